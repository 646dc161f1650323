//! A serde model of Docker Compose files and the project resolution rules
//! the mock needs: multi-file merge, resource name resolution and canonical
//! YAML rendering of service definitions (the input to the content hash).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One parsed compose file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub services: BTreeMap<String, ServiceConfig>,
    pub networks: BTreeMap<String, Option<NetworkConfig>>,
    pub volumes: BTreeMap<String, Option<VolumeConfig>>,
}

/// A value that may be written as a single string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StringOrList::One(s) => s.split_whitespace().map(str::to_string).collect(),
            StringOrList::Many(list) => list.clone(),
        }
    }
}

/// The environment section: either a `KEY: value` map or a `KEY=value` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Environment {
    Map(BTreeMap<String, Option<String>>),
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Map(BTreeMap::new())
    }
}

impl Environment {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Environment::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default()))
                .collect(),
            Environment::List(list) => list
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (entry.clone(), String::new()),
                })
                .collect(),
        }
    }
}

/// A service port, in either the short `"[host_ip:][published:]target[/proto]"`
/// form or the long map form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortConfig {
    Short(String),
    Long {
        target: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        published: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host_ip: Option<String>,
    },
}

/// A port normalised out of either syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPort {
    pub target: u16,
    pub published: String,
    pub protocol: String,
    pub host_ip: String,
}

impl ResolvedPort {
    /// The Docker port key, e.g. `8080/tcp`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.target, self.protocol)
    }
}

impl PortConfig {
    pub fn resolve(&self) -> Result<ResolvedPort, String> {
        match self {
            PortConfig::Long {
                target,
                published,
                protocol,
                host_ip,
            } => Ok(ResolvedPort {
                target: *target,
                published: published.clone().unwrap_or_default(),
                protocol: protocol.clone().unwrap_or_else(|| "tcp".to_string()),
                host_ip: host_ip.clone().unwrap_or_default(),
            }),
            PortConfig::Short(spec) => {
                let (address, protocol) = match spec.split_once('/') {
                    Some((address, protocol)) => (address, protocol.to_string()),
                    None => (spec.as_str(), "tcp".to_string()),
                };

                let parts: Vec<&str> = address.split(':').collect();
                let (host_ip, published, target) = match parts.as_slice() {
                    [target] => (String::new(), String::new(), *target),
                    [published, target] => (String::new(), published.to_string(), *target),
                    [host_ip, published, target] => {
                        (host_ip.to_string(), published.to_string(), *target)
                    }
                    _ => return Err(format!("unparseable port binding [{}]", spec)),
                };

                let target = target
                    .parse::<u16>()
                    .map_err(|e| format!("error parsing port binding [{}]: {}", spec, e))?;

                Ok(ResolvedPort {
                    target,
                    published,
                    protocol,
                    host_ip,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation: Option<String>,
}

/// A service mount, in either the short `source:target[:options]` form or the
/// long map form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceVolumeConfig {
    Short(String),
    Long {
        #[serde(rename = "type")]
        mount_type: String,
        source: String,
        target: String,
        #[serde(default)]
        read_only: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bind: Option<BindOptions>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedServiceVolume {
    pub mount_type: String,
    pub source: String,
    pub target: String,
    pub read_only: bool,
    pub propagation: Option<String>,
}

const PROPAGATION_MODES: &[&str] = &["rprivate", "private", "rshared", "shared", "rslave", "slave"];

impl ServiceVolumeConfig {
    pub fn resolve(&self) -> Result<ResolvedServiceVolume, String> {
        match self {
            ServiceVolumeConfig::Long {
                mount_type,
                source,
                target,
                read_only,
                bind,
            } => Ok(ResolvedServiceVolume {
                mount_type: mount_type.clone(),
                source: source.clone(),
                target: target.clone(),
                read_only: *read_only,
                propagation: bind.as_ref().and_then(|b| b.propagation.clone()),
            }),
            ServiceVolumeConfig::Short(spec) => {
                let parts: Vec<&str> = spec.split(':').collect();
                let (source, target, options) = match parts.as_slice() {
                    [source, target] => (*source, *target, ""),
                    [source, target, options] => (*source, *target, *options),
                    _ => return Err(format!("unparseable volume binding [{}]", spec)),
                };

                // Paths are bind mounts, bare names reference volumes.
                let mount_type = if source.starts_with('/')
                    || source.starts_with("./")
                    || source.starts_with("~/")
                {
                    "bind"
                } else {
                    "volume"
                };

                let mut read_only = false;
                let mut propagation = None;
                for option in options.split(',').filter(|o| !o.is_empty()) {
                    match option {
                        "ro" => read_only = true,
                        "rw" => read_only = false,
                        mode if PROPAGATION_MODES.contains(&mode) => {
                            propagation = Some(mode.to_string())
                        }
                        other => {
                            return Err(format!(
                                "unsupported volume option [{}] in [{}]",
                                other, spec
                            ))
                        }
                    }
                }

                Ok(ResolvedServiceVolume {
                    mount_type: mount_type.to_string(),
                    source: source.to_string(),
                    target: target.to_string(),
                    read_only,
                    propagation,
                })
            }
        }
    }
}

/// The per-service network attachment config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNetworkConfig {
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

/// The service networks section: a plain list of names or a map with
/// per-network attachment config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceNetworks {
    List(Vec<String>),
    Map(BTreeMap<String, Option<ServiceNetworkConfig>>),
}

impl Default for ServiceNetworks {
    fn default() -> Self {
        ServiceNetworks::List(vec![])
    }
}

impl ServiceNetworks {
    pub fn to_map(&self) -> BTreeMap<String, Option<ServiceNetworkConfig>> {
        match self {
            ServiceNetworks::List(names) => {
                names.iter().map(|name| (name.clone(), None)).collect()
            }
            ServiceNetworks::Map(map) => map.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<StringOrList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// A compose service definition. The canonical YAML rendering of this struct
/// is what gets content-hashed for regeneration checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<StringOrList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<StringOrList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domainname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    pub environment: Environment,
    pub ports: Vec<PortConfig>,
    pub volumes: Vec<ServiceVolumeConfig>,
    pub networks: ServiceNetworks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheckConfig>,
    pub labels: BTreeMap<String, String>,
    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub security_opt: Vec<String>,
    pub tty: bool,
    pub stdin_open: bool,
    pub privileged: bool,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
}

impl ServiceConfig {
    /// The canonical YAML used for the content hash.
    pub fn canonical_yaml(&self) -> Result<String, String> {
        serde_yaml::to_string(self).map_err(|e| format!("error marshalling service: {}", e))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    pub enable_ipv6: bool,
    pub internal: bool,
    pub attachable: bool,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    pub driver_opts: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// A network or volume with its Docker-side name resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNetwork {
    pub name: String,
    pub config: NetworkConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVolume {
    pub name: String,
    pub config: VolumeConfig,
}

/// A fully loaded and merged compose project.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeProject {
    pub name: String,
    /// Services keyed by their name in the YAML, with `container_name`
    /// resolved.
    pub services: BTreeMap<String, ServiceConfig>,
    /// Networks keyed by their name in the YAML.
    pub networks: BTreeMap<String, ResolvedNetwork>,
    /// Volumes keyed by their name in the YAML.
    pub volumes: BTreeMap<String, ResolvedVolume>,
}

/// The output format of `compose config`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComposeFormat {
    Yaml,
    Json,
}

impl ComposeProject {
    /// Loads and merges the given compose files under `project_name`. Later
    /// files override earlier ones per top-level key.
    pub fn load<P: AsRef<Path>>(project_name: &str, paths: &[P]) -> Result<Self, String> {
        let merged = load_merged_file(paths)?;

        let services = merged
            .services
            .into_iter()
            .map(|(service_name, mut service)| {
                if service.container_name.is_none() {
                    // Compose names containers `{project}-{service}-{replica}`.
                    service.container_name =
                        Some(format!("{}-{}-1", project_name, service_name));
                }
                (service_name, service)
            })
            .collect();

        let networks = merged
            .networks
            .into_iter()
            .map(|(yaml_name, config)| {
                let config = config.unwrap_or_default();
                let name = resolve_resource_name(
                    project_name,
                    &yaml_name,
                    config.name.as_deref(),
                    config.external,
                );
                (yaml_name, ResolvedNetwork { name, config })
            })
            .collect();

        let volumes = merged
            .volumes
            .into_iter()
            .map(|(yaml_name, config)| {
                let config = config.unwrap_or_default();
                let name = resolve_resource_name(
                    project_name,
                    &yaml_name,
                    config.name.as_deref(),
                    config.external,
                );
                (yaml_name, ResolvedVolume { name, config })
            })
            .collect();

        Ok(Self {
            name: project_name.to_string(),
            services,
            networks,
            volumes,
        })
    }

    /// Renders the merged project files in the requested format, emulating
    /// `docker compose config`.
    pub fn render<P: AsRef<Path>>(
        project_name: &str,
        paths: &[P],
        format: ComposeFormat,
    ) -> Result<String, String> {
        let mut merged = load_merged_file(paths)?;
        merged.name = Some(project_name.to_string());

        match format {
            ComposeFormat::Yaml => serde_yaml::to_string(&merged)
                .map_err(|e| format!("error marshalling model: {}", e)),
            ComposeFormat::Json => serde_json::to_string_pretty(&merged)
                .map_err(|e| format!("error marshalling model: {}", e)),
        }
    }
}

fn load_merged_file<P: AsRef<Path>>(paths: &[P]) -> Result<ComposeFile, String> {
    if paths.is_empty() {
        return Err("no compose files provided".to_string());
    }

    let mut merged = ComposeFile::default();
    for path in paths {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("error reading compose file [{}]: {}", path.display(), e))?;
        let file: ComposeFile = serde_yaml::from_str(&contents)
            .map_err(|e| format!("error parsing compose file [{}]: {}", path.display(), e))?;

        if file.name.is_some() {
            merged.name = file.name;
        }
        merged.services.extend(file.services);
        merged.networks.extend(file.networks);
        merged.volumes.extend(file.volumes);
    }
    Ok(merged)
}

/// Compose resource naming: an explicit `name` wins, external resources keep
/// their YAML name, and everything else is prefixed with the project name.
fn resolve_resource_name(
    project_name: &str,
    yaml_name: &str,
    explicit: Option<&str>,
    external: bool,
) -> String {
    if let Some(name) = explicit {
        name.to_string()
    } else if external {
        yaml_name.to_string()
    } else {
        format!("{}_{}", project_name, yaml_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn short_port_forms() {
        let port = PortConfig::Short("8080:80".to_string()).resolve().unwrap();
        assert_eq!(port.target, 80);
        assert_eq!(port.published, "8080");
        assert_eq!(port.protocol, "tcp");
        assert_eq!(port.key(), "80/tcp");

        let port = PortConfig::Short("127.0.0.1:53:53/udp".to_string())
            .resolve()
            .unwrap();
        assert_eq!(port.host_ip, "127.0.0.1");
        assert_eq!(port.protocol, "udp");
        assert_eq!(port.key(), "53/udp");

        assert!(PortConfig::Short("a:b:c:d".to_string()).resolve().is_err());
    }

    #[test]
    fn short_volume_forms() {
        let bind = ServiceVolumeConfig::Short("/host/data:/data:ro".to_string())
            .resolve()
            .unwrap();
        assert_eq!(bind.mount_type, "bind");
        assert!(bind.read_only);

        let volume = ServiceVolumeConfig::Short("my-volume:/data".to_string())
            .resolve()
            .unwrap();
        assert_eq!(volume.mount_type, "volume");
        assert!(!volume.read_only);
    }

    #[test]
    fn environment_forms() {
        let as_map: Environment =
            serde_yaml::from_str("FOO: bar\nEMPTY:\n").unwrap();
        let map = as_map.to_map();
        assert_eq!(map.get("FOO").unwrap(), "bar");
        assert_eq!(map.get("EMPTY").unwrap(), "");

        let as_list: Environment = serde_yaml::from_str("- FOO=bar\n- FLAG\n").unwrap();
        let map = as_list.to_map();
        assert_eq!(map.get("FOO").unwrap(), "bar");
        assert_eq!(map.get("FLAG").unwrap(), "");
    }

    #[test]
    fn project_resolves_names() {
        let file = write_temp(
            r#"
services:
  api:
    image: example/api:latest
networks:
  internal: {}
  shared:
    external: true
volumes:
  data: {}
  keyed:
    name: explicit-name
"#,
        );

        let project = ComposeProject::load("proj", &[file.path()]).unwrap();
        assert_eq!(
            project.services["api"].container_name.as_deref(),
            Some("proj-api-1")
        );
        assert_eq!(project.networks["internal"].name, "proj_internal");
        assert_eq!(project.networks["shared"].name, "shared");
        assert_eq!(project.volumes["data"].name, "proj_data");
        assert_eq!(project.volumes["keyed"].name, "explicit-name");
    }

    #[test]
    fn later_files_override() {
        let base = write_temp(
            r#"
services:
  api:
    image: example/api:v1
"#,
        );
        let overlay = write_temp(
            r#"
services:
  api:
    image: example/api:v2
"#,
        );

        let project =
            ComposeProject::load("proj", &[base.path(), overlay.path()]).unwrap();
        assert_eq!(project.services["api"].image, "example/api:v2");
    }

    #[test]
    fn canonical_yaml_is_stable() {
        let file = write_temp(
            r#"
services:
  api:
    image: example/api:latest
    environment:
      B: "2"
      A: "1"
"#,
        );
        let a = ComposeProject::load("proj", &[file.path()]).unwrap();
        let b = ComposeProject::load("proj", &[file.path()]).unwrap();
        assert_eq!(
            a.services["api"].canonical_yaml().unwrap(),
            b.services["api"].canonical_yaml().unwrap()
        );
    }

    #[test]
    fn render_config_yaml() {
        let file = write_temp(
            r#"
services:
  api:
    image: example/api:latest
"#,
        );
        let yaml =
            ComposeProject::render("proj", &[file.path()], ComposeFormat::Yaml).unwrap();
        assert!(yaml.contains("name: proj"));
        assert!(yaml.contains("example/api:latest"));

        let json =
            ComposeProject::render("proj", &[file.path()], ComposeFormat::Json).unwrap();
        assert!(json.contains("\"name\": \"proj\""));
    }
}
