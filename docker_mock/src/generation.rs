//! Projection of compose definitions into the Docker object model.

use crate::compose::{ComposeProject, ResolvedNetwork, ResolvedVolume, ServiceConfig};
use crate::manager::DockerMock;
use crate::models::{
    ContainerConfig, ContainerDetails, ContainerState, EmptyObject, EndpointResource,
    EndpointSettings, HostConfig, HostMount, Ipam, IpamConfig, MountPoint, Network,
    NetworkSettings, PortBinding, RestartPolicy, Volume,
};
use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use std::collections::BTreeMap;

/// A random 32-byte hex id, the shape Docker uses for containers, images,
/// networks and endpoints.
pub(crate) fn random_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl DockerMock {
    /// Creates or updates a network from a compose definition. Repeat
    /// creations only overwrite the boolean flags.
    pub(crate) fn generate_network(
        &mut self,
        yaml_name: &str,
        resolved: &ResolvedNetwork,
        project_name: &str,
    ) -> Result<(), String> {
        let config = &resolved.config;

        if let Some(existing) = self.state.networks.get_mut(&resolved.name) {
            existing.enable_ipv6 = config.enable_ipv6;
            existing.internal = config.internal;
            existing.attachable = config.attachable;
            return Ok(());
        }

        let subnet = self.state.allocate_subnet(&resolved.name)?;

        let mut labels = config.labels.clone();
        labels.insert(
            "com.docker.compose.network".to_string(),
            yaml_name.to_string(),
        );
        labels.insert(
            "com.docker.compose.project".to_string(),
            project_name.to_string(),
        );
        labels.insert("com.docker.compose.version".to_string(), "0.0.1".to_string());

        let network = Network {
            name: resolved.name.clone(),
            id: random_id(),
            created: now_rfc3339(),
            scope: "local".to_string(),
            driver: "bridge".to_string(),
            enable_ipv6: config.enable_ipv6,
            ipam: Ipam {
                driver: "default".to_string(),
                config: vec![IpamConfig {
                    subnet: format!("172.{}.0.0/16", subnet),
                    gateway: format!("172.{}.0.1", subnet),
                }],
            },
            internal: config.internal,
            attachable: config.attachable,
            containers: BTreeMap::new(),
            options: BTreeMap::new(),
            labels,
        };
        self.state.networks.insert(resolved.name.clone(), network);

        // Addresses 0 and 1 are the network and gateway; containers start at 2.
        self.state.network_indices.insert(resolved.name.clone(), 2);
        Ok(())
    }

    /// Creates or updates a volume from a compose definition. Repeat
    /// creations only overwrite the driver options.
    pub(crate) fn generate_volume(
        &mut self,
        yaml_name: &str,
        resolved: &ResolvedVolume,
        project_name: &str,
    ) {
        let config = &resolved.config;

        if let Some(existing) = self.state.volumes.get_mut(&resolved.name) {
            existing.options = config.driver_opts.clone();
            return;
        }

        let mut labels = config.labels.clone();
        labels.insert(
            "com.docker.compose.project".to_string(),
            project_name.to_string(),
        );
        labels.insert("com.docker.compose.version".to_string(), "0.0.1".to_string());
        labels.insert(
            "com.docker.compose.volume".to_string(),
            yaml_name.to_string(),
        );

        let volume = Volume {
            created_at: now_rfc3339(),
            driver: "local".to_string(),
            labels,
            mountpoint: format!("/var/lib/docker/volumes/{}/_data", resolved.name),
            name: resolved.name.clone(),
            scope: "local".to_string(),
            options: config.driver_opts.clone(),
            usage_data: None,
        };
        self.state.volumes.insert(resolved.name.clone(), volume);
    }

    /// Synthesizes a container from a compose service, replacing any previous
    /// container with the same name.
    pub(crate) fn generate_service(
        &mut self,
        service_name: &str,
        service: &ServiceConfig,
        project: &ComposeProject,
    ) -> Result<(), String> {
        let container_name = service
            .container_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}-1", project.name, service_name));

        // A replaced container leaves its old endpoints behind otherwise.
        if let Some(previous) = self.state.containers.remove(&container_name) {
            for network_name in previous.network_settings.networks.keys() {
                if let Some(network) = self.state.networks.get_mut(network_name) {
                    network.containers.remove(&previous.id);
                }
            }
        }

        let now = now_rfc3339();

        // Mounts.
        let mut binds = vec![];
        let mut host_mounts = vec![];
        let mut mount_points = vec![];
        for volume_config in &service.volumes {
            let mount = volume_config.resolve().map_err(|e| {
                format!("error parsing mounts on container [{}]: {}", container_name, e)
            })?;
            match mount.mount_type.as_str() {
                "bind" => {
                    let mode = if mount.read_only { "ro" } else { "rw" };
                    binds.push(format!("{}:{}:{}", mount.source, mount.target, mode));
                    mount_points.push(MountPoint {
                        mount_type: "bind".to_string(),
                        name: None,
                        source: mount.source.clone(),
                        destination: mount.target.clone(),
                        driver: String::new(),
                        mode: mode.to_string(),
                        rw: !mount.read_only,
                        propagation: mount
                            .propagation
                            .clone()
                            .unwrap_or_else(|| "rprivate".to_string()),
                    });
                }
                "volume" => {
                    let resolved_volume = project.volumes.get(&mount.source).ok_or_else(|| {
                        format!(
                            "volume [{}] referenced by service [{}] is not defined",
                            mount.source, service_name
                        )
                    })?;
                    let volume_entity =
                        self.state.volumes.get(&resolved_volume.name).ok_or_else(|| {
                            format!("volume [{}] has not been created", resolved_volume.name)
                        })?;

                    mount_points.push(MountPoint {
                        mount_type: "volume".to_string(),
                        name: Some(resolved_volume.name.clone()),
                        source: volume_entity.mountpoint.clone(),
                        destination: mount.target.clone(),
                        driver: "local".to_string(),
                        mode: "z".to_string(),
                        rw: !mount.read_only,
                        propagation: String::new(),
                    });
                    host_mounts.push(HostMount {
                        mount_type: "volume".to_string(),
                        source: resolved_volume.name.clone(),
                        target: mount.target.clone(),
                    });
                }
                other => return Err(format!("unsupported mount type [{}]", other)),
            }
        }
        binds.sort();

        // Ports, sorted by port key for deterministic derived maps.
        let mut ports = service
            .ports
            .iter()
            .map(|p| {
                p.resolve().map_err(|e| {
                    format!(
                        "error parsing service port binding on container [{}]: {}",
                        container_name, e
                    )
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        ports.sort_by_key(|p| p.key());

        let mut port_bindings = BTreeMap::new();
        let mut exposed_ports = BTreeMap::new();
        let mut ns_ports = BTreeMap::new();
        for port in &ports {
            let key = port.key();
            port_bindings.insert(
                key.clone(),
                vec![PortBinding {
                    host_ip: port.host_ip.clone(),
                    host_port: port.published.clone(),
                }],
            );
            exposed_ports.insert(key.clone(), EmptyObject {});

            let bindings = if port.host_ip.is_empty() {
                vec![
                    PortBinding {
                        host_ip: "0.0.0.0".to_string(),
                        host_port: port.published.clone(),
                    },
                    PortBinding {
                        host_ip: "::".to_string(),
                        host_port: port.published.clone(),
                    },
                ]
            } else {
                vec![PortBinding {
                    host_ip: port.host_ip.clone(),
                    host_port: port.published.clone(),
                }]
            };
            ns_ports.insert(key, bindings);
        }

        // Environment flattens to sorted KEY=VALUE strings.
        let env: Vec<String> = service
            .environment
            .to_map()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let id = random_id();
        let image_id = random_id();
        let sandbox_id = random_id();
        let short_id = id[..12].to_string();
        let hostname = service.hostname.clone().unwrap_or_else(|| short_id.clone());

        // Network endpoints, allocated in yaml-name order.
        let mut endpoints: BTreeMap<String, EndpointSettings> = BTreeMap::new();
        for (network_yaml_name, attachment) in service.networks.to_map() {
            let resolved_network =
                project.networks.get(&network_yaml_name).ok_or_else(|| {
                    format!(
                        "network [{}] referenced by service [{}] is not defined",
                        network_yaml_name, service_name
                    )
                })?;
            let network_name = &resolved_network.name;
            let network_entity = self.state.networks.get(network_name).ok_or_else(|| {
                format!("network [{}] has not been created", network_name)
            })?;
            let subnet = *self
                .state
                .used_subnets
                .get(network_name)
                .ok_or_else(|| format!("network [{}] has no subnet", network_name))?;
            let index = self
                .state
                .network_indices
                .get(network_name)
                .copied()
                .unwrap_or(2);

            // A present attachment config is taken as-is, empty MAC included;
            // aliases and a MAC are only synthesized when the whole config is
            // absent.
            let (aliases, mac_address) = match attachment {
                Some(config) => (
                    config.aliases.clone(),
                    config.mac_address.clone().unwrap_or_default(),
                ),
                None => (
                    vec![container_name.clone(), service_name.to_string()],
                    format!("02:42:ac:{:02x}:00:{:02x}", subnet, index),
                ),
            };

            let mut dns_names = vec![
                container_name.clone(),
                service_name.to_string(),
                short_id.clone(),
            ];
            for alias in &aliases {
                if !dns_names.contains(alias) {
                    dns_names.push(alias.clone());
                }
            }

            endpoints.insert(
                network_name.clone(),
                EndpointSettings {
                    aliases,
                    mac_address,
                    network_id: network_entity.id.clone(),
                    endpoint_id: random_id(),
                    gateway: network_entity.ipam.config[0].gateway.clone(),
                    ip_address: format!("172.{}.0.{}", subnet, index),
                    ip_prefix_len: 16,
                    dns_names,
                },
            );

            // Post-increment for the next container on this network.
            self.state
                .network_indices
                .insert(network_name.clone(), index + 1);
        }

        // Runtime fields the compose file may leave unset.
        let network_mode = match &service.network_mode {
            Some(mode) => mode.clone(),
            None => service
                .networks
                .to_map()
                .keys()
                .filter_map(|yaml_name| project.networks.get(yaml_name))
                .find(|n| !n.config.external)
                .map(|n| n.name.clone())
                .unwrap_or_default(),
        };
        let runtime = service
            .runtime
            .clone()
            .unwrap_or_else(|| "runc".to_string());
        let maximum_retry_count = service
            .healthcheck
            .as_ref()
            .and_then(|h| h.retries)
            .unwrap_or(0);

        let entrypoint = service
            .entrypoint
            .as_ref()
            .map(|e| e.to_vec())
            .unwrap_or_default();
        let command = service
            .command
            .as_ref()
            .map(|c| c.to_vec())
            .unwrap_or_default();

        let container = ContainerDetails {
            id: id.clone(),
            created: now.clone(),
            path: entrypoint.join(" "),
            args: command.clone(),
            state: ContainerState::new_running(now),
            image: format!("sha256:{}", image_id),
            name: format!("/{}", container_name),
            restart_count: 0,
            driver: "overlay2".to_string(),
            platform: "linux".to_string(),
            host_config: HostConfig {
                binds,
                network_mode,
                port_bindings,
                restart_policy: RestartPolicy {
                    name: service.restart.clone().unwrap_or_default(),
                    maximum_retry_count,
                },
                auto_remove: false,
                runtime,
                mounts: host_mounts,
                cap_add: service.cap_add.clone(),
                cap_drop: service.cap_drop.clone(),
                dns: service.dns.clone(),
                dns_search: service.dns_search.clone(),
                privileged: service.privileged,
                readonly_rootfs: service.read_only,
                security_opt: service.security_opt.clone(),
            },
            mounts: mount_points,
            config: ContainerConfig {
                hostname,
                domainname: service.domainname.clone().unwrap_or_default(),
                user: service.user.clone().unwrap_or_default(),
                exposed_ports,
                tty: service.tty,
                open_stdin: service.stdin_open,
                env,
                cmd: command,
                image: service.image.clone(),
                working_dir: service.working_dir.clone().unwrap_or_default(),
                entrypoint,
                labels: service.labels.clone(),
                stop_signal: service.stop_signal.clone(),
            },
            network_settings: NetworkSettings {
                sandbox_id: sandbox_id.clone(),
                sandbox_key: format!("/var/run/docker/netns/{}", &sandbox_id[..12]),
                ports: ns_ports,
                networks: endpoints.clone(),
            },
            size_rw: 0,
            size_root_fs: 0,
        };

        self.state
            .containers
            .insert(container_name.clone(), container);

        // Attach the container to each network's endpoint table.
        for (network_name, endpoint) in &endpoints {
            if let Some(network) = self.state.networks.get_mut(network_name) {
                network.containers.insert(
                    id.clone(),
                    EndpointResource {
                        name: container_name.clone(),
                        endpoint_id: endpoint.endpoint_id.clone(),
                        mac_address: endpoint.mac_address.clone(),
                        ipv4_address: endpoint.ip_address.clone(),
                    },
                );
            }
        }

        Ok(())
    }
}
