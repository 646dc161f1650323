use crate::compose::{ComposeFormat, ComposeProject};
use crate::generation::now_rfc3339;
use crate::models::{
    ContainerDetails, ContainerSummary, DiskUsage, PortSummary, SummaryHostConfig,
    SummaryNetworkSettings, Volume, VolumeUsageData,
};
use crate::state::DockerState;
use chrono::DateTime;
use sha2::{Digest, Sha256};
use slog::{info, Logger};
use std::collections::HashMap;
use std::path::Path;

/// The Docker mock: an in-process stand-in for the daemon plus the compose
/// plugin, backed by [`DockerState`] and a registry of named snapshots.
pub struct DockerMock {
    name: String,
    pub(crate) state: DockerState,
    snapshots: HashMap<String, DockerState>,
    log: Logger,
}

impl DockerMock {
    pub fn new(log: Logger) -> Self {
        Self {
            name: "docker".to_string(),
            state: DockerState::new(),
            snapshots: HashMap::new(),
            log,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &DockerState {
        &self.state
    }

    /*
     * Container lifecycle
     */

    /// Returns the inspect view of a container. The error string matches the
    /// real daemon's.
    pub fn container_inspect(&self, container_name: &str) -> Result<ContainerDetails, String> {
        self.state
            .containers
            .get(container_name)
            .cloned()
            .ok_or_else(|| format!("No such container: {}", container_name))
    }

    /// Lists running containers, or all of them when `all` is set.
    pub fn container_list(&self, all: bool) -> Vec<ContainerSummary> {
        self.state
            .containers
            .values()
            .filter(|c| all || c.state.running)
            .map(summarize_container)
            .collect()
    }

    pub fn container_start(&mut self, container_name: &str) -> Result<(), String> {
        let container = self
            .state
            .containers
            .get_mut(container_name)
            .ok_or_else(|| format!("No such container: {}", container_name))?;
        container.state.set_running(now_rfc3339());
        Ok(())
    }

    pub fn container_stop(&mut self, container_name: &str) -> Result<(), String> {
        let container = self
            .state
            .containers
            .get_mut(container_name)
            .ok_or_else(|| format!("No such container: {}", container_name))?;
        container.state.set_stopped(0, now_rfc3339());
        Ok(())
    }

    pub fn container_restart(&mut self, container_name: &str) -> Result<(), String> {
        self.container_start(container_name)
    }

    /// Removes a container and detaches it from every network it joined.
    pub fn container_remove(&mut self, container_name: &str) -> Result<(), String> {
        let container = self
            .state
            .containers
            .remove(container_name)
            .ok_or_else(|| format!("No such container: {}", container_name))?;

        for network_name in container.network_settings.networks.keys() {
            if let Some(network) = self.state.networks.get_mut(network_name) {
                network.containers.remove(&container.id);
            }
        }
        Ok(())
    }

    /*
     * Volumes & networks
     */

    pub fn volume_remove(&mut self, volume_name: &str) -> Result<(), String> {
        if self.state.volumes.remove(volume_name).is_none() {
            return Err(format!("No such volume: {}", volume_name));
        }
        Ok(())
    }

    /// Removes a network, returning its subnet to the pool. Fails while any
    /// container is still attached.
    pub fn network_remove(&mut self, network_name: &str) -> Result<(), String> {
        let network = self
            .state
            .networks
            .get(network_name)
            .ok_or_else(|| format!("No such network: {}", network_name))?;

        if !network.containers.is_empty() {
            return Err(format!("network {} is in use still", network_name));
        }

        self.state.networks.remove(network_name);
        self.state.release_subnet(network_name);
        self.state.network_indices.remove(network_name);
        Ok(())
    }

    /*
     * Disk usage
     */

    /// The flat disk-usage rollup. Sizes are whatever the admin mutators set.
    pub fn disk_usage(&self) -> DiskUsage {
        DiskUsage {
            containers: self.container_list(true),
            volumes: self.state.volumes.values().cloned().collect(),
        }
    }

    pub fn set_container_disk_usage(
        &mut self,
        container_name: &str,
        size_root_fs: i64,
        size_rw: i64,
    ) -> Result<(), String> {
        let container = self
            .state
            .containers
            .get_mut(container_name)
            .ok_or_else(|| format!("No such container: {}", container_name))?;
        container.size_root_fs = size_root_fs;
        container.size_rw = size_rw;
        Ok(())
    }

    pub fn set_volume_disk_usage(&mut self, volume_name: &str, size: i64) -> Result<(), String> {
        let volume = self
            .state
            .volumes
            .get_mut(volume_name)
            .ok_or_else(|| format!("No such volume: {}", volume_name))?;
        volume.usage_data = Some(VolumeUsageData { size, ref_count: 1 });
        Ok(())
    }

    /*
     * Direct injection, for tests that bypass compose
     */

    pub fn add_container(&mut self, container: ContainerDetails) -> Result<(), String> {
        let name = container.bare_name().to_string();
        if self.state.containers.contains_key(&name) {
            return Err(format!("container {} already exists", name));
        }
        self.state.containers.insert(name, container);
        Ok(())
    }

    pub fn add_volume(&mut self, volume: Volume) -> Result<(), String> {
        if self.state.volumes.contains_key(&volume.name) {
            return Err(format!("volume {} already exists", volume.name));
        }
        self.state.volumes.insert(volume.name.clone(), volume);
        Ok(())
    }

    /*
     * Compose
     */

    /// Emulates `docker compose up`: realize networks (external first), then
    /// volumes, then services. A service whose definition hash is unchanged
    /// and whose container still exists is just started.
    pub fn compose_up<P: AsRef<Path>>(
        &mut self,
        project_name: &str,
        compose_files: &[P],
    ) -> Result<(), String> {
        let project = ComposeProject::load(project_name, compose_files)?;

        // External networks first, then project networks; both passes walk
        // the map in yaml-name order.
        for (yaml_name, network) in project.networks.iter().filter(|(_, n)| n.config.external) {
            self.generate_network(yaml_name, network, project_name)?;
        }
        for (yaml_name, network) in project.networks.iter().filter(|(_, n)| !n.config.external) {
            self.generate_network(yaml_name, network, project_name)?;
        }

        for (yaml_name, volume) in &project.volumes {
            self.generate_volume(yaml_name, volume, project_name);
        }

        for (service_name, service) in &project.services {
            let yaml = service.canonical_yaml()?;
            let hash: [u8; 32] = Sha256::digest(yaml.as_bytes()).into();

            let container_name = service
                .container_name
                .clone()
                .unwrap_or_else(|| format!("{}-{}-1", project_name, service_name));

            let unchanged = self.state.service_hashes.get(service_name) == Some(&hash);
            if unchanged && self.state.containers.contains_key(&container_name) {
                self.container_start(&container_name)
                    .map_err(|e| format!("error starting service [{}]: {}", service_name, e))?;
                continue;
            }

            self.generate_service(service_name, service, &project)?;
            self.state
                .service_hashes
                .insert(service_name.clone(), hash);
        }

        info!(self.log, "Compose project up"; "project" => project_name);
        Ok(())
    }

    /// Emulates `docker compose stop`.
    pub fn compose_stop<P: AsRef<Path>>(
        &mut self,
        project_name: &str,
        compose_files: &[P],
    ) -> Result<(), String> {
        let project = ComposeProject::load(project_name, compose_files)?;

        for (service_name, service) in &project.services {
            let container_name = service
                .container_name
                .clone()
                .unwrap_or_else(|| format!("{}-{}-1", project_name, service_name));
            self.container_stop(&container_name)
                .map_err(|e| format!("error stopping service [{}]: {}", service_name, e))?;
        }
        Ok(())
    }

    /// Emulates `docker compose down`: remove services, then volumes, then
    /// networks.
    pub fn compose_down<P: AsRef<Path>>(
        &mut self,
        project_name: &str,
        compose_files: &[P],
    ) -> Result<(), String> {
        let project = ComposeProject::load(project_name, compose_files)?;

        for (service_name, service) in &project.services {
            let container_name = service
                .container_name
                .clone()
                .unwrap_or_else(|| format!("{}-{}-1", project_name, service_name));
            self.container_remove(&container_name)
                .map_err(|e| format!("error removing service [{}]: {}", service_name, e))?;
            self.state.service_hashes.remove(service_name);
        }

        for volume in project.volumes.values() {
            self.volume_remove(&volume.name)
                .map_err(|e| format!("error removing volume [{}]: {}", volume.name, e))?;
        }

        for network in project.networks.values() {
            self.network_remove(&network.name)
                .map_err(|e| format!("error removing network [{}]: {}", network.name, e))?;
        }

        info!(self.log, "Compose project down"; "project" => project_name);
        Ok(())
    }

    /// Emulates `docker compose config`.
    pub fn compose_config<P: AsRef<Path>>(
        &self,
        project_name: &str,
        compose_files: &[P],
        format: ComposeFormat,
    ) -> Result<String, String> {
        ComposeProject::render(project_name, compose_files, format)
    }

    /*
     * Snapshots
     */

    /// Stores a deep clone of the state under `name`.
    pub fn take_snapshot(&mut self, name: &str) -> String {
        self.snapshots.insert(name.to_string(), self.state.clone());
        info!(self.log, "Took Docker snapshot"; "name" => name);
        name.to_string()
    }

    /// Installs a clone of the named snapshot, keeping the stored copy
    /// revertible again later.
    pub fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        let snapshot = self
            .snapshots
            .get(name)
            .ok_or_else(|| format!("snapshot [{}] does not exist", name))?;
        self.state = snapshot.clone();
        info!(self.log, "Reverted to Docker snapshot"; "name" => name);
        Ok(())
    }

    /// Releases all state. Safe to call more than once.
    pub fn close(&mut self) {
        self.state = DockerState::new();
        self.snapshots.clear();
    }
}

/// Builds the "list" summary view from the inspect view.
fn summarize_container(container: &ContainerDetails) -> ContainerSummary {
    let created = DateTime::parse_from_rfc3339(&container.created)
        .map(|t| t.timestamp())
        .unwrap_or_default();

    let mut ports = vec![];
    for (key, bindings) in &container.network_settings.ports {
        let (target, protocol) = key
            .split_once('/')
            .unwrap_or((key.as_str(), "tcp"));
        for binding in bindings {
            ports.push(PortSummary {
                ip: binding.host_ip.clone(),
                private_port: target.parse().unwrap_or_default(),
                public_port: binding.host_port.parse().unwrap_or_default(),
                protocol: protocol.to_string(),
            });
        }
    }

    let status = if container.state.running {
        "Up".to_string()
    } else {
        format!("Exited ({})", container.state.exit_code)
    };

    ContainerSummary {
        id: container.id.clone(),
        names: vec![container.name.clone()],
        image: container.config.image.clone(),
        image_id: container.image.clone(),
        command: format!("{} {}", container.path, container.args.join(" ")),
        created,
        ports,
        size_rw: container.size_rw,
        size_root_fs: container.size_root_fs,
        labels: container.config.labels.clone(),
        state: container.state.status.clone(),
        status,
        host_config: SummaryHostConfig {
            network_mode: container.host_config.network_mode.clone(),
        },
        mounts: container.mounts.clone(),
        network_settings: SummaryNetworkSettings {
            networks: container.network_settings.networks.clone(),
        },
    }
}
