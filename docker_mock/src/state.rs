//! The cloneable backing state of the Docker mock.

use crate::models::{ContainerDetails, Network, Volume};
use std::collections::{BTreeMap, BTreeSet};

/// Docker reserves the bridge subnets 172.17.0.0/16 through 172.31.0.0/16.
pub const FIRST_SUBNET: u8 = 17;
pub const LAST_SUBNET: u8 = 31;

/// Everything the mock knows, in plain cloneable values. Snapshots are just
/// clones of this struct; every map key and value is owned data.
#[derive(Debug, Clone)]
pub struct DockerState {
    /// Containers keyed by bare container name.
    pub containers: BTreeMap<String, ContainerDetails>,
    /// Volumes keyed by volume name.
    pub volumes: BTreeMap<String, Volume>,
    /// Networks keyed by network name.
    pub networks: BTreeMap<String, Network>,

    /// The third octet pool for new bridge networks.
    pub available_subnets: BTreeSet<u8>,
    /// Subnet each network drew, keyed by network name.
    pub used_subnets: BTreeMap<String, u8>,
    /// Next IP/MAC index per network, keyed by network name.
    pub network_indices: BTreeMap<String, u8>,

    /// SHA-256 of each service's canonical YAML, keyed by service name. Used
    /// to skip regenerating unchanged services on `up`.
    pub service_hashes: BTreeMap<String, [u8; 32]>,
}

impl Default for DockerState {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerState {
    pub fn new() -> Self {
        Self {
            containers: BTreeMap::new(),
            volumes: BTreeMap::new(),
            networks: BTreeMap::new(),
            available_subnets: (FIRST_SUBNET..=LAST_SUBNET).collect(),
            used_subnets: BTreeMap::new(),
            network_indices: BTreeMap::new(),
            service_hashes: BTreeMap::new(),
        }
    }

    /// Draws the smallest available subnet for `network_name`.
    pub fn allocate_subnet(&mut self, network_name: &str) -> Result<u8, String> {
        let subnet = *self
            .available_subnets
            .iter()
            .next()
            .ok_or_else(|| "too many networks".to_string())?;
        self.available_subnets.remove(&subnet);
        self.used_subnets.insert(network_name.to_string(), subnet);
        Ok(subnet)
    }

    /// Returns a network's subnet to the pool.
    pub fn release_subnet(&mut self, network_name: &str) {
        if let Some(subnet) = self.used_subnets.remove(network_name) {
            self.available_subnets.insert(subnet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_hands_out_smallest_first() {
        let mut state = DockerState::new();
        assert_eq!(state.allocate_subnet("a").unwrap(), 17);
        assert_eq!(state.allocate_subnet("b").unwrap(), 18);

        // Releasing makes the subnet available again, smallest first.
        state.release_subnet("a");
        assert_eq!(state.allocate_subnet("c").unwrap(), 17);
    }

    #[test]
    fn allocator_exhausts() {
        let mut state = DockerState::new();
        for i in FIRST_SUBNET..=LAST_SUBNET {
            state.allocate_subnet(&format!("net-{}", i)).unwrap();
        }
        let err = state.allocate_subnet("one-too-many").unwrap_err();
        assert_eq!(err, "too many networks");
    }

    #[test]
    fn round_trip_restores_the_pool() {
        let mut state = DockerState::new();
        let before = state.available_subnets.clone();

        state.allocate_subnet("a").unwrap();
        state.allocate_subnet("b").unwrap();
        state.release_subnet("b");
        state.release_subnet("a");

        assert_eq!(state.available_subnets, before);
        assert!(state.used_subnets.is_empty());
    }
}
