//! The test harness: in-process mocks of a Beacon node, a Docker runtime and
//! a scratch filesystem, coordinated with an external execution-layer dev
//! node under one atomic snapshot-and-revert facility.
//!
//! A test mutates the mocks and the chain freely, then reverts the whole
//! fixture to a named snapshot (or the construction-time baseline) before the
//! next test runs.

pub mod execution_rpc;
pub mod filesystem;
pub mod keygen;
pub mod module;
pub mod test_utils;

pub use execution_rpc::EvmRpcClient;
pub use filesystem::FilesystemManager;
pub use keygen::KeyGenerator;
pub use module::HarnessModule;

use beacon_mock::{BeaconConfig, BeaconMockManager};
use docker_mock::DockerMock;
use parking_lot::RwLock;
use slog::{info, warn, Logger};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// The environment variable naming the dev node's RPC endpoint.
pub const EVM_RPC_ENV_VAR: &str = "HARDHAT_URL";

/// The per-module identifiers recorded for one coordinator snapshot.
struct SnapshotRecord {
    /// The dev node's own snapshot id. Rewritten on every revert, because
    /// the node consumes a snapshot when reverting to it.
    evm_id: String,
    /// Module name to the id that module stored the snapshot under.
    module_ids: HashMap<String, String>,
}

/// The coordinator. Owns the built-in modules, any user-registered modules,
/// and the snapshot registry tying them all to the dev node's snapshots.
///
/// Not internally synchronized: drive it from one task.
pub struct TestHarness {
    log: Logger,
    rpc: EvmRpcClient,
    chain_id: u64,

    beacon: Arc<RwLock<BeaconMockManager>>,
    docker: Arc<RwLock<DockerMock>>,
    filesystem: FilesystemManager,
    modules: HashMap<String, Box<dyn HarnessModule>>,

    snapshots: HashMap<String, SnapshotRecord>,
    baseline_id: String,
}

impl TestHarness {
    /// Builds a harness against the endpoint named by `HARDHAT_URL`.
    pub async fn new(log: Logger) -> Result<Self, String> {
        let endpoint = std::env::var(EVM_RPC_ENV_VAR)
            .map_err(|_| format!("{} env var not set", EVM_RPC_ENV_VAR))?;
        Self::new_with_endpoint(log, &endpoint).await
    }

    /// Builds a harness against an explicit dev-node endpoint: dials it,
    /// derives the Beacon config from the observed chain, stands up the
    /// modules and takes the baseline snapshot.
    pub async fn new_with_endpoint(log: Logger, endpoint: &str) -> Result<Self, String> {
        let rpc = EvmRpcClient::new(endpoint)?;

        let (latest_block_number, latest_block_timestamp) = rpc
            .latest_block()
            .await
            .map_err(|e| format!("error getting latest EL block: {}", e))?;
        let chain_id = rpc
            .chain_id()
            .await
            .map_err(|e| format!("error getting chain ID: {}", e))?;

        let beacon_config = BeaconConfig {
            first_execution_block_index: latest_block_number,
            chain_id,
            genesis_time: latest_block_timestamp,
            ..BeaconConfig::default()
        };

        let filesystem = FilesystemManager::new(log.clone())?;
        let beacon = Arc::new(RwLock::new(BeaconMockManager::new(
            log.clone(),
            beacon_config,
        )));
        let docker = Arc::new(RwLock::new(DockerMock::new(log.clone())));

        let mut harness = Self {
            log,
            rpc,
            chain_id,
            beacon,
            docker,
            filesystem,
            modules: HashMap::new(),
            snapshots: HashMap::new(),
            baseline_id: String::new(),
        };

        harness.baseline_id = harness.take_snapshot().await?;
        info!(
            harness.log,
            "Test harness ready";
            "chain_id" => chain_id,
            "first_execution_block" => latest_block_number,
        );
        Ok(harness)
    }

    /*
     * Accessors
     */

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn rpc(&self) -> &EvmRpcClient {
        &self.rpc
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn beacon(&self) -> Arc<RwLock<BeaconMockManager>> {
        self.beacon.clone()
    }

    pub fn docker(&self) -> Arc<RwLock<DockerMock>> {
        self.docker.clone()
    }

    pub fn filesystem(&self) -> &FilesystemManager {
        &self.filesystem
    }

    /// The scratch directory for this test run.
    pub fn test_dir(&self) -> Result<PathBuf, String> {
        self.filesystem.test_dir().map(PathBuf::from)
    }

    /// Registers a user module. A module with the same name replaces the
    /// prior registration. Registered modules participate in every snapshot
    /// taken afterwards.
    pub fn register_module(&mut self, module: Box<dyn HarnessModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /*
     * Snapshots
     */

    /// Takes a snapshot of the dev node and every module under one fresh
    /// coordinator id, and returns that id.
    pub async fn take_snapshot(&mut self) -> Result<String, String> {
        let evm_id = self
            .rpc
            .snapshot()
            .await
            .map_err(|e| format!("error creating EVM snapshot: {}", e))?;

        let mut name = Uuid::new_v4().to_string();
        while self.snapshots.contains_key(&name) {
            name = Uuid::new_v4().to_string();
        }

        let mut module_ids = HashMap::new();
        let beacon_id = self.beacon.write().take_snapshot(&name);
        module_ids.insert("beacon".to_string(), beacon_id);
        let docker_id = self.docker.write().take_snapshot(&name);
        module_ids.insert("docker".to_string(), docker_id);
        let filesystem_id = self.filesystem.take_named_snapshot(&name)?;
        module_ids.insert("filesystem".to_string(), filesystem_id);
        for module in self.modules.values_mut() {
            let id = module.take_snapshot(&name)?;
            module_ids.insert(module.name().to_string(), id);
        }

        self.snapshots
            .insert(name.clone(), SnapshotRecord { evm_id, module_ids });
        info!(self.log, "Took harness snapshot"; "name" => name.as_str());
        Ok(name)
    }

    /// Reverts the dev node and every module to the named snapshot. The dev
    /// node consumes its snapshot on revert, so a fresh one is taken
    /// immediately and recorded under the same coordinator id, keeping the
    /// id revertible forever.
    pub async fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        let evm_id = self
            .snapshots
            .get(name)
            .map(|record| record.evm_id.clone())
            .ok_or_else(|| format!("snapshot [{}] does not exist", name))?;

        let reverted = self
            .rpc
            .revert(&evm_id)
            .await
            .map_err(|e| format!("error reverting EVM to snapshot {}: {}", evm_id, e))?;
        if !reverted {
            return Err(format!(
                "EVM node refused to revert to snapshot [{}]",
                evm_id
            ));
        }

        let replacement_evm_id = self
            .rpc
            .snapshot()
            .await
            .map_err(|e| format!("error recreating EVM snapshot: {}", e))?;

        let record = self
            .snapshots
            .get_mut(name)
            .expect("the record was just read");
        record.evm_id = replacement_evm_id;
        let module_ids = record.module_ids.clone();

        let lookup = |module_name: &str| -> String {
            module_ids
                .get(module_name)
                .cloned()
                .unwrap_or_else(|| name.to_string())
        };

        self.beacon
            .write()
            .revert_to_snapshot(&lookup("beacon"))
            .map_err(|e| format!("error reverting the Beacon mock: {}", e))?;
        self.docker
            .write()
            .revert_to_snapshot(&lookup("docker"))
            .map_err(|e| format!("error reverting the Docker mock: {}", e))?;
        self.filesystem
            .revert_to_snapshot(&lookup("filesystem"))
            .map_err(|e| format!("error reverting the filesystem: {}", e))?;
        for module in self.modules.values_mut() {
            // A module registered after this snapshot was taken has nothing
            // recorded for it, and nothing to restore.
            let Some(id) = module_ids.get(module.name()) else {
                continue;
            };
            module
                .revert_to_snapshot(id)
                .map_err(|e| format!("error reverting module [{}]: {}", id, e))?;
        }

        info!(self.log, "Reverted to harness snapshot"; "name" => name);
        Ok(())
    }

    /// Reverts to the snapshot taken at construction.
    pub async fn revert_to_baseline(&mut self) -> Result<(), String> {
        let baseline = self.baseline_id.clone();
        self.revert_to_snapshot(&baseline)
            .await
            .map_err(|e| format!("error reverting to baseline snapshot: {}", e))
    }

    /*
     * Chain advancement
     */

    /// Mines one EL block, advances the node clock by one slot duration and
    /// commits one validated Beacon slot.
    pub async fn commit_block(&mut self) -> Result<(), String> {
        self.rpc
            .mine()
            .await
            .map_err(|e| format!("error mining EL block: {}", e))?;

        let seconds_per_slot = self.beacon.read().config().seconds_per_slot;
        self.rpc
            .increase_time(seconds_per_slot)
            .await
            .map_err(|e| format!("error increasing EL time: {}", e))?;

        self.beacon.write().commit_block(true);
        Ok(())
    }

    /// Advances the chain by `slots`. With `include_blocks`, each slot gets
    /// an EL block; otherwise the slots are missed and the node clock jumps
    /// once at the end.
    pub async fn advance_slots(&mut self, slots: u64, include_blocks: bool) -> Result<(), String> {
        if include_blocks {
            for _ in 0..slots {
                self.commit_block().await?;
            }
            return Ok(());
        }

        for _ in 0..slots {
            self.beacon.write().commit_block(false);
        }

        let seconds_per_slot = self.beacon.read().config().seconds_per_slot;
        self.rpc
            .increase_time(seconds_per_slot * slots)
            .await
            .map_err(|e| format!("error advancing time on EL: {}", e))
    }

    /// Raises the network head while leaving the local head alone, to
    /// simulate an unsynced client.
    pub fn set_beacon_head_slot(&mut self, slot: u64) {
        self.beacon.write().set_highest_slot(slot);
    }

    /*
     * Teardown
     */

    /// Reverts to the baseline (exercising the revert path one last time)
    /// and closes every module.
    pub async fn close(&mut self) -> Result<(), String> {
        if let Err(e) = self.revert_to_baseline().await {
            warn!(self.log, "Error reverting to baseline during close"; "error" => e.as_str());
        }

        self.beacon.write().close();
        self.docker.write().close();
        for module in self.modules.values_mut() {
            module.close()?;
        }
        self.filesystem.close()?;
        self.snapshots.clear();
        Ok(())
    }
}
