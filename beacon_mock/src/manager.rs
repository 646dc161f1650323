use crate::config::BeaconConfig;
use crate::database::{Database, PendingDeposit};
use crate::validator::Validator;
use api_types::{
    Address, BlindedBlockBody, BlindedBlockData, BlindedBlockMessage, BlockHeaderAndSignature,
    BlockHeaderData, BlockHeaderMessage, Checkpoint, ConfigSpecData, DepositContractData,
    ExecutionPayloadHeaderData, FinalityCheckpointsData, GenesisData, Hash256, HeadersResponse,
    PendingDepositData, PublicKeyBytes, SignatureBytes, SyncingData, ValidatorData, ValidatorId,
};
use slog::{info, Logger};
use std::collections::HashMap;
use std::str::FromStr;

/// The manager wraps the database with the read derivations the HTTP surface
/// needs and a registry of named snapshots.
pub struct BeaconMockManager {
    name: String,
    database: Database,
    config: BeaconConfig,
    snapshots: HashMap<String, Database>,
    log: Logger,
}

/// A block reference supplied on the HTTP surface.
enum BlockId {
    Head,
    Slot(u64),
    Root(Hash256),
}

impl FromStr for BlockId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(BlockId::Head),
            other if other.starts_with("0x") => Hash256::from_str(&other[2..])
                .map(BlockId::Root)
                .map_err(|e| format!("{} cannot be parsed as a block root: {}", other, e)),
            other => u64::from_str(other)
                .map(BlockId::Slot)
                .map_err(|_| format!("{} cannot be parsed as a slot", other)),
        }
    }
}

impl BeaconMockManager {
    pub fn new(log: Logger, config: BeaconConfig) -> Self {
        Self {
            name: "beacon".to_string(),
            database: Database::new(config.first_execution_block_index),
            config,
            snapshots: HashMap::new(),
            log,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Swaps in a custom-provisioned database.
    pub fn set_database(&mut self, database: Database) {
        self.database = database;
    }

    /*
     * Admin mutations
     */

    /// Registers a validator, returning its assigned index.
    pub fn add_validator(
        &mut self,
        pubkey: PublicKeyBytes,
        withdrawal_credentials: Hash256,
    ) -> Result<u64, String> {
        let validator = self.database.add_validator(pubkey, withdrawal_credentials)?;
        Ok(validator.index)
    }

    pub fn validator(&self, id: &ValidatorId) -> Option<&Validator> {
        match id {
            ValidatorId::Index(index) => self.database.validator_by_index(*index),
            ValidatorId::PublicKey(pubkey) => self.database.validator_by_pubkey(pubkey),
        }
    }

    /// Resolves a validator for mutation, erroring if it is unknown.
    pub fn validator_mut(&mut self, id: &ValidatorId) -> Result<&mut Validator, String> {
        let missing = format!("validator [{}] does not exist", id);
        match id {
            ValidatorId::Index(index) => self.database.validator_mut_by_index(*index),
            ValidatorId::PublicKey(pubkey) => self.database.validator_mut_by_pubkey(pubkey),
        }
        .ok_or(missing)
    }

    pub fn commit_block(&mut self, slot_validated: bool) {
        self.database.commit_block(slot_validated);
    }

    pub fn current_slot(&self) -> u64 {
        self.database.current_slot()
    }

    pub fn highest_slot(&self) -> u64 {
        self.database.highest_slot()
    }

    pub fn set_highest_slot(&mut self, slot: u64) {
        self.database.set_highest_slot(slot);
    }

    pub fn set_slot_block_root(&mut self, slot_index: u64, root: Hash256) {
        self.database.set_slot_block_root(slot_index, root);
    }

    pub fn set_slot_execution_block_number(&mut self, slot_index: u64, block_number: u64) {
        self.database
            .set_slot_execution_block_number(slot_index, block_number);
    }

    pub fn add_pending_deposit(&mut self, deposit: PendingDeposit) {
        self.database.add_pending_deposit(deposit);
    }

    pub fn reset(&mut self) {
        self.database.reset();
        info!(self.log, "Reset Beacon database");
    }

    /*
     * Read derivations for the HTTP surface
     */

    fn require_head(state_id: &str) -> Result<(), String> {
        if state_id == "head" {
            Ok(())
        } else {
            Err(format!(
                "unsupported state ID [{}], only 'head' is supported",
                state_id
            ))
        }
    }

    /// Validators for the given state. An empty id list means all validators;
    /// unknown ids are skipped.
    pub fn validators_data(
        &self,
        state_id: &str,
        ids: &[ValidatorId],
    ) -> Result<Vec<ValidatorData>, String> {
        Self::require_head(state_id)?;

        if ids.is_empty() {
            return Ok(self
                .database
                .validators()
                .iter()
                .map(Validator::to_data)
                .collect());
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.validator(id))
            .map(Validator::to_data)
            .collect())
    }

    pub fn validator_data(&self, state_id: &str, id: &ValidatorId) -> Result<ValidatorData, String> {
        Self::require_head(state_id)?;
        self.validator(id)
            .map(Validator::to_data)
            .ok_or_else(|| format!("validator [{}] does not exist", id))
    }

    pub fn syncing_data(&self) -> SyncingData {
        let current_slot = self.database.current_slot();
        let highest_slot = self.database.highest_slot();
        SyncingData {
            is_syncing: current_slot < highest_slot,
            head_slot: highest_slot,
            sync_distance: highest_slot - current_slot,
        }
    }

    pub fn genesis_data(&self) -> GenesisData {
        GenesisData {
            genesis_time: self.config.genesis_time,
            genesis_validators_root: self.config.genesis_validators_root,
            genesis_fork_version: self.config.genesis_fork_version,
        }
    }

    pub fn deposit_contract_data(&self) -> DepositContractData {
        DepositContractData {
            chain_id: self.config.chain_id,
            address: self.config.deposit_contract,
        }
    }

    pub fn config_spec_data(&self) -> ConfigSpecData {
        ConfigSpecData {
            seconds_per_slot: self.config.seconds_per_slot,
            slots_per_epoch: self.config.slots_per_epoch,
            epochs_per_sync_committee_period: self.config.epochs_per_sync_committee_period,
            capella_fork_version: self.config.capella_fork_version,
        }
    }

    /// Finality checkpoints for the given state.
    ///
    /// The mock reports the current slot as the epoch of every checkpoint, a
    /// documented approximation: nothing here models actual finality.
    pub fn finality_checkpoints(&self, state_id: &str) -> Result<FinalityCheckpointsData, String> {
        Self::require_head(state_id)?;

        let checkpoint = Checkpoint {
            epoch: self.database.current_slot(),
            root: Hash256::zero(),
        };
        Ok(FinalityCheckpointsData {
            previous_justified: checkpoint,
            current_justified: checkpoint,
            finalized: checkpoint,
        })
    }

    pub fn pending_deposits_data(&self, state_id: &str) -> Result<Vec<PendingDepositData>, String> {
        Self::require_head(state_id)?;

        Ok(self
            .database
            .pending_deposits()
            .iter()
            .map(|d| PendingDepositData {
                pubkey: d.pubkey,
                withdrawal_credentials: d.withdrawal_credentials,
                amount: d.amount_gwei,
                signature: d.signature,
                slot: d.slot,
            })
            .collect())
    }

    /// The header for a block id ("head", a slot index, or a 0x block root).
    /// Returns `Ok(None)` when the slot is unknown.
    pub fn header_data(
        &self,
        block_id: &str,
    ) -> Result<Option<HeadersResponse<BlockHeaderData>>, String> {
        let slot = match BlockId::from_str(block_id)? {
            BlockId::Head => self.database.slot(self.database.current_slot()),
            BlockId::Slot(index) => self.database.slot(index),
            BlockId::Root(root) => self.database.slot_by_root(&root),
        };

        Ok(slot.map(|slot| HeadersResponse {
            execution_optimistic: false,
            // A slot is final once the local head has reached it.
            finalized: slot.index <= self.database.current_slot(),
            data: BlockHeaderData {
                root: slot.block_root,
                canonical: true,
                header: BlockHeaderAndSignature {
                    message: BlockHeaderMessage {
                        slot: slot.index,
                        proposer_index: 0,
                        parent_root: Hash256::zero(),
                        state_root: Hash256::zero(),
                        body_root: Hash256::zero(),
                    },
                    signature: SignatureBytes::zero(),
                },
            },
        }))
    }

    /// The blinded block for a block id. Returns `Ok(None)` when the slot is
    /// unknown.
    pub fn blinded_block_data(&self, block_id: &str) -> Result<Option<BlindedBlockData>, String> {
        let slot = match BlockId::from_str(block_id)? {
            BlockId::Head => self.database.slot(self.database.current_slot()),
            BlockId::Slot(index) => self.database.slot(index),
            BlockId::Root(root) => self.database.slot_by_root(&root),
        };

        Ok(slot.map(|slot| BlindedBlockData {
            message: BlindedBlockMessage {
                slot: slot.index,
                proposer_index: 0,
                body: BlindedBlockBody {
                    execution_payload_header: ExecutionPayloadHeaderData {
                        fee_recipient: Address::zero(),
                        block_number: slot.execution_block_number,
                    },
                },
            },
        }))
    }

    /*
     * Snapshots
     */

    /// Stores a deep clone of the database under `name`.
    pub fn take_snapshot(&mut self, name: &str) -> String {
        self.snapshots.insert(name.to_string(), self.database.clone());
        info!(self.log, "Took Beacon snapshot"; "name" => name);
        name.to_string()
    }

    /// Installs a clone of the named snapshot, leaving the stored copy intact
    /// so the same name can be reverted to again.
    pub fn revert_to_snapshot(&mut self, name: &str) -> Result<(), String> {
        let snapshot = self
            .snapshots
            .get(name)
            .ok_or_else(|| format!("snapshot [{}] does not exist", name))?;
        self.database = snapshot.clone();
        info!(self.log, "Reverted to Beacon snapshot"; "name" => name);
        Ok(())
    }

    /// Releases all state. Safe to call more than once.
    pub fn close(&mut self) {
        self.database = Database::new(0);
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::STARTING_BALANCE_GWEI;
    use api_types::ValidatorStatus;

    fn manager() -> BeaconMockManager {
        BeaconMockManager::new(logging::null_logger(), BeaconConfig::default())
    }

    fn provision_validators(manager: &mut BeaconMockManager, count: u8) {
        for i in 0..count {
            manager
                .add_validator(PublicKeyBytes::repeat_byte(i), Hash256::repeat_byte(0xaa))
                .unwrap();
        }
    }

    #[test]
    fn slashing_scenario() {
        let mut m = manager();
        provision_validators(&mut m, 3);

        let p1 = ValidatorId::PublicKey(PublicKeyBytes::repeat_byte(1));
        m.validator_mut(&p1)
            .unwrap()
            .set_status(ValidatorStatus::ActiveOngoing);

        let data = m.validator_data("head", &p1).unwrap();
        assert_eq!(data.balance, STARTING_BALANCE_GWEI);
        assert!(!data.validator.slashed);

        m.validator_mut(&p1).unwrap().slash(1_000_000_000).unwrap();

        let data = m.validator_data("head", &p1).unwrap();
        assert_eq!(data.status, ValidatorStatus::ActiveSlashed);
        assert_eq!(data.balance, STARTING_BALANCE_GWEI - 1_000_000_000);
        assert!(data.validator.slashed);
    }

    #[test]
    fn commit_and_sync_scenario() {
        let mut m = manager();
        provision_validators(&mut m, 3);

        m.commit_block(true);
        let syncing = m.syncing_data();
        assert_eq!(syncing.head_slot, 1);
        assert_eq!(syncing.sync_distance, 0);
        assert!(!syncing.is_syncing);

        m.set_highest_slot(14);
        let syncing = m.syncing_data();
        assert_eq!(syncing.head_slot, 14);
        assert_eq!(syncing.sync_distance, 13);
        assert!(syncing.is_syncing);
    }

    #[test]
    fn block_root_upsert_scenario() {
        let mut m = manager();
        let first = Hash256::repeat_byte(0x11);
        let replacement = Hash256::repeat_byte(0x22);

        m.set_slot_block_root(0, first);
        let header = m.header_data("0").unwrap().unwrap();
        assert_eq!(header.data.root, first);
        assert!(header.finalized);

        m.set_slot_block_root(0, replacement);
        let header = m.header_data("0").unwrap().unwrap();
        assert_eq!(header.data.root, replacement);

        // The old root no longer resolves.
        assert!(m
            .header_data(&format!("{:?}", first))
            .unwrap()
            .is_none());
    }

    #[test]
    fn header_lookup_by_root() {
        let mut m = manager();
        let root = Hash256::repeat_byte(0x33);
        m.set_slot_block_root(5, root);
        m.set_slot_execution_block_number(5, 321);

        let header = m.header_data(&format!("{:?}", root)).unwrap().unwrap();
        assert_eq!(header.data.header.message.slot, 5);
        // Slot 5 is ahead of the local head, so it is not final yet.
        assert!(!header.finalized);

        let blinded = m.blinded_block_data("5").unwrap().unwrap();
        assert_eq!(
            blinded.message.body.execution_payload_header.block_number,
            321
        );
    }

    #[test]
    fn unknown_block_id_forms() {
        let m = manager();
        assert!(m.header_data("12").unwrap().is_none());
        assert!(m.header_data("0xnothex").is_err());
        assert!(m.blinded_block_data("bogus").is_err());
    }

    #[test]
    fn only_head_state_is_supported() {
        let mut m = manager();
        provision_validators(&mut m, 1);
        assert!(m.validators_data("head", &[]).is_ok());
        let err = m.validators_data("finalized", &[]).unwrap_err();
        assert!(err.contains("only 'head' is supported"));
    }

    #[test]
    fn validators_filtered_by_id() {
        let mut m = manager();
        provision_validators(&mut m, 3);

        let ids = vec![
            ValidatorId::Index(0),
            ValidatorId::PublicKey(PublicKeyBytes::repeat_byte(2)),
            // Unknown ids are skipped, not errors.
            ValidatorId::Index(99),
        ];
        let data = m.validators_data("head", &ids).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].index, 0);
        assert_eq!(data[1].index, 2);
    }

    #[test]
    fn snapshot_revert_restores_state_repeatedly() {
        let mut m = manager();
        provision_validators(&mut m, 2);
        m.take_snapshot("baseline");

        m.add_validator(PublicKeyBytes::repeat_byte(9), Hash256::zero())
            .unwrap();
        m.commit_block(true);

        m.revert_to_snapshot("baseline").unwrap();
        assert_eq!(m.database().validators().len(), 2);
        assert_eq!(m.current_slot(), 0);

        // Mutate and revert again: the stored snapshot must be untouched.
        m.commit_block(true);
        m.revert_to_snapshot("baseline").unwrap();
        assert_eq!(m.current_slot(), 0);

        assert!(m.revert_to_snapshot("missing").is_err());
    }

    #[test]
    fn pending_deposits_round_trip() {
        let mut m = manager();
        m.add_pending_deposit(PendingDeposit {
            pubkey: PublicKeyBytes::repeat_byte(0x05),
            withdrawal_credentials: Hash256::repeat_byte(0x06),
            amount_gwei: 32_000_000_000,
            signature: SignatureBytes::repeat_byte(0x07),
            slot: 3,
        });

        let data = m.pending_deposits_data("head").unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].pubkey, PublicKeyBytes::repeat_byte(0x05));
        assert_eq!(data[0].amount, 32_000_000_000);
        assert_eq!(data[0].slot, 3);

        assert!(m.pending_deposits_data("genesis").is_err());
    }

    #[test]
    fn config_backed_reads() {
        let config = BeaconConfig {
            chain_id: 777,
            genesis_time: 1_700_000_123,
            ..BeaconConfig::default()
        };
        let m = BeaconMockManager::new(logging::null_logger(), config.clone());

        let genesis = m.genesis_data();
        assert_eq!(genesis.genesis_time, 1_700_000_123);
        assert_eq!(genesis.genesis_validators_root, config.genesis_validators_root);
        assert_eq!(genesis.genesis_fork_version, config.genesis_fork_version);

        let contract = m.deposit_contract_data();
        assert_eq!(contract.chain_id, 777);
        assert_eq!(contract.address, config.deposit_contract);

        let spec = m.config_spec_data();
        assert_eq!(spec.seconds_per_slot, config.seconds_per_slot);
        assert_eq!(spec.capella_fork_version, config.capella_fork_version);
    }

    #[test]
    fn finality_checkpoints_track_current_slot() {
        let mut m = manager();
        for _ in 0..4 {
            m.commit_block(false);
        }
        let checkpoints = m.finality_checkpoints("head").unwrap();
        assert_eq!(checkpoints.finalized.epoch, 4);
        assert_eq!(checkpoints.current_justified.epoch, 4);
    }
}
