use crate::validator::Validator;
use api_types::{Hash256, PublicKeyBytes, SignatureBytes};
use std::collections::HashMap;

/// A slot the chain knows about, together with whatever block data tests have
/// provisioned for it. A zero block root means "no root set"; a zero
/// execution block number means the slot is not linked to an execution block.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRecord {
    pub index: u64,
    pub block_root: Hash256,
    pub execution_block_number: u64,
}

/// A deposit waiting to be processed, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDeposit {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    pub amount_gwei: u64,
    pub signature: SignatureBytes,
    pub slot: u64,
}

/// The in-memory Beacon chain model.
///
/// Cloning produces a fully independent copy; the snapshot registry in the
/// manager relies on this.
#[derive(Debug, Clone)]
pub struct Database {
    validators: Vec<Validator>,
    validator_indices: HashMap<PublicKeyBytes, usize>,

    slots: HashMap<u64, SlotRecord>,
    block_roots: HashMap<Hash256, u64>,

    execution_block_map: HashMap<u64, u64>,
    pending_deposits: Vec<PendingDeposit>,

    current_slot: u64,
    highest_slot: u64,
    next_execution_block_index: u64,
}

impl Database {
    pub fn new(first_execution_block_index: u64) -> Self {
        Self {
            validators: vec![],
            validator_indices: HashMap::new(),
            slots: HashMap::new(),
            block_roots: HashMap::new(),
            execution_block_map: HashMap::new(),
            pending_deposits: vec![],
            current_slot: 0,
            highest_slot: 0,
            next_execution_block_index: first_execution_block_index,
        }
    }

    /*
     * Validators
     */

    /// Registers a new validator. Fails if the pubkey is already known.
    pub fn add_validator(
        &mut self,
        pubkey: PublicKeyBytes,
        withdrawal_credentials: Hash256,
    ) -> Result<&Validator, String> {
        if self.validator_indices.contains_key(&pubkey) {
            return Err(format!("validator with pubkey {} already exists", pubkey));
        }

        let index = self.validators.len();
        self.validators
            .push(Validator::new(pubkey, withdrawal_credentials, index as u64));
        self.validator_indices.insert(pubkey, index);
        Ok(&self.validators[index])
    }

    pub fn validator_by_index(&self, index: u64) -> Option<&Validator> {
        self.validators.get(index as usize)
    }

    pub fn validator_by_pubkey(&self, pubkey: &PublicKeyBytes) -> Option<&Validator> {
        self.validator_indices
            .get(pubkey)
            .and_then(|index| self.validators.get(*index))
    }

    pub fn validator_mut_by_index(&mut self, index: u64) -> Option<&mut Validator> {
        self.validators.get_mut(index as usize)
    }

    pub fn validator_mut_by_pubkey(&mut self, pubkey: &PublicKeyBytes) -> Option<&mut Validator> {
        match self.validator_indices.get(pubkey) {
            Some(index) => self.validators.get_mut(*index),
            None => None,
        }
    }

    /// All validators, in registration (index) order.
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /*
     * Chain head & execution block links
     */

    pub fn current_slot(&self) -> u64 {
        self.current_slot
    }

    pub fn highest_slot(&self) -> u64 {
        self.highest_slot
    }

    /// Advances the chain by one slot.
    ///
    /// With `slot_validated` set, a "block" is proposed for the current slot:
    /// the slot is linked to the next execution block index and the counter
    /// advances. Without it the slot is missed.
    pub fn commit_block(&mut self, slot_validated: bool) {
        if slot_validated {
            self.execution_block_map
                .insert(self.current_slot, self.next_execution_block_index);
            self.next_execution_block_index += 1;
        }
        self.current_slot += 1;
        if self.current_slot > self.highest_slot {
            self.highest_slot = self.current_slot;
        }
    }

    /// Raises the highest slot. The highest slot is monotonic and never drops
    /// below the current slot.
    pub fn set_highest_slot(&mut self, slot: u64) {
        if slot > self.highest_slot {
            self.highest_slot = slot;
        }
    }

    pub fn execution_block_for_slot(&self, slot: u64) -> Option<u64> {
        self.execution_block_map.get(&slot).copied()
    }

    pub fn next_execution_block_index(&self) -> u64 {
        self.next_execution_block_index
    }

    /*
     * Slots
     */

    pub fn slot(&self, index: u64) -> Option<&SlotRecord> {
        self.slots.get(&index)
    }

    pub fn slot_by_root(&self, root: &Hash256) -> Option<&SlotRecord> {
        self.block_roots
            .get(root)
            .and_then(|index| self.slots.get(index))
    }

    /// Upserts the slot's block root, keeping the root index in sync. Both
    /// maps are updated under the caller's single lock acquisition.
    pub fn set_slot_block_root(&mut self, slot_index: u64, root: Hash256) {
        let slot = self.slots.entry(slot_index).or_insert_with(|| SlotRecord {
            index: slot_index,
            block_root: Hash256::zero(),
            execution_block_number: 0,
        });

        let old_root = slot.block_root;
        slot.block_root = root;

        if !old_root.is_zero() {
            self.block_roots.remove(&old_root);
        }
        if !root.is_zero() {
            self.block_roots.insert(root, slot_index);
        }
    }

    pub fn set_slot_execution_block_number(&mut self, slot_index: u64, block_number: u64) {
        let slot = self.slots.entry(slot_index).or_insert_with(|| SlotRecord {
            index: slot_index,
            block_root: Hash256::zero(),
            execution_block_number: 0,
        });
        slot.execution_block_number = block_number;
    }

    /*
     * Deposits
     */

    pub fn add_pending_deposit(&mut self, deposit: PendingDeposit) {
        self.pending_deposits.push(deposit);
    }

    pub fn pending_deposits(&self) -> &[PendingDeposit] {
        &self.pending_deposits
    }

    /// Replaces the database with a fresh one.
    ///
    /// Note the execution block counter restarts at zero rather than the
    /// configured first index; consumers of the reset route depend on the
    /// zeroed counter.
    pub fn reset(&mut self) {
        *self = Database::new(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey(byte: u8) -> PublicKeyBytes {
        PublicKeyBytes::repeat_byte(byte)
    }

    fn provisioned() -> Database {
        let mut db = Database::new(0);
        for i in 0..3 {
            db.add_validator(pubkey(i), Hash256::repeat_byte(0xcc))
                .unwrap();
        }
        db
    }

    #[test]
    fn indices_track_registration_order() {
        let db = provisioned();
        for (position, validator) in db.validators().iter().enumerate() {
            assert_eq!(validator.index, position as u64);
            let by_index = db.validator_by_index(validator.index).unwrap();
            let by_pubkey = db.validator_by_pubkey(&validator.pubkey).unwrap();
            assert_eq!(by_index, by_pubkey);
        }
    }

    #[test]
    fn duplicate_pubkey_is_rejected() {
        let mut db = provisioned();
        let err = db
            .add_validator(pubkey(0), Hash256::zero())
            .unwrap_err();
        assert!(err.contains("already exists"));
        assert_eq!(db.validators().len(), 3);
    }

    #[test]
    fn commit_block_links_prior_slot() {
        let mut db = Database::new(100);

        db.commit_block(true);
        assert_eq!(db.current_slot(), 1);
        assert_eq!(db.execution_block_for_slot(0), Some(100));
        assert_eq!(db.next_execution_block_index(), 101);

        // A missed slot advances the chain without linking a block.
        db.commit_block(false);
        assert_eq!(db.current_slot(), 2);
        assert_eq!(db.execution_block_for_slot(1), None);
        assert_eq!(db.next_execution_block_index(), 101);
    }

    #[test]
    fn highest_slot_is_monotonic() {
        let mut db = Database::new(0);
        db.set_highest_slot(14);
        assert_eq!(db.highest_slot(), 14);

        // Lower values are ignored.
        db.set_highest_slot(3);
        assert_eq!(db.highest_slot(), 14);

        // Committing past the highest slot bumps it.
        for _ in 0..15 {
            db.commit_block(true);
        }
        assert_eq!(db.current_slot(), 15);
        assert_eq!(db.highest_slot(), 15);
    }

    #[test]
    fn block_root_index_follows_reassignment() {
        let mut db = Database::new(0);
        let first = Hash256::repeat_byte(0x11);
        let second = Hash256::repeat_byte(0x22);

        db.set_slot_block_root(0, first);
        assert_eq!(db.slot_by_root(&first).unwrap().index, 0);

        db.set_slot_block_root(0, second);
        assert!(db.slot_by_root(&first).is_none());
        assert_eq!(db.slot_by_root(&second).unwrap().index, 0);
        assert_eq!(db.slot(0).unwrap().block_root, second);
    }

    #[test]
    fn slot_upserts_merge() {
        let mut db = Database::new(0);
        db.set_slot_block_root(5, Hash256::repeat_byte(0x33));
        db.set_slot_execution_block_number(5, 77);

        let slot = db.slot(5).unwrap();
        assert_eq!(slot.block_root, Hash256::repeat_byte(0x33));
        assert_eq!(slot.execution_block_number, 77);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut db = provisioned();
        db.commit_block(true);
        db.set_highest_slot(9);
        db.reset();

        assert!(db.validators().is_empty());
        assert_eq!(db.current_slot(), 0);
        assert_eq!(db.highest_slot(), 0);
        assert_eq!(db.next_execution_block_index(), 0);
    }

    #[test]
    fn clones_are_independent() {
        let mut db = provisioned();
        db.set_slot_block_root(0, Hash256::repeat_byte(0x44));

        let mut clone = db.clone();
        clone.add_validator(pubkey(9), Hash256::zero()).unwrap();
        clone.commit_block(true);
        clone.set_slot_block_root(0, Hash256::repeat_byte(0x55));
        clone
            .validator_mut_by_pubkey(&pubkey(0))
            .unwrap()
            .set_balance(1);

        // The original saw none of it.
        assert_eq!(db.validators().len(), 3);
        assert_eq!(db.current_slot(), 0);
        assert_eq!(db.slot(0).unwrap().block_root, Hash256::repeat_byte(0x44));
        assert_eq!(
            db.validator_by_pubkey(&pubkey(0)).unwrap().balance,
            crate::STARTING_BALANCE_GWEI
        );
    }

    #[test]
    fn pending_deposits_preserve_order() {
        let mut db = Database::new(0);
        for i in 0..4 {
            db.add_pending_deposit(PendingDeposit {
                pubkey: pubkey(i),
                withdrawal_credentials: Hash256::zero(),
                amount_gwei: 32_000_000_000,
                signature: SignatureBytes::zero(),
                slot: i as u64,
            });
        }
        let slots: Vec<u64> = db.pending_deposits().iter().map(|d| d.slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }
}
