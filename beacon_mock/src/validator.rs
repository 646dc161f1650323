use crate::{FAR_FUTURE_EPOCH, STARTING_BALANCE_GWEI};
use api_types::{Hash256, PublicKeyBytes, ValidatorData, ValidatorInfo, ValidatorStatus};

/// Effective balance moves down by one gwei once the balance drops this far
/// below it, and up by one gwei once the balance exceeds it by the upward
/// threshold. This coarse rendition of the hysteresis rule is intentional;
/// the thresholds and the one-gwei step are part of the observable contract.
const DOWNWARD_THRESHOLD_GWEI: u64 = 250_000_000;
const UPWARD_THRESHOLD_GWEI: u64 = 1_250_000_000;

/// A validator registered with the mock chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    pub pubkey: PublicKeyBytes,
    pub index: u64,
    pub withdrawal_credentials: Hash256,
    pub balance: u64,
    pub effective_balance: u64,
    pub status: ValidatorStatus,
    pub slashed: bool,
    pub activation_eligibility_epoch: u64,
    pub activation_epoch: u64,
    pub exit_epoch: u64,
    pub withdrawable_epoch: u64,
}

impl Validator {
    pub fn new(pubkey: PublicKeyBytes, withdrawal_credentials: Hash256, index: u64) -> Self {
        Self {
            pubkey,
            index,
            withdrawal_credentials,
            balance: STARTING_BALANCE_GWEI,
            effective_balance: STARTING_BALANCE_GWEI,
            status: ValidatorStatus::PendingInitialized,
            slashed: false,
            activation_eligibility_epoch: FAR_FUTURE_EPOCH,
            activation_epoch: FAR_FUTURE_EPOCH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        }
    }

    /// Sets the balance, applying the hysteretic effective-balance rule.
    pub fn set_balance(&mut self, balance_gwei: u64) {
        self.balance = balance_gwei;

        if balance_gwei < self.effective_balance.saturating_sub(DOWNWARD_THRESHOLD_GWEI) {
            self.effective_balance = self.effective_balance.saturating_sub(1);
        }
        if balance_gwei > self.effective_balance.saturating_add(UPWARD_THRESHOLD_GWEI) {
            self.effective_balance = self.effective_balance.saturating_add(1);
        }
    }

    pub fn set_status(&mut self, status: ValidatorStatus) {
        self.status = status;
    }

    pub fn set_activation_epoch(&mut self, epoch: u64) {
        self.activation_epoch = epoch;
    }

    /// Slashes the validator, deducting `penalty_gwei` from its balance.
    ///
    /// Only validators in an active state can be slashed.
    pub fn slash(&mut self, penalty_gwei: u64) -> Result<(), String> {
        if self.status != ValidatorStatus::ActiveOngoing
            && self.status != ValidatorStatus::ActiveExiting
        {
            return Err(format!(
                "validator with pubkey {} is not in a slashable state",
                self.pubkey
            ));
        }
        self.slashed = true;
        self.set_balance(self.balance.saturating_sub(penalty_gwei));
        self.status = ValidatorStatus::ActiveSlashed;
        Ok(())
    }

    /// The API representation of this validator.
    pub fn to_data(&self) -> ValidatorData {
        ValidatorData {
            index: self.index,
            balance: self.balance,
            status: self.status,
            validator: ValidatorInfo {
                pubkey: self.pubkey,
                withdrawal_credentials: self.withdrawal_credentials,
                effective_balance: self.effective_balance,
                slashed: self.slashed,
                activation_eligibility_epoch: self.activation_eligibility_epoch,
                activation_epoch: self.activation_epoch,
                exit_epoch: self.exit_epoch,
                withdrawable_epoch: self.withdrawable_epoch,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_validator() -> Validator {
        Validator::new(
            PublicKeyBytes::repeat_byte(0x01),
            Hash256::repeat_byte(0x02),
            0,
        )
    }

    #[test]
    fn fresh_validator_defaults() {
        let v = new_validator();
        assert_eq!(v.balance, STARTING_BALANCE_GWEI);
        assert_eq!(v.effective_balance, STARTING_BALANCE_GWEI);
        assert_eq!(v.status, ValidatorStatus::PendingInitialized);
        assert!(!v.slashed);
        assert_eq!(v.activation_epoch, FAR_FUTURE_EPOCH);
        assert_eq!(v.withdrawable_epoch, FAR_FUTURE_EPOCH);
    }

    #[test]
    fn balance_hysteresis() {
        let mut v = new_validator();

        // Within both thresholds: effective balance untouched.
        v.set_balance(STARTING_BALANCE_GWEI - DOWNWARD_THRESHOLD_GWEI);
        assert_eq!(v.effective_balance, STARTING_BALANCE_GWEI);

        // Below the downward threshold: one gwei down.
        v.set_balance(STARTING_BALANCE_GWEI - DOWNWARD_THRESHOLD_GWEI - 1);
        assert_eq!(v.effective_balance, STARTING_BALANCE_GWEI - 1);

        // Above the upward threshold: one gwei up.
        let effective = v.effective_balance;
        v.set_balance(effective + UPWARD_THRESHOLD_GWEI + 1);
        assert_eq!(v.effective_balance, effective + 1);
    }

    #[test]
    fn slash_requires_active_status() {
        let mut v = new_validator();
        assert!(v.slash(1_000_000_000).is_err());

        v.set_status(ValidatorStatus::ActiveOngoing);
        v.slash(1_000_000_000).unwrap();
        assert!(v.slashed);
        assert_eq!(v.status, ValidatorStatus::ActiveSlashed);
        assert_eq!(v.balance, STARTING_BALANCE_GWEI - 1_000_000_000);

        // Already slashed: not slashable again.
        assert!(v.slash(1).is_err());
    }

    #[test]
    fn slash_from_exiting_state() {
        let mut v = new_validator();
        v.set_status(ValidatorStatus::ActiveExiting);
        v.slash(5).unwrap();
        assert_eq!(v.status, ValidatorStatus::ActiveSlashed);
    }
}
