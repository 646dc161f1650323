//! Types for the Beacon API surface served by the mock.

use crate::{Address, Hash256, PublicKeyBytes, SignatureBytes};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The lifecycle status of a validator, as reported by the standard API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    PendingInitialized,
    PendingQueued,
    ActiveOngoing,
    ActiveExiting,
    ActiveSlashed,
    ExitedUnslashed,
    ExitedSlashed,
    WithdrawalPossible,
    WithdrawalDone,
}

impl FromStr for ValidatorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_initialized" => Ok(ValidatorStatus::PendingInitialized),
            "pending_queued" => Ok(ValidatorStatus::PendingQueued),
            "active_ongoing" => Ok(ValidatorStatus::ActiveOngoing),
            "active_exiting" => Ok(ValidatorStatus::ActiveExiting),
            "active_slashed" => Ok(ValidatorStatus::ActiveSlashed),
            "exited_unslashed" => Ok(ValidatorStatus::ExitedUnslashed),
            "exited_slashed" => Ok(ValidatorStatus::ExitedSlashed),
            "withdrawal_possible" => Ok(ValidatorStatus::WithdrawalPossible),
            "withdrawal_done" => Ok(ValidatorStatus::WithdrawalDone),
            _ => Err(format!("{} cannot be parsed as a validator status", s)),
        }
    }
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidatorStatus::PendingInitialized => "pending_initialized",
            ValidatorStatus::PendingQueued => "pending_queued",
            ValidatorStatus::ActiveOngoing => "active_ongoing",
            ValidatorStatus::ActiveExiting => "active_exiting",
            ValidatorStatus::ActiveSlashed => "active_slashed",
            ValidatorStatus::ExitedUnslashed => "exited_unslashed",
            ValidatorStatus::ExitedSlashed => "exited_slashed",
            ValidatorStatus::WithdrawalPossible => "withdrawal_possible",
            ValidatorStatus::WithdrawalDone => "withdrawal_done",
        };
        write!(f, "{}", s)
    }
}

/// A validator id supplied on the HTTP surface: either a numeric index or a
/// hex-encoded pubkey.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatorId {
    PublicKey(PublicKeyBytes),
    Index(u64),
}

impl FromStr for ValidatorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") || s.len() == 96 {
            PublicKeyBytes::from_str(s)
                .map(ValidatorId::PublicKey)
                .map_err(|e| format!("{} cannot be parsed as a public key: {}", s, e))
        } else {
            u64::from_str(s)
                .map(ValidatorId::Index)
                .map_err(|e| format!("{} cannot be parsed as an index: {}", s, e))
        }
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorId::PublicKey(pubkey) => write!(f, "{}", pubkey),
            ValidatorId::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A comma-separated query value, e.g. `?id=0,1,2`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "String", bound = "T: FromStr")]
pub struct QueryVec<T: FromStr>(pub Vec<T>);

impl<T: FromStr> TryFrom<String> for QueryVec<T> {
    type Error = String;

    fn try_from(string: String) -> Result<Self, Self::Error> {
        if string.is_empty() {
            return Ok(Self(vec![]));
        }

        string
            .split(',')
            .map(|s| {
                s.parse()
                    .map_err(|_| format!("unable to parse query value {}", s))
            })
            .collect::<Result<Vec<T>, String>>()
            .map(Self)
    }
}

/// The inner `validator` object of a validators response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub effective_balance: u64,
    pub slashed: bool,
    #[serde(with = "serde_utils::quoted_u64")]
    pub activation_eligibility_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub activation_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub exit_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub withdrawable_epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub balance: u64,
    pub status: ValidatorStatus,
    pub validator: ValidatorInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncingData {
    pub is_syncing: bool,
    #[serde(with = "serde_utils::quoted_u64")]
    pub head_slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub sync_distance: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub genesis_time: u64,
    pub genesis_validators_root: Hash256,
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub genesis_fork_version: [u8; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositContractData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub chain_id: u64,
    pub address: Address,
}

/// The subset of `/eth/v1/config/spec` the mock serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSpecData {
    #[serde(rename = "SECONDS_PER_SLOT", with = "serde_utils::quoted_u64")]
    pub seconds_per_slot: u64,
    #[serde(rename = "SLOTS_PER_EPOCH", with = "serde_utils::quoted_u64")]
    pub slots_per_epoch: u64,
    #[serde(
        rename = "EPOCHS_PER_SYNC_COMMITTEE_PERIOD",
        with = "serde_utils::quoted_u64"
    )]
    pub epochs_per_sync_committee_period: u64,
    #[serde(rename = "CAPELLA_FORK_VERSION", with = "serde_utils::bytes_4_hex")]
    pub capella_fork_version: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(with = "serde_utils::quoted_u64")]
    pub epoch: u64,
    pub root: Hash256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalityCheckpointsData {
    pub previous_justified: Checkpoint,
    pub current_justified: Checkpoint,
    pub finalized: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeaderMessage {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body_root: Hash256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeaderAndSignature {
    pub message: BlockHeaderMessage,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeaderData {
    pub root: Hash256,
    pub canonical: bool,
    pub header: BlockHeaderAndSignature,
}

/// The `/eth/v1/beacon/headers*` envelope, which carries the finality flag
/// alongside the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Serialize + serde::de::DeserializeOwned")]
pub struct HeadersResponse<T: Serialize + serde::de::DeserializeOwned> {
    pub execution_optimistic: bool,
    pub finalized: bool,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPayloadHeaderData {
    pub fee_recipient: Address,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindedBlockBody {
    pub execution_payload_header: ExecutionPayloadHeaderData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindedBlockMessage {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub body: BlindedBlockBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindedBlockData {
    pub message: BlindedBlockMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDepositData {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
    pub signature: SignatureBytes,
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
}

/// Response to the `add-validator` admin route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddValidatorResponse {
    pub index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn validator_id_parses_both_forms() {
        assert_eq!(ValidatorId::from_str("3").unwrap(), ValidatorId::Index(3));

        let pubkey = PublicKeyBytes::repeat_byte(0x11);
        assert_eq!(
            ValidatorId::from_str(&pubkey.as_hex_string()).unwrap(),
            ValidatorId::PublicKey(pubkey)
        );
        assert!(ValidatorId::from_str("0xzz").is_err());
    }

    #[test]
    fn query_vec_splits_on_commas() {
        let q: QueryVec<u64> = QueryVec::try_from("1,2,3".to_string()).unwrap();
        assert_eq!(q.0, vec![1, 2, 3]);

        let empty: QueryVec<u64> = QueryVec::try_from(String::new()).unwrap();
        assert!(empty.0.is_empty());
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            ValidatorStatus::PendingInitialized,
            ValidatorStatus::ActiveOngoing,
            ValidatorStatus::ActiveSlashed,
            ValidatorStatus::WithdrawalDone,
        ] {
            assert_eq!(
                ValidatorStatus::from_str(&status.to_string()).unwrap(),
                status
            );
        }
        assert!(ValidatorStatus::from_str("active").is_err());
    }
}
