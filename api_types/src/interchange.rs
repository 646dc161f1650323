//! The EIP-3076 slashing protection interchange format, as far as the mock
//! key manager stores it. Records are kept verbatim and never evaluated.

use crate::{Hash256, PublicKeyBytes};
use serde::{Deserialize, Serialize};

pub const INTERCHANGE_FORMAT_VERSION: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeMetadata {
    #[serde(with = "serde_utils::quoted_u64")]
    pub interchange_format_version: u64,
    pub genesis_validators_root: Hash256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_root: Option<Hash256>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedAttestation {
    #[serde(with = "serde_utils::quoted_u64")]
    pub source_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub target_epoch: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_root: Option<Hash256>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeData {
    pub pubkey: PublicKeyBytes,
    pub signed_blocks: Vec<SignedBlock>,
    pub signed_attestations: Vec<SignedAttestation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interchange {
    pub metadata: InterchangeMetadata,
    pub data: Vec<InterchangeData>,
}

impl Interchange {
    /// An interchange with no validator records.
    pub fn empty(genesis_validators_root: Hash256) -> Self {
        Self {
            metadata: InterchangeMetadata {
                interchange_format_version: INTERCHANGE_FORMAT_VERSION,
                genesis_validators_root,
            },
            data: vec![],
        }
    }

    /// A fresh record for `pubkey` with no signing history.
    pub fn for_pubkey(genesis_validators_root: Hash256, pubkey: PublicKeyBytes) -> Self {
        Self {
            data: vec![InterchangeData {
                pubkey,
                signed_blocks: vec![],
                signed_attestations: vec![],
            }],
            ..Self::empty(genesis_validators_root)
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
