//! Types for the standard key-manager API surface served by the VC mock.

use crate::{Address, Hash256, Interchange, PublicKeyBytes};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleKeystoreResponse {
    pub validating_pubkey: PublicKeyBytes,
    pub derivation_path: Option<String>,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListKeystoresResponse {
    pub data: Vec<SingleKeystoreResponse>,
}

/// The subset of an EIP-2335 keystore the mock needs. The full crypto section
/// is accepted but ignored; keys are never decrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keystore {
    pub pubkey: PublicKeyBytes,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
}

/// Body of `POST /eth/v1/keystores`. Keystores and the slashing-protection
/// bundle arrive as JSON-encoded strings, per the keymanager API schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportKeystoresRequest {
    pub keystores: Vec<String>,
    pub passwords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slashing_protection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status<T> {
    pub status: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Status<T> {
    pub fn ok(status: T) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn error(status: T, message: String) -> Self {
        Self {
            status,
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKeystoreStatus {
    Imported,
    Duplicate,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportKeystoresResponse {
    pub data: Vec<Status<ImportKeystoreStatus>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteKeystoresRequest {
    pub pubkeys: Vec<PublicKeyBytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteKeystoreStatus {
    Deleted,
    NotActive,
    NotFound,
    Error,
}

/// Response to `DELETE /eth/v1/keystores`. The aggregated slashing-protection
/// bundle is a JSON-encoded string, mirroring the import side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteKeystoresResponse {
    pub data: Vec<Status<DeleteKeystoreStatus>>,
    pub slashing_protection: String,
}

impl DeleteKeystoresResponse {
    pub fn interchange(&self) -> Result<Interchange, serde_json::Error> {
        Interchange::from_json_str(&self.slashing_protection)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetFeeRecipientResponse {
    pub pubkey: PublicKeyBytes,
    pub ethaddress: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetFeeRecipientRequest {
    pub ethaddress: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetGraffitiResponse {
    pub pubkey: PublicKeyBytes,
    pub graffiti: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetGraffitiRequest {
    pub graffiti: String,
}

// Admin surface bodies.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultFeeRecipientData {
    pub fee_recipient: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultGraffitiData {
    pub graffiti: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisValidatorsRootData {
    pub genesis_validators_root: Hash256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiTokenData {
    pub token: String,
}
