//! Wire types for the mock Beacon node and key-manager API surfaces.
//!
//! These are a trimmed-down rendition of the standard Beacon API and
//! keymanager API schemas: only the fields the mocks actually serve. All
//! integers follow the quoted-decimal convention of the upstream APIs.

mod beacon;
mod bytes;
mod interchange;
mod keymanager;

pub use beacon::*;
pub use bytes::{PublicKeyBytes, SignatureBytes};
pub use interchange::{
    Interchange, InterchangeData, InterchangeMetadata, SignedAttestation, SignedBlock,
    INTERCHANGE_FORMAT_VERSION,
};
pub use keymanager::*;

pub use ethereum_types::{H160 as Address, H256 as Hash256};

use serde::{Deserialize, Serialize};

/// An API error serializable to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: u16,
    pub message: String,
}

/// The standard `{"data": ...}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Serialize + serde::de::DeserializeOwned")]
pub struct GenericResponse<T: Serialize + serde::de::DeserializeOwned> {
    pub data: T,
}

impl<T: Serialize + serde::de::DeserializeOwned> From<T> for GenericResponse<T> {
    fn from(data: T) -> Self {
        Self { data }
    }
}
