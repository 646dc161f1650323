//! An in-process mock of a validator client's key-manager API.
//!
//! The mock stores imported keystores with their fee recipients, graffiti and
//! slashing-protection records, serves the standard bearer-authenticated
//! `/eth` key-manager surface, and exposes an unauthenticated `/admin`
//! surface for process-wide defaults and snapshot control.

pub mod database;
pub mod http;
pub mod manager;

pub use database::{KeyManagerDatabase, KeyManagerOpts, ValidatorRecord};
pub use manager::KeyManagerMock;
