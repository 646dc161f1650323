//! An in-process mock of the Docker surface used by orchestration tooling.
//!
//! Compose projects are projected into an object graph of networks, volumes
//! and containers with content-hashed service reuse; container lifecycle,
//! volume/network removal and disk usage are modelled far enough to test the
//! tooling that drives them. No images are pulled and no processes run.

pub mod compose;
pub mod generation;
pub mod manager;
pub mod models;
pub mod state;

pub use compose::{ComposeFormat, ComposeProject};
pub use manager::DockerMock;
pub use state::DockerState;
