//! Helpers shared by the warp-based mock servers.

pub mod reject;
