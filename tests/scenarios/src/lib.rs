//! Shared fixtures for the cross-crate scenarios under `tests/`.
//!
//! Run with `cargo test -p uplink-scenarios`.

pub mod fakes;
pub mod wire;
