//! proctor-stores — Collaborator implementations for the session engine.
//!
//! A REST store and a local directory store for questions, recordings and
//! session records, roster-based login, a synthetic capture device, and
//! in-memory mocks for tests.

pub mod config;
pub mod local;
pub mod mock;
pub mod rest;
pub mod roster;
pub mod synthetic;

pub use config::{
    create_device, create_stores, load_config, load_config_from, DeviceConfig, ProctorConfig,
    StoreConfig, Stores,
};
pub use local::LocalStore;
pub use rest::RestStore;
pub use roster::RosterAuth;
pub use synthetic::SyntheticDevice;
