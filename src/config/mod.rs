//! Persisted configuration
//!
//! Schema and store for the device lists written after every structural
//! device change and read at startup to seed class-id assignments.

pub mod schema;
pub mod store;

pub use schema::{PersistedDevice, PersistedDeviceList};
pub use store::{ConfigError, DeviceConfigStore};
