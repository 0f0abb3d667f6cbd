//! Core data model for the infected key exchange: period keys, the
//! in-memory key store and the little-endian values read off the wire.

pub mod event;
pub mod period_key;
pub mod store;
pub mod wire;
