//! credvault
//!
//! Secure credential store adapter: reads, writes and deletes structured
//! secret records in an OS-level credential vault, marshaling them across
//! the native boundary with strict ownership of the vault's buffers.

pub mod config;
pub mod credentials;
pub mod logging;

pub use credentials::{
    CredentialAttribute, CredentialError, CredentialFlags, CredentialRecord, CredentialStore,
    CredentialType, Persistence, WriteMode,
};
