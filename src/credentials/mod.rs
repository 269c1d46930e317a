//! Credential storage module
//!
//! Adapter over an OS-level credential vault:
//! - `store`: the caller-facing read/write/delete API
//! - `codec`, `layout`, `arena`: marshaling to the native `CREDENTIALW` block
//! - `memory`: in-process vault with allocation tracking
//! - `windows`: Windows Credential Manager (64-bit)

pub mod arena;
pub mod codec;
pub mod error;
pub mod layout;
pub mod limits;
pub mod memory;
pub mod platform;
pub mod store;
pub mod task;
pub mod types;

#[cfg(all(windows, target_pointer_width = "64"))]
pub mod windows;

pub use arena::{NativeArena, NativeView};
pub use codec::{decode_credential, encode_credential};
pub use error::{CredentialError, MarshalError, PlatformCode, ValidationError};
pub use limits::Limits;
pub use memory::{Corruption, InMemoryVault, VaultOp, VaultStats};
pub use platform::CredentialPlatform;
pub use store::CredentialStore;
pub use task::SharedStore;
pub use types::{
    CredentialAttribute, CredentialFlags, CredentialRecord, CredentialType, Persistence, WriteMode,
};

#[cfg(all(windows, target_pointer_width = "64"))]
pub use windows::WindowsCredentialManager;
