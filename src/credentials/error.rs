//! Credential adapter error types

use std::fmt;
use thiserror::Error;

/// Opaque diagnostic code reported by the platform vault (its last-error value).
///
/// The code space belongs to the operating system, so this stays an open
/// newtype rather than an enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformCode(pub u32);

impl PlatformCode {
    pub const ERROR_INVALID_PARAMETER: PlatformCode = PlatformCode(87);
    pub const ERROR_INVALID_FLAGS: PlatformCode = PlatformCode(1004);
    pub const ERROR_NOT_FOUND: PlatformCode = PlatformCode(1168);
    pub const ERROR_NO_SUCH_LOGON_SESSION: PlatformCode = PlatformCode(1312);

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PlatformCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08x})", self.0, self.0)
    }
}

/// Errors surfaced by the credential store adapter
#[derive(Error, Debug)]
pub enum CredentialError {
    /// A field bound was violated; the platform was never called.
    #[error("Invalid credential: {0}")]
    Validation(#[from] ValidationError),

    #[error("Credential not found")]
    NotFound,

    #[error("Credential platform call failed with code {code}")]
    Platform { code: PlatformCode },

    /// The native buffer did not match the expected layout.
    #[error("Malformed native credential: {0}")]
    Marshal(#[from] MarshalError),

    #[error("Credential task failed: {0}")]
    Task(String),
}

impl CredentialError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CredentialError::NotFound)
    }

    /// Raw platform code, if this error came from the vault.
    pub fn platform_code(&self) -> Option<PlatformCode> {
        match self {
            CredentialError::Platform { code } => Some(*code),
            _ => None,
        }
    }
}

/// Pre-flight bound violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("target name is empty")]
    EmptyTargetName,

    #[error("{field} is {len} characters, maximum is {max}")]
    StringTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} contains an interior NUL character")]
    InteriorNul { field: &'static str },

    #[error("secret blob is {size} bytes, maximum is {max}")]
    BlobTooLarge { size: usize, max: usize },

    #[error("{count} attributes, maximum is {max}")]
    TooManyAttributes { count: usize, max: usize },

    #[error("attribute {index} value is {size} bytes, maximum is {max}")]
    AttributeValueTooLarge { index: usize, size: usize, max: usize },

    #[error("preserve-blob mode cannot be combined with a non-empty secret blob")]
    PreserveWithBlob,
}

/// Copy-out failures while reading a native credential block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("read of {len} bytes at 0x{addr:x} falls outside the native block")]
    OutOfBounds { addr: u64, len: usize },

    #[error("{0} is null")]
    MissingField(&'static str),

    #[error("{field} pointer is null but its size is {len}")]
    NullPointer { field: &'static str, len: usize },

    #[error("{field} is not NUL-terminated within {max} characters")]
    Unterminated { field: &'static str, max: usize },

    #[error("{field} is not valid UTF-16")]
    InvalidUtf16 { field: &'static str },

    #[error("attribute count {0} exceeds the platform maximum")]
    AttributeCount(u32),

    #[error("unknown credential type {0}")]
    UnknownType(u32),

    #[error("unknown persistence value {0}")]
    UnknownPersistence(u32),

    #[error("last-written timestamp {0} is out of range")]
    InvalidTimestamp(u64),
}
