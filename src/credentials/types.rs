//! Logical credential record and its enumerations
//!
//! These types never carry native pointers; they are what callers read,
//! build, and write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Kind of credential. Together with the target name it identifies a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum CredentialType {
    Generic = 1,
    DomainPassword = 2,
    DomainCertificate = 3,
    DomainVisiblePassword = 4,
    GenericCertificate = 5,
    DomainExtended = 6,
}

impl CredentialType {
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Generic),
            2 => Some(Self::DomainPassword),
            3 => Some(Self::DomainCertificate),
            4 => Some(Self::DomainVisiblePassword),
            5 => Some(Self::GenericCertificate),
            6 => Some(Self::DomainExtended),
            _ => None,
        }
    }

    /// Generic kinds accept long, free-form target names.
    pub fn is_generic(self) -> bool {
        matches!(self, Self::Generic | Self::GenericCertificate)
    }
}

/// How long the vault keeps a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Persistence {
    None = 0,
    /// Lives for the logon session.
    Session = 1,
    /// Survives reboots on this machine.
    #[default]
    LocalMachine = 2,
    /// Roams with the user's enterprise profile.
    Enterprise = 3,
}

impl Persistence {
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Session),
            2 => Some(Self::LocalMachine),
            3 => Some(Self::Enterprise),
            _ => None,
        }
    }
}

/// Credential flag bits. Unknown bits are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CredentialFlags(pub u32);

impl CredentialFlags {
    pub const NONE: CredentialFlags = CredentialFlags(0);
    pub const PROMPT_NOW: CredentialFlags = CredentialFlags(0x0002);
    pub const USERNAME_TARGET: CredentialFlags = CredentialFlags(0x0004);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: CredentialFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CredentialFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        CredentialFlags(self.0 | rhs.0)
    }
}

/// Write behaviour for an existing secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Store the record's blob as given.
    #[default]
    Replace,
    /// Keep the blob already stored under the same target; the record's
    /// blob must be empty.
    PreserveBlob,
}

impl WriteMode {
    /// Native `CredWrite` flags for this mode.
    pub fn as_raw_flags(self) -> u32 {
        match self {
            WriteMode::Replace => 0,
            WriteMode::PreserveBlob => CRED_PRESERVE_CREDENTIAL_BLOB,
        }
    }
}

/// `CredWrite` flag asking the vault to keep the previous blob.
pub const CRED_PRESERVE_CREDENTIAL_BLOB: u32 = 0x1;

/// Application-defined attribute attached to a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialAttribute {
    /// Conventionally `<CompanyName>_<Name>`.
    pub keyword: String,
    /// Reserved; zero unless the vault says otherwise.
    pub flags: u32,
    pub value: Vec<u8>,
}

impl CredentialAttribute {
    pub fn new(keyword: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            keyword: keyword.into(),
            flags: 0,
            value: value.into(),
        }
    }
}

/// In-process copy of a vault record.
///
/// A record obtained from a read is independent of the vault: changing it
/// has no effect until it is written back.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub target_name: String,
    pub cred_type: CredentialType,
    pub flags: CredentialFlags,
    pub secret_blob: Zeroizing<Vec<u8>>,
    pub comment: Option<String>,
    pub persistence: Persistence,
    pub attributes: Vec<CredentialAttribute>,
    pub target_alias: Option<String>,
    pub user_name: Option<String>,
    /// Set by the vault on read; ignored on write.
    pub last_written: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn new(target_name: impl Into<String>, cred_type: CredentialType) -> Self {
        Self {
            target_name: target_name.into(),
            cred_type,
            flags: CredentialFlags::NONE,
            secret_blob: Zeroizing::new(Vec::new()),
            comment: None,
            persistence: Persistence::default(),
            attributes: Vec::new(),
            target_alias: None,
            user_name: None,
            last_written: None,
        }
    }

    /// Shorthand for a `Generic` record holding `secret`.
    pub fn generic(target_name: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self::new(target_name, CredentialType::Generic).with_secret(secret)
    }

    pub fn with_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret_blob = Zeroizing::new(secret.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_flags(mut self, flags: CredentialFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_attribute(mut self, attribute: CredentialAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_target_alias(mut self, alias: impl Into<String>) -> Self {
        self.target_alias = Some(alias.into());
        self
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    /// True when `other` matches in every field the caller controls.
    pub fn same_content(&self, other: &CredentialRecord) -> bool {
        self.target_name == other.target_name
            && self.cred_type == other.cred_type
            && self.flags == other.flags
            && self.secret_blob == other.secret_blob
            && self.comment == other.comment
            && self.persistence == other.persistence
            && self.attributes == other.attributes
            && self.target_alias == other.target_alias
            && self.user_name == other.user_name
    }
}

// Never print secret material.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("target_name", &self.target_name)
            .field("cred_type", &self.cred_type)
            .field("flags", &self.flags)
            .field(
                "secret_blob",
                &format_args!("<{} bytes>", self.secret_blob.len()),
            )
            .field("comment", &self.comment)
            .field("persistence", &self.persistence)
            .field("attributes", &self.attributes.len())
            .field("target_alias", &self.target_alias)
            .field("user_name", &self.user_name)
            .field("last_written", &self.last_written)
            .finish()
    }
}
