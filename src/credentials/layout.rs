//! Native struct layout of `CREDENTIALW` and `CREDENTIAL_ATTRIBUTEW`
//!
//! The vault reads these structs by position, so they are described as
//! ordered field lists with explicit offsets instead of Rust structs. The
//! offsets are those of a 64-bit target with natural alignment; reordering
//! an entry corrupts every call.
//!
//! The codec addresses fields through the `credential` and `attribute`
//! offset constants. `CREDENTIAL_LAYOUT` and `ATTRIBUTE_LAYOUT` are the
//! ordered schema built from those same constants; the tests in this module
//! recompute C layout from the declaration order and check every constant
//! against it.

/// Storage class of a native field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `DWORD`
    U32,
    /// Pointer (`LPWSTR`, `LPBYTE`, `PCREDENTIAL_ATTRIBUTEW`).
    Ptr,
    /// `FILETIME`: two `DWORD`s, low part first.
    FileTime,
}

impl FieldKind {
    pub const fn size(self) -> usize {
        match self {
            FieldKind::U32 => 4,
            FieldKind::Ptr => 8,
            FieldKind::FileTime => 8,
        }
    }

    pub const fn align(self) -> usize {
        match self {
            FieldKind::U32 => 4,
            FieldKind::Ptr => 8,
            // FILETIME is a pair of DWORDs
            FieldKind::FileTime => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub offset: usize,
}

/// An ordered native struct description.
#[derive(Debug, Clone, Copy)]
pub struct StructLayout {
    pub name: &'static str,
    pub size: usize,
    pub align: usize,
    pub fields: &'static [FieldSpec],
}

impl StructLayout {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const fn field(name: &'static str, kind: FieldKind, offset: usize) -> FieldSpec {
    FieldSpec { name, kind, offset }
}

/// `CREDENTIALW` field offsets.
pub mod credential {
    pub const FLAGS: usize = 0;
    pub const TYPE: usize = 4;
    pub const TARGET_NAME: usize = 8;
    pub const COMMENT: usize = 16;
    pub const LAST_WRITTEN: usize = 24;
    pub const CREDENTIAL_BLOB_SIZE: usize = 32;
    pub const CREDENTIAL_BLOB: usize = 40;
    pub const PERSIST: usize = 48;
    pub const ATTRIBUTE_COUNT: usize = 52;
    pub const ATTRIBUTES: usize = 56;
    pub const TARGET_ALIAS: usize = 64;
    pub const USER_NAME: usize = 72;
    pub const SIZE: usize = 80;
}

/// `CREDENTIAL_ATTRIBUTEW` field offsets.
pub mod attribute {
    pub const KEYWORD: usize = 0;
    pub const FLAGS: usize = 8;
    pub const VALUE_SIZE: usize = 12;
    pub const VALUE: usize = 16;
    pub const SIZE: usize = 24;
}

pub const CREDENTIAL_LAYOUT: StructLayout = StructLayout {
    name: "CREDENTIALW",
    size: credential::SIZE,
    align: 8,
    fields: &[
        field("Flags", FieldKind::U32, credential::FLAGS),
        field("Type", FieldKind::U32, credential::TYPE),
        field("TargetName", FieldKind::Ptr, credential::TARGET_NAME),
        field("Comment", FieldKind::Ptr, credential::COMMENT),
        field("LastWritten", FieldKind::FileTime, credential::LAST_WRITTEN),
        field(
            "CredentialBlobSize",
            FieldKind::U32,
            credential::CREDENTIAL_BLOB_SIZE,
        ),
        field("CredentialBlob", FieldKind::Ptr, credential::CREDENTIAL_BLOB),
        field("Persist", FieldKind::U32, credential::PERSIST),
        field("AttributeCount", FieldKind::U32, credential::ATTRIBUTE_COUNT),
        field("Attributes", FieldKind::Ptr, credential::ATTRIBUTES),
        field("TargetAlias", FieldKind::Ptr, credential::TARGET_ALIAS),
        field("UserName", FieldKind::Ptr, credential::USER_NAME),
    ],
};

pub const ATTRIBUTE_LAYOUT: StructLayout = StructLayout {
    name: "CREDENTIAL_ATTRIBUTEW",
    size: attribute::SIZE,
    align: 8,
    fields: &[
        field("Keyword", FieldKind::Ptr, attribute::KEYWORD),
        field("Flags", FieldKind::U32, attribute::FLAGS),
        field("ValueSize", FieldKind::U32, attribute::VALUE_SIZE),
        field("Value", FieldKind::Ptr, attribute::VALUE),
    ],
};

/// Round `value` up to a multiple of `align` (a power of two).
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}
