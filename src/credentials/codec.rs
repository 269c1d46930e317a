//! Conversion between `CredentialRecord` and the native block format
//!
//! Encoding produces one self-contained arena (header, attribute array,
//! strings and blobs, all pointers internal). Decoding deep-copies every
//! field out of any `NativeView`, so the record never references the block.

use zeroize::Zeroizing;

use super::arena::{datetime_to_filetime, filetime_to_datetime, ArenaBuilder, NativeArena, NativeView};
use super::error::MarshalError;
use super::layout::{attribute, credential};
use super::limits::{
    CRED_MAX_ATTRIBUTES, CRED_MAX_GENERIC_TARGET_NAME_LENGTH, CRED_MAX_STRING_LENGTH,
    CRED_MAX_USERNAME_LENGTH,
};
use super::types::{
    CredentialAttribute, CredentialFlags, CredentialRecord, CredentialType, Persistence, WriteMode,
};

/// Build the native block for `record`. In `PreserveBlob` mode the blob is
/// omitted (size zero, null pointer).
pub fn encode_credential(record: &CredentialRecord, mode: WriteMode) -> NativeArena {
    let mut b = ArenaBuilder::with_capacity(credential::SIZE, encoded_capacity(record, mode));

    b.put_u32(credential::FLAGS, record.flags.bits());
    b.put_u32(credential::TYPE, record.cred_type.as_raw());
    // FILETIME is low DWORD then high DWORD, i.e. a little-endian u64.
    b.put_u64(
        credential::LAST_WRITTEN,
        datetime_to_filetime(record.last_written),
    );
    b.put_u32(credential::PERSIST, record.persistence.as_raw());

    let target = b.push_wide(&record.target_name);
    b.link(credential::TARGET_NAME, target);

    if let Some(comment) = &record.comment {
        let at = b.push_wide(comment);
        b.link(credential::COMMENT, at);
    }

    if mode == WriteMode::Replace && !record.secret_blob.is_empty() {
        let at = b.push_bytes(&record.secret_blob, 1);
        b.link(credential::CREDENTIAL_BLOB, at);
        b.put_u32(
            credential::CREDENTIAL_BLOB_SIZE,
            record.secret_blob.len() as u32,
        );
    }

    if !record.attributes.is_empty() {
        let count = record.attributes.len();
        b.put_u32(credential::ATTRIBUTE_COUNT, count as u32);
        let array = b.reserve(count * attribute::SIZE, 8);
        b.link(credential::ATTRIBUTES, array);

        for (i, attr) in record.attributes.iter().enumerate() {
            let entry = array + i * attribute::SIZE;
            let keyword = b.push_wide(&attr.keyword);
            b.link(entry + attribute::KEYWORD, keyword);
            b.put_u32(entry + attribute::FLAGS, attr.flags);
            b.put_u32(entry + attribute::VALUE_SIZE, attr.value.len() as u32);
            if !attr.value.is_empty() {
                let value = b.push_bytes(&attr.value, 1);
                b.link(entry + attribute::VALUE, value);
            }
        }
    }

    if let Some(alias) = &record.target_alias {
        let at = b.push_wide(alias);
        b.link(credential::TARGET_ALIAS, at);
    }
    if let Some(user) = &record.user_name {
        let at = b.push_wide(user);
        b.link(credential::USER_NAME, at);
    }

    b.finish()
}

/// Upper bound on the encoded size, so the builder never has to grow.
fn encoded_capacity(record: &CredentialRecord, mode: WriteMode) -> usize {
    // Worst-case alignment padding before each pushed item.
    const PAD: usize = 7;
    let wide = |s: &str| (s.encode_utf16().count() + 1) * 2 + PAD;
    let optional = |s: &Option<String>| s.as_deref().map_or(0, wide);

    let mut size = credential::SIZE + wide(&record.target_name);
    size += optional(&record.comment) + optional(&record.target_alias) + optional(&record.user_name);
    if mode == WriteMode::Replace {
        size += record.secret_blob.len() + PAD;
    }
    if !record.attributes.is_empty() {
        size += record.attributes.len() * attribute::SIZE + PAD;
        size += record
            .attributes
            .iter()
            .map(|attr| wide(&attr.keyword) + attr.value.len() + PAD)
            .sum::<usize>();
    }
    size
}

/// Copy a credential out of a native block.
pub fn decode_credential<V: NativeView + ?Sized>(view: &V) -> Result<CredentialRecord, MarshalError> {
    let root = view.root();
    let at = |offset: usize| root + offset as u64;

    let flags = CredentialFlags(view.read_u32(at(credential::FLAGS))?);
    let raw_type = view.read_u32(at(credential::TYPE))?;
    let cred_type = CredentialType::from_raw(raw_type).ok_or(MarshalError::UnknownType(raw_type))?;

    let target_name = read_string(
        view,
        view.read_u64(at(credential::TARGET_NAME))?,
        "TargetName",
        CRED_MAX_GENERIC_TARGET_NAME_LENGTH,
    )?
    .ok_or(MarshalError::MissingField("TargetName"))?;

    let comment = read_string(
        view,
        view.read_u64(at(credential::COMMENT))?,
        "Comment",
        CRED_MAX_STRING_LENGTH,
    )?;

    let last_written = filetime_to_datetime(view.read_u64(at(credential::LAST_WRITTEN))?)?;

    let blob_size = view.read_u32(at(credential::CREDENTIAL_BLOB_SIZE))? as usize;
    let blob_ptr = view.read_u64(at(credential::CREDENTIAL_BLOB))?;
    let secret_blob = Zeroizing::new(read_sized(view, blob_ptr, blob_size, "CredentialBlob")?);

    let raw_persist = view.read_u32(at(credential::PERSIST))?;
    let persistence =
        Persistence::from_raw(raw_persist).ok_or(MarshalError::UnknownPersistence(raw_persist))?;

    let attribute_count = view.read_u32(at(credential::ATTRIBUTE_COUNT))?;
    let attributes_ptr = view.read_u64(at(credential::ATTRIBUTES))?;
    let attributes = read_attributes(view, attributes_ptr, attribute_count)?;

    let target_alias = read_string(
        view,
        view.read_u64(at(credential::TARGET_ALIAS))?,
        "TargetAlias",
        CRED_MAX_STRING_LENGTH,
    )?;
    let user_name = read_string(
        view,
        view.read_u64(at(credential::USER_NAME))?,
        "UserName",
        CRED_MAX_USERNAME_LENGTH,
    )?;

    Ok(CredentialRecord {
        target_name,
        cred_type,
        flags,
        secret_blob,
        comment,
        persistence,
        attributes,
        target_alias,
        user_name,
        last_written,
    })
}

fn read_attributes<V: NativeView + ?Sized>(
    view: &V,
    ptr: u64,
    count: u32,
) -> Result<Vec<CredentialAttribute>, MarshalError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if count as usize > CRED_MAX_ATTRIBUTES {
        return Err(MarshalError::AttributeCount(count));
    }
    // Copy the whole array first so a short block fails before any entry is used.
    let len = count as usize * attribute::SIZE;
    let array = read_sized(view, ptr, len, "Attributes")?;

    array
        .chunks_exact(attribute::SIZE)
        .map(|entry| {
            let keyword_ptr = le_u64(&entry[attribute::KEYWORD..]);
            let flags = le_u32(&entry[attribute::FLAGS..]);
            let value_size = le_u32(&entry[attribute::VALUE_SIZE..]) as usize;
            let value_ptr = le_u64(&entry[attribute::VALUE..]);

            let keyword = read_string(view, keyword_ptr, "Keyword", CRED_MAX_STRING_LENGTH)?
                .ok_or(MarshalError::MissingField("Keyword"))?;
            let value = read_sized(view, value_ptr, value_size, "Value")?;
            Ok(CredentialAttribute {
                keyword,
                flags,
                value,
            })
        })
        .collect()
}

fn read_sized<V: NativeView + ?Sized>(
    view: &V,
    ptr: u64,
    len: usize,
    field: &'static str,
) -> Result<Vec<u8>, MarshalError> {
    if len == 0 {
        return Ok(Vec::new());
    }
    if ptr == 0 {
        return Err(MarshalError::NullPointer { field, len });
    }
    view.read_bytes(ptr, len)
}

fn read_string<V: NativeView + ?Sized>(
    view: &V,
    ptr: u64,
    field: &'static str,
    max: usize,
) -> Result<Option<String>, MarshalError> {
    if ptr == 0 {
        return Ok(None);
    }
    let units = view.read_wide(ptr, field, max)?;
    String::from_utf16(&units)
        .map(Some)
        .map_err(|_| MarshalError::InvalidUtf16 { field })
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn full_record() -> CredentialRecord {
        CredentialRecord::generic("atto-wallet:seed", b"correct horse battery".to_vec())
            .with_comment("wallet seed")
            .with_persistence(Persistence::Enterprise)
            .with_flags(CredentialFlags::USERNAME_TARGET)
            .with_attribute(CredentialAttribute::new("Atto_Network", b"mainnet".to_vec()))
            .with_attribute(CredentialAttribute {
                keyword: "Atto_Index".to_string(),
                flags: 0,
                value: Vec::new(),
            })
            .with_target_alias("seed")
            .with_user_name("alice")
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_encoded_secret_is_wiped() {
        let secret = b"SEEDWORDS-abandon-ability";
        let record = CredentialRecord::generic("t", secret.to_vec());
        let mut arena = encode_credential(&record, WriteMode::Replace);
        assert!(contains(arena.as_bytes(), secret));
        arena.wipe();
        assert!(!contains(arena.as_bytes(), secret));
        assert!(arena.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encoded_size_within_capacity() {
        let mut wide = CredentialRecord::generic("\u{1F511}-target", vec![1; 512])
            .with_comment("c".repeat(256))
            .with_user_name("u".repeat(513));
        for i in 0..64 {
            wide.attributes
                .push(CredentialAttribute::new(format!("k{i}"), vec![2; 255]));
        }
        for record in [full_record(), wide, CredentialRecord::generic("t", Vec::new())] {
            for mode in [WriteMode::Replace, WriteMode::PreserveBlob] {
                let arena = encode_credential(&record, mode);
                assert!(arena.len() <= encoded_capacity(&record, mode));
            }
        }
    }

    #[test]
    fn test_encode_places_fields_at_fixed_offsets() {
        let record = full_record();
        let arena = encode_credential(&record, WriteMode::Replace);
        let base = arena.base();
        assert_eq!(base % 8, 0);
        assert_eq!(arena.read_u32(base + credential::FLAGS as u64).unwrap(), 0x4);
        assert_eq!(arena.read_u32(base + credential::TYPE as u64).unwrap(), 1);
        assert_eq!(arena.read_u32(base + credential::PERSIST as u64).unwrap(), 3);
        assert_eq!(
            arena
                .read_u32(base + credential::CREDENTIAL_BLOB_SIZE as u64)
                .unwrap(),
            21
        );
        assert_eq!(
            arena
                .read_u32(base + credential::ATTRIBUTE_COUNT as u64)
                .unwrap(),
            2
        );
        let attrs = arena.read_u64(base + credential::ATTRIBUTES as u64).unwrap();
        assert_eq!(attrs % 8, 0, "attribute array must be pointer aligned");
    }

    #[test]
    fn test_pointers_stay_inside_block() {
        let arena = encode_credential(&full_record(), WriteMode::Replace);
        let base = arena.base();
        let end = base + arena.len() as u64;
        for offset in [
            credential::TARGET_NAME,
            credential::COMMENT,
            credential::CREDENTIAL_BLOB,
            credential::ATTRIBUTES,
            credential::TARGET_ALIAS,
            credential::USER_NAME,
        ] {
            let ptr = arena.read_u64(base + offset as u64).unwrap();
            assert!(ptr >= base && ptr < end, "pointer at {offset} escapes");
        }
    }

    #[test]
    fn test_decode_copies_every_field() {
        let mut record = full_record();
        record.last_written = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let arena = encode_credential(&record, WriteMode::Replace);
        let decoded = decode_credential(&arena).unwrap();
        drop(arena);
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_absent_optionals_are_null() {
        let record = CredentialRecord::new("t", CredentialType::DomainPassword);
        let arena = encode_credential(&record, WriteMode::Replace);
        let base = arena.base();
        for offset in [
            credential::COMMENT,
            credential::CREDENTIAL_BLOB,
            credential::ATTRIBUTES,
            credential::TARGET_ALIAS,
            credential::USER_NAME,
        ] {
            assert_eq!(arena.read_u64(base + offset as u64).unwrap(), 0);
        }
        let decoded = decode_credential(&arena).unwrap();
        assert_eq!(decoded.comment, None);
        assert!(decoded.secret_blob.is_empty());
        assert_eq!(decoded.last_written, None);
    }

    #[test]
    fn test_preserve_mode_omits_blob() {
        let record = CredentialRecord::generic("t", b"ignored".to_vec());
        let arena = encode_credential(&record, WriteMode::PreserveBlob);
        let base = arena.base();
        assert_eq!(
            arena
                .read_u32(base + credential::CREDENTIAL_BLOB_SIZE as u64)
                .unwrap(),
            0
        );
        assert_eq!(
            arena.read_u64(base + credential::CREDENTIAL_BLOB as u64).unwrap(),
            0
        );
    }

    #[test]
    fn test_decode_truncated_block() {
        let mut arena = encode_credential(&full_record(), WriteMode::Replace);
        arena.truncate(credential::SIZE);
        assert!(matches!(
            decode_credential(&arena),
            Err(MarshalError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_decode_header_too_short() {
        let arena = NativeArena::zeroed(credential::SIZE - 8);
        assert!(decode_credential(&arena).is_err());
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut arena = encode_credential(&full_record(), WriteMode::Replace);
        arena.write_u32(credential::TYPE, 99);
        assert_eq!(
            decode_credential(&arena).unwrap_err(),
            MarshalError::UnknownType(99)
        );
    }

    #[test]
    fn test_decode_unknown_persistence() {
        let mut arena = encode_credential(&full_record(), WriteMode::Replace);
        arena.write_u32(credential::PERSIST, 7);
        assert_eq!(
            decode_credential(&arena).unwrap_err(),
            MarshalError::UnknownPersistence(7)
        );
    }

    #[test]
    fn test_decode_null_blob_with_size() {
        let mut arena = encode_credential(&full_record(), WriteMode::Replace);
        arena.write_u64(credential::CREDENTIAL_BLOB, 0);
        assert!(matches!(
            decode_credential(&arena),
            Err(MarshalError::NullPointer {
                field: "CredentialBlob",
                ..
            })
        ));
    }

    #[test]
    fn test_decode_missing_target_name() {
        let mut arena = encode_credential(&full_record(), WriteMode::Replace);
        arena.write_u64(credential::TARGET_NAME, 0);
        assert_eq!(
            decode_credential(&arena).unwrap_err(),
            MarshalError::MissingField("TargetName")
        );
    }

    #[test]
    fn test_decode_rejects_excess_attribute_count() {
        let mut arena = encode_credential(&full_record(), WriteMode::Replace);
        arena.write_u32(credential::ATTRIBUTE_COUNT, 65);
        assert_eq!(
            decode_credential(&arena).unwrap_err(),
            MarshalError::AttributeCount(65)
        );
    }

    #[test]
    fn test_decode_attribute_array_overrun() {
        let mut arena = encode_credential(&full_record(), WriteMode::Replace);
        // Claim more entries than the block holds.
        arena.write_u32(credential::ATTRIBUTE_COUNT, 64);
        assert!(matches!(
            decode_credential(&arena),
            Err(MarshalError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_decode_pointer_outside_block() {
        let other = encode_credential(&full_record(), WriteMode::Replace);
        let mut arena = encode_credential(&full_record(), WriteMode::Replace);
        let foreign = other.read_u64(other.base() + credential::COMMENT as u64).unwrap();
        arena.write_u64(credential::COMMENT, foreign);
        assert!(decode_credential(&arena).is_err());
    }
}
