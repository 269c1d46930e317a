//! End-to-end behaviour of the credential store against the in-memory vault.
//!
//! Covers round-trips, pre-flight rejection, not-found handling and native
//! buffer release on every read path.

use chrono::Utc;
use credvault::credentials::{
    Corruption, CredentialAttribute, CredentialError, CredentialFlags, CredentialRecord,
    CredentialStore, CredentialType, InMemoryVault, Limits, Persistence, PlatformCode,
    ValidationError, VaultOp, WriteMode,
};

fn store() -> CredentialStore<InMemoryVault> {
    CredentialStore::new(InMemoryVault::new())
}

fn wallet_record() -> CredentialRecord {
    CredentialRecord::new("atto-wallet:primary", CredentialType::Generic)
        .with_secret(b"abandon abandon abandon ability".to_vec())
        .with_comment("Atto wallet seed")
        .with_persistence(Persistence::LocalMachine)
        .with_flags(CredentialFlags::NONE)
        .with_attribute(CredentialAttribute::new("Atto_Network", b"live".to_vec()))
        .with_attribute(CredentialAttribute::new("Atto_Version", vec![1, 0, 2]))
        .with_target_alias("primary")
        .with_user_name("wallet")
}

#[test]
fn roundtrip_preserves_every_field() {
    let store = store();
    let before = Utc::now();
    let record = wallet_record();
    store.write_credential(&record, WriteMode::Replace).unwrap();

    let read = store
        .read_credential(&record.target_name, record.cred_type)
        .unwrap();
    assert!(read.same_content(&record), "{read:?} != {record:?}");
    let written = read.last_written.expect("vault sets last_written");
    // FILETIME has 100ns resolution.
    assert!(written.timestamp_micros() >= before.timestamp_micros() - 1);
}

#[test]
fn roundtrip_at_platform_maxima() {
    let store = store();
    let limits = Limits::default();
    let mut record = CredentialRecord::generic("max", vec![0xA5; limits.max_blob_size])
        .with_comment("c".repeat(limits.max_string_length))
        .with_user_name("u".repeat(limits.max_username_length));
    for i in 0..limits.max_attributes {
        record.attributes.push(CredentialAttribute {
            keyword: format!("Atto_{i:02}"),
            flags: 0,
            value: vec![i as u8; limits.max_attribute_value_size],
        });
    }
    store.write_credential(&record, WriteMode::Replace).unwrap();

    let read = store.read_credential("max", CredentialType::Generic).unwrap();
    assert!(read.same_content(&record));
    assert_eq!(read.attributes.len(), 64);
}

#[test]
fn every_credential_type_is_distinct() {
    let store = store();
    let types = [
        CredentialType::Generic,
        CredentialType::DomainPassword,
        CredentialType::DomainCertificate,
        CredentialType::DomainVisiblePassword,
        CredentialType::GenericCertificate,
        CredentialType::DomainExtended,
    ];
    for (i, ty) in types.iter().enumerate() {
        let record = CredentialRecord::new("shared-target", *ty).with_secret(vec![i as u8]);
        store.write_credential(&record, WriteMode::Replace).unwrap();
    }
    for (i, ty) in types.iter().enumerate() {
        let read = store.read_credential("shared-target", *ty).unwrap();
        assert_eq!(read.cred_type, *ty);
        assert_eq!(read.secret_blob.as_slice(), &[i as u8]);
    }
}

#[test]
fn oversized_blob_rejected_without_platform_call() {
    let store = store();
    let record = CredentialRecord::generic("big", vec![0u8; Limits::default().max_blob_size + 1]);
    let err = store
        .write_credential(&record, WriteMode::Replace)
        .unwrap_err();
    assert!(matches!(
        err,
        CredentialError::Validation(ValidationError::BlobTooLarge { .. })
    ));
    assert_eq!(store.platform().stats().writes, 0);
}

#[test]
fn preserve_mode_with_blob_rejected_locally() {
    let store = store();
    let err = store
        .write_credential(&wallet_record(), WriteMode::PreserveBlob)
        .unwrap_err();
    assert!(matches!(
        err,
        CredentialError::Validation(ValidationError::PreserveWithBlob)
    ));
    assert_eq!(store.platform().stats().writes, 0);
}

#[test]
fn never_written_target_is_not_found() {
    let store = store();
    let err = store
        .read_credential("never-written", CredentialType::Generic)
        .unwrap_err();
    assert!(matches!(err, CredentialError::NotFound));
}

#[test]
fn delete_then_read_is_not_found() {
    let store = store();
    let record = wallet_record();
    store.write_credential(&record, WriteMode::Replace).unwrap();
    store
        .delete_credential(&record.target_name, record.cred_type)
        .unwrap();
    let err = store
        .read_credential(&record.target_name, record.cred_type)
        .unwrap_err();
    assert!(matches!(err, CredentialError::NotFound));
}

#[test]
fn other_platform_failures_keep_their_code() {
    let store = store();
    store
        .platform()
        .fail_next(VaultOp::Read, PlatformCode::ERROR_NO_SUCH_LOGON_SESSION);
    match store.read_credential("x", CredentialType::Generic) {
        Err(CredentialError::Platform { code }) => {
            assert_eq!(code, PlatformCode::ERROR_NO_SUCH_LOGON_SESSION)
        }
        other => panic!("expected platform error, got {other:?}"),
    }
}

#[test]
fn every_read_frees_exactly_once() {
    let store = store();
    store
        .write_credential(&wallet_record(), WriteMode::Replace)
        .unwrap();
    let target = "atto-wallet:primary";

    // Successful reads.
    for _ in 0..3 {
        store.read_credential(target, CredentialType::Generic).unwrap();
    }
    // Reads that fail part-way through copying.
    for corruption in [
        Corruption::TruncateAfterHeader,
        Corruption::DanglingTargetName,
        Corruption::UnknownType(0),
    ] {
        store.platform().corrupt_next_read(corruption);
        let err = store
            .read_credential(target, CredentialType::Generic)
            .unwrap_err();
        assert!(matches!(err, CredentialError::Marshal(_)));
    }
    // Reads that never got a block.
    store.read_credential("missing", CredentialType::Generic).unwrap_err();
    store.platform().fail_next(VaultOp::Read, PlatformCode(5));
    store.read_credential(target, CredentialType::Generic).unwrap_err();

    let stats = store.platform().stats();
    assert_eq!(stats.reads, 8);
    assert_eq!(stats.allocations, 6);
    assert_eq!(stats.frees, 6);
    assert_eq!(stats.double_frees, 0);
    assert_eq!(store.platform().outstanding_handles(), 0);
}

#[test]
fn mutating_a_read_record_does_not_touch_the_vault() {
    let store = store();
    store
        .write_credential(&wallet_record(), WriteMode::Replace)
        .unwrap();
    let mut copy = store
        .read_credential("atto-wallet:primary", CredentialType::Generic)
        .unwrap();
    copy.attributes.clear();
    copy.user_name = None;

    let fresh = store
        .read_credential("atto-wallet:primary", CredentialType::Generic)
        .unwrap();
    assert_eq!(fresh.attributes.len(), 2);
    assert_eq!(fresh.user_name.as_deref(), Some("wallet"));
}

#[test]
fn rewrite_updates_last_written() {
    let store = store();
    store.set_secret("rotating", b"v1").unwrap();
    let first = store
        .read_credential("rotating", CredentialType::Generic)
        .unwrap()
        .last_written
        .unwrap();
    store.set_secret("rotating", b"v2").unwrap();
    let second = store
        .read_credential("rotating", CredentialType::Generic)
        .unwrap();
    assert_eq!(second.secret_blob.as_slice(), b"v2");
    assert!(second.last_written.unwrap() >= first);
}
