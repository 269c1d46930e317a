//! Caller-facing credential store
//!
//! `CredentialStore` validates requests, marshals records to and from the
//! native format, and guarantees that every block obtained from a read is
//! released exactly once. It keeps no state between calls and never retries.

use std::mem::ManuallyDrop;
use std::ops::Deref;

use tracing::{debug, error, trace, warn};
use zeroize::Zeroizing;

use super::arena::to_wide;
use super::codec::{decode_credential, encode_credential};
use super::error::{CredentialError, PlatformCode};
use super::limits::Limits;
use super::platform::CredentialPlatform;
use super::types::{CredentialRecord, CredentialType, WriteMode};
use crate::logging::fingerprint;

/// Read and delete take no flags.
const NO_FLAGS: u32 = 0;

/// Owns a native block until it goes out of scope, then releases it.
struct NativeBlockGuard<'a, P: CredentialPlatform> {
    platform: &'a P,
    handle: ManuallyDrop<P::Handle>,
}

impl<'a, P: CredentialPlatform> NativeBlockGuard<'a, P> {
    fn new(platform: &'a P, handle: P::Handle) -> Self {
        Self {
            platform,
            handle: ManuallyDrop::new(handle),
        }
    }
}

impl<P: CredentialPlatform> Deref for NativeBlockGuard<'_, P> {
    type Target = P::Handle;

    fn deref(&self) -> &P::Handle {
        &self.handle
    }
}

impl<P: CredentialPlatform> Drop for NativeBlockGuard<'_, P> {
    fn drop(&mut self) {
        // SAFETY: `handle` is taken exactly once, here, and never touched again.
        let handle = unsafe { ManuallyDrop::take(&mut self.handle) };
        self.platform.cred_free(handle);
    }
}

/// Adapter between callers and an OS credential vault.
pub struct CredentialStore<P> {
    platform: P,
    limits: Limits,
}

impl<P: CredentialPlatform> CredentialStore<P> {
    pub fn new(platform: P) -> Self {
        Self::with_limits(platform, Limits::default())
    }

    pub fn with_limits(platform: P, limits: Limits) -> Self {
        Self { platform, limits }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Read the record identified by `(target_name, cred_type)`.
    ///
    /// The returned record is a deep copy; the native block is released
    /// before this returns, on success and on every error path.
    pub fn read_credential(
        &self,
        target_name: &str,
        cred_type: CredentialType,
    ) -> Result<CredentialRecord, CredentialError> {
        self.limits.validate_target(target_name, cred_type)?;

        let wide = to_wide(target_name);
        let handle = self
            .platform
            .cred_read(&wide, cred_type.as_raw(), NO_FLAGS)
            .map_err(|code| lookup_error("read", target_name, cred_type, code))?;

        let block = NativeBlockGuard::new(&self.platform, handle);
        let decoded = decode_credential(&*block);
        drop(block);

        let record = decoded.map_err(|e| {
            error!(
                target_name = %target_name,
                cred_type = ?cred_type,
                error = %e,
                "native credential block is malformed"
            );
            CredentialError::Marshal(e)
        })?;

        debug!(
            target_name = %target_name,
            cred_type = ?cred_type,
            blob_len = record.secret_blob.len(),
            attributes = record.attributes.len(),
            "credential read"
        );
        trace!(blob = %fingerprint(&record.secret_blob), "credential blob fingerprint");
        Ok(record)
    }

    /// Like `read_credential`, with a missing target reported as `None`.
    pub fn read_optional(
        &self,
        target_name: &str,
        cred_type: CredentialType,
    ) -> Result<Option<CredentialRecord>, CredentialError> {
        match self.read_credential(target_name, cred_type) {
            Ok(record) => Ok(Some(record)),
            Err(CredentialError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn exists(
        &self,
        target_name: &str,
        cred_type: CredentialType,
    ) -> Result<bool, CredentialError> {
        self.read_optional(target_name, cred_type)
            .map(|record| record.is_some())
    }

    /// Create or replace a record. Bounds are checked before the vault is
    /// touched; `last_written` on `record` is ignored.
    pub fn write_credential(
        &self,
        record: &CredentialRecord,
        mode: WriteMode,
    ) -> Result<(), CredentialError> {
        if let Err(e) = self.limits.validate_record(record, mode) {
            debug!(
                target_name = %record.target_name,
                error = %e,
                "credential rejected before write"
            );
            return Err(e.into());
        }

        let block = encode_credential(record, mode);
        self.platform
            .cred_write(&block, mode.as_raw_flags())
            .map_err(|code| {
                warn!(
                    target_name = %record.target_name,
                    cred_type = ?record.cred_type,
                    code = %code,
                    "credential write failed"
                );
                CredentialError::Platform { code }
            })?;

        debug!(
            target_name = %record.target_name,
            cred_type = ?record.cred_type,
            blob_len = record.secret_blob.len(),
            mode = ?mode,
            "credential written"
        );
        Ok(())
    }

    /// Remove a record from the vault.
    pub fn delete_credential(
        &self,
        target_name: &str,
        cred_type: CredentialType,
    ) -> Result<(), CredentialError> {
        self.limits.validate_target(target_name, cred_type)?;

        let wide = to_wide(target_name);
        self.platform
            .cred_delete(&wide, cred_type.as_raw(), NO_FLAGS)
            .map_err(|code| lookup_error("delete", target_name, cred_type, code))?;

        debug!(target_name = %target_name, cred_type = ?cred_type, "credential deleted");
        Ok(())
    }

    /// Secret of a `Generic` record, if present.
    pub fn get_secret(
        &self,
        target_name: &str,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, CredentialError> {
        Ok(self
            .read_optional(target_name, CredentialType::Generic)?
            .map(|record| record.secret_blob))
    }

    /// Store `secret` under a `Generic` record with default persistence.
    pub fn set_secret(&self, target_name: &str, secret: &[u8]) -> Result<(), CredentialError> {
        let record = CredentialRecord::generic(target_name, secret.to_vec());
        self.write_credential(&record, WriteMode::Replace)
    }
}

/// Map a read/delete failure: a missing target is a normal outcome.
fn lookup_error(
    op: &'static str,
    target_name: &str,
    cred_type: CredentialType,
    code: PlatformCode,
) -> CredentialError {
    if code == PlatformCode::ERROR_NOT_FOUND {
        debug!(target_name = %target_name, cred_type = ?cred_type, op, "credential not found");
        return CredentialError::NotFound;
    }
    warn!(
        target_name = %target_name,
        cred_type = ?cred_type,
        op,
        code = %code,
        "credential platform call failed"
    );
    CredentialError::Platform { code }
}
