//! Vault primitives the adapter is built on
//!
//! Mirrors the four OS calls one-to-one. Failures carry the platform's
//! last-error code and nothing else; interpreting them is the adapter's job.

use super::arena::{NativeArena, NativeView};
use super::error::PlatformCode;

/// An OS credential vault.
///
/// `cred_read` hands out a native block that stays valid until it is passed
/// back to `cred_free`. Taking the handle by value makes a second release
/// impossible in safe code.
pub trait CredentialPlatform {
    type Handle: NativeView;

    /// `CredRead`. `target_name` is NUL-terminated UTF-16.
    fn cred_read(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<Self::Handle, PlatformCode>;

    /// `CredWrite`. `credential` is a complete native block.
    fn cred_write(&self, credential: &NativeArena, flags: u32) -> Result<(), PlatformCode>;

    /// `CredDelete`.
    fn cred_delete(&self, target_name: &[u16], cred_type: u32, flags: u32)
        -> Result<(), PlatformCode>;

    /// `CredFree`.
    fn cred_free(&self, handle: Self::Handle);
}

impl<P: CredentialPlatform + ?Sized> CredentialPlatform for &P {
    type Handle = P::Handle;

    fn cred_read(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<Self::Handle, PlatformCode> {
        (**self).cred_read(target_name, cred_type, flags)
    }

    fn cred_write(&self, credential: &NativeArena, flags: u32) -> Result<(), PlatformCode> {
        (**self).cred_write(credential, flags)
    }

    fn cred_delete(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<(), PlatformCode> {
        (**self).cred_delete(target_name, cred_type, flags)
    }

    fn cred_free(&self, handle: Self::Handle) {
        (**self).cred_free(handle)
    }
}

impl<P: CredentialPlatform + ?Sized> CredentialPlatform for std::sync::Arc<P> {
    type Handle = P::Handle;

    fn cred_read(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<Self::Handle, PlatformCode> {
        (**self).cred_read(target_name, cred_type, flags)
    }

    fn cred_write(&self, credential: &NativeArena, flags: u32) -> Result<(), PlatformCode> {
        (**self).cred_write(credential, flags)
    }

    fn cred_delete(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<(), PlatformCode> {
        (**self).cred_delete(target_name, cred_type, flags)
    }

    fn cred_free(&self, handle: Self::Handle) {
        (**self).cred_free(handle)
    }
}
