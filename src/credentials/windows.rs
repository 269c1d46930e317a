//! Windows Credential Manager backend
//!
//! Binds `CredReadW`, `CredWriteW`, `CredDeleteW` and `CredFree` from
//! advapi32. The arena produced by the codec already has the exact
//! `CREDENTIALW` layout, so writes pass it straight through; reads wrap the
//! block returned by the OS in a view and hand it back to `CredFree`.

use std::ffi::c_void;
use std::ptr::NonNull;

use super::arena::{NativeArena, NativeView};
use super::error::{MarshalError, PlatformCode};
use super::platform::CredentialPlatform;

#[link(name = "advapi32")]
extern "system" {
    fn CredReadW(
        target_name: *const u16,
        cred_type: u32,
        flags: u32,
        credential: *mut *mut c_void,
    ) -> i32;
    fn CredWriteW(credential: *const c_void, flags: u32) -> i32;
    fn CredDeleteW(target_name: *const u16, cred_type: u32, flags: u32) -> i32;
    fn CredFree(buffer: *const c_void);
}

fn last_error() -> PlatformCode {
    let code = std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or_default();
    PlatformCode(code as u32)
}

/// Credential block allocated by the OS. Released only through `CredFree`.
#[derive(Debug)]
pub struct WindowsCredentialHandle {
    ptr: NonNull<c_void>,
}

impl NativeView for WindowsCredentialHandle {
    fn root(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>, MarshalError> {
        if addr == 0 {
            return Err(MarshalError::OutOfBounds { addr, len });
        }
        // SAFETY: the OS guarantees every pointer and size inside the block it
        // returned from `CredReadW` is valid until `CredFree`, and the handle
        // is consumed by `cred_free`, so the block is still live here.
        let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, len) };
        Ok(bytes.to_vec())
    }

    fn read_wide(
        &self,
        addr: u64,
        field: &'static str,
        max: usize,
    ) -> Result<Vec<u16>, MarshalError> {
        if addr == 0 {
            return Err(MarshalError::OutOfBounds { addr, len: 2 });
        }
        let base = addr as *const u16;
        let mut units = Vec::new();
        loop {
            // SAFETY: strings in the block are NUL-terminated; the scan stops
            // at the terminator or after `max` units, whichever comes first.
            let unit = unsafe { base.add(units.len()).read_unaligned() };
            if unit == 0 {
                return Ok(units);
            }
            if units.len() == max {
                return Err(MarshalError::Unterminated { field, max });
            }
            units.push(unit);
        }
    }
}

/// The current user's credential set.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsCredentialManager;

impl WindowsCredentialManager {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialPlatform for WindowsCredentialManager {
    type Handle = WindowsCredentialHandle;

    fn cred_read(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<WindowsCredentialHandle, PlatformCode> {
        let mut out: *mut c_void = std::ptr::null_mut();
        // SAFETY: `target_name` is NUL-terminated and `out` is a valid slot.
        let ok = unsafe { CredReadW(target_name.as_ptr(), cred_type, flags, &mut out) };
        if ok == 0 {
            return Err(last_error());
        }
        NonNull::new(out)
            .map(|ptr| WindowsCredentialHandle { ptr })
            .ok_or(PlatformCode::ERROR_NOT_FOUND)
    }

    fn cred_write(&self, credential: &NativeArena, flags: u32) -> Result<(), PlatformCode> {
        // SAFETY: the arena is 8-byte aligned, laid out as `CREDENTIALW`, and
        // every pointer in it refers to memory owned by the arena, which
        // outlives the call.
        let ok = unsafe { CredWriteW(credential.as_ptr().cast(), flags) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn cred_delete(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<(), PlatformCode> {
        // SAFETY: `target_name` is NUL-terminated.
        let ok = unsafe { CredDeleteW(target_name.as_ptr(), cred_type, flags) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn cred_free(&self, handle: WindowsCredentialHandle) {
        // SAFETY: the pointer came from `CredReadW` and the handle is consumed.
        unsafe { CredFree(handle.ptr.as_ptr()) };
    }
}
