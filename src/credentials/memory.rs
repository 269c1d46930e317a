//! In-memory credential vault
//!
//! Behaves like the OS vault at the native boundary: reads hand out a
//! single-block native credential that must be released with `cred_free`,
//! writes accept a native block. Every allocation and release is counted so
//! tests can check that nothing leaks or is freed twice. Faults can be
//! injected per operation.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::arena::{NativeArena, NativeView};
use super::codec::{decode_credential, encode_credential};
use super::error::{MarshalError, PlatformCode};
use super::layout::credential;
use super::platform::CredentialPlatform;
use super::types::{CredentialRecord, WriteMode, CRED_PRESERVE_CREDENTIAL_BLOB};

/// Vault operation, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VaultOp {
    Read,
    Write,
    Delete,
}

/// Ways to damage the block returned by the next read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// Cut the block off right after the header.
    TruncateAfterHeader,
    /// Point the target name outside the block.
    DanglingTargetName,
    /// Store a credential type the adapter does not know.
    UnknownType(u32),
}

/// Call and allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultStats {
    pub reads: usize,
    pub writes: usize,
    pub deletes: usize,
    /// Blocks handed out by successful reads.
    pub allocations: usize,
    pub frees: usize,
    /// Releases of a handle that was not outstanding.
    pub double_frees: usize,
}

/// Native block handed out by `InMemoryVault::cred_read`.
#[derive(Debug)]
pub struct MemoryHandle {
    id: u64,
    block: NativeArena,
}

impl MemoryHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl NativeView for MemoryHandle {
    fn root(&self) -> u64 {
        self.block.root()
    }

    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>, MarshalError> {
        self.block.read_bytes(addr, len)
    }

    fn read_wide(
        &self,
        addr: u64,
        field: &'static str,
        max: usize,
    ) -> Result<Vec<u16>, MarshalError> {
        self.block.read_wide(addr, field, max)
    }
}

#[derive(Default)]
struct VaultState {
    entries: HashMap<(String, u32), CredentialRecord>,
    outstanding: HashSet<u64>,
    next_handle: u64,
    stats: VaultStats,
    faults: HashMap<VaultOp, VecDeque<PlatformCode>>,
    corruptions: VecDeque<Corruption>,
}

impl VaultState {
    fn take_fault(&mut self, op: VaultOp) -> Option<PlatformCode> {
        self.faults.get_mut(&op).and_then(|queue| queue.pop_front())
    }
}

/// Process-local vault. Target names match case-insensitively.
#[derive(Default)]
pub struct InMemoryVault {
    state: Mutex<VaultState>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> VaultStats {
        self.state.lock().stats
    }

    /// Handles returned by `cred_read` that have not been freed yet.
    pub fn outstanding_handles(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next call of `op` fail with `code`.
    pub fn fail_next(&self, op: VaultOp, code: PlatformCode) {
        self.state
            .lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(code);
    }

    /// Damage the block returned by the next successful read.
    pub fn corrupt_next_read(&self, corruption: Corruption) {
        self.state.lock().corruptions.push_back(corruption);
    }

    fn key(target_name: &[u16], cred_type: u32) -> Result<(String, u32), PlatformCode> {
        let units = target_name
            .split(|&u| u == 0)
            .next()
            .unwrap_or_default();
        let name = String::from_utf16(units).map_err(|_| PlatformCode::ERROR_INVALID_PARAMETER)?;
        if name.is_empty() {
            return Err(PlatformCode::ERROR_INVALID_PARAMETER);
        }
        Ok((name.to_lowercase(), cred_type))
    }
}

fn corrupt(block: &mut NativeArena, corruption: Corruption) {
    match corruption {
        Corruption::TruncateAfterHeader => block.truncate(credential::SIZE),
        Corruption::DanglingTargetName => {
            let past_end = block.base() + block.len() as u64 + 64;
            block.write_u64(credential::TARGET_NAME, past_end);
        }
        Corruption::UnknownType(raw) => block.write_u32(credential::TYPE, raw),
    }
}

impl CredentialPlatform for InMemoryVault {
    type Handle = MemoryHandle;

    fn cred_read(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<MemoryHandle, PlatformCode> {
        let mut state = self.state.lock();
        state.stats.reads += 1;
        if let Some(code) = state.take_fault(VaultOp::Read) {
            return Err(code);
        }
        if flags != 0 {
            return Err(PlatformCode::ERROR_INVALID_FLAGS);
        }
        let key = Self::key(target_name, cred_type)?;
        let record = state
            .entries
            .get(&key)
            .ok_or(PlatformCode::ERROR_NOT_FOUND)?;

        let mut block = encode_credential(record, WriteMode::Replace);
        if let Some(corruption) = state.corruptions.pop_front() {
            debug!(?corruption, "handing out corrupted credential block");
            corrupt(&mut block, corruption);
        }

        state.next_handle += 1;
        let id = state.next_handle;
        state.outstanding.insert(id);
        state.stats.allocations += 1;
        Ok(MemoryHandle { id, block })
    }

    fn cred_write(&self, credential: &NativeArena, flags: u32) -> Result<(), PlatformCode> {
        let mut state = self.state.lock();
        state.stats.writes += 1;
        if let Some(code) = state.take_fault(VaultOp::Write) {
            return Err(code);
        }
        if flags & !CRED_PRESERVE_CREDENTIAL_BLOB != 0 {
            return Err(PlatformCode::ERROR_INVALID_FLAGS);
        }

        let mut record =
            decode_credential(credential).map_err(|_| PlatformCode::ERROR_INVALID_PARAMETER)?;
        let key = (record.target_name.to_lowercase(), record.cred_type.as_raw());

        if flags & CRED_PRESERVE_CREDENTIAL_BLOB != 0 {
            if !record.secret_blob.is_empty() {
                return Err(PlatformCode::ERROR_INVALID_PARAMETER);
            }
            let existing = state
                .entries
                .get(&key)
                .ok_or(PlatformCode::ERROR_NOT_FOUND)?;
            record.secret_blob = existing.secret_blob.clone();
        }

        record.last_written = Some(Utc::now());
        state.entries.insert(key, record);
        Ok(())
    }

    fn cred_delete(
        &self,
        target_name: &[u16],
        cred_type: u32,
        flags: u32,
    ) -> Result<(), PlatformCode> {
        let mut state = self.state.lock();
        state.stats.deletes += 1;
        if let Some(code) = state.take_fault(VaultOp::Delete) {
            return Err(code);
        }
        if flags != 0 {
            return Err(PlatformCode::ERROR_INVALID_FLAGS);
        }
        let key = Self::key(target_name, cred_type)?;
        state
            .entries
            .remove(&key)
            .map(|_| ())
            .ok_or(PlatformCode::ERROR_NOT_FOUND)
    }

    fn cred_free(&self, handle: MemoryHandle) {
        let mut state = self.state.lock();
        if state.outstanding.remove(&handle.id) {
            state.stats.frees += 1;
        } else {
            warn!(handle = handle.id, "credential block released twice");
            state.stats.double_frees += 1;
        }
    }
}
