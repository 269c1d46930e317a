//! Native memory views and the owned byte arena
//!
//! A credential returned by the vault is one allocation whose embedded
//! pointers all point back inside it. `NativeView` gives bounds-aware,
//! copying access to such a block by absolute address; `NativeArena` is an
//! owned, 8-byte-aligned block laid out the same way, used to build
//! credentials for `CredWrite` and by the in-memory vault.
//!
//! Both the arena and the builder hold secret bytes, so both are wiped
//! before their memory is released.

use chrono::{DateTime, Utc};
use zeroize::{Zeroize, Zeroizing};

use super::error::MarshalError;

/// Read access to a single native credential block.
///
/// Addresses are absolute. Every read copies, so nothing returned borrows
/// the block past the call.
pub trait NativeView {
    /// Address of the top-level `CREDENTIALW`.
    fn root(&self) -> u64;

    /// Copy `len` bytes starting at `addr`.
    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>, MarshalError>;

    /// Copy a NUL-terminated UTF-16 string of at most `max` units (excluding
    /// the terminator) starting at `addr`.
    fn read_wide(&self, addr: u64, field: &'static str, max: usize)
        -> Result<Vec<u16>, MarshalError>;

    fn read_u32(&self, addr: u64) -> Result<u32, MarshalError> {
        let bytes = self.read_bytes(addr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&self, addr: u64) -> Result<u64, MarshalError> {
        let bytes = self.read_bytes(addr, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(raw))
    }
}

/// Owned native block backed by `u64` words for pointer alignment.
pub struct NativeArena {
    words: Box<[u64]>,
    len: usize,
}

impl NativeArena {
    /// A zero-filled arena of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        let words = vec![0u64; len.div_ceil(8)].into_boxed_slice();
        Self { words, len }
    }

    /// Copy raw bytes into a fresh arena. Embedded pointers are kept as-is.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut arena = Self::zeroed(bytes.len());
        arena.as_bytes_mut().copy_from_slice(bytes);
        arena
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute address of the first byte.
    pub fn base(&self) -> u64 {
        self.words.as_ptr() as u64
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr().cast()
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `words` holds at least `len` initialised bytes and u8 has
        // no alignment or validity requirements.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; the borrow of `self` is exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }

    /// Overwrite every byte of the backing storage with zeros.
    pub fn wipe(&mut self) {
        self.words.zeroize();
    }

    /// Shorten the arena, keeping its base address.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.as_bytes_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.as_bytes_mut()[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn range(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>, MarshalError> {
        let out_of_bounds = MarshalError::OutOfBounds { addr, len };
        let start = addr
            .checked_sub(self.base())
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(|| out_of_bounds.clone())?;
        let end = start.checked_add(len).ok_or_else(|| out_of_bounds.clone())?;
        if end > self.len {
            return Err(out_of_bounds);
        }
        Ok(start..end)
    }
}

impl NativeView for NativeArena {
    fn root(&self) -> u64 {
        self.base()
    }

    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>, MarshalError> {
        let range = self.range(addr, len)?;
        Ok(self.as_bytes()[range].to_vec())
    }

    fn read_wide(
        &self,
        addr: u64,
        field: &'static str,
        max: usize,
    ) -> Result<Vec<u16>, MarshalError> {
        let start = self.range(addr, 0)?.start;
        let bytes = &self.as_bytes()[start..];
        let mut units = Vec::new();
        for pair in bytes.chunks_exact(2) {
            let unit = u16::from_le_bytes([pair[0], pair[1]]);
            if unit == 0 {
                return Ok(units);
            }
            if units.len() == max {
                return Err(MarshalError::Unterminated { field, max });
            }
            units.push(unit);
        }
        // Ran off the end of the block before the terminator.
        Err(MarshalError::OutOfBounds {
            addr,
            len: (units.len() + 1) * 2,
        })
    }
}

impl Drop for NativeArena {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl std::fmt::Debug for NativeArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeArena")
            .field("base", &format_args!("0x{:x}", self.base()))
            .field("len", &self.len)
            .finish()
    }
}

/// Lays out a single native block: a fixed header followed by variable
/// data, with pointers patched to absolute addresses once the arena exists.
///
/// The staging buffer never reallocates in place: when a reservation does
/// not fit, the contents move to a larger buffer and the old one is wiped.
pub struct ArenaBuilder {
    bytes: Zeroizing<Vec<u8>>,
    fixups: Vec<(usize, usize)>,
}

impl ArenaBuilder {
    /// Start a block whose first `header_size` bytes are the root struct.
    pub fn new(header_size: usize) -> Self {
        Self::with_capacity(header_size, header_size)
    }

    /// As [`ArenaBuilder::new`], with room for `capacity` bytes up front.
    pub fn with_capacity(header_size: usize, capacity: usize) -> Self {
        let mut bytes: Zeroizing<Vec<u8>> =
            Zeroizing::new(Vec::with_capacity(capacity.max(header_size)));
        bytes.resize(header_size, 0);
        Self {
            bytes,
            fixups: Vec::new(),
        }
    }

    /// Reserve `size` zeroed bytes at `align`, returning their offset.
    pub fn reserve(&mut self, size: usize, align: usize) -> usize {
        let offset = super::layout::align_up(self.bytes.len(), align);
        let end = offset + size;
        if end > self.bytes.capacity() {
            let mut grown: Zeroizing<Vec<u8>> =
                Zeroizing::new(Vec::with_capacity(end.max(self.bytes.capacity() * 2)));
            grown.extend_from_slice(self.bytes.as_slice());
            // The previous buffer is zeroized as it drops here.
            self.bytes = grown;
        }
        self.bytes.resize(end, 0);
        offset
    }

    /// Append raw bytes, returning their offset.
    pub fn push_bytes(&mut self, data: &[u8], align: usize) -> usize {
        let offset = self.reserve(data.len(), align);
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        offset
    }

    /// Append a NUL-terminated UTF-16 string, returning its offset.
    pub fn push_wide(&mut self, value: &str) -> usize {
        let wide = to_wide(value);
        let offset = self.reserve(wide.len() * 2, 2);
        for (i, unit) in wide.iter().enumerate() {
            let at = offset + i * 2;
            self.bytes[at..at + 2].copy_from_slice(&unit.to_le_bytes());
        }
        offset
    }

    pub fn put_u32(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, offset: usize, value: u64) {
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Record that the pointer slot at `slot` must point at `target`.
    pub fn link(&mut self, slot: usize, target: usize) {
        self.fixups.push((slot, target));
    }

    pub fn finish(self) -> NativeArena {
        let mut arena = NativeArena::from_bytes(&self.bytes);
        let base = arena.base();
        for (slot, target) in self.fixups {
            arena.write_u64(slot, base + target as u64);
        }
        arena
    }
}

/// UTF-16 with a trailing NUL.
pub fn to_wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

/// 100ns intervals between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;
const FILETIME_TICKS_PER_SECOND: i64 = 10_000_000;

/// Convert a `FILETIME` tick count to UTC. Zero means "never written".
pub fn filetime_to_datetime(ticks: u64) -> Result<Option<DateTime<Utc>>, MarshalError> {
    if ticks == 0 {
        return Ok(None);
    }
    let signed = i64::try_from(ticks).map_err(|_| MarshalError::InvalidTimestamp(ticks))?;
    let since_unix = signed - FILETIME_UNIX_EPOCH;
    let secs = since_unix.div_euclid(FILETIME_TICKS_PER_SECOND);
    let nanos = (since_unix.rem_euclid(FILETIME_TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(Some)
        .ok_or(MarshalError::InvalidTimestamp(ticks))
}

/// Convert UTC to `FILETIME` ticks; `None` and pre-1601 instants become zero.
pub fn datetime_to_filetime(value: Option<DateTime<Utc>>) -> u64 {
    let Some(dt) = value else {
        return 0;
    };
    let ticks = dt
        .timestamp()
        .checked_mul(FILETIME_TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(i64::from(dt.timestamp_subsec_nanos() / 100)))
        .and_then(|t| t.checked_add(FILETIME_UNIX_EPOCH));
    match ticks {
        Some(t) if t > 0 => t as u64,
        _ => 0,
    }
}
