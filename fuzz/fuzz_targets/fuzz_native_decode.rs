#![no_main]

use libfuzzer_sys::fuzz_target;

use credvault::credentials::layout::{attribute, credential};
use credvault::credentials::{decode_credential, NativeArena};

/// Decodes arbitrary bytes as a native credential block.
///
/// Pointer slots in the input are treated as offsets into the block and
/// relocated to absolute addresses, so the decoder sees pointers that
/// land inside, at the edge of, and past the end of the block.
///
/// This catches:
/// - Panics on truncated headers or attribute arrays
/// - Reads outside the block through malformed pointers or sizes
/// - Unbounded scans for string terminators
fn relocate(arena: &mut NativeArena, slot: usize) {
    if slot + 8 > arena.len() {
        return;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&arena.as_bytes()[slot..slot + 8]);
    let offset = u64::from_le_bytes(raw) & 0xffff;
    if offset != 0 {
        let addr = arena.base() + offset;
        arena.write_u64(slot, addr);
    }
}

fuzz_target!(|data: &[u8]| {
    let mut arena = NativeArena::from_bytes(data);
    for slot in [
        credential::TARGET_NAME,
        credential::COMMENT,
        credential::CREDENTIAL_BLOB,
        credential::ATTRIBUTES,
        credential::TARGET_ALIAS,
        credential::USER_NAME,
    ] {
        relocate(&mut arena, slot);
    }
    // The first attribute entry usually follows the header directly.
    relocate(&mut arena, credential::SIZE + attribute::KEYWORD);
    relocate(&mut arena, credential::SIZE + attribute::VALUE);

    let _ = decode_credential(&arena);
});
