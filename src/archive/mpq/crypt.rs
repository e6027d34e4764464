//! Storm hashing and block cipher
//!
//! MPQ archives index files by name hashes and encrypt their hash/block
//! tables (and optionally file data) with a shared table-driven cipher. Both
//! primitives are seeded from the same 0x500-entry table generated by a
//! fixed LCG. Exposed publicly because tooling that writes fixtures or
//! inspects archives needs the exact same functions.

/// Hash type for the hash-table slot index.
pub const HASH_TABLE_INDEX: u32 = 0x000;
/// Hash type for the first name check value.
pub const HASH_NAME_A: u32 = 0x100;
/// Hash type for the second name check value.
pub const HASH_NAME_B: u32 = 0x200;
/// Hash type for file and table encryption keys.
pub const HASH_FILE_KEY: u32 = 0x300;

static CRYPT_TABLE: [u32; 0x500] = build_crypt_table();

const fn build_crypt_table() -> [u32; 0x500] {
    let mut table = [0u32; 0x500];
    let mut seed: u32 = 0x0010_0001;

    let mut index1 = 0;
    while index1 < 0x100 {
        let mut index2 = index1;
        let mut i = 0;
        while i < 5 {
            seed = (seed * 125 + 3) % 0x2A_AAAB;
            let temp1 = (seed & 0xFFFF) << 16;
            seed = (seed * 125 + 3) % 0x2A_AAAB;
            let temp2 = seed & 0xFFFF;

            table[index2] = temp1 | temp2;
            index2 += 0x100;
            i += 1;
        }
        index1 += 1;
    }

    table
}

/// Storm string hash over an archive-internal name.
///
/// Names hash case-insensitively with forward slashes treated as
/// backslashes, so any path spelling may be passed in.
pub fn hash_string(name: &str, hash_type: u32) -> u32 {
    let mut seed1: u32 = 0x7FED_7FED;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for &b in name.as_bytes() {
        let ch = if b == b'/' { b'\\' } else { b.to_ascii_uppercase() };
        let ch = u32::from(ch);

        seed1 = CRYPT_TABLE[(hash_type + ch) as usize] ^ seed1.wrapping_add(seed2);
        seed2 = ch
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

/// Decrypt a block of little-endian u32 values in place.
pub fn decrypt_block(data: &mut [u32], mut key: u32) {
    let mut seed: u32 = 0xEEEE_EEEE;

    for value in data.iter_mut() {
        seed = seed.wrapping_add(CRYPT_TABLE[(0x400 + (key & 0xFF)) as usize]);
        let ch = *value ^ key.wrapping_add(seed);

        key = ((!key) << 0x15).wrapping_add(0x1111_1111) | (key >> 0x0B);
        seed = ch
            .wrapping_add(seed)
            .wrapping_add(seed << 5)
            .wrapping_add(3);
        *value = ch;
    }
}

/// Encrypt a block of little-endian u32 values in place. Inverse of
/// [`decrypt_block`].
pub fn encrypt_block(data: &mut [u32], mut key: u32) {
    let mut seed: u32 = 0xEEEE_EEEE;

    for value in data.iter_mut() {
        seed = seed.wrapping_add(CRYPT_TABLE[(0x400 + (key & 0xFF)) as usize]);
        let ch = *value;
        *value = ch ^ key.wrapping_add(seed);

        key = ((!key) << 0x15).wrapping_add(0x1111_1111) | (key >> 0x0B);
        seed = ch
            .wrapping_add(seed)
            .wrapping_add(seed << 5)
            .wrapping_add(3);
    }
}

/// Encryption key for a file, derived from its bare name (the part after the
/// last path separator). With `fix_key`, the key is additionally mixed with
/// the file's block position and size.
pub fn file_key(name: &str, block_offset: u32, file_size: u32, fix_key: bool) -> u32 {
    let bare = name
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(name);
    let key = hash_string(bare, HASH_FILE_KEY);

    if fix_key {
        key.wrapping_add(block_offset) ^ file_size
    } else {
        key
    }
}
