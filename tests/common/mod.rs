//! Shared test fixtures
//!
//! A small MPQ writer producing format-0 archives the crate can mount:
//! single-unit files (raw, zlib or encrypted), raw sectored files, delete
//! markers and embedded listfiles. Tables are encrypted with the same Storm
//! primitives the reader uses.

#![allow(dead_code)]

use std::io::Write as _;
use std::path::Path;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use wow_client_data::archive::mpq::crypt::{
    self, HASH_FILE_KEY, HASH_NAME_A, HASH_NAME_B, HASH_TABLE_INDEX,
};

const FLAG_COMPRESS: u32 = 0x0000_0200;
const FLAG_ENCRYPTED: u32 = 0x0001_0000;
const FLAG_FIX_KEY: u32 = 0x0002_0000;
const FLAG_SINGLE_UNIT: u32 = 0x0100_0000;
const FLAG_DELETE_MARKER: u32 = 0x0200_0000;
const FLAG_EXISTS: u32 = 0x8000_0000;

const HEADER_SIZE: u32 = 32;
const SECTOR_SHIFT: u16 = 3;

/// Route crate logs through the test harness when a test opts in.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Entry {
    name: String,
    file_size: u32,
    payload: Vec<u8>,
    flags: u32,
}

#[derive(Default)]
pub struct MpqBuilder {
    entries: Vec<Entry>,
}

impl MpqBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain single-unit file.
    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(Entry {
            name: name.to_owned(),
            file_size: data.len() as u32,
            payload: data.to_vec(),
            flags: FLAG_EXISTS | FLAG_SINGLE_UNIT,
        });
        self
    }

    /// A zlib-compressed single-unit file. `data` must actually shrink.
    pub fn compressed_file(mut self, name: &str, data: &[u8]) -> Self {
        let mut encoder = ZlibEncoder::new(vec![0x02], Compression::default());
        encoder.write_all(data).unwrap();
        let payload = encoder.finish().unwrap();
        assert!(
            payload.len() < data.len(),
            "fixture data must be compressible"
        );

        self.entries.push(Entry {
            name: name.to_owned(),
            file_size: data.len() as u32,
            payload,
            flags: FLAG_EXISTS | FLAG_SINGLE_UNIT | FLAG_COMPRESS,
        });
        self
    }

    /// An encrypted single-unit file; the payload is ciphered once block
    /// offsets are known.
    pub fn encrypted_file(mut self, name: &str, data: &[u8], fix_key: bool) -> Self {
        let mut flags = FLAG_EXISTS | FLAG_SINGLE_UNIT | FLAG_ENCRYPTED;
        if fix_key {
            flags |= FLAG_FIX_KEY;
        }
        self.entries.push(Entry {
            name: name.to_owned(),
            file_size: data.len() as u32,
            payload: data.to_vec(),
            flags,
        });
        self
    }

    /// A raw file stored without the single-unit flag, read through the
    /// sector path.
    pub fn sectored_file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(Entry {
            name: name.to_owned(),
            file_size: data.len() as u32,
            payload: data.to_vec(),
            flags: FLAG_EXISTS,
        });
        self
    }

    /// A delete marker, as patch archives use to hide base files.
    pub fn deleted_file(mut self, name: &str) -> Self {
        self.entries.push(Entry {
            name: name.to_owned(),
            file_size: 0,
            payload: Vec::new(),
            flags: FLAG_EXISTS | FLAG_SINGLE_UNIT | FLAG_DELETE_MARKER,
        });
        self
    }

    pub fn write(mut self, path: &Path) {
        let hash_count = (self.entries.len().max(2) * 2).next_power_of_two() as u32;

        // Lay out file data right after the header, encrypting payloads now
        // that their offsets are final.
        let mut data_section: Vec<u8> = Vec::new();
        let mut block_words: Vec<u32> = Vec::new();
        for entry in &mut self.entries {
            let block_offset = HEADER_SIZE + data_section.len() as u32;

            if entry.flags & FLAG_ENCRYPTED != 0 {
                let key = crypt::file_key(
                    &entry.name,
                    block_offset,
                    entry.file_size,
                    entry.flags & FLAG_FIX_KEY != 0,
                );
                encrypt_bytes(&mut entry.payload, key);
            }

            block_words.extend([
                block_offset,
                entry.payload.len() as u32,
                entry.file_size,
                entry.flags,
            ]);
            data_section.extend_from_slice(&entry.payload);
        }

        // Hash table: empty slots are all-ones, files linear-probe in.
        let mask = hash_count - 1;
        let mut hash_words = vec![0xFFFF_FFFFu32; hash_count as usize * 4];
        for (block_index, entry) in self.entries.iter().enumerate() {
            let mut slot = crypt::hash_string(&entry.name, HASH_TABLE_INDEX) & mask;
            while hash_words[slot as usize * 4 + 3] != 0xFFFF_FFFF {
                slot = (slot + 1) & mask;
            }
            hash_words[slot as usize * 4] = crypt::hash_string(&entry.name, HASH_NAME_A);
            hash_words[slot as usize * 4 + 1] = crypt::hash_string(&entry.name, HASH_NAME_B);
            hash_words[slot as usize * 4 + 2] = 0;
            hash_words[slot as usize * 4 + 3] = block_index as u32;
        }

        crypt::encrypt_block(
            &mut hash_words,
            crypt::hash_string("(hash table)", HASH_FILE_KEY),
        );
        crypt::encrypt_block(
            &mut block_words,
            crypt::hash_string("(block table)", HASH_FILE_KEY),
        );

        let hash_offset = HEADER_SIZE + data_section.len() as u32;
        let block_offset = hash_offset + hash_count * 16;
        let archive_size = block_offset + block_words.len() as u32 * 4;

        let mut out = Vec::with_capacity(archive_size as usize);
        out.extend_from_slice(&0x1A51_504Du32.to_le_bytes()); // "MPQ\x1A"
        out.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        out.extend_from_slice(&archive_size.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // format version
        out.extend_from_slice(&SECTOR_SHIFT.to_le_bytes());
        out.extend_from_slice(&hash_offset.to_le_bytes());
        out.extend_from_slice(&block_offset.to_le_bytes());
        out.extend_from_slice(&hash_count.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());

        out.extend_from_slice(&data_section);
        for word in &hash_words {
            out.extend_from_slice(&word.to_le_bytes());
        }
        for word in &block_words {
            out.extend_from_slice(&word.to_le_bytes());
        }

        std::fs::write(path, out).unwrap();
    }
}

fn encrypt_bytes(data: &mut [u8], key: u32) {
    let mut words: Vec<u32> = data
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    crypt::encrypt_block(&mut words, key);

    for (chunk, word) in data.chunks_exact_mut(4).zip(&words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}
