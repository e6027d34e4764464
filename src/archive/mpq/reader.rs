//! Minimal MPQ reader
//!
//! Parses format 0/1 archives: header discovery at 512-byte boundaries,
//! encrypted hash/block tables, named lookup through the three-hash probe
//! sequence, and file reads in single-unit or sector form with zlib
//! compressed sectors. Compression methods other than zlib are rejected;
//! the access layer never needs the audio codecs of early archives.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use tracing::trace;

use crate::archive::mpq::crypt;
use crate::error::{ClientDataError, Result};

const MPQ_MAGIC: u32 = 0x1A51_504D; // "MPQ\x1A"
const HEADER_ALIGN: u64 = 0x200;

const HASH_ENTRY_EMPTY: u32 = 0xFFFF_FFFF;
const HASH_ENTRY_DELETED: u32 = 0xFFFF_FFFE;

pub(crate) const FLAG_IMPLODE: u32 = 0x0000_0100;
pub(crate) const FLAG_COMPRESS: u32 = 0x0000_0200;
pub(crate) const FLAG_ENCRYPTED: u32 = 0x0001_0000;
pub(crate) const FLAG_FIX_KEY: u32 = 0x0002_0000;
pub(crate) const FLAG_PATCH_FILE: u32 = 0x0010_0000;
pub(crate) const FLAG_SINGLE_UNIT: u32 = 0x0100_0000;
pub(crate) const FLAG_DELETE_MARKER: u32 = 0x0200_0000;
pub(crate) const FLAG_SECTOR_CRC: u32 = 0x0400_0000;
pub(crate) const FLAG_EXISTS: u32 = 0x8000_0000;

/// Compression mask for zlib, the only method WotLK-era data uses.
const COMPRESSION_ZLIB: u8 = 0x02;

#[derive(Debug, Clone, Copy)]
struct HashEntry {
    name_a: u32,
    name_b: u32,
    block_index: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockEntry {
    pub(crate) offset: u32,
    pub(crate) packed_size: u32,
    pub(crate) file_size: u32,
    pub(crate) flags: u32,
}

impl BlockEntry {
    pub(crate) fn is_deleted(&self) -> bool {
        self.flags & FLAG_EXISTS == 0 || self.flags & FLAG_DELETE_MARKER != 0
    }

    pub(crate) fn is_patch_file(&self) -> bool {
        self.flags & FLAG_PATCH_FILE != 0
    }
}

pub(crate) struct MpqReader {
    file: File,
    archive_offset: u64,
    sector_size: usize,
    hash_table: Vec<HashEntry>,
    block_table: Vec<BlockEntry>,
}

impl MpqReader {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let (archive_offset, header) = locate_header(&mut file, file_len, path)?;

        let sector_size = 512usize << header.sector_shift;
        let hash_table = read_hash_table(&mut file, archive_offset, &header)?;
        let block_table = read_block_table(&mut file, archive_offset, &header)?;

        trace!(
            "opened MPQ {} ({} hash entries, {} blocks)",
            path.display(),
            hash_table.len(),
            block_table.len()
        );

        Ok(Self {
            file,
            archive_offset,
            sector_size,
            hash_table,
            block_table,
        })
    }

    /// Find the block index for `name`. Delete markers are still reported;
    /// the caller decides what a deleted entry means for its overlay.
    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        if self.hash_table.is_empty() {
            return None;
        }

        let mask = (self.hash_table.len() - 1) as u32;
        let start = crypt::hash_string(name, crypt::HASH_TABLE_INDEX) & mask;
        let name_a = crypt::hash_string(name, crypt::HASH_NAME_A);
        let name_b = crypt::hash_string(name, crypt::HASH_NAME_B);

        for probe in 0..self.hash_table.len() {
            let entry = &self.hash_table[((start + probe as u32) & mask) as usize];

            if entry.block_index == HASH_ENTRY_EMPTY {
                return None;
            }
            if entry.block_index == HASH_ENTRY_DELETED {
                continue;
            }
            if entry.name_a == name_a && entry.name_b == name_b {
                let block_index = entry.block_index as usize;
                if block_index < self.block_table.len() {
                    return Some(block_index);
                }
                return None;
            }
        }

        None
    }

    pub(crate) fn block(&self, index: usize) -> &BlockEntry {
        &self.block_table[index]
    }

    /// Read and decode the file at `block_index`. `name` must be the name
    /// the block was found under; encrypted files derive their key from it.
    pub(crate) fn read(&mut self, name: &str, block_index: usize) -> Result<Vec<u8>> {
        let block = self.block_table[block_index];

        if block.flags & FLAG_IMPLODE != 0 {
            return Err(ClientDataError::MpqUnsupported(
                "PKWARE imploded file".into(),
            ));
        }
        if block.is_patch_file() {
            return Err(ClientDataError::MpqUnsupported(
                "incremental patch file".into(),
            ));
        }

        let encrypted = block.flags & FLAG_ENCRYPTED != 0;
        let key = encrypted.then(|| {
            crypt::file_key(
                name,
                block.offset,
                block.file_size,
                block.flags & FLAG_FIX_KEY != 0,
            )
        });

        if block.flags & FLAG_SINGLE_UNIT != 0 {
            self.read_single_unit(&block, key)
        } else {
            self.read_sectors(&block, key)
        }
    }

    fn read_single_unit(&mut self, block: &BlockEntry, key: Option<u32>) -> Result<Vec<u8>> {
        let mut raw = self.read_at(u64::from(block.offset), block.packed_size as usize)?;
        if let Some(key) = key {
            decrypt_bytes(&mut raw, key);
        }

        if block.flags & FLAG_COMPRESS != 0 && block.packed_size < block.file_size {
            let data = decompress(&raw, block.file_size as usize)?;
            if data.len() != block.file_size as usize {
                return Err(ClientDataError::MpqFormat(format!(
                    "decoded {} bytes, block declares {}",
                    data.len(),
                    block.file_size
                )));
            }
            Ok(data)
        } else {
            Ok(raw)
        }
    }

    fn read_sectors(&mut self, block: &BlockEntry, key: Option<u32>) -> Result<Vec<u8>> {
        let file_size = block.file_size as usize;
        if file_size == 0 {
            return Ok(Vec::new());
        }

        let sector_count = file_size.div_ceil(self.sector_size);
        let mut data = Vec::with_capacity(file_size);

        if block.flags & FLAG_COMPRESS != 0 {
            // Sector offset table, relative to the block start. One extra
            // entry terminates it; a CRC sector adds one more.
            let mut table_len = sector_count + 1;
            if block.flags & FLAG_SECTOR_CRC != 0 {
                table_len += 1;
            }

            let mut offsets = vec![0u32; table_len];
            let raw = self.read_at(u64::from(block.offset), table_len * 4)?;
            for (slot, chunk) in offsets.iter_mut().zip(raw.chunks_exact(4)) {
                *slot = u32::from_le_bytes(chunk.try_into().unwrap());
            }
            if let Some(key) = key {
                crypt::decrypt_block(&mut offsets, key.wrapping_sub(1));
            }

            for sector in 0..sector_count {
                let start = offsets[sector] as usize;
                let end = offsets[sector + 1] as usize;
                if end < start || end > block.packed_size as usize {
                    return Err(ClientDataError::MpqFormat(
                        "sector offsets out of order".into(),
                    ));
                }

                let mut raw =
                    self.read_at(u64::from(block.offset) + start as u64, end - start)?;
                if let Some(key) = key {
                    decrypt_bytes(&mut raw, key.wrapping_add(sector as u32));
                }

                let expected = (file_size - sector * self.sector_size).min(self.sector_size);
                if raw.len() < expected {
                    data.extend_from_slice(&decompress(&raw, expected)?);
                } else {
                    data.extend_from_slice(&raw);
                }
            }
        } else {
            // Stored raw and contiguous; encryption is still per sector.
            let mut raw = self.read_at(u64::from(block.offset), file_size)?;
            if let Some(key) = key {
                for (sector, chunk) in raw.chunks_mut(self.sector_size).enumerate() {
                    decrypt_bytes(chunk, key.wrapping_add(sector as u32));
                }
            }
            data = raw;
        }

        if data.len() != file_size {
            return Err(ClientDataError::MpqFormat(format!(
                "decoded {} bytes, block declares {file_size}",
                data.len()
            )));
        }
        Ok(data)
    }

    fn read_at(&mut self, block_relative: u64, len: usize) -> Result<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(self.archive_offset + block_relative))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

struct Header {
    sector_shift: u16,
    hash_table_offset: u64,
    block_table_offset: u64,
    hash_table_count: u32,
    block_table_count: u32,
}

fn locate_header(file: &mut File, file_len: u64, path: &Path) -> Result<(u64, Header)> {
    let mut offset = 0u64;

    while offset + 32 <= file_len {
        file.seek(SeekFrom::Start(offset))?;
        if file.read_u32::<LittleEndian>()? == MPQ_MAGIC {
            let header_size = file.read_u32::<LittleEndian>()?;
            let _archive_size = file.read_u32::<LittleEndian>()?;
            let format_version = file.read_u16::<LittleEndian>()?;
            let sector_shift = file.read_u16::<LittleEndian>()?;
            let hash_table_offset = file.read_u32::<LittleEndian>()?;
            let block_table_offset = file.read_u32::<LittleEndian>()?;
            let hash_table_count = file.read_u32::<LittleEndian>()?;
            let block_table_count = file.read_u32::<LittleEndian>()?;

            let (mut hash_hi, mut block_hi) = (0u64, 0u64);
            if format_version >= 1 && header_size >= 44 {
                let _hi_block_table = file.read_u64::<LittleEndian>()?;
                hash_hi = u64::from(file.read_u16::<LittleEndian>()?);
                block_hi = u64::from(file.read_u16::<LittleEndian>()?);
            }

            if hash_table_count != 0 && !hash_table_count.is_power_of_two() {
                return Err(ClientDataError::MpqFormat(format!(
                    "hash table size {hash_table_count} is not a power of two in {}",
                    path.display()
                )));
            }

            let header = Header {
                sector_shift,
                hash_table_offset: u64::from(hash_table_offset) | (hash_hi << 32),
                block_table_offset: u64::from(block_table_offset) | (block_hi << 32),
                hash_table_count,
                block_table_count,
            };
            return Ok((offset, header));
        }

        offset += HEADER_ALIGN;
    }

    Err(ClientDataError::MpqFormat(format!(
        "no MPQ header in {}",
        path.display()
    )))
}

fn read_encrypted_table(
    file: &mut File,
    offset: u64,
    count: usize,
    key_name: &str,
) -> Result<Vec<u32>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut raw = vec![0u8; count * 16];
    file.read_exact(&mut raw)?;

    let mut words: Vec<u32> = raw
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    crypt::decrypt_block(&mut words, crypt::hash_string(key_name, crypt::HASH_FILE_KEY));
    Ok(words)
}

fn read_hash_table(file: &mut File, archive_offset: u64, header: &Header) -> Result<Vec<HashEntry>> {
    let words = read_encrypted_table(
        file,
        archive_offset + header.hash_table_offset,
        header.hash_table_count as usize,
        "(hash table)",
    )?;

    Ok(words
        .chunks_exact(4)
        .map(|entry| HashEntry {
            name_a: entry[0],
            name_b: entry[1],
            // entry[2] packs locale and platform; neutral archives leave it
            // zero and the access layer picks locale by archive, not entry.
            block_index: entry[3],
        })
        .collect())
}

fn read_block_table(
    file: &mut File,
    archive_offset: u64,
    header: &Header,
) -> Result<Vec<BlockEntry>> {
    let words = read_encrypted_table(
        file,
        archive_offset + header.block_table_offset,
        header.block_table_count as usize,
        "(block table)",
    )?;

    Ok(words
        .chunks_exact(4)
        .map(|entry| BlockEntry {
            offset: entry[0],
            packed_size: entry[1],
            file_size: entry[2],
            flags: entry[3],
        })
        .collect())
}

/// Decrypt the whole dwords of `data` in place; a trailing partial dword is
/// stored unencrypted in the format.
fn decrypt_bytes(data: &mut [u8], key: u32) {
    let mut words: Vec<u32> = data
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    crypt::decrypt_block(&mut words, key);

    for (chunk, word) in data.chunks_exact_mut(4).zip(&words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

/// Decode one compressed block: leading mask byte, then the payload.
fn decompress(raw: &[u8], expected: usize) -> Result<Vec<u8>> {
    let Some((&mask, payload)) = raw.split_first() else {
        return Err(ClientDataError::MpqFormat("empty compressed block".into()));
    };

    match mask {
        COMPRESSION_ZLIB => {
            let mut out = Vec::with_capacity(expected);
            ZlibDecoder::new(payload)
                .read_to_end(&mut out)
                .map_err(|e| ClientDataError::MpqFormat(format!("zlib: {e}")))?;
            Ok(out)
        }
        other => Err(ClientDataError::MpqUnsupported(format!(
            "compression mask {other:#04x}"
        ))),
    }
}
