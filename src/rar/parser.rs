//! Incremental RAR 4.x header parser.
//!
//! As segments arrive out of order but are fed to this parser strictly in
//! stream order, the parser walks an append-only buffer block by block,
//! stopping cleanly whenever a header is only partially buffered so far
//! and resuming from the same offset once more bytes land. Grounded on
//! the teacher's `archive/rar.rs::analyse_rar_buffer`, generalised from a
//! one-shot `Cursor` read into a resumable scanner over a growing
//! `Vec<u8>`.

use super::error::RarError;
use super::types::{
    FileHeadBlock, RawBlockHeader, BLOCK_HEADER_LEN, FILE_FLAG_PASSWORD, METHOD_STORE,
    RAR_ENDARC_HEAD, RAR_FILE_HEAD, RAR_MAIN_HEAD, RAR_MARK_HEAD, RAR_SIGNATURE,
    RAR_SUB_RECOVERY_AUTH,
};

#[derive(Debug, Clone)]
pub enum RarBlock {
    Main,
    File(FileHeadBlock),
    EndArchive,
    /// A recognised-but-uninteresting block (MARK, SUB, RECOVERY, AUTH)
    /// skipped by `header_size`.
    Skipped(u8),
}

#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub block: RarBlock,
    /// Byte offset, relative to the scanner's buffer origin, where this
    /// block's payload (if any) begins.
    pub data_offset: usize,
    /// Byte offset where the *next* block header starts.
    pub next_offset: usize,
}

/// Scans one RAR volume's buffered bytes for block headers, one at a
/// time. Call [`Scanner::next_block`] repeatedly as more bytes arrive;
/// it returns `Ok(None)` when the buffer doesn't yet hold a complete
/// header, without consuming anything, so the same offset is retried
/// once the caller appends more data.
pub struct Scanner {
    offset: usize,
    signature_checked: bool,
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            offset: 0,
            signature_checked: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Drop `removed` already-consumed bytes from the front of the
    /// scanner's view after the caller compacts its buffer by the same
    /// amount, so the scanner's offset stays valid against the shrunk
    /// buffer.
    pub fn rebase(&mut self, removed: usize) {
        self.offset = self.offset.saturating_sub(removed);
    }

    pub fn next_block(&mut self, buf: &[u8]) -> Result<Option<ParsedBlock>, RarError> {
        if !self.signature_checked {
            if buf.len() < RAR_SIGNATURE.len() {
                return Ok(None);
            }
            if buf[..RAR_SIGNATURE.len()] != RAR_SIGNATURE {
                return Err(RarError::BadSignature);
            }
            self.offset = RAR_SIGNATURE.len();
            self.signature_checked = true;
        } else if buf.len() >= self.offset + RAR_SIGNATURE.len()
            && buf[self.offset..self.offset + RAR_SIGNATURE.len()] == RAR_SIGNATURE
        {
            // Every subsequent volume in a rar-set repeats its own 7-byte
            // marker before its MAIN_HEAD; skip it transparently so a
            // single continuous buffer spanning the whole set parses the
            // same way a single volume would.
            self.offset += RAR_SIGNATURE.len();
        }

        let remaining = &buf[self.offset..];
        let Some(header) = RawBlockHeader::parse(remaining) else {
            return Ok(None);
        };

        let header_size = header.header_size as usize;
        if remaining.len() < header_size {
            return Ok(None);
        }

        match header.block_type {
            RAR_MAIN_HEAD => {
                self.offset += header_size;
                Ok(Some(ParsedBlock {
                    block: RarBlock::Main,
                    data_offset: self.offset,
                    next_offset: self.offset,
                }))
            }
            RAR_ENDARC_HEAD => {
                self.offset += header_size;
                Ok(Some(ParsedBlock {
                    block: RarBlock::EndArchive,
                    data_offset: self.offset,
                    next_offset: self.offset,
                }))
            }
            RAR_MARK_HEAD => {
                self.offset += header_size;
                Ok(Some(ParsedBlock {
                    block: RarBlock::Skipped(RAR_MARK_HEAD),
                    data_offset: self.offset,
                    next_offset: self.offset,
                }))
            }
            other if RAR_SUB_RECOVERY_AUTH.contains(&other) => {
                self.offset += header_size;
                Ok(Some(ParsedBlock {
                    block: RarBlock::Skipped(other),
                    data_offset: self.offset,
                    next_offset: self.offset,
                }))
            }
            RAR_FILE_HEAD => {
                let block = parse_file_head(remaining, header_size, header.crc)?;
                let total_needed = block.header_len + block.packed_size as usize;
                if remaining.len() < total_needed {
                    // Header is complete but this volume's payload hasn't
                    // fully arrived yet; retry from the same offset once
                    // more bytes land.
                    return Ok(None);
                }

                let data_offset = self.offset + block.header_len;
                let next_offset = self.offset + total_needed;
                self.offset = next_offset;

                Ok(Some(ParsedBlock {
                    block: RarBlock::File(block),
                    data_offset,
                    next_offset,
                }))
            }
            other => Err(RarError::Unsupported(other)),
        }
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

// common header (7) + packed_size (4) + unpacked_size (4) + host_os (1)
// + file_crc (4) + method (1) + name_size (2)
const FILE_HEAD_FIXED_LEN: usize = 7 + 4 + 4 + 1 + 4 + 1 + 2;

fn parse_file_head(buf: &[u8], header_size: usize, header_crc: u16) -> Result<FileHeadBlock, RarError> {
    if buf.len() < header_size || header_size < FILE_HEAD_FIXED_LEN {
        return Err(RarError::Truncated(header_size as u64));
    }

    let header = RawBlockHeader::parse(buf).ok_or(RarError::Truncated(BLOCK_HEADER_LEN as u64))?;
    if header.flags & FILE_FLAG_PASSWORD != 0 {
        return Err(RarError::Compressed);
    }

    let packed_size = u32::from_le_bytes(buf[7..11].try_into().unwrap()) as u64;
    let unpacked_size = u32::from_le_bytes(buf[11..15].try_into().unwrap()) as u64;
    // buf[15] = host OS, buf[16..20] = file CRC
    let method = buf[20];
    if method != METHOD_STORE {
        return Err(RarError::Compressed);
    }

    let name_size = u16::from_le_bytes(buf[21..23].try_into().unwrap()) as usize;
    let name_start = FILE_HEAD_FIXED_LEN;
    let name_end = name_start + name_size;
    if buf.len() < name_end || header_size < name_end {
        return Err(RarError::Truncated(name_end as u64));
    }

    let filename = String::from_utf8_lossy(&buf[name_start..name_end]).into_owned();

    Ok(FileHeadBlock {
        flags: header.flags,
        packed_size,
        unpacked_size,
        method,
        filename,
        header_len: header_size,
        header_crc,
    })
}
