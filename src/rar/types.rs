//! RAR 4.x block constants and the incremental header cursor.
//!
//! Grounded on the teacher's `archive/rar.rs` constants and `RarExt`
//! volume-ordering type.

use std::cmp::Ordering;

pub const RAR_SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];

pub const RAR_MARK_HEAD: u8 = 0x72;
pub const RAR_MAIN_HEAD: u8 = 0x73;
pub const RAR_FILE_HEAD: u8 = 0x74;
pub const RAR_ENDARC_HEAD: u8 = 0x7B;

/// SUB_HEAD, RECOVERY_HEAD and AV_HEAD all carry file-like payloads this
/// crate has no use for; recognised only so `Scanner` skips them by
/// `header_size` instead of erroring on an unknown block type.
pub const RAR_SUB_RECOVERY_AUTH: std::ops::RangeInclusive<u8> = 0x77..=0x7a;

/// Method byte 0x30 is "store" (no compression); anything else means the
/// archive was compressed, which this crate never reads.
pub const METHOD_STORE: u8 = 0x30;

/// Bit 0x04 on a FILE_HEAD's flags marks the file as encrypted (password
/// protected), which this crate refuses to stream.
pub const FILE_FLAG_PASSWORD: u16 = 0x0004;
/// Bit 0x01 marks a file spanning into the next volume (continues after
/// this block's data).
pub const FILE_FLAG_SPLIT_AFTER: u16 = 0x0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlockHeader {
    pub crc: u16,
    pub block_type: u8,
    pub flags: u16,
    pub header_size: u16,
}

pub const BLOCK_HEADER_LEN: usize = 7;

impl RawBlockHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < BLOCK_HEADER_LEN {
            return None;
        }
        Some(Self {
            crc: u16::from_le_bytes([buf[0], buf[1]]),
            block_type: buf[2],
            flags: u16::from_le_bytes([buf[3], buf[4]]),
            header_size: u16::from_le_bytes([buf[5], buf[6]]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeadBlock {
    pub flags: u16,
    /// Payload length carried by *this* volume (RAR's ADD_SIZE); for a
    /// file split across volumes this is only a slice of `unpacked_size`.
    pub packed_size: u64,
    /// Total uncompressed size of the logical file, repeated identically
    /// in every volume's header for a split file.
    pub unpacked_size: u64,
    pub method: u8,
    pub filename: String,
    /// Total bytes consumed by this header (fixed fields + filename),
    /// i.e. where the file's packed data begins relative to the block.
    pub header_len: usize,
    /// HEAD_CRC of the raw block header; two FILE headers for the same
    /// logical file with the same `header_crc` are the same header seen
    /// twice (volumes can overlap at headers but not payload).
    pub header_crc: u16,
}

/// Volume ordering key: the main-archive volume (no number suffix) always
/// sorts first, then numbered volumes sort numerically. Mirrors the
/// teacher's `RarExt` `Ord` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKey {
    Main,
    Part(u32),
}

impl Ord for VolumeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (VolumeKey::Main, VolumeKey::Main) => Ordering::Equal,
            (VolumeKey::Main, VolumeKey::Part(_)) => Ordering::Less,
            (VolumeKey::Part(_), VolumeKey::Main) => Ordering::Greater,
            (VolumeKey::Part(a), VolumeKey::Part(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for VolumeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pull the trailing volume number out of a name like `movie.part03.rar`
/// or `movie.r03`. Returns `None` for a bare `movie.rar` (the main/first
/// volume).
pub fn extract_volume_number(filename: &str) -> VolumeKey {
    let lower = filename.to_ascii_lowercase();

    if let Some(part) = lower.strip_suffix(".rar").and_then(|s| {
        s.rsplit_once(".part").map(|(_, n)| n)
    }) {
        if let Ok(n) = part.parse::<u32>() {
            return VolumeKey::Part(n);
        }
    }

    if lower.ends_with(".rar") {
        return VolumeKey::Main;
    }

    // classic .rNN / .sNN style extensions
    if let Some(ext) = lower.rsplit('.').next() {
        if ext.len() == 3 && ext.starts_with('r') {
            if let Ok(n) = ext[1..].parse::<u32>() {
                return VolumeKey::Part(n + 1);
            }
        }
    }

    VolumeKey::Main
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_volume_sorts_before_numbered_parts() {
        let mut keys = vec![VolumeKey::Part(2), VolumeKey::Main, VolumeKey::Part(1)];
        keys.sort();
        assert_eq!(keys, vec![VolumeKey::Main, VolumeKey::Part(1), VolumeKey::Part(2)]);
    }

    #[test]
    fn extracts_part_numbers() {
        assert_eq!(extract_volume_number("movie.part01.rar"), VolumeKey::Part(1));
        assert_eq!(extract_volume_number("movie.part12.rar"), VolumeKey::Part(12));
        assert_eq!(extract_volume_number("movie.rar"), VolumeKey::Main);
        assert_eq!(extract_volume_number("movie.r00"), VolumeKey::Part(1));
    }
}
