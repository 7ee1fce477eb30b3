//! PAR2 packet framing and `FILE_DESCRIPTION` extraction.
//!
//! Grounded on the teacher's `src/par2/parser.rs` (`scan_for_packets`,
//! `parse_packet`, `parse_file_packet`): a fixed 64-byte packet header
//! (magic, length, packet MD5, recovery-set ID, packet-type ID) parsed
//! with `nom`, followed by a type-specific body whose little-endian
//! fields are read with `byteorder`. Only `PAR 2.0\0FileDesc` packets are
//! decoded into logical data; `IFSC` slice-checksum packets are
//! recognised and skipped since no repair is ever performed.

use byteorder::{ByteOrder, LittleEndian};
use nom::bytes::complete::{tag, take};
use nom::number::complete::le_u64;
use nom::IResult;

use super::error::Par2Error;

const PAR_PKT_ID: &[u8; 8] = b"PAR2\x00PKT";
const PAR_FILE_ID: &[u8; 16] = b"PAR 2.0\x00FileDesc";
const HEADER_LEN: usize = 8 + 8 + 16 + 16 + 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescription {
    pub file_id: [u8; 16],
    pub hash16k: [u8; 16],
    pub file_size: u64,
    pub filename: String,
}

fn packet_header(input: &[u8]) -> IResult<&[u8], (u64, &[u8])> {
    let (input, _magic) = tag(PAR_PKT_ID.as_slice())(input)?;
    let (input, length) = le_u64(input)?;
    let (input, _packet_md5) = take(16usize)(input)?;
    let (input, _recovery_set_id) = take(16usize)(input)?;
    let (input, type_id) = take(16usize)(input)?;
    Ok((input, (length, type_id)))
}

/// Walk a PAR2 file's packets and return every `FILE_DESCRIPTION` found.
pub fn parse_file_descriptions(mut buf: &[u8]) -> Result<Vec<FileDescription>, Par2Error> {
    let mut offset = 0usize;
    let mut out = Vec::new();

    while buf.len() >= HEADER_LEN {
        if &buf[..8] != PAR_PKT_ID.as_slice() {
            return Err(Par2Error::BadMagic(offset));
        }

        let (rest, (length, type_id)) =
            packet_header(buf).map_err(|_| Par2Error::Truncated(offset))?;

        if length % 4 != 0 || length < HEADER_LEN as u64 {
            return Err(Par2Error::UnalignedLength(length));
        }

        let body_len = (length as usize)
            .checked_sub(HEADER_LEN)
            .ok_or(Par2Error::UnalignedLength(length))?;
        if rest.len() < body_len {
            return Err(Par2Error::Truncated(offset + HEADER_LEN));
        }
        let body = &rest[..body_len];

        if type_id == PAR_FILE_ID.as_slice() {
            out.push(parse_file_description(body, offset + HEADER_LEN)?);
        }

        offset += length as usize;
        buf = &rest[body_len..];
    }

    Ok(out)
}

fn parse_file_description(body: &[u8], offset: usize) -> Result<FileDescription, Par2Error> {
    if body.len() < 16 + 16 + 16 + 8 {
        return Err(Par2Error::Truncated(offset));
    }

    let file_id: [u8; 16] = body[0..16].try_into().unwrap();
    // body[16..32] is the full-file MD5, unused since no repair is performed.
    let hash16k: [u8; 16] = body[32..48].try_into().unwrap();
    let file_size = LittleEndian::read_u64(&body[48..56]);

    let filename = body[56..]
        .split(|&b| b == 0)
        .next()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .filter(|name| !name.is_empty())
        .ok_or(Par2Error::MissingFilename)?;

    Ok(FileDescription {
        file_id,
        hash16k,
        file_size,
        filename,
    })
}
