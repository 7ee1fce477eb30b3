//! yEnc article decoding.
//!
//! Grounded on the original `nzbstream.nntp` module's `yCheck`/`decode`
//! for the header/trailer line scan, and on the teacher crate's
//! `nntp/yenc.rs` filename extraction helper and `nntp/simple.rs`, which
//! hands the escaped payload to the real `yenc` crate
//! (`yenc::decode_buffer`) rather than reversing the byte transform by
//! hand; this module does the same, keeping only the header/trailer
//! field scanning the `yenc` crate doesn't do.

pub mod error;

use std::collections::HashMap;

pub use error::YencError;

const HEAD_SCAN_LINES: usize = 40;
const TAIL_SCAN_LINES: usize = 10;

/// Parsed `=ybegin`/`=ypart`/`=yend` key=value fields.
pub type YencFields = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct DecodedArticle {
    pub filename: String,
    pub data: Vec<u8>,
    pub crc_ok: bool,
}

/// Decode a single yEnc-encoded NNTP article body.
///
/// `lines` is the article body split on line boundaries, trailing `\r\n`
/// still attached or not (both are tolerated). Returns `MalformedArticle`
/// if neither a `=ybegin` header nor a `=yend` trailer line can be found.
/// On CRC mismatch the article is still returned (recoverable: higher
/// layers rely on the RAR stream and PAR2 hashes to catch real corruption).
pub fn decode(lines: &[&[u8]]) -> Result<DecodedArticle, YencError> {
    let (ybegin, ypart, body_start) = find_header(lines)?;
    let (yend, body_end) = find_trailer(lines)?;

    if body_start > body_end {
        return Err(YencError::MalformedArticle);
    }

    let filename = ybegin
        .get("name")
        .map(|n| name_fixer(n))
        .unwrap_or_default();

    let mut escaped = Vec::new();
    for line in &lines[body_start..body_end] {
        escaped.extend_from_slice(trim_eol(line));
    }
    let data = yenc::decode_buffer(&escaped).map_err(|_| YencError::MalformedArticle)?;

    let crc = crc32fast::hash(&data);
    let crc_field = if ypart.is_some() { "pcrc32" } else { "crc32" };
    let expected = yend
        .get(crc_field)
        .and_then(|s| u32::from_str_radix(s, 16).ok());

    let crc_ok = match expected {
        Some(expected) => {
            if expected != crc {
                tracing::error!(
                    "CRC error decoding article {}: expected {expected:08X}, got {crc:08X}",
                    filename
                );
            }
            expected == crc
        }
        None => {
            tracing::error!("corrupt yEnc trailer for {filename}: missing {crc_field}");
            false
        }
    };

    Ok(DecodedArticle {
        filename,
        data,
        crc_ok,
    })
}

/// Extract the quoted filename out of an NZB subject line, e.g.
/// `"some group" presents "movie.rar" (1/50) yEnc`. Falls back to the
/// first whitespace-delimited token when no quoted segment is present.
/// Grounded on `manager.py::get_filename`.
pub fn extract_filename(subject: &str) -> String {
    if let Some(start) = subject.find('"') {
        if let Some(end) = subject[start + 1..].find('"') {
            return subject[start + 1..start + 1 + end].to_string();
        }
    }
    subject
        .split_whitespace()
        .next()
        .unwrap_or(subject)
        .to_string()
}

/// Render a byte rate as `"12.3 Kbps"`-style text. Grounded on
/// `nntp.py::sizeof_fmt`.
pub fn sizeof_fmt(bytes_per_sec: f64) -> String {
    let mut bits = bytes_per_sec * 8.0;
    for unit in ["bps", "Kbps", "Mbps", "Gbps", "Tbps"] {
        if bits < 1024.0 {
            return format!("{bits:.1} {unit}");
        }
        bits /= 1024.0;
    }
    format!("{bits:.1} Tbps")
}

fn find_header(lines: &[&[u8]]) -> Result<(YencFields, Option<YencFields>, usize), YencError> {
    let scan = lines.len().min(HEAD_SCAN_LINES);
    for i in 0..scan {
        if lines[i].starts_with(b"=ybegin ") {
            let ybegin = split_fields(lines[i]);
            if i + 1 < lines.len() && lines[i + 1].starts_with(b"=ypart ") {
                let ypart = split_fields(lines[i + 1]);
                return Ok((ybegin, Some(ypart), i + 2));
            }
            return Ok((ybegin, None, i + 1));
        }
    }
    Err(YencError::MalformedArticle)
}

fn find_trailer(lines: &[&[u8]]) -> Result<(YencFields, usize), YencError> {
    let scan = lines.len().min(TAIL_SCAN_LINES);
    for i in 0..scan {
        let idx = lines.len() - 1 - i;
        if lines[idx].starts_with(b"=yend ") {
            return Ok((split_fields(lines[idx]), idx));
        }
    }
    Err(YencError::MalformedArticle)
}

fn split_fields(line: &[u8]) -> YencFields {
    let line = String::from_utf8_lossy(line);
    let mut fields = HashMap::new();
    // Skip the leading "=ybegin"/"=ypart"/"=yend" token.
    for token in line.split_whitespace().skip(1) {
        if let Some((key, value)) = token.split_once('=') {
            fields.insert(key.to_string(), value.to_string());
        }
    }
    fields
}

fn trim_eol(line: &[u8]) -> &[u8] {
    match line {
        [.., b'\r', b'\n'] => &line[..line.len() - 2],
        [.., b'\n'] => &line[..line.len() - 1],
        _ => line,
    }
}

/// Normalise a yEnc header filename (Latin-1 on the wire) to UTF-8,
/// replacing any resulting `?` with `_`. Grounded on `nntp.py::name_fixer`.
fn name_fixer(raw: &str) -> String {
    raw.chars().map(|c| if c == '?' { '_' } else { c }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEST_SHIFT: u8 = 42;
    const TEST_ESCAPE_SHIFT: u8 = 64;

    fn encode_line(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &b in data {
            let enc = b.wrapping_add(TEST_SHIFT);
            if matches!(enc, b'=' | b'\0' | b'\n' | b'\r' | b'\t' | b'.') {
                out.push(b'=');
                out.push(enc.wrapping_add(TEST_ESCAPE_SHIFT));
            } else {
                out.push(enc);
            }
        }
        out
    }

    #[test]
    fn round_trips_a_single_part_article() {
        let payload = b"the quick brown fox jumps over the lazy dog";
        let crc = crc32fast::hash(payload);
        let encoded_line = encode_line(payload);

        let header = b"=ybegin line=128 size=44 name=movie.rar".to_vec();
        let trailer = format!("=yend size=44 crc32={crc:08x}").into_bytes();

        let lines: Vec<&[u8]> = vec![&header, &encoded_line, &trailer];
        let decoded = decode(&lines).unwrap();

        assert_eq!(decoded.data, payload);
        assert_eq!(decoded.filename, "movie.rar");
        assert!(decoded.crc_ok);
    }

    #[test]
    fn multipart_uses_pcrc32() {
        let payload = b"segment payload bytes";
        let crc = crc32fast::hash(payload);
        let encoded_line = encode_line(payload);

        let header = b"=ybegin part=2 total=3 line=128 size=100 name=movie.rar".to_vec();
        let part = b"=ypart begin=21 end=42".to_vec();
        let trailer = format!("=yend size=21 part=2 pcrc32={crc:08x}").into_bytes();

        let lines: Vec<&[u8]> = vec![&header, &part, &encoded_line, &trailer];
        let decoded = decode(&lines).unwrap();

        assert_eq!(decoded.data, payload);
        assert!(decoded.crc_ok);
    }

    #[test]
    fn crc_mismatch_is_recoverable() {
        let payload = b"data";
        let encoded_line = encode_line(payload);
        let header = b"=ybegin line=128 size=4 name=x.rar".to_vec();
        let trailer = b"=yend size=4 crc32=deadbeef".to_vec();

        let lines: Vec<&[u8]> = vec![&header, &encoded_line, &trailer];
        let decoded = decode(&lines).unwrap();

        assert_eq!(decoded.data, payload);
        assert!(!decoded.crc_ok);
    }

    #[test]
    fn missing_header_is_malformed() {
        let lines: Vec<&[u8]> = vec![b"just some text", b"=yend size=0 crc32=00000000"];
        assert!(matches!(decode(&lines), Err(YencError::MalformedArticle)));
    }

    #[test]
    fn extracts_quoted_filename_from_subject() {
        assert_eq!(
            extract_filename(r#"[1/50] "movie.rar" yEnc (1/100)"#),
            "movie.rar"
        );
        assert_eq!(extract_filename("no-quotes-here"), "no-quotes-here");
    }

    #[test]
    fn formats_human_readable_rate() {
        assert_eq!(sizeof_fmt(125.0), "1000.0 bps");
        assert!(sizeof_fmt(1_000_000.0).ends_with("Mbps"));
    }
}
