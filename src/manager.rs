//! Orchestrates the three-phase pipeline: initialize (resolve real
//! filenames and rar-set order), verify (locate the media file, confirm
//! it's supported, and optionally gate on a bitrate cap before a single
//! byte is streamed), stream (fetch every segment in order, yEnc-decode,
//! and write the media file's bytes to disk via one continuous
//! cross-volume RAR scan).
//!
//! Grounded on `manager.py`'s `Manager` class, with the worker pool
//! supplied by [`crate::nntp::FetchPool`] instead of a module-level
//! thread pool.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nzb_rs::Nzb;

use crate::error::{Result, StreamError};
use crate::media::{bitrate, DurationProbe, MatroskaDurationProbe};
use crate::nntp::{FetchPool, NntpConnector};
use crate::par2::{parse_file_descriptions, Par2Manifest};
use crate::progress::{display_progress, finish_progress};
use crate::rar::{RarBlock, Scanner};
use crate::resolver::{self, Candidate};
use crate::sink::{is_media_extension, MediaFileSink};
use crate::yenc;

/// Segments below this much in the queue complete head-first often enough
/// to keep `get_segment` from blocking forever; see spec §5's "typical 2s"
/// per-call timeout.
const SEGMENT_POLL_TIMEOUT: Duration = Duration::from_secs(2);
const SEGMENT_MAX_WAIT: Duration = Duration::from_secs(600);

/// How many leading volumes the verify stage will pull while trying to
/// make the media probe compute a duration, before giving up on the
/// bitrate cap and letting the stream proceed unchecked.
const PROBE_VOLUME_CAP: usize = 6;

/// A recovery-slice PAR2 file (`name.volNN+NN.par2`) carries no
/// FILE_DESCRIPTION packets worth reading; only the main index does.
fn is_par2_recovery_slice(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    let Some(stem) = lower.strip_suffix(".par2") else {
        return false;
    };
    let Some((_, tail)) = stem.rsplit_once(".vol") else {
        return false;
    };
    !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit() || c == '+')
}

/// Only these suffixes are candidate rar-set members; PAR2 doesn't always
/// `keep`-flag sidecar files (nfo/sfv/sample), so they must be filtered
/// out before the resolver's component-count check ever sees them.
fn is_rar_set_member(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".rar") {
        return true;
    }
    match lower.rsplit('.').next() {
        Some(ext) if ext.len() == 3 => {
            let mut chars = ext.chars();
            match chars.next() {
                Some('r') => chars.as_str().chars().all(|c| c.is_ascii_digit()),
                Some(c) if c.is_ascii_digit() => ext.chars().all(|c| c.is_ascii_digit()),
                _ => false,
            }
        }
        _ => false,
    }
}

pub struct ManagerConfig {
    pub connections: u32,
    pub bandwidth_limit: Option<u64>,
    pub output: PathBuf,
}

pub struct Manager<C: NntpConnector> {
    nzb: Nzb,
    pool: Arc<FetchPool>,
    config: ManagerConfig,
    _connector: Arc<C>,
}

pub struct InitializedSet {
    pub resolved: resolver::ResolvedSet,
    pub segment_lists: Vec<Vec<nzb_rs::Segment>>,
}

pub struct VerifiedTarget {
    pub filename: String,
    pub declared_size: u64,
}

impl<C: NntpConnector + 'static> Manager<C> {
    pub fn new(nzb: Nzb, connector: Arc<C>, config: ManagerConfig) -> Self {
        let pool = FetchPool::new(config.bandwidth_limit);
        pool.spawn_workers(Arc::clone(&connector), config.connections as u64);
        Self {
            nzb,
            pool,
            config,
            _connector: connector,
        }
    }

    /// Fetch the first segment of every file in the NZB, recover real
    /// filenames via any PAR2 sidecar present, and resolve the rar
    /// volumes into stream order. Mirrors `Manager.initialize`.
    pub async fn initialize(&self) -> Result<InitializedSet> {
        let mut par2_manifest = None;
        let mut first_bytes: Vec<(String, Vec<u8>)> = Vec::new();
        let mut candidates = Vec::new();
        let mut per_candidate_segments = Vec::new();

        for file in &self.nzb.files {
            let filename = yenc::extract_filename(&file.subject);
            let Some(first_segment) = file.segments.first() else {
                continue;
            };

            let decoded = self.fetch_decoded(0, first_segment).await?;

            if filename.to_ascii_lowercase().ends_with(".par2") {
                if is_par2_recovery_slice(&filename) {
                    continue;
                }
                let descriptions = parse_file_descriptions(&decoded.data)?;
                par2_manifest = Some(Par2Manifest::from_descriptions(descriptions));
                continue;
            }

            if !is_rar_set_member(&filename) {
                continue;
            }

            let hash16k = crate::par2::compute_hash16k(&decoded.data);
            first_bytes.push((filename.clone(), decoded.data));
            candidates.push(Candidate {
                downloaded_name: filename,
                real_name: None,
                hash16k: Some(hash16k),
                keep: false,
            });
            per_candidate_segments.push(file.segments.clone());
        }

        if candidates.is_empty() {
            return Err(StreamError::NoRarArchives);
        }

        let contents: Vec<(&str, &[u8])> = first_bytes
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();

        let resolved = resolver::resolve(candidates, &contents, par2_manifest.as_ref())
            .map_err(|err| StreamError::OpenNzb(err.to_string()))?;

        // `resolve` reorders candidates; re-derive the matching segment
        // lists by downloaded name so the two stay aligned.
        let segment_lists = resolved
            .ordered
            .iter()
            .filter_map(|candidate| {
                let source_index = first_bytes
                    .iter()
                    .position(|(name, _)| name == &candidate.downloaded_name)?;
                per_candidate_segments.get(source_index).cloned()
            })
            .collect();

        Ok(InitializedSet {
            resolved,
            segment_lists,
        })
    }

    /// Walk the first volume's header to find the target file. With
    /// `enforce_media_type`, reject anything but a supported media
    /// extension (the normal verify stage); with it off (`-q`/
    /// `skip-verify`), take the first FILE block regardless of extension
    /// and skip the bitrate cap entirely. Mirrors `Manager.verify`.
    pub fn verify(&self, first_volume_buf: &[u8], enforce_media_type: bool) -> Result<VerifiedTarget> {
        let mut scanner = Scanner::new();
        while let Some(parsed) = scanner
            .next_block(first_volume_buf)
            .map_err(StreamError::from)?
        {
            match parsed.block {
                RarBlock::File(file) if !enforce_media_type || is_media_extension(&file.filename) => {
                    return Ok(VerifiedTarget {
                        filename: file.filename,
                        declared_size: file.unpacked_size,
                    });
                }
                RarBlock::EndArchive => break,
                _ => continue,
            }
        }
        Err(StreamError::InvalidMediaType(
            "no recognised media file found in the rar set".to_string(),
        ))
    }

    /// Pull leading volumes (beyond the one already fetched for
    /// [`Manager::verify`]) until the media probe can compute a bitrate,
    /// and reject before any sink is ever created if it exceeds
    /// `max_bitrate`. Returns the computed bitrate, if determined, so
    /// [`Manager::stream`] can throttle once it's known. Mirrors the
    /// verify stage's "continue pulling until the media probe can compute
    /// bitrate" behaviour.
    pub async fn probe_bitrate(
        &self,
        segment_lists: &[Vec<nzb_rs::Segment>],
        target_filename: &str,
        declared_size: u64,
        first_volume_buf: &[u8],
        max_bitrate: f64,
    ) -> Result<Option<f64>> {
        let mut scanner = Scanner::new();
        let mut buffer = first_volume_buf.to_vec();
        let mut seen_header_crcs = HashSet::new();
        let mut probe_bytes = Vec::new();

        for chunk in drain_target_chunks(&mut scanner, &mut buffer, target_filename, &mut seen_header_crcs)? {
            probe_bytes.extend_from_slice(&chunk);
        }

        if let Some(bps) = try_compute_bitrate(&probe_bytes, declared_size).await? {
            check_bitrate_cap(bps, max_bitrate)?;
            return Ok(Some(bps));
        }

        let mut fetch_order = 1u64;
        for segments in segment_lists.iter().skip(1).take(PROBE_VOLUME_CAP.saturating_sub(1)) {
            for segment in segments {
                let decoded = self.fetch_decoded(fetch_order, segment).await?;
                fetch_order += 1;
                buffer.extend_from_slice(&decoded.data);
            }

            for chunk in drain_target_chunks(&mut scanner, &mut buffer, target_filename, &mut seen_header_crcs)? {
                probe_bytes.extend_from_slice(&chunk);
            }

            if let Some(bps) = try_compute_bitrate(&probe_bytes, declared_size).await? {
                check_bitrate_cap(bps, max_bitrate)?;
                return Ok(Some(bps));
            }
        }

        tracing::warn!(
            "could not determine media duration within the first {PROBE_VOLUME_CAP} volumes; \
             proceeding without enforcing the bitrate cap"
        );
        Ok(None)
    }

    /// Fetch and yEnc-decode every segment of a single volume, in order,
    /// concatenating them into one buffer. Used to pull down the first
    /// volume ahead of [`Manager::verify`].
    pub async fn fetch_volume(&self, segments: &[nzb_rs::Segment]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for (order, segment) in segments.iter().enumerate() {
            let decoded = self.fetch_decoded(order as u64, segment).await?;
            buf.extend_from_slice(&decoded.data);
        }
        Ok(buf)
    }

    /// Fetch every remaining segment of every volume, in rar-set order,
    /// feeding one continuous incremental RAR scanner so headers that
    /// straddle volume boundaries and cross-volume file spans are handled
    /// exactly like a single-volume archive would be. `seed`, if given,
    /// is the already-decoded bytes of the first volume (fetched earlier
    /// for [`Manager::verify`]/[`Manager::probe_bitrate`]) so it isn't
    /// fetched twice. Mirrors `Manager.stream`.
    pub async fn stream(
        &self,
        segment_lists: &[Vec<nzb_rs::Segment>],
        target_filename: &str,
        declared_size: u64,
        seed: Option<Vec<u8>>,
        known_bitrate: Option<f64>,
        sink: &mut MediaFileSink,
    ) -> Result<()> {
        if let Some(bps) = known_bitrate {
            self.pool.set_throttle(Some((bps * 2.0 / 8.0) as u64));
        }

        let mut scanner = Scanner::new();
        let mut buffer = Vec::new();
        let mut seen_header_crcs = HashSet::new();
        let mut cumulative_written: u64 = 0;
        let mut fetch_order = 1u64;
        let mut seed = seed;

        for (volume_idx, segments) in segment_lists.iter().enumerate() {
            if volume_idx == 0 {
                if let Some(seed_bytes) = seed.take() {
                    buffer.extend_from_slice(&seed_bytes);
                    fetch_order += segments.len() as u64;
                    for chunk in
                        drain_target_chunks(&mut scanner, &mut buffer, target_filename, &mut seen_header_crcs)?
                    {
                        cumulative_written += chunk.len() as u64;
                        sink.write_chunk(&chunk).await?;
                    }
                    display_progress(sink.progress(), self.pool.get_speed(), false);
                    continue;
                }
            }

            for segment in segments {
                let decoded = self.fetch_decoded(fetch_order, segment).await?;
                fetch_order += 1;
                buffer.extend_from_slice(&decoded.data);

                for chunk in
                    drain_target_chunks(&mut scanner, &mut buffer, target_filename, &mut seen_header_crcs)?
                {
                    cumulative_written += chunk.len() as u64;
                    sink.write_chunk(&chunk).await?;
                }

                display_progress(sink.progress(), self.pool.get_speed(), false);
            }

            if cumulative_written >= declared_size {
                break;
            }
        }

        finish_progress(false);

        if cumulative_written < declared_size {
            return Err(StreamError::SegmentMissing(fetch_order));
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.pool.quit(self.config.connections as u64).await;
    }

    pub fn nzb(&self) -> &Nzb {
        &self.nzb
    }

    /// Enqueue `segment` at `order` and wait for its decoded bytes,
    /// retrying the bounded-timeout `get_segment` poll until the pool's
    /// overall patience (`SEGMENT_MAX_WAIT`) runs out. A 430 (article
    /// gone) surfaces immediately rather than after the full wait, since
    /// it's fatal for the whole pipeline.
    async fn fetch_decoded(&self, order: u64, segment: &nzb_rs::Segment) -> Result<yenc::DecodedArticle> {
        self.pool.add_segment(order, segment.message_id.clone()).await;

        let deadline = Instant::now() + SEGMENT_MAX_WAIT;
        let raw = loop {
            match self.pool.get_segment(&segment.message_id, SEGMENT_POLL_TIMEOUT).await? {
                Some(bytes) => break bytes,
                None => {
                    if Instant::now() >= deadline {
                        return Err(StreamError::SegmentMissing(order));
                    }
                }
            }
        };

        let lines = split_lines(&raw);
        Ok(yenc::decode(&lines)?)
    }
}

/// Drain every complete block currently available in `buffer`, returning
/// the target file's payload chunks found along the way (deduplicated by
/// `header_crc`), then compact `buffer`/`scanner` down to the unconsumed
/// remainder.
fn drain_target_chunks(
    scanner: &mut Scanner,
    buffer: &mut Vec<u8>,
    target_filename: &str,
    seen_header_crcs: &mut HashSet<u16>,
) -> Result<Vec<Vec<u8>>> {
    let mut chunks = Vec::new();
    while let Some(parsed) = scanner.next_block(buffer).map_err(StreamError::from)? {
        if let RarBlock::File(file) = &parsed.block {
            if file.filename == target_filename && seen_header_crcs.insert(file.header_crc) {
                chunks.push(buffer[parsed.data_offset..parsed.next_offset].to_vec());
            }
        }
    }

    let consumed = scanner.offset();
    if consumed > 0 {
        buffer.drain(..consumed);
        scanner.rebase(consumed);
    }

    Ok(chunks)
}

/// Write `probe_bytes` to a scratch temp file and attempt to compute a
/// bitrate from a duration probe over it. Returns `None` when the probe
/// can't yet determine a duration from the bytes gathered so far.
async fn try_compute_bitrate(probe_bytes: &[u8], declared_size: u64) -> Result<Option<f64>> {
    if probe_bytes.is_empty() {
        return Ok(None);
    }

    let mut tmp = tempfile::NamedTempFile::new().map_err(StreamError::Io)?;
    {
        use std::io::Write;
        tmp.write_all(probe_bytes).map_err(StreamError::Io)?;
        tmp.flush().map_err(StreamError::Io)?;
    }

    let probe = MatroskaDurationProbe;
    match probe.duration_seconds(tmp.path()) {
        Ok(duration) if duration > 0.0 => Ok(Some(bitrate(declared_size, duration))),
        _ => Ok(None),
    }
}

fn check_bitrate_cap(actual: f64, max: f64) -> Result<()> {
    if actual > max {
        return Err(StreamError::BitrateExceeded { actual, max });
    }
    Ok(())
}

fn split_lines(raw: &[u8]) -> Vec<&[u8]> {
    raw.split_inclusive(|&b| b == b'\n').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_rar_set_suffixes() {
        assert!(is_rar_set_member("movie.rar"));
        assert!(is_rar_set_member("movie.r00"));
        assert!(is_rar_set_member("movie.001"));
        assert!(!is_rar_set_member("movie.nfo"));
        assert!(!is_rar_set_member("movie.sfv"));
    }

    #[test]
    fn recognises_par2_recovery_slices() {
        assert!(is_par2_recovery_slice("movie.vol00+01.par2"));
        assert!(is_par2_recovery_slice("movie.vol12+34.par2"));
        assert!(!is_par2_recovery_slice("movie.par2"));
    }
}
