//! Bitrate verification for the written media file.
//!
//! Grounded on `mediafile.py::get_bitrate` (file_size * 8 / duration),
//! with duration sourced from the container's own metadata rather than
//! the Python original's external `ffprobe` shell-out, since the crate
//! already pulls in `matroska` for MKV parsing.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("could not read container metadata for '{0}'")]
    Probe(String),

    #[error("container reports zero duration")]
    ZeroDuration,
}

/// Something that can report a container's playback duration, so the
/// verify stage can compute `file_size * 8 / duration` without coupling
/// to one container format.
pub trait DurationProbe {
    fn duration_seconds(&self, path: &Path) -> Result<f64, MediaError>;
}

pub struct MatroskaDurationProbe;

impl DurationProbe for MatroskaDurationProbe {
    fn duration_seconds(&self, path: &Path) -> Result<f64, MediaError> {
        let file = std::fs::File::open(path)
            .map_err(|_| MediaError::Probe(path.display().to_string()))?;
        let matroska = matroska::Matroska::open(file)
            .map_err(|_| MediaError::Probe(path.display().to_string()))?;
        let duration = matroska
            .info
            .duration
            .ok_or(MediaError::ZeroDuration)?
            .as_secs_f64();
        if duration <= 0.0 {
            return Err(MediaError::ZeroDuration);
        }
        Ok(duration)
    }
}

/// Bits-per-second implied by `file_size` over `duration_seconds`.
/// Mirrors `mediafile.py::get_bitrate`.
pub fn bitrate(file_size: u64, duration_seconds: f64) -> f64 {
    file_size as f64 * 8.0 / duration_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_bits_per_second() {
        let bps = bitrate(125_000, 10.0);
        assert_eq!(bps, 100_000.0);
    }

    struct FixedProbe(f64);
    impl DurationProbe for FixedProbe {
        fn duration_seconds(&self, _path: &Path) -> Result<f64, MediaError> {
            Ok(self.0)
        }
    }

    #[test]
    fn trait_object_is_usable_with_a_fixed_duration() {
        let probe: Box<dyn DurationProbe> = Box::new(FixedProbe(60.0));
        let duration = probe.duration_seconds(Path::new("ignored.mkv")).unwrap();
        assert_eq!(bitrate(7_500_000, duration), 1_000_000.0);
    }
}
