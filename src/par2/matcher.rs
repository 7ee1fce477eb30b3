//! Maps obfuscated downloaded filenames back to their real names using a
//! PAR2 file's 16 KiB-prefix MD5 hashes.
//!
//! Grounded on the teacher's `par2/matcher.rs` (`compute_hash16k`,
//! `find_file_by_hash16k`).

use std::collections::HashMap;

use md5::{Digest, Md5};

use super::packet::FileDescription;

const HASH16K_PREFIX: usize = 16 * 1024;

/// MD5 of the first 16 KiB of `data` (or all of it, if shorter).
pub fn compute_hash16k(data: &[u8]) -> [u8; 16] {
    let prefix = &data[..data.len().min(HASH16K_PREFIX)];
    let mut hasher = Md5::new();
    hasher.update(prefix);
    hasher.finalize().into()
}

/// Index of real filename by its declared 16 KiB hash, built once per
/// PAR2 sidecar file.
pub struct Par2Manifest {
    by_hash16k: HashMap<[u8; 16], FileDescription>,
}

impl Par2Manifest {
    pub fn from_descriptions(descriptions: Vec<FileDescription>) -> Self {
        let by_hash16k = descriptions
            .into_iter()
            .map(|desc| (desc.hash16k, desc))
            .collect();
        Self { by_hash16k }
    }

    pub fn find_by_prefix(&self, hash16k: &[u8; 16]) -> Option<&FileDescription> {
        self.by_hash16k.get(hash16k)
    }

    pub fn find_by_prefix_bytes(&self, data: &[u8]) -> Option<&FileDescription> {
        self.find_by_prefix(&compute_hash16k(data))
    }

    pub fn len(&self) -> usize {
        self.by_hash16k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash16k.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_only_the_leading_16kib() {
        let short = vec![7u8; 100];
        let long = {
            let mut v = vec![7u8; HASH16K_PREFIX];
            v.extend_from_slice(&[9u8; 5000]);
            v
        };
        // Same leading bytes, different tail: hash differs because the
        // short buffer is shorter than the prefix window.
        assert_ne!(compute_hash16k(&short), compute_hash16k(&long));

        let long_a = vec![7u8; HASH16K_PREFIX + 1000];
        let long_b = {
            let mut v = vec![7u8; HASH16K_PREFIX];
            v.extend_from_slice(&[0xFF; 1000]);
            v
        };
        assert_eq!(compute_hash16k(&long_a), compute_hash16k(&long_b));
    }

    #[test]
    fn manifest_resolves_real_filename_from_hash() {
        let data = vec![5u8; 2000];
        let hash = compute_hash16k(&data);
        let manifest = Par2Manifest::from_descriptions(vec![FileDescription {
            file_id: [0; 16],
            hash16k: hash,
            file_size: 2000,
            filename: "movie.part03.rar".to_string(),
        }]);

        let found = manifest.find_by_prefix_bytes(&data).unwrap();
        assert_eq!(found.filename, "movie.part03.rar");
    }
}
