//! Resolves a set of obfuscated, randomly-named RAR volumes into their
//! correct download/read order.
//!
//! Grounded on `rarset.py`'s `RarSet`: sort candidate filenames by a
//! natural key (so `part2` sorts before `part10`), derive the set's
//! common base name from the longest shared dotted-prefix of the first
//! two sorted names, validate each name's dotted-component count against
//! that base, and promote a lone `.rar` volume (no `.partNN` suffix) to
//! the front when the PAR2 sidecar confirms it's the only archive
//! present.

use thiserror::Error;

use crate::par2::Par2Manifest;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolverError {
    #[error("no candidate rar volumes were supplied")]
    Empty,

    #[error("could not derive a common base name from the candidate set")]
    NoCommonBaseName,

    #[error("'{0}' does not belong to this rar set: component count mismatch")]
    NameMismatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Name as delivered over NNTP (often an obfuscated subject token).
    pub downloaded_name: String,
    /// Real name recovered from the PAR2 sidecar, if any.
    pub real_name: Option<String>,
    pub hash16k: Option<[u8; 16]>,
    /// PAR2 marks a file with the `keep` flag when its name is already
    /// meaningful and shouldn't be forced through the dotted-component
    /// check (mirrors `_check_name`'s exception).
    pub keep: bool,
}

impl Candidate {
    fn resolved_name(&self) -> &str {
        self.real_name.as_deref().unwrap_or(&self.downloaded_name)
    }
}

/// Split a filename into alternating non-digit/digit runs so that
/// `"part2"` sorts before `"part10"`. Mirrors the natural sort key used
/// to order `.partNN.rar`/`.rNN` volumes.
fn natural_key(name: &str) -> Vec<(String, u64)> {
    let mut key = Vec::new();
    let mut chars = name.chars().peekable();
    loop {
        let mut alpha = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                break;
            }
            alpha.push(c);
            chars.next();
        }
        let mut digits = String::new();
        while let Some(&c) = chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            chars.next();
        }
        if alpha.is_empty() && digits.is_empty() {
            break;
        }
        let num = digits.parse().unwrap_or(0);
        key.push((alpha, num));
    }
    key
}

/// Longest common dotted-component prefix shared by two filenames, e.g.
/// `movie.2020.part01.rar` and `movie.2020.part02.rar` share
/// `movie.2020`.
fn common_base_name(a: &str, b: &str) -> Option<String> {
    let a_parts: Vec<&str> = a.split('.').collect();
    let b_parts: Vec<&str> = b.split('.').collect();

    let shared = a_parts
        .iter()
        .zip(b_parts.iter())
        .take_while(|(x, y)| x == y)
        .count();

    if shared == 0 {
        None
    } else {
        Some(a_parts[..shared].join("."))
    }
}

fn dotted_component_count(name: &str) -> usize {
    name.split('.').count()
}

/// Whether `name` carries a rar-set suffix (`.rar`, `.rNN`, `.NNN`).
/// Sidecar files PAR2 didn't `keep`-flag (nfo/sfv/sample clips) fall
/// outside this and must never reach the component-count check below.
fn is_rar_set_suffix(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
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

pub struct ResolvedSet {
    pub base_name: String,
    pub ordered: Vec<Candidate>,
}

/// Order candidate RAR volumes for streaming, consulting `par2` to
/// recover real filenames where the downloaded names are obfuscated.
pub fn resolve(
    mut candidates: Vec<Candidate>,
    contents: &[(&str, &[u8])],
    par2: Option<&Par2Manifest>,
) -> Result<ResolvedSet, ResolverError> {
    if candidates.is_empty() {
        return Err(ResolverError::Empty);
    }

    if let Some(manifest) = par2 {
        for candidate in &mut candidates {
            if candidate.real_name.is_some() {
                continue;
            }
            let data = contents
                .iter()
                .find(|(name, _)| *name == candidate.downloaded_name)
                .map(|(_, data)| *data);
            if let Some(data) = data {
                if let Some(desc) = manifest.find_by_prefix_bytes(data) {
                    candidate.real_name = Some(desc.filename.clone());
                    candidate.hash16k = Some(desc.hash16k);
                }
            }
        }
    }

    // Drop sidecar files (nfo/sfv/sample clips) that PAR2 didn't
    // `keep`-flag and that don't look like a rar-set member; letting them
    // through would otherwise blow up the component-count check below.
    candidates.retain(|c| c.keep || is_rar_set_suffix(c.resolved_name()));
    if candidates.is_empty() {
        return Err(ResolverError::Empty);
    }

    candidates.sort_by_key(|c| natural_key(c.resolved_name()));

    // Single-volume sets have no `.partNN` suffix to validate against;
    // a lone `.rar` is, by definition, already first.
    if candidates.len() == 1 {
        let base_name = candidates[0].resolved_name().to_string();
        return Ok(ResolvedSet {
            base_name,
            ordered: candidates,
        });
    }

    let base_name = common_base_name(candidates[0].resolved_name(), candidates[1].resolved_name())
        .ok_or(ResolverError::NoCommonBaseName)?;
    let expected_components = dotted_component_count(&base_name) + 1;

    for candidate in &candidates {
        if candidate.keep {
            continue;
        }
        let actual = dotted_component_count(candidate.resolved_name());
        if actual != expected_components {
            return Err(ResolverError::NameMismatch(
                candidate.resolved_name().to_string(),
            ));
        }
    }

    // A single bare `.rar` (no `.partNN` marker) amid otherwise-numbered
    // volumes is the main archive header and must stream first even if
    // its natural-sort position landed elsewhere.
    if let Some(main_idx) = candidates.iter().position(|c| {
        let name = c.resolved_name();
        name.ends_with(".rar") && !name.to_ascii_lowercase().contains(".part")
    }) {
        let main = candidates.remove(main_idx);
        candidates.insert(0, main);
    }

    Ok(ResolvedSet {
        base_name,
        ordered: candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate(name: &str) -> Candidate {
        Candidate {
            downloaded_name: name.to_string(),
            real_name: None,
            hash16k: None,
            keep: false,
        }
    }

    #[test]
    fn orders_double_digit_parts_after_single_digit() {
        let candidates = vec![
            candidate("movie.part10.rar"),
            candidate("movie.part2.rar"),
            candidate("movie.part1.rar"),
        ];
        let resolved = resolve(candidates, &[], None).unwrap();
        let names: Vec<_> = resolved.ordered.iter().map(|c| c.resolved_name()).collect();
        assert_eq!(names, vec!["movie.part1.rar", "movie.part2.rar", "movie.part10.rar"]);
    }

    #[test]
    fn derives_common_base_name_from_first_two_candidates() {
        let candidates = vec![candidate("show.s01e02.part1.rar"), candidate("show.s01e02.part2.rar")];
        let resolved = resolve(candidates, &[], None).unwrap();
        assert_eq!(resolved.base_name, "show.s01e02");
    }

    #[test]
    fn rejects_a_name_outside_the_set() {
        let candidates = vec![
            candidate("show.s01e02.part1.rar"),
            candidate("show.s01e02.part2.rar"),
            candidate("unrelated.extra.junk.rar"),
        ];
        assert!(matches!(
            resolve(candidates, &[], None),
            Err(ResolverError::NameMismatch(_))
        ));
    }

    #[test]
    fn non_rar_sidecar_without_keep_flag_is_dropped_silently() {
        let candidates = vec![
            candidate("show.part1.rar"),
            candidate("show.part2.rar"),
            candidate("show.nfo"),
            candidate("show.sfv"),
        ];
        let resolved = resolve(candidates, &[], None).unwrap();
        let names: Vec<_> = resolved.ordered.iter().map(|c| c.resolved_name()).collect();
        assert_eq!(names, vec!["show.part1.rar", "show.part2.rar"]);
    }

    #[test]
    fn keep_flagged_file_skips_component_check() {
        let mut odd = candidate("README.nfo");
        odd.keep = true;
        let candidates = vec![candidate("show.part1.rar"), candidate("show.part2.rar"), odd];
        let resolved = resolve(candidates, &[], None).unwrap();
        assert_eq!(resolved.ordered.len(), 3);
    }

    #[test]
    fn single_volume_set_has_no_ordering_ambiguity() {
        let candidates = vec![candidate("standalone.rar")];
        let resolved = resolve(candidates, &[], None).unwrap();
        assert_eq!(resolved.ordered.len(), 1);
        assert_eq!(resolved.base_name, "standalone.rar");
    }

    #[test]
    fn resolves_real_names_from_par2_manifest_before_sorting() {
        use crate::par2::packet::FileDescription;

        let data_a = vec![1u8; 500];
        let data_b = vec![2u8; 500];
        let manifest = Par2Manifest::from_descriptions(vec![
            FileDescription {
                file_id: [0; 16],
                hash16k: crate::par2::compute_hash16k(&data_a),
                file_size: 500,
                filename: "movie.part1.rar".to_string(),
            },
            FileDescription {
                file_id: [0; 16],
                hash16k: crate::par2::compute_hash16k(&data_b),
                file_size: 500,
                filename: "movie.part2.rar".to_string(),
            },
        ]);

        let candidates = vec![candidate("xqz81ab.bin"), candidate("mjk22cd.bin")];
        let contents: Vec<(&str, &[u8])> = vec![("xqz81ab.bin", &data_b), ("mjk22cd.bin", &data_a)];

        let resolved = resolve(candidates, &contents, Some(&manifest)).unwrap();
        let names: Vec<_> = resolved.ordered.iter().map(|c| c.resolved_name()).collect();
        assert_eq!(names, vec!["movie.part1.rar", "movie.part2.rar"]);
    }
}
