//! Navigation target resolution.
//!
//! Turns a citation into a local file to open. Candidate paths are tried in
//! priority order: the descriptor's own fields first, then those of the
//! primary matched fragment. Absolute paths are used as-is; relative and
//! root-relative forms are joined onto the project root. The first
//! candidate that exists on disk wins.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::normalize::{is_absolute, normalize_path, strip_root};
use super::ReferenceResolver;
use crate::models::reference::{FragmentRecord, ReferenceDescriptor};
use crate::{AppError, Result};

/// A resolved citation.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationTarget {
    /// Local file to open.
    pub path: PathBuf,
    /// Fragment to highlight inside the file, if any matched.
    pub fragment: Option<FragmentRecord>,
}

impl ReferenceResolver {
    /// Resolve `descriptor` to a local file.
    ///
    /// `matched` is the output of
    /// [`match_fragments`](ReferenceResolver::match_fragments); its first
    /// entry is the fragment to highlight.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Reference`] when no candidate path exists locally.
    pub fn resolve_target(
        &self,
        descriptor: &ReferenceDescriptor,
        matched: &[FragmentRecord],
    ) -> Result<NavigationTarget> {
        let primary = matched.first();
        let raw_candidates = descriptor
            .path_candidates()
            .chain(primary.into_iter().flat_map(|fragment| fragment.path_candidates()));

        for raw in raw_candidates {
            for candidate in self.local_candidates(raw) {
                if candidate.exists() {
                    debug!(path = %candidate.display(), "citation resolved");
                    return Ok(NavigationTarget {
                        path: candidate,
                        fragment: primary.cloned(),
                    });
                }
            }
        }

        let name = if descriptor.display_name.is_empty() {
            "citation"
        } else {
            descriptor.display_name.as_str()
        };
        warn!(display_name = name, "citation has no local file");
        Err(AppError::Reference(format!("no resolvable path for {name}")))
    }

    /// Local paths worth probing for one raw path, most specific first.
    fn local_candidates(&self, raw: &str) -> Vec<PathBuf> {
        let Some(normalized) = normalize_path(raw) else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        if is_absolute(&normalized) {
            candidates.push(PathBuf::from(&normalized));
            if let Some(project_root) = &self.project_root {
                candidates.extend(
                    self.roots
                        .iter()
                        .filter_map(|root| strip_root(&normalized, root))
                        .filter_map(|relative| join_relative(project_root, relative)),
                );
            }
        } else if let Some(project_root) = &self.project_root {
            candidates.extend(join_relative(project_root, &normalized));
        }
        candidates.dedup();
        candidates
    }
}

/// Join a normalized relative path onto `root`, refusing `..` escapes.
fn join_relative(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    let mut depth = 0usize;
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if depth == 0 {
                    return None;
                }
                joined.pop();
                depth -= 1;
            }
            part => {
                joined.push(part);
                depth += 1;
            }
        }
    }
    (depth > 0).then_some(joined)
}
