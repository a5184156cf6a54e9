//! Descriptor-to-fragment matching.
//!
//! A fragment belongs to a citation when any of its path variants equals,
//! or is a segment-suffix counterpart of, any of the descriptor's variants.
//! Only when no fragment matches by path does the display file name decide.
//! Matching is deterministic and keeps retrieval order.

use std::collections::BTreeSet;

use tracing::debug;

use super::normalize::{file_name, is_path_counterpart, normalize_path, path_variants};
use super::ReferenceResolver;
use crate::models::reference::{FragmentRecord, ReferenceDescriptor};

impl ReferenceResolver {
    /// Every normalized variant of the descriptor's path fields.
    #[must_use]
    pub fn descriptor_variants(&self, descriptor: &ReferenceDescriptor) -> BTreeSet<String> {
        self.collect_variants(descriptor.path_candidates())
    }

    /// Every normalized variant of the fragment's path fields.
    #[must_use]
    pub fn fragment_variants(&self, fragment: &FragmentRecord) -> BTreeSet<String> {
        self.collect_variants(fragment.path_candidates())
    }

    /// Whether `fragment` matches `descriptor` by path.
    #[must_use]
    pub fn matches_by_path(
        &self,
        descriptor: &ReferenceDescriptor,
        fragment: &FragmentRecord,
    ) -> bool {
        variants_intersect(
            &self.descriptor_variants(descriptor),
            &self.fragment_variants(fragment),
        )
    }

    /// Fragments belonging to `descriptor`, in retrieval order.
    ///
    /// When `preferred` (the fragment the user clicked) is given it becomes
    /// the first entry: moved to the front if it matched, prepended if it
    /// did not.
    #[must_use]
    pub fn match_fragments(
        &self,
        descriptor: &ReferenceDescriptor,
        fragments: &[FragmentRecord],
        preferred: Option<&FragmentRecord>,
    ) -> Vec<FragmentRecord> {
        let wanted = self.descriptor_variants(descriptor);

        let mut matched: Vec<FragmentRecord> = if wanted.is_empty() {
            Vec::new()
        } else {
            fragments
                .iter()
                .filter(|fragment| variants_intersect(&wanted, &self.fragment_variants(fragment)))
                .cloned()
                .collect()
        };

        if matched.is_empty() {
            matched = match_by_display_name(descriptor, fragments);
            if !matched.is_empty() {
                debug!(
                    display_name = %descriptor.display_name,
                    count = matched.len(),
                    "citation matched by file name"
                );
            }
        }

        if let Some(preferred) = preferred {
            promote(&mut matched, preferred);
        }
        matched
    }

    fn collect_variants<'a>(&self, candidates: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
        candidates
            .flat_map(|raw| path_variants(raw, &self.roots))
            .collect()
    }
}

/// Whether any pair of variants names the same file.
fn variants_intersect(left: &BTreeSet<String>, right: &BTreeSet<String>) -> bool {
    left.iter()
        .any(|a| right.iter().any(|b| is_path_counterpart(a, b)))
}

fn match_by_display_name(
    descriptor: &ReferenceDescriptor,
    fragments: &[FragmentRecord],
) -> Vec<FragmentRecord> {
    let wanted = descriptor.display_name.trim();
    if wanted.is_empty() {
        return Vec::new();
    }
    fragments
        .iter()
        .filter(|fragment| {
            fragment
                .path_candidates()
                .filter_map(normalize_path)
                .any(|path| file_name(&path) == wanted)
        })
        .cloned()
        .collect()
}

/// Put `preferred` first, keeping the relative order of the rest.
fn promote(matched: &mut Vec<FragmentRecord>, preferred: &FragmentRecord) {
    match matched.iter().position(|f| f.same_fragment(preferred)) {
        Some(0) => {}
        Some(index) => {
            let item = matched.remove(index);
            matched.insert(0, item);
        }
        None => matched.insert(0, preferred.clone()),
    }
}
