//! Citation resolution.
//!
//! Matches a citation descriptor to the retrieved fragments it refers to
//! and resolves it to a local file the user can open.
//!
//! - `normalize`: path normalization and variant generation.
//! - `matcher`: descriptor-to-fragment matching and primary-fragment ordering.
//! - `resolve`: navigation target resolution against the project root.
//!
//! Failures here are scoped to the citation the user clicked and never
//! affect a chat session.

pub mod matcher;
pub mod normalize;
pub mod resolve;

use std::path::PathBuf;

use crate::config::ReferenceConfig;

pub use resolve::NavigationTarget;

/// Path-aware matcher and resolver for citations.
#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    project_root: Option<PathBuf>,
    /// Normalized root prefixes stripped to obtain root-relative variants.
    roots: Vec<String>,
}

impl ReferenceResolver {
    /// Build a resolver for a project root and external mount prefixes.
    #[must_use]
    pub fn new<I, S>(project_root: Option<PathBuf>, external_roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roots: Vec<String> = external_roots
            .into_iter()
            .filter_map(|root| normalize::normalize_path(root.as_ref()))
            .collect();
        if let Some(root) = project_root
            .as_ref()
            .and_then(|root| normalize::normalize_path(&root.to_string_lossy()))
        {
            roots.push(root);
        }
        // Longest first so the most specific root yields the first variant.
        roots.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        roots.dedup();

        Self {
            project_root,
            roots,
        }
    }

    /// Build a resolver from the `[references]` configuration table.
    #[must_use]
    pub fn from_config(config: &ReferenceConfig) -> Self {
        Self::new(config.project_root.clone(), &config.external_roots)
    }

    /// Local knowledge-base root, if configured.
    #[must_use]
    pub fn project_root(&self) -> Option<&std::path::Path> {
        self.project_root.as_deref()
    }

    /// Normalized root prefixes in stripping order.
    #[must_use]
    pub fn roots(&self) -> &[String] {
        &self.roots
    }
}
