//! Citation descriptors and retrieved fragments.

use serde::{Deserialize, Serialize};

/// One citation shown under an answer.
///
/// Paths arrive in whatever form the backend recorded them: absolute,
/// project-relative, Windows-style, or prefixed with a transport scheme.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDescriptor {
    /// Absolute path on the machine that indexed the document.
    #[serde(default, alias = "absolute_path")]
    pub absolute_path: Option<String>,
    /// Path relative to the knowledge-base root.
    #[serde(default, alias = "project_relative_path")]
    pub project_relative_path: Option<String>,
    /// Path as stored in the index.
    #[serde(default, alias = "file_path")]
    pub file_path: Option<String>,
    /// File name shown to the user.
    #[serde(default, alias = "display_name", alias = "fileName", alias = "file_name")]
    pub display_name: String,
    /// Retrieval score, when the backend reports one.
    #[serde(default)]
    pub score: Option<f64>,
    /// Short excerpt of the matched text.
    #[serde(default)]
    pub snippet: Option<String>,
}

impl ReferenceDescriptor {
    /// Path fields in navigation priority order.
    pub fn path_candidates(&self) -> impl Iterator<Item = &str> {
        [
            self.absolute_path.as_deref(),
            self.project_relative_path.as_deref(),
            self.file_path.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// A retrieved piece of source content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FragmentRecord {
    /// Absolute path of the source document.
    #[serde(default, alias = "absolute_path")]
    pub absolute_path: Option<String>,
    /// Path as stored in the index.
    #[serde(default, alias = "file_path")]
    pub file_path: Option<String>,
    /// Fragment text.
    #[serde(default)]
    pub content: String,
    /// Position of the fragment within its document.
    #[serde(default, alias = "fragment_index", alias = "chunkIndex", alias = "chunk_index")]
    pub fragment_index: u32,
    /// Vector store id, when known.
    #[serde(default, alias = "vector_id")]
    pub vector_id: Option<String>,
}

impl FragmentRecord {
    /// Path fields in navigation priority order.
    pub fn path_candidates(&self) -> impl Iterator<Item = &str> {
        [self.absolute_path.as_deref(), self.file_path.as_deref()]
            .into_iter()
            .flatten()
    }

    /// Whether `other` denotes the same retrieved fragment.
    ///
    /// Vector ids decide when both sides carry one; otherwise the path
    /// fields and fragment index must agree.
    #[must_use]
    pub fn same_fragment(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.vector_id, &other.vector_id) {
            return a == b;
        }
        self.fragment_index == other.fragment_index
            && self.absolute_path == other.absolute_path
            && self.file_path == other.file_path
    }
}
