//! Path normalization and variant generation.
//!
//! Citation paths arrive absolute, relative, Windows-style, or prefixed
//! with a transport scheme. Every representation is reduced to a small set
//! of normalized *variants*, and matching becomes a single set-intersection
//! test over them. Each fallback form is one more variant, never a separate
//! comparison path.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

static SCHEME_PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
static DRIVE_PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
static REPEATED_SLASHES: OnceLock<Option<Regex>> = OnceLock::new();

/// Compile `pattern` once. The patterns are constants, so `None` never
/// happens in practice; callers skip the step if it does.
fn pattern(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Normalize one path representation.
///
/// Trims whitespace, strips a leading `scheme://`, turns backslashes into
/// forward slashes, collapses repeated slashes, and lowercases a drive
/// letter. Returns `None` for blank input.
#[must_use]
pub fn normalize_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = match pattern(&SCHEME_PREFIX, r"^[A-Za-z][A-Za-z0-9+.\-]+://") {
        Some(re) => re.replace(trimmed, ""),
        None => Cow::Borrowed(trimmed),
    };
    let forward = without_scheme.replace('\\', "/");
    let collapsed = match pattern(&REPEATED_SLASHES, r"/{2,}") {
        Some(re) => re.replace_all(&forward, "/").into_owned(),
        None => forward,
    };

    let drive = pattern(&DRIVE_PREFIX, r"^(?:/)?([A-Za-z]):(?:/|$)")
        .and_then(|re| re.captures(&collapsed));
    let normalized = match drive {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            let letter = caps
                .get(1)
                .map_or(String::new(), |m| m.as_str().to_ascii_lowercase());
            let rest = collapsed[whole..].trim_start_matches('/');
            format!("{letter}:/{rest}")
        }
        None => collapsed.clone(),
    };

    let normalized = if normalized.len() > 1 {
        normalized.trim_end_matches('/').to_owned()
    } else {
        normalized
    };

    (!normalized.is_empty()).then_some(normalized)
}

/// Whether a normalized path is absolute (leading slash or drive letter).
#[must_use]
pub fn is_absolute(normalized: &str) -> bool {
    normalized.starts_with('/') || has_drive_letter(normalized)
}

/// Whether a normalized path starts with a drive letter (`c:/...`).
#[must_use]
pub fn has_drive_letter(normalized: &str) -> bool {
    let bytes = normalized.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Final path segment of a normalized path.
#[must_use]
pub fn file_name(normalized: &str) -> &str {
    normalized.rsplit('/').next().unwrap_or(normalized)
}

/// Strip `root` from the front of `path` at a segment boundary.
///
/// Comparison ignores ASCII case so that Windows roots match regardless of
/// how the drive or folders were capitalized.
#[must_use]
pub fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    let root = root.trim_end_matches('/');
    if root.is_empty() || path.len() <= root.len() {
        return None;
    }
    let head = path.get(..root.len())?;
    let tail = &path[root.len()..];
    (head.eq_ignore_ascii_case(root) && tail.starts_with('/'))
        .then(|| tail.trim_start_matches('/'))
        .filter(|rest| !rest.is_empty())
}

/// All normalized variants of `raw`.
///
/// Contains the normalized form, its root-relative form for every matching
/// entry of `roots` (already normalized), and the leading-slash-stripped
/// form of each.
#[must_use]
pub fn path_variants(raw: &str, roots: &[String]) -> BTreeSet<String> {
    let mut variants = BTreeSet::new();
    let Some(normalized) = normalize_path(raw) else {
        return variants;
    };

    let mut forms = vec![normalized.clone()];
    forms.extend(
        roots
            .iter()
            .filter_map(|root| strip_root(&normalized, root))
            .map(str::to_owned),
    );

    for form in forms {
        let stripped = form.trim_start_matches('/');
        if !stripped.is_empty() && stripped != form {
            variants.insert(stripped.to_owned());
        }
        variants.insert(form);
    }
    variants
}

/// Whether two normalized paths name the same file: equal, or one is the
/// other with extra leading segments.
#[must_use]
pub fn is_path_counterpart(a: &str, b: &str) -> bool {
    a == b || is_segment_suffix(a, b) || is_segment_suffix(b, a)
}

/// Whether `longer` ends with `/` followed by `shorter`.
fn is_segment_suffix(longer: &str, shorter: &str) -> bool {
    longer.len() > shorter.len()
        && longer.ends_with(shorter)
        && longer.as_bytes()[longer.len() - shorter.len() - 1] == b'/'
}
