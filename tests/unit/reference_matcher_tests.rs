//! Unit tests for descriptor-to-fragment matching.

use kbase_chat::models::reference::{FragmentRecord, ReferenceDescriptor};
use kbase_chat::references::ReferenceResolver;

fn fragment(path: &str, index: u32) -> FragmentRecord {
    FragmentRecord {
        file_path: Some(path.to_owned()),
        content: format!("fragment {index}"),
        fragment_index: index,
        ..Default::default()
    }
}

fn descriptor(path: &str) -> ReferenceDescriptor {
    ReferenceDescriptor {
        file_path: Some(path.to_owned()),
        display_name: path.rsplit('/').next().unwrap_or(path).to_owned(),
        ..Default::default()
    }
}

fn resolver() -> ReferenceResolver {
    ReferenceResolver::new(None, Vec::<String>::new())
}

// ── Path matching ───────────────────────────────────────────────────────────

/// Windows absolute and forward-slash relative paths name the same file.
#[test]
fn matching_is_platform_neutral() {
    let descriptor = ReferenceDescriptor {
        absolute_path: Some(r"C:\data\x\report.docx".into()),
        display_name: "report.docx".into(),
        ..Default::default()
    };
    let candidate = fragment("data/x/report.docx", 0);

    assert!(resolver().matches_by_path(&descriptor, &candidate));
    assert_eq!(
        resolver().match_fragments(&descriptor, &[candidate.clone()], None),
        vec![candidate]
    );
}

#[test]
fn matching_preserves_retrieval_order() {
    let fragments = vec![
        fragment("docs/other.md", 0),
        fragment("docs/a.md", 3),
        fragment("notes/b.md", 0),
        fragment("docs/a.md", 1),
    ];

    let matched = resolver().match_fragments(&descriptor("docs/a.md"), &fragments, None);
    let indices: Vec<u32> = matched.iter().map(|f| f.fragment_index).collect();
    assert_eq!(indices, vec![3, 1]);
}

#[test]
fn external_root_is_stripped_before_matching() {
    let resolver = ReferenceResolver::new(None, ["/srv/kb"]);
    let descriptor = ReferenceDescriptor {
        absolute_path: Some("/srv/kb/guides/setup.md".into()),
        ..Default::default()
    };

    assert!(resolver.matches_by_path(&descriptor, &fragment("guides/setup.md", 0)));
}

#[test]
fn similar_file_names_do_not_match_by_path() {
    assert!(!resolver().matches_by_path(&descriptor("docs/report.md"), &fragment("docs/myreport.md", 0)));
}

// ── Display-name fallback ───────────────────────────────────────────────────

#[test]
fn display_name_used_when_no_path_matches() {
    let descriptor = ReferenceDescriptor {
        file_path: Some("/unrelated/place/x.md".into()),
        display_name: "notes.txt".into(),
        ..Default::default()
    };
    let fragments = vec![fragment("kb/notes.txt", 0), fragment("kb/other.txt", 0)];

    let matched = resolver().match_fragments(&descriptor, &fragments, None);
    assert_eq!(matched, vec![fragments[0].clone()]);
}

#[test]
fn display_name_not_consulted_when_a_path_matches() {
    let descriptor = ReferenceDescriptor {
        file_path: Some("kb/a.md".into()),
        display_name: "b.md".into(),
        ..Default::default()
    };
    let fragments = vec![fragment("kb/a.md", 0), fragment("kb/b.md", 0)];

    let matched = resolver().match_fragments(&descriptor, &fragments, None);
    assert_eq!(matched, vec![fragments[0].clone()]);
}

// ── Preferred fragment ──────────────────────────────────────────────────────

/// Matched `[A, B, C]` with preferred `B` yields `[B, A, C]`.
#[test]
fn preferred_member_moves_to_front() {
    let a = fragment("docs/a.md", 0);
    let b = fragment("docs/a.md", 1);
    let c = fragment("docs/a.md", 2);
    let fragments = vec![a.clone(), b.clone(), c.clone()];

    let matched = resolver().match_fragments(&descriptor("docs/a.md"), &fragments, Some(&b));
    assert_eq!(matched, vec![b, a, c]);
}

#[test]
fn preferred_non_member_is_prepended() {
    let a = fragment("docs/a.md", 0);
    let b = fragment("docs/a.md", 1);
    let clicked = fragment("elsewhere/z.md", 9);

    let matched = resolver().match_fragments(
        &descriptor("docs/a.md"),
        &[a.clone(), b.clone()],
        Some(&clicked),
    );
    assert_eq!(matched, vec![clicked, a, b]);
}

#[test]
fn vector_id_identifies_preferred_fragment() {
    let mut a = fragment("docs/a.md", 0);
    a.vector_id = Some("v-1".into());
    let mut b = fragment("docs/a.md", 0);
    b.vector_id = Some("v-2".into());

    let matched = resolver().match_fragments(
        &descriptor("docs/a.md"),
        &[a.clone(), b.clone()],
        Some(&b),
    );
    assert_eq!(matched, vec![b, a]);
}
