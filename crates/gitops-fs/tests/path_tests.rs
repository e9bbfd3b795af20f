use gitops_fs::NormalizedPath;
use rstest::rstest;

#[rstest]
#[case("foo/bar/baz", "foo/bar/baz")]
#[case("foo\\bar\\baz", "foo/bar/baz")]
#[case("/fabric-a/./raw/", "/fabric-a/raw")]
#[case("/fabric-a/raw/../managed", "/fabric-a/managed")]
#[case("/../escape", "/../escape")]
fn test_normalization(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(NormalizedPath::new(input).as_str(), expected);
}

#[test]
fn test_join_paths() {
    let base = NormalizedPath::new("/work/clone");
    let joined = base.join("fabrics/fabric-01/");
    assert_eq!(joined.as_str(), "/work/clone/fabrics/fabric-01");
}

#[test]
fn test_join_cannot_hide_parent_reference() {
    let base = NormalizedPath::new("fabric");
    let joined = base.join("../../outside");
    assert!(joined.has_parent_reference());
}

#[test]
fn test_starts_with_is_segment_wise() {
    let a = NormalizedPath::new("/fabric-a/raw");
    assert!(a.starts_with(&NormalizedPath::new("/fabric-a")));
    assert!(!a.starts_with(&NormalizedPath::new("/fabric")));
}

#[test]
fn test_strip_prefix() {
    let file = NormalizedPath::new("/clone/fabric-a/raw/pending/vpc.yaml");
    let relative = file.strip_prefix(&NormalizedPath::new("/clone/fabric-a")).unwrap();
    assert_eq!(relative.as_str(), "raw/pending/vpc.yaml");
}

#[test]
fn test_parent_and_file_name() {
    let path = NormalizedPath::new("managed/metadata/gitops-structure.json");
    assert_eq!(path.parent().unwrap().as_str(), "managed/metadata");
    assert_eq!(path.file_name(), Some("gitops-structure.json"));
    assert_eq!(path.extension(), Some("json"));
}

#[test]
fn test_depth_counts_segments() {
    assert_eq!(NormalizedPath::new("/").depth(), 0);
    assert_eq!(NormalizedPath::new("/environments/prod/").depth(), 2);
}
