use dataload_core::{LoadError, LoaderConfig};
use dataload_test_utils::{loader, reference_node, stored, write_file};

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.xml", r#"<data archetype="x" id="1" name="id:2"/>"#);
    write_file(dir.path(), "sub/b.xml", r#"<data archetype="y" id="2" label="two"/>"#);
    write_file(dir.path(), "notes.txt", "<not xml");
    dir
}

#[test]
fn test_recursive_directory_load() {
    let dir = fixture();
    let mut loader = loader(LoaderConfig::new().with_recurse(true));

    assert_eq!(loader.load_dir(dir.path()).unwrap(), 2);
    loader.finish().unwrap();
    assert_eq!(
        reference_node(&stored(&loader, "1"), "name"),
        stored(&loader, "2").reference()
    );
}

#[test]
fn test_flat_directory_load() {
    let dir = fixture();
    let mut loader = loader(LoaderConfig::new());

    assert_eq!(loader.load_dir(dir.path()).unwrap(), 1);
    let err = loader.finish().unwrap_err();
    assert!(matches!(err, LoadError::UnresolvedReferences(ref u) if u[0].location.path().ends_with("a.xml")));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = loader(LoaderConfig::new())
        .load_file(dir.path().join("absent.xml"))
        .unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}
