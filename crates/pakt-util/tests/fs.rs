use pakt_util::fs::{copy_dir_all, ensure_dir, find_ancestor_with, remove_dir_if_exists};
use tempfile::TempDir;

#[test]
fn test_find_ancestor_with_direct() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("pakt.toml"), "").unwrap();
    let result = find_ancestor_with(tmp.path(), "pakt.toml");
    assert_eq!(result, Some(tmp.path().to_path_buf()));
}

#[test]
fn test_find_ancestor_with_nested() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("pakt.toml"), "").unwrap();
    let nested = tmp.path().join("a").join("b").join("c");
    std::fs::create_dir_all(&nested).unwrap();
    let result = find_ancestor_with(&nested, "pakt.toml");
    assert_eq!(result, Some(tmp.path().to_path_buf()));
}

#[test]
fn test_find_ancestor_with_not_found() {
    let tmp = TempDir::new().unwrap();
    let result = find_ancestor_with(tmp.path(), "NonExistent.file");
    assert_eq!(result, None);
}

#[test]
fn test_ensure_dir_creates_nested() {
    let tmp = TempDir::new().unwrap();
    let deep = tmp.path().join("x").join("y").join("z");
    assert!(!deep.exists());
    ensure_dir(&deep).unwrap();
    assert!(deep.is_dir());
}

#[test]
fn test_copy_dir_all_copies_nested_files() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    std::fs::create_dir_all(src.join("lib")).unwrap();
    std::fs::write(src.join("README"), "readme").unwrap();
    std::fs::write(src.join("lib").join("mod.txt"), "module").unwrap();

    let dst = tmp.path().join("out").join("pkg");
    copy_dir_all(&src, &dst).unwrap();

    assert_eq!(std::fs::read_to_string(dst.join("README")).unwrap(), "readme");
    assert_eq!(
        std::fs::read_to_string(dst.join("lib").join("mod.txt")).unwrap(),
        "module"
    );
}

#[test]
fn test_remove_dir_if_exists() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("gone");
    std::fs::create_dir(&dir).unwrap();
    assert!(remove_dir_if_exists(&dir).unwrap());
    assert!(!dir.exists());
    assert!(!remove_dir_if_exists(&dir).unwrap());
}
