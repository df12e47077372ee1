use pakt_core::metadata::{PackageFile, SELF_VERSION};

#[test]
fn test_parse_package_file() {
    let file = PackageFile::from_str(
        r#"
[[version]]
version = "2.3.0"
dist = "dist/util-2.3.0"

[version.require]
"acme/log" = "^1.0"

[version.replace]
"legacy/util" = "self.version"

[[version]]
version = "1.0.0"
type = "cms-installer"

[version.installer]
types = ["cms-extension"]
path = "web/ext/{package}"
"#,
    )
    .unwrap();

    assert_eq!(file.versions.len(), 2);
    let newest = &file.versions[0];
    assert_eq!(newest.require["acme/log"], "^1.0");
    assert_eq!(newest.replace["legacy/util"], SELF_VERSION);
    assert_eq!(newest.dist.as_deref(), Some("dist/util-2.3.0"));

    let plugin = file.versions[1].installer.as_ref().unwrap();
    assert_eq!(plugin.types, vec!["cms-extension"]);
    assert_eq!(plugin.path, "web/ext/{package}");
}

#[test]
fn test_missing_file_is_metadata_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = PackageFile::from_path(&tmp.path().join("nope.toml")).unwrap_err();
    assert!(err.to_string().contains("Metadata error"));
}

#[test]
fn test_empty_file_has_no_versions() {
    let file = PackageFile::from_str("").unwrap();
    assert!(file.versions.is_empty());
}
