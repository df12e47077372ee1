use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use pakt_resolver::conflict::ConflictReason;
use pakt_resolver::index::PackageVersion;
use pakt_resolver::resolver::{parse_requirements, resolve, ResolveError};
use pakt_resolver::source::{populate_index, DirectorySource, FetchError, MetadataSource};
use tempfile::TempDir;

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(format!("{name}.toml"));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn repo() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "acme/app",
        r#"
[[version]]
version = "1.0.0"
dist = "dist/app"

[version.require]
"acme/util" = "^2.0"
"psr/log-impl" = "^1.0"
"#,
    );
    write(
        tmp.path(),
        "acme/util",
        r#"
[[version]]
version = "2.3.0"
type = "library"

[version.require]
"acme/log" = "*"

[[version]]
version = "1.9.0"
"#,
    );
    write(
        tmp.path(),
        "acme/log",
        r#"
[[version]]
version = "1.0.0"

[version.provide]
"psr/log-impl" = "1.0.0"
"#,
    );
    tmp
}

fn sources(root: &Path) -> Vec<Arc<dyn MetadataSource>> {
    vec![Arc::new(DirectorySource::new("local", root))]
}

#[tokio::test]
async fn collects_transitive_packages() {
    let tmp = repo();
    let index = populate_index(&sources(tmp.path()), ["acme/app".to_string()], 2)
        .await
        .unwrap();

    assert_eq!(index.len(), 4);
    assert_eq!(index.find("acme/util").len(), 2);
    assert!(index.find("acme/log").len() == 1);
    // The virtual name has no metadata file of its own.
    assert!(index.unavailable_reason("psr/log-impl").is_some());
    assert_eq!(index.candidates("psr/log-impl")[0].name, "acme/log");

    let app = &index.find("acme/app")[0];
    assert_eq!(app.dist.as_deref(), Some(tmp.path().join("dist/app").as_path()));
}

#[tokio::test]
async fn missing_root_is_marked_unavailable() {
    let tmp = repo();
    let index = populate_index(&sources(tmp.path()), ["acme/nope".to_string()], 1)
        .await
        .unwrap();
    assert!(index.is_empty());
    assert!(index.unavailable_reason("acme/nope").unwrap().contains("not found"));
}

#[tokio::test]
async fn unreadable_metadata_is_not_fatal() {
    let tmp = repo();
    write(tmp.path(), "acme/broken", "[[version]\nversion = ");
    let index = populate_index(&sources(tmp.path()), ["acme/broken".to_string()], 4)
        .await
        .unwrap();
    assert!(index.unavailable_reason("acme/broken").is_some());
}

struct PanickingSource;

impl MetadataSource for PanickingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    fn fetch_versions(&self, package: &str) -> Result<Vec<PackageVersion>, FetchError> {
        panic!("metadata backend crashed while reading {package}");
    }
}

#[tokio::test]
async fn crashed_fetch_is_reported_as_unavailable() {
    let sources: Vec<Arc<dyn MetadataSource>> = vec![Arc::new(PanickingSource)];
    let index = populate_index(&sources, ["acme/flaky".to_string()], 2)
        .await
        .unwrap();
    assert!(index.unavailable_reason("acme/flaky").is_some());

    let raw: BTreeMap<String, String> = [("acme/flaky".to_string(), "*".to_string())].into();
    let roots = parse_requirements(&raw).unwrap();
    let ResolveError::Conflict(report) = resolve(&index, &roots).unwrap_err() else {
        panic!("expected a conflict");
    };
    match &report.conflicts[0].reason {
        ConflictReason::Unavailable { detail } => {
            assert!(detail.contains("failed to read metadata"), "{detail}");
            assert!(!detail.contains("no versions"), "{detail}");
        }
        other => panic!("unexpected reason {other:?}"),
    }
}

#[tokio::test]
async fn malformed_constraint_in_metadata_is_fatal() {
    let tmp = repo();
    write(
        tmp.path(),
        "acme/bad",
        "[[version]]\nversion = \"1.0.0\"\n[version.require]\n\"acme/util\" = \">=>2\"\n",
    );
    let err = populate_index(&sources(tmp.path()), ["acme/bad".to_string()], 4)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, FetchError::InvalidConstraint { .. }));
}

#[test]
fn directory_source_rejects_escaping_names() {
    let tmp = repo();
    let source = DirectorySource::new("local", tmp.path());
    assert!(matches!(
        source.fetch_versions("../etc/passwd"),
        Err(FetchError::NotFound(_))
    ));
}
