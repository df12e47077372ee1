use std::sync::Arc;

use pakt_core::manifest::{InstallerDisable, Manifest};
use pakt_plugin::coordinator::{Coordinator, RegisterPolicy};
use pakt_plugin::handler::{InstallerHandler, LibraryInstaller, TemplateInstaller};
use pakt_plugin::registry::InstallerRegistry;
use pakt_plugin::store::{DisabledStore, ManifestStore};
use tempfile::TempDir;

const MANIFEST: &str = r#"# project manifest
[package]
name = "acme/site"

[require]
"acme/cms" = "^2.0"  # the CMS
"#;

#[test]
fn loads_disabled_set_from_manifest() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("pakt.toml");
    std::fs::write(
        &path,
        format!("{MANIFEST}\n[extra]\ninstaller-disable = \"cms\"\n"),
    )
    .unwrap();

    let store = ManifestStore::new(&path);
    assert!(store.load().unwrap().contains("cms"));
}

#[test]
fn claim_records_disable_in_manifest() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("pakt.toml");
    std::fs::write(&path, MANIFEST).unwrap();

    let c = Coordinator::new(InstallerRegistry::new(), Arc::new(ManifestStore::new(&path))).unwrap();
    c.register("cms", Arc::new(LibraryInstaller::default()), RegisterPolicy::Replace);
    c.claim("cms", || {
        let handler = TemplateInstaller::new("acme/cms-installer", "web/{name}")?;
        Ok(Arc::new(handler) as Arc<dyn InstallerHandler>)
    })
    .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("# the CMS"));
    let manifest = Manifest::from_path(&path).unwrap();
    assert_eq!(
        manifest.extra.installer_disable,
        InstallerDisable::Tags(["cms".to_string()].into())
    );
}

#[test]
fn missing_manifest_is_a_persist_error() {
    let tmp = TempDir::new().unwrap();
    let store = ManifestStore::new(tmp.path().join("pakt.toml"));
    assert!(store.load().is_err());
    assert!(store.persist(&InstallerDisable::All).is_err());
}
