use std::path::PathBuf;
use std::sync::Arc;

use pakt_core::manifest::InstallerDisable;
use pakt_plugin::coordinator::{Coordinator, RegisterPolicy, Registration, RegistryError};
use pakt_plugin::handler::{InstallerHandler, LibraryInstaller, TemplateInstaller};
use pakt_plugin::registry::InstallerRegistry;
use pakt_plugin::store::{DisabledStore, MemoryStore};
use pakt_resolver::index::PackageVersion;
use pakt_util::errors::PaktError;

fn coordinator(initial: InstallerDisable) -> (Coordinator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(initial));
    let coordinator = Coordinator::new(InstallerRegistry::new(), store.clone()).unwrap();
    (coordinator, store)
}

fn generic() -> Arc<dyn InstallerHandler> {
    Arc::new(LibraryInstaller::default())
}

fn template(id: &str) -> Arc<dyn InstallerHandler> {
    Arc::new(TemplateInstaller::new(id, "web/ext/{name}").unwrap())
}

#[test]
fn same_handler_twice_is_a_no_op() {
    let (c, _) = coordinator(InstallerDisable::default());
    let handler = template("acme/cms-installer");
    assert_eq!(
        c.register("cms", handler.clone(), RegisterPolicy::Replace),
        Registration::Registered
    );
    assert_eq!(
        c.register("cms", handler.clone(), RegisterPolicy::Replace),
        Registration::Unchanged
    );
    assert_eq!(c.entries(), vec![("cms".to_string(), "acme/cms-installer".to_string())]);
}

#[test]
fn replace_and_keep_policies() {
    let (c, _) = coordinator(InstallerDisable::default());
    c.register("cms", template("first"), RegisterPolicy::Replace);
    assert_eq!(
        c.register("cms", template("second"), RegisterPolicy::KeepExisting),
        Registration::Kept {
            existing: "first".to_string()
        }
    );
    assert_eq!(
        c.register("cms", template("third"), RegisterPolicy::Replace),
        Registration::Replaced {
            previous: "first".to_string()
        }
    );
    assert_eq!(c.handler_for("cms").unwrap().id(), "third");
}

#[test]
fn generic_handlers_respect_the_disabled_set() {
    let (c, _) = coordinator(InstallerDisable::Tags(["cms".to_string()].into()));
    assert_eq!(
        c.register("cms", generic(), RegisterPolicy::Replace),
        Registration::Refused
    );
    assert_eq!(
        c.register("library", generic(), RegisterPolicy::Replace),
        Registration::Registered
    );

    let (c, _) = coordinator(InstallerDisable::All);
    assert_eq!(
        c.register("library", generic(), RegisterPolicy::Replace),
        Registration::Refused
    );
    assert!(c.handler_for("library").is_none());
}

#[test]
fn generic_never_displaces_a_plugin() {
    let (c, _) = coordinator(InstallerDisable::default());
    c.register("cms", template("acme/cms-installer"), RegisterPolicy::Replace);
    assert!(matches!(
        c.register("cms", generic(), RegisterPolicy::Replace),
        Registration::Kept { .. }
    ));
}

#[test]
fn disable_is_idempotent() {
    let (c, store) = coordinator(InstallerDisable::default());
    c.register("cms", generic(), RegisterPolicy::Replace);

    assert!(c.disable("cms").unwrap());
    assert!(!c.disable("cms").unwrap());
    assert_eq!(store.writes(), 1);
    assert!(c.is_disabled("cms"));
    assert!(store.current().contains("cms"));
    // The generic handler no longer serves the tag.
    assert!(c.handler_for("cms").is_none());
}

#[test]
fn claim_takes_the_tag_from_a_generic_handler() {
    let (c, store) = coordinator(InstallerDisable::default());
    c.register("cms", generic(), RegisterPolicy::Replace);

    let plugin = template("acme/cms-installer");
    let handed = plugin.clone();
    let outcome = c.claim("cms", move || Ok(handed)).unwrap();
    assert_eq!(
        outcome,
        Registration::Replaced {
            previous: "library".to_string()
        }
    );
    assert!(c.is_disabled("cms"));
    assert_eq!(store.writes(), 1);
    assert_eq!(c.handler_for("cms").unwrap().id(), "acme/cms-installer");

    let again = plugin.clone();
    assert_eq!(c.claim("cms", move || Ok(again)).unwrap(), Registration::Unchanged);
    assert_eq!(store.writes(), 1);
}

#[test]
fn claim_of_a_free_tag_does_not_touch_the_store() {
    let (c, store) = coordinator(InstallerDisable::default());
    let outcome = c.claim("cms", || Ok(template("acme/cms-installer"))).unwrap();
    assert_eq!(outcome, Registration::Registered);
    assert_eq!(store.writes(), 0);
    assert!(!c.is_disabled("cms"));
}

#[test]
fn failed_construction_changes_nothing() {
    let (c, store) = coordinator(InstallerDisable::default());
    c.register("cms", generic(), RegisterPolicy::Replace);

    let err = c
        .claim("cms", || {
            TemplateInstaller::new("bad", "../escape").map(|t| Arc::new(t) as Arc<dyn InstallerHandler>)
        })
        .unwrap_err();
    assert!(matches!(err, RegistryError::Construct { .. }));
    assert_eq!(store.writes(), 0);
    assert!(!c.is_disabled("cms"));
    assert_eq!(c.handler_for("cms").unwrap().id(), "library");
}

struct FailingStore;

impl DisabledStore for FailingStore {
    fn load(&self) -> Result<InstallerDisable, RegistryError> {
        Ok(InstallerDisable::default())
    }

    fn persist(&self, _: &InstallerDisable) -> Result<(), RegistryError> {
        Err(RegistryError::Persist {
            message: "read-only".to_string(),
        })
    }
}

#[test]
fn handler_is_not_swapped_when_persisting_fails() {
    let c = Coordinator::new(InstallerRegistry::new(), Arc::new(FailingStore)).unwrap();
    c.register("cms", generic(), RegisterPolicy::Replace);

    assert!(c.claim("cms", || Ok(template("acme/cms-installer"))).is_err());
    assert_eq!(c.handler_for("cms").unwrap().id(), "library");
    assert!(!c.is_disabled("cms"));
    assert!(c.disable("other").is_err());
}

#[test]
fn concurrent_claims_leave_exactly_one_handler() {
    let (c, _) = coordinator(InstallerDisable::default());
    c.register("cms", generic(), RegisterPolicy::Replace);
    let c = Arc::new(c);

    std::thread::scope(|s| {
        for i in 0..8 {
            let c = Arc::clone(&c);
            s.spawn(move || {
                let id = format!("plugin-{i}");
                c.claim("cms", move || Ok(template(&id))).unwrap();
            });
        }
    });

    let entries = c.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].1.starts_with("plugin-"));
    assert!(c.is_disabled("cms"));
}

#[test]
fn into_registry_returns_the_mapping() {
    let (c, _) = coordinator(InstallerDisable::default());
    c.register("library", generic(), RegisterPolicy::Replace);
    let registry = c.into_registry();
    assert!(registry.has("library"));
    let pkg = PackageVersion::builder("acme/util", "1.0.0").build().unwrap();
    assert_eq!(
        registry.get("library").unwrap().install_path(&pkg),
        PathBuf::from("vendor/acme/util")
    );
}

#[test]
fn construction_errors_surface_as_installer_errors() {
    let err: PaktError = RegistryError::Construct {
        tag: "cms".to_string(),
        message: "boom".to_string(),
    }
    .into();
    assert!(err.to_string().contains("cms"));
}
