use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use pakt_core::lockfile::{LockedPackage, Lockfile};
use pakt_installer::execute::{execute, ExecutionSummary, FilesystemExecutor, PlanExecutor};
use pakt_installer::plan::{plan, Step};
use pakt_plugin::coordinator::{Coordinator, RegisterPolicy};
use pakt_plugin::handler::LibraryInstaller;
use pakt_plugin::registry::InstallerRegistry;
use pakt_plugin::store::MemoryStore;
use pakt_resolver::index::{PackageVersion, PackageVersionBuilder, RepositoryIndex};
use pakt_resolver::resolver::{parse_requirements, resolve, Resolution};

fn resolution(packages: Vec<PackageVersionBuilder>, roots: &[(&str, &str)]) -> Resolution {
    let mut index = RepositoryIndex::new();
    for p in packages {
        index.add(p.build().unwrap());
    }
    let raw: BTreeMap<String, String> = roots
        .iter()
        .map(|(n, c)| (n.to_string(), c.to_string()))
        .collect();
    resolve(&index, &parse_requirements(&raw).unwrap()).unwrap()
}

fn coordinator(store: Arc<MemoryStore>, types: &[&str]) -> Coordinator {
    let coordinator = Coordinator::new(InstallerRegistry::new(), store).unwrap();
    let library = Arc::new(LibraryInstaller::default());
    for tag in types {
        coordinator.register(tag, library.clone(), RegisterPolicy::KeepExisting);
    }
    coordinator
}

fn dist(root: &Path, name: &str) -> std::path::PathBuf {
    let dir = root.join("dist").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("README"), format!("{name}\n")).unwrap();
    dir
}

#[test]
fn library_packages_are_copied_under_vendor() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("project");
    let resolution = resolution(
        vec![
            PackageVersion::builder("acme/app", "1.0.0")
                .require("acme/util", "^1.0")
                .dist(dist(tmp.path(), "app")),
            PackageVersion::builder("acme/util", "1.2.0").dist(dist(tmp.path(), "util")),
        ],
        &[("acme/app", "*")],
    );
    let store = Arc::new(MemoryStore::default());
    let coordinator = coordinator(store, &["library"]);

    let plan = plan(&resolution, None).unwrap();
    let mut executor = FilesystemExecutor::new(&project, &coordinator, false);
    let summary = execute(plan, &mut executor).unwrap();

    assert_eq!(
        summary,
        ExecutionSummary {
            installed: 2,
            removed: 0,
            activated: 0,
        }
    );
    assert_eq!(
        fs::read_to_string(project.join("vendor/acme/util/README")).unwrap(),
        "util\n"
    );
    assert!(project.join("vendor/acme/app/README").exists());
}

#[test]
fn plugin_takes_over_its_type_from_the_generic_installer() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("project");
    let resolution = resolution(
        vec![
            PackageVersion::builder("acme/blog", "1.0.0")
                .installer_type("cms-module")
                .dist(dist(tmp.path(), "blog")),
            PackageVersion::builder("acme/cms-installer", "1.0.0")
                .installer_type("installer-plugin")
                .installer(&["cms-module"], "modules/{name}"),
        ],
        &[("acme/blog", "*"), ("acme/cms-installer", "*")],
    );
    let store = Arc::new(MemoryStore::default());
    let coordinator = coordinator(store.clone(), &["cms-module", "installer-plugin"]);
    assert_eq!(coordinator.handler_for("cms-module").unwrap().id(), "library");

    let plan = plan(&resolution, None).unwrap();
    let mut executor = FilesystemExecutor::new(&project, &coordinator, false);
    let summary = execute(plan, &mut executor).unwrap();

    assert_eq!(summary.activated, 1);
    assert_eq!(
        coordinator.handler_for("cms-module").unwrap().id(),
        "acme/cms-installer"
    );
    assert!(store.current().contains("cms-module"));
    assert_eq!(store.writes(), 1);
    assert!(project.join("modules/blog/README").exists());
    assert!(!project.join("vendor/acme/blog").exists());
}

#[test]
fn dry_run_touches_nothing_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("project");
    let resolution = resolution(
        vec![PackageVersion::builder("acme/util", "1.0.0").dist(dist(tmp.path(), "util"))],
        &[("acme/util", "*")],
    );
    let store = Arc::new(MemoryStore::default());
    let coordinator = coordinator(store, &["library"]);

    let plan = plan(&resolution, None).unwrap();
    let mut executor = FilesystemExecutor::new(&project, &coordinator, true);
    let summary = execute(plan, &mut executor).unwrap();

    assert_eq!(summary.installed, 1);
    assert!(!project.exists());
}

#[test]
fn removed_packages_lose_their_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("project");
    fs::create_dir_all(project.join("vendor/acme/old")).unwrap();
    fs::write(project.join("vendor/acme/old/README"), "old").unwrap();

    let resolution = resolution(
        vec![PackageVersion::builder("acme/util", "1.0.0")],
        &[("acme/util", "*")],
    );
    let lock = Lockfile::generate(
        String::new(),
        vec![LockedPackage {
            name: "acme/old".to_string(),
            version: "0.3.0".to_string(),
            installer_type: "library".to_string(),
            install_path: Some("vendor/acme/old".to_string()),
            dependencies: Vec::new(),
        }],
    );
    let store = Arc::new(MemoryStore::default());
    let coordinator = coordinator(store, &["library"]);

    let plan = plan(&resolution, Some(&lock)).unwrap();
    let mut executor = FilesystemExecutor::new(&project, &coordinator, false);
    let summary = execute(plan, &mut executor).unwrap();

    assert_eq!(summary.removed, 1);
    assert_eq!(summary.installed, 1);
    assert!(!project.join("vendor/acme/old").exists());
    assert!(project.join("vendor/acme/util").is_dir());
}

#[test]
fn install_without_an_active_handler_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let resolution = resolution(
        vec![PackageVersion::builder("acme/theme", "1.0.0").installer_type("theme")],
        &[("acme/theme", "*")],
    );
    let store = Arc::new(MemoryStore::default());
    let coordinator = coordinator(store, &["library"]);

    let plan = plan(&resolution, None).unwrap();
    let mut executor = FilesystemExecutor::new(tmp.path(), &coordinator, false);
    let err = execute(plan, &mut executor).unwrap_err();
    assert!(err.to_string().contains("no installer is active for type 'theme'"));
}

struct FailOnSecond {
    seen: Vec<String>,
}

impl PlanExecutor for FailOnSecond {
    fn apply(&mut self, step: &Step) -> miette::Result<()> {
        self.seen.push(step.to_string());
        if self.seen.len() == 2 {
            miette::bail!("disk full");
        }
        Ok(())
    }
}

#[test]
fn execution_stops_at_the_first_failing_step() {
    let resolution = resolution(
        vec![
            PackageVersion::builder("a", "1.0.0"),
            PackageVersion::builder("b", "1.0.0"),
            PackageVersion::builder("c", "1.0.0"),
        ],
        &[("a", "*"), ("b", "*"), ("c", "*")],
    );
    let plan = plan(&resolution, None).unwrap();
    let mut executor = FailOnSecond { seen: Vec::new() };
    let err = execute(plan, &mut executor).unwrap_err();
    assert_eq!(err.to_string(), "disk full");
    assert_eq!(executor.seen, vec!["install a@1.0.0", "install b@1.0.0"]);
}
