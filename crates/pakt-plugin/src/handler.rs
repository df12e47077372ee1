//! Installer handlers: where a package goes and how it gets there.

use std::path::{Component, Path, PathBuf};

use pakt_resolver::index::PackageVersion;
use pakt_util::errors::PaktError;

/// Places packages of one or more installer types on disk.
///
/// Paths returned by [`install_path`](Self::install_path) are relative to
/// the project root.
pub trait InstallerHandler: Send + Sync {
    /// Identifier shown in logs and `pakt installer list`.
    fn id(&self) -> &str;

    /// A generic handler serves any type it is offered. Generic handlers are
    /// refused for tags in the disabled set.
    fn is_generic(&self) -> bool {
        false
    }

    fn install_path(&self, package: &PackageVersion) -> PathBuf;

    /// Place `package` at `target`, replacing whatever is there.
    fn install(&self, package: &PackageVersion, target: &Path) -> miette::Result<()> {
        pakt_util::fs::remove_dir_if_exists(target).map_err(PaktError::Io)?;
        match &package.dist {
            Some(dist) => pakt_util::fs::copy_dir_all(dist, target).map_err(|e| {
                PaktError::Installer {
                    message: format!("failed to copy {} from {}: {e}", package, dist.display()),
                }
            })?,
            None => pakt_util::fs::ensure_dir(target).map_err(PaktError::Io)?,
        }
        Ok(())
    }

    fn remove(&self, target: &Path) -> miette::Result<()> {
        pakt_util::fs::remove_dir_if_exists(target).map_err(PaktError::Io)?;
        Ok(())
    }
}

/// The built-in installer: `<vendor-dir>/<vendor>/<name>`.
///
/// Registered as the primary handler of the `library` type, and as the
/// generic fallback for every other type nothing more specific claims.
pub struct LibraryInstaller {
    vendor_dir: PathBuf,
    generic: bool,
}

impl LibraryInstaller {
    /// The generic fallback.
    pub fn new(vendor_dir: impl Into<PathBuf>) -> Self {
        Self {
            vendor_dir: vendor_dir.into(),
            generic: true,
        }
    }

    /// The handler for the `library` type itself. Not generic, so the
    /// disabled set never applies to it.
    pub fn primary(vendor_dir: impl Into<PathBuf>) -> Self {
        Self {
            vendor_dir: vendor_dir.into(),
            generic: false,
        }
    }
}

impl Default for LibraryInstaller {
    fn default() -> Self {
        Self::new("vendor")
    }
}

impl InstallerHandler for LibraryInstaller {
    fn id(&self) -> &str {
        "library"
    }

    fn is_generic(&self) -> bool {
        self.generic
    }

    fn install_path(&self, package: &PackageVersion) -> PathBuf {
        self.vendor_dir.join(&package.name)
    }
}

/// Handler contributed by an installer plugin package.
///
/// The path template may use `{package}` (full name), `{vendor}` and
/// `{name}` (the parts before and after the `/`).
#[derive(Debug)]
pub struct TemplateInstaller {
    id: String,
    template: String,
}

impl TemplateInstaller {
    /// Fails if the template is absolute or climbs out of the project.
    pub fn new(id: impl Into<String>, template: &str) -> Result<Self, PaktError> {
        let id = id.into();
        let escapes = Path::new(template)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if template.trim().is_empty() || escapes {
            return Err(PaktError::Installer {
                message: format!("installer {id} has an invalid path template '{template}'"),
            });
        }
        Ok(Self {
            id,
            template: template.to_string(),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl InstallerHandler for TemplateInstaller {
    fn id(&self) -> &str {
        &self.id
    }

    fn install_path(&self, package: &PackageVersion) -> PathBuf {
        let (vendor, name) = package
            .name
            .split_once('/')
            .unwrap_or(("", package.name.as_str()));
        PathBuf::from(
            self.template
                .replace("{package}", &package.name)
                .replace("{vendor}", vendor)
                .replace("{name}", name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str) -> PackageVersion {
        PackageVersion::builder(name, "1.0.0").build().unwrap()
    }

    #[test]
    fn library_goes_under_vendor_dir() {
        let lib = LibraryInstaller::default();
        assert!(lib.is_generic());
        assert_eq!(lib.install_path(&pkg("acme/util")), PathBuf::from("vendor/acme/util"));
        assert!(!LibraryInstaller::primary("vendor").is_generic());
    }

    #[test]
    fn template_placeholders() {
        let t = TemplateInstaller::new("acme/cms-installer", "web/{vendor}-ext/{name}").unwrap();
        assert!(!t.is_generic());
        assert_eq!(
            t.install_path(&pkg("acme/blog")),
            PathBuf::from("web/acme-ext/blog")
        );
        let t = TemplateInstaller::new("x", "plugins/{package}").unwrap();
        assert_eq!(t.install_path(&pkg("acme/blog")), PathBuf::from("plugins/acme/blog"));
    }

    #[test]
    fn template_must_stay_inside_the_project() {
        assert!(TemplateInstaller::new("x", "../outside/{name}").is_err());
        assert!(TemplateInstaller::new("x", "/abs/{name}").is_err());
        assert!(TemplateInstaller::new("x", "  ").is_err());
    }
}
