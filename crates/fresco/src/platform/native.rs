//! Native backends: file-backed storage and manifest-file remotes.
//!
//! A native process cannot adopt a remote's UI bundle, so a manifest file
//! stands in for the container: it lists the exports and shared libraries,
//! negotiates them on init, and serves inert stub instances. That is enough
//! for the CLI and for exercising the whole load path off-browser.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture};

use crate::adapter::{Anchor, AnchorId, ComponentFactory, ForeignInstance, Props};
use crate::loader::{ContainerError, ContainerFetcher, LoadError, RemoteContainer};
use crate::registry::RemoteDescriptor;
use crate::shared_scope::SharedScope;
use crate::storage::{StorageBackend, StorageError};

// --- FileStorage ---

/// File-per-key storage under a base directory.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileStorage {
    fn load(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.key_path(key)).ok()
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path).map_err(io_error)?;
        fs::write(self.key_path(key), value).map_err(io_error)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(io_error(error)),
        }
    }
}

fn io_error(error: io::Error) -> StorageError {
    StorageError::Io(error.to_string())
}

// --- HeadlessAnchor ---

/// Always-attached anchor for headless use.
pub struct HeadlessAnchor {
    id: AnchorId,
}

impl HeadlessAnchor {
    pub fn new() -> Self {
        Self { id: AnchorId::new() }
    }
}

impl Default for HeadlessAnchor {
    fn default() -> Self {
        Self::new()
    }
}

impl Anchor for HeadlessAnchor {
    fn anchor_id(&self) -> AnchorId {
        self.id
    }

    fn is_attached(&self) -> bool {
        true
    }
}

// --- Manifest remotes ---

/// Fetches remotes from `<root>/<name>.remote.json` manifest files.
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn manifest_path(&self, remote: &str) -> PathBuf {
        self.root.join(format!("{remote}.remote.json"))
    }
}

impl ContainerFetcher for DirFetcher {
    fn fetch(
        &self,
        descriptor: &RemoteDescriptor,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn RemoteContainer>, LoadError>> {
        let path = self.manifest_path(&descriptor.name);
        let remote = descriptor.name.clone();
        let result = read_manifest(&path, &remote)
            .map(|manifest| Rc::new(ManifestContainer::new(manifest)) as Rc<dyn RemoteContainer>);
        future::ready(result).boxed_local()
    }
}

fn read_manifest(path: &PathBuf, remote: &str) -> Result<RemoteDescriptor, LoadError> {
    let fetch_error = |reason: String| LoadError::Fetch {
        remote: remote.to_owned(),
        reason,
    };
    let text = fs::read_to_string(path)
        .map_err(|error| fetch_error(format!("{}: {error}", path.display())))?;
    let manifest: RemoteDescriptor = serde_json::from_str(&text)
        .map_err(|error| fetch_error(format!("manifest is not valid JSON: {error}")))?;
    if manifest.name != remote {
        return Err(fetch_error(format!(
            "manifest declares itself as '{}'",
            manifest.name
        )));
    }
    Ok(manifest)
}

/// Container built from a manifest: negotiates the manifest's shared list on
/// init and serves one stub factory per listed export.
pub struct ManifestContainer {
    manifest: RemoteDescriptor,
}

impl ManifestContainer {
    pub fn new(manifest: RemoteDescriptor) -> Self {
        Self { manifest }
    }
}

impl RemoteContainer for ManifestContainer {
    fn init(
        &self,
        scope: Rc<RefCell<SharedScope>>,
    ) -> LocalBoxFuture<'static, Result<(), ContainerError>> {
        let result = {
            let mut scope = scope.borrow_mut();
            for dependency in &self.manifest.shared {
                scope.register(
                    &dependency.name,
                    dependency.version,
                    dependency.singleton,
                    &self.manifest.name,
                );
            }
            let mut result = Ok(());
            for dependency in &self.manifest.shared {
                if let Err(error) =
                    scope.resolve(&dependency.name, &dependency.requirement, &self.manifest.name)
                {
                    result = Err(ContainerError::InitFailed(error.to_string()));
                    break;
                }
            }
            result
        };
        future::ready(result).boxed_local()
    }

    fn get(
        &self,
        exposed: &str,
    ) -> LocalBoxFuture<'static, Result<ComponentFactory, ContainerError>> {
        let result = if self.manifest.exposes.iter().any(|name| name == exposed) {
            #[cfg(feature = "debug-loader")]
            eprintln!(
                "[LOADER] serving stub for '{}/{exposed}'",
                self.manifest.name
            );
            Ok(stub_factory())
        } else {
            Err(ContainerError::UnknownExport {
                exposed: exposed.to_owned(),
            })
        };
        future::ready(result).boxed_local()
    }
}

struct StubInstance;

impl ForeignInstance for StubInstance {
    fn update(&mut self, _props: &Props) {}

    fn destroy(&mut self) {}
}

fn stub_factory() -> ComponentFactory {
    Rc::new(|_anchor, _props| Ok(Box::new(StubInstance) as Box<dyn ForeignInstance>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Mounter;
    use crate::loader::Loader;
    use crate::registry::{RemoteRegistry, SharedDependency};
    use crate::version::{Version, VersionReq};

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fresco-{tag}-{}", ulid::Ulid::new()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn file_storage_round_trip() {
        let dir = scratch_dir("storage");
        let storage = FileStorage::new(&dir);

        storage.save("cart", r#"{"1":{"quantity":1}}"#).unwrap();
        assert_eq!(
            storage.load("cart").as_deref(),
            Some(r#"{"1":{"quantity":1}}"#)
        );

        storage.remove("cart").unwrap();
        assert_eq!(storage.load("cart"), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_storage_remove_of_absent_key_is_a_noop() {
        let dir = scratch_dir("storage-absent");
        let storage = FileStorage::new(&dir);
        assert!(storage.remove("never-saved").is_ok());
        let _ = fs::remove_dir_all(&dir);
    }

    fn write_manifest(dir: &PathBuf, manifest: &RemoteDescriptor) {
        let path = dir.join(format!("{}.remote.json", manifest.name));
        fs::write(path, serde_json::to_string_pretty(manifest).unwrap()).unwrap();
    }

    fn cart_manifest() -> RemoteDescriptor {
        RemoteDescriptor::new("cart", "http://localhost:8080/remoteEntry.js")
            .exposing("CartSummary")
            .sharing(
                SharedDependency::new("react", Version::new(18, 2, 0))
                    .singleton()
                    .requiring(VersionReq::parse("^18.0").unwrap()),
            )
    }

    fn registry_for(remote: &str) -> Rc<RemoteRegistry> {
        let mut registry = RemoteRegistry::new("shell");
        registry.add_remote(RemoteDescriptor::new(
            remote,
            format!("http://localhost:8080/{remote}.js"),
        ));
        Rc::new(registry)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn manifest_remote_resolves_and_mounts() {
        let dir = scratch_dir("manifests");
        write_manifest(&dir, &cart_manifest());

        let loader = Loader::new(registry_for("cart"), Rc::new(DirFetcher::new(&dir)));
        let factory = loader.resolve("cart", "CartSummary").await.unwrap();

        let mounter = Mounter::new();
        let anchor = HeadlessAnchor::new();
        let handle = mounter.mount(&factory, &anchor, &Props::new()).await.unwrap();
        assert!(mounter.is_mounted(handle));

        // The manifest's shared list reached the scope.
        assert_eq!(
            loader.scope().borrow().entry("react").unwrap().version,
            Version::new(18, 2, 0)
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_manifest_file_is_a_fetch_error() {
        let dir = scratch_dir("manifests-missing");
        let loader = Loader::new(registry_for("cart"), Rc::new(DirFetcher::new(&dir)));

        let error = loader.resolve("cart", "CartSummary").await.err().unwrap();
        assert!(matches!(error, LoadError::Fetch { remote, .. } if remote == "cart"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn manifest_with_a_foreign_name_is_rejected() {
        let dir = scratch_dir("manifests-mismatch");
        let mut manifest = cart_manifest();
        manifest.name = "basket".to_owned();
        // Stored under the expected file name but declaring another remote.
        fs::write(
            dir.join("cart.remote.json"),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();

        let loader = Loader::new(registry_for("cart"), Rc::new(DirFetcher::new(&dir)));
        let error = loader.resolve("cart", "CartSummary").await.err().unwrap();
        assert!(matches!(
            error,
            LoadError::Fetch { reason, .. } if reason.contains("basket")
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn manifest_export_gaps_surface_as_unknown_export() {
        let dir = scratch_dir("manifests-export");
        write_manifest(&dir, &cart_manifest());

        let loader = Loader::new(registry_for("cart"), Rc::new(DirFetcher::new(&dir)));
        let error = loader.resolve("cart", "Checkout").await.err().unwrap();
        assert_eq!(
            error,
            LoadError::UnknownExport {
                remote: "cart".to_owned(),
                exposed: "Checkout".to_owned(),
            }
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn incompatible_manifest_requirement_fails_init() {
        let dir = scratch_dir("manifests-incompat");
        let manifest = RemoteDescriptor::new("cart", "http://localhost:8080/remoteEntry.js")
            .exposing("CartSummary")
            .sharing(
                // Ships 4.x but demands 5.x: a broken manifest.
                SharedDependency::new("lodash", Version::new(4, 17, 21))
                    .requiring(VersionReq::parse("^5.0").unwrap()),
            );
        write_manifest(&dir, &manifest);

        let loader = Loader::new(registry_for("cart"), Rc::new(DirFetcher::new(&dir)));
        let error = loader.resolve("cart", "CartSummary").await.err().unwrap();
        assert!(matches!(
            error,
            LoadError::Container(ContainerError::InitFailed(_))
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
