//! The host's federation configuration: known remotes, shared libraries, and
//! locally exposed components.
//!
//! The serialized form is plain JSON so configurations can be checked in,
//! served, and diffed. Validation is fail-closed: a configuration that does
//! not pass [`RemoteRegistry::validate`] never reaches the loader.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::adapter::ComponentFactory;
use crate::loader::{LocalContainer, RemoteContainer};
use crate::version::{Version, VersionReq};

// --- Limits ---

pub const MAX_REMOTE_NAME_LEN: usize = 64;
pub const MAX_EXPOSED_NAME_LEN: usize = 128;
pub const MAX_MANIFEST_URL_LEN: usize = 2048;

// --- SharedDependency ---

/// One library a bundle ships and/or consumes through the shared scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDependency {
    pub name: String,
    pub version: Version,
    /// What this bundle needs from the winning copy. Defaults to `Any`,
    /// matching configurations that pin nothing.
    #[serde(default)]
    pub requirement: VersionReq,
    #[serde(default)]
    pub singleton: bool,
    /// Bundled into the initial load rather than fetched on demand.
    #[serde(default)]
    pub eager: bool,
}

impl SharedDependency {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            requirement: VersionReq::Any,
            singleton: false,
            eager: false,
        }
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn requiring(mut self, requirement: VersionReq) -> Self {
        self.requirement = requirement;
        self
    }
}

// --- RemoteDescriptor ---

/// Everything the host knows about one remote before loading it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub name: String,
    pub manifest_url: String,
    /// Advertised exports. An empty list defers entirely to the container.
    #[serde(default)]
    pub exposes: Vec<String>,
    #[serde(default)]
    pub shared: Vec<SharedDependency>,
}

impl RemoteDescriptor {
    pub fn new(name: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manifest_url: manifest_url.into(),
            exposes: Vec::new(),
            shared: Vec::new(),
        }
    }

    pub fn exposing(mut self, exposed: impl Into<String>) -> Self {
        self.exposes.push(exposed.into());
        self
    }

    pub fn sharing(mut self, dependency: SharedDependency) -> Self {
        self.shared.push(dependency);
        self
    }

    /// Whether the descriptor claims to export `exposed`. An empty `exposes`
    /// list advertises nothing either way, so everything passes.
    pub fn advertises(&self, exposed: &str) -> bool {
        self.exposes.is_empty() || self.exposes.iter().any(|name| name == exposed)
    }
}

// --- Errors ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Parse(String),
    EmptyHostName,
    InvalidName { owner: String, name: String },
    NameMismatch { key: String, name: String },
    InvalidManifestUrl { remote: String },
    InvalidExposedName { remote: String, exposed: String },
    DuplicateSharedLibrary { owner: String, library: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Parse(reason) => {
                write!(f, "registry configuration is not valid JSON: {reason}")
            }
            RegistryError::EmptyHostName => write!(f, "host name is empty"),
            RegistryError::InvalidName { owner, name } => {
                write!(f, "'{owner}' declares invalid name '{name}'")
            }
            RegistryError::NameMismatch { key, name } => write!(
                f,
                "remote registered under '{key}' declares itself as '{name}'"
            ),
            RegistryError::InvalidManifestUrl { remote } => {
                write!(f, "remote '{remote}' has an empty or oversized manifest url")
            }
            RegistryError::InvalidExposedName { remote, exposed } => {
                write!(f, "remote '{remote}' exposes invalid name '{exposed}'")
            }
            RegistryError::DuplicateSharedLibrary { owner, library } => {
                write!(f, "'{owner}' shares '{library}' twice")
            }
        }
    }
}

// --- RemoteRegistry ---

/// Host-side table of remotes and shared libraries, plus the component
/// factories the host itself exposes (runtime-only, never serialized).
#[derive(Default, Serialize, Deserialize)]
pub struct RemoteRegistry {
    host: String,
    #[serde(default)]
    shared: Vec<SharedDependency>,
    #[serde(default)]
    remotes: BTreeMap<String, RemoteDescriptor>,
    #[serde(skip)]
    exposed: RefCell<BTreeMap<String, ComponentFactory>>,
}

impl RemoteRegistry {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn add_shared(&mut self, dependency: SharedDependency) {
        self.shared.push(dependency);
    }

    pub fn shared(&self) -> &[SharedDependency] {
        &self.shared
    }

    /// Register a remote under its own declared name.
    pub fn add_remote(&mut self, descriptor: RemoteDescriptor) {
        self.remotes.insert(descriptor.name.clone(), descriptor);
    }

    pub fn remote(&self, name: &str) -> Option<&RemoteDescriptor> {
        self.remotes.get(name)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &RemoteDescriptor> {
        self.remotes.values()
    }

    /// Expose a component under `name` for other bundles to consume through
    /// [`RemoteRegistry::local_container`].
    pub fn declare_exposed(&self, name: impl Into<String>, factory: ComponentFactory) {
        self.exposed.borrow_mut().insert(name.into(), factory);
    }

    pub fn exposed_factory(&self, name: &str) -> Option<ComponentFactory> {
        self.exposed.borrow().get(name).cloned()
    }

    /// The host's own exposed components behind the standard container
    /// protocol, so the host can be consumed like any remote.
    pub fn local_container(&self) -> Rc<dyn RemoteContainer> {
        let mut container = LocalContainer::new();
        for (name, factory) in self.exposed.borrow().iter() {
            container = container.expose(name.clone(), factory.clone());
        }
        Rc::new(container)
    }

    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let registry: Self =
            serde_json::from_str(text).map_err(|error| RegistryError::Parse(error.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn to_json(&self) -> Result<String, RegistryError> {
        serde_json::to_string_pretty(self).map_err(|error| RegistryError::Parse(error.to_string()))
    }

    /// Check names, urls, and shared lists against the registry limits.
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.host.trim().is_empty() {
            return Err(RegistryError::EmptyHostName);
        }
        if !valid_bundle_name(&self.host) {
            return Err(RegistryError::InvalidName {
                owner: "host".to_owned(),
                name: self.host.clone(),
            });
        }
        validate_shared_list(&self.host, &self.shared)?;

        for (key, descriptor) in &self.remotes {
            if key != &descriptor.name {
                return Err(RegistryError::NameMismatch {
                    key: key.clone(),
                    name: descriptor.name.clone(),
                });
            }
            if !valid_bundle_name(&descriptor.name) {
                return Err(RegistryError::InvalidName {
                    owner: "remotes".to_owned(),
                    name: descriptor.name.clone(),
                });
            }
            if descriptor.manifest_url.is_empty()
                || descriptor.manifest_url.len() > MAX_MANIFEST_URL_LEN
            {
                return Err(RegistryError::InvalidManifestUrl {
                    remote: descriptor.name.clone(),
                });
            }
            for exposed in &descriptor.exposes {
                if !valid_exposed_name(exposed) {
                    return Err(RegistryError::InvalidExposedName {
                        remote: descriptor.name.clone(),
                        exposed: exposed.clone(),
                    });
                }
            }
            validate_shared_list(&descriptor.name, &descriptor.shared)?;
        }
        Ok(())
    }
}

fn validate_shared_list(
    owner: &str,
    shared: &[SharedDependency],
) -> Result<(), RegistryError> {
    let mut seen = BTreeMap::new();
    for dependency in shared {
        if !valid_library_name(&dependency.name) {
            return Err(RegistryError::InvalidName {
                owner: owner.to_owned(),
                name: dependency.name.clone(),
            });
        }
        if seen.insert(dependency.name.as_str(), ()).is_some() {
            return Err(RegistryError::DuplicateSharedLibrary {
                owner: owner.to_owned(),
                library: dependency.name.clone(),
            });
        }
    }
    Ok(())
}

fn valid_bundle_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_REMOTE_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn valid_exposed_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_EXPOSED_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
}

// Package names additionally allow npm scopes ("@scope/name").
fn valid_library_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_EXPOSED_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '@'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> RemoteRegistry {
        let mut registry = RemoteRegistry::new("shell");
        registry.add_shared(
            SharedDependency::new("react", Version::new(18, 2, 0))
                .singleton()
                .requiring(VersionReq::parse("^18.0").unwrap()),
        );
        registry.add_remote(
            RemoteDescriptor::new("cart", "http://localhost:8080/remoteEntry.js")
                .exposing("CartSummary")
                .exposing("CartPage")
                .sharing(SharedDependency::new("react", Version::new(18, 2, 0)).singleton()),
        );
        registry
    }

    #[test]
    fn json_round_trip_preserves_the_configuration() {
        let registry = sample_registry();
        let text = registry.to_json().unwrap();
        let reloaded = RemoteRegistry::from_json(&text).unwrap();

        assert_eq!(reloaded.host(), "shell");
        assert_eq!(reloaded.shared(), registry.shared());
        assert_eq!(
            reloaded.remote("cart").unwrap(),
            registry.remote("cart").unwrap()
        );
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let registry = RemoteRegistry::from_json(
            r#"{
                "host": "shell",
                "remotes": {
                    "cart": { "name": "cart", "manifest_url": "http://localhost:8080/remoteEntry.js" }
                }
            }"#,
        )
        .unwrap();

        let cart = registry.remote("cart").unwrap();
        assert!(cart.exposes.is_empty());
        assert!(cart.shared.is_empty());
        assert!(cart.advertises("anything"));
    }

    #[test]
    fn advertised_exports_are_checked_when_present() {
        let registry = sample_registry();
        let cart = registry.remote("cart").unwrap();
        assert!(cart.advertises("CartSummary"));
        assert!(!cart.advertises("Checkout"));
    }

    #[test]
    fn mismatched_remote_key_is_rejected() {
        let error = RemoteRegistry::from_json(
            r#"{
                "host": "shell",
                "remotes": {
                    "cart": { "name": "basket", "manifest_url": "http://localhost:8080/x.js" }
                }
            }"#,
        )
        .err()
        .unwrap();
        assert_eq!(
            error,
            RegistryError::NameMismatch {
                key: "cart".to_owned(),
                name: "basket".to_owned(),
            }
        );
    }

    #[test]
    fn bad_remote_name_is_rejected() {
        let mut registry = RemoteRegistry::new("shell");
        registry.add_remote(RemoteDescriptor::new("cart widgets", "http://x/remoteEntry.js"));
        assert!(matches!(
            registry.validate().unwrap_err(),
            RegistryError::InvalidName { name, .. } if name == "cart widgets"
        ));
    }

    #[test]
    fn empty_manifest_url_is_rejected() {
        let mut registry = RemoteRegistry::new("shell");
        registry.add_remote(RemoteDescriptor::new("cart", ""));
        assert_eq!(
            registry.validate().unwrap_err(),
            RegistryError::InvalidManifestUrl {
                remote: "cart".to_owned(),
            }
        );
    }

    #[test]
    fn duplicate_shared_library_is_rejected() {
        let mut registry = RemoteRegistry::new("shell");
        registry.add_shared(SharedDependency::new("react", Version::new(18, 2, 0)));
        registry.add_shared(SharedDependency::new("react", Version::new(17, 0, 2)));
        assert_eq!(
            registry.validate().unwrap_err(),
            RegistryError::DuplicateSharedLibrary {
                owner: "shell".to_owned(),
                library: "react".to_owned(),
            }
        );
    }

    #[test]
    fn scoped_package_names_are_accepted() {
        let mut registry = RemoteRegistry::new("shell");
        registry.add_shared(SharedDependency::new(
            "@acme/design-system",
            Version::new(2, 1, 0),
        ));
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn declared_exports_are_retrievable() {
        let registry = RemoteRegistry::new("shell");
        let factory: ComponentFactory = Rc::new(|_, _| {
            Err(crate::adapter::MountError::FactoryFailed("test".into()))
        });
        registry.declare_exposed("Header", factory);

        assert!(registry.exposed_factory("Header").is_some());
        assert!(registry.exposed_factory("Footer").is_none());
    }
}
