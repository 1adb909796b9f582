//! Fetching remote containers and resolving exposed components out of them.
//!
//! A container is fetched at most once per page lifetime. Concurrent
//! resolves piggyback on one in-flight fetch through a shared future; a
//! failed fetch is evicted once observed so a later attempt can retry.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture, Shared};

use crate::adapter::ComponentFactory;
use crate::registry::{RemoteDescriptor, RemoteRegistry};
use crate::shared_scope::{ScopeError, SharedScope};

// --- Container protocol ---

/// A loaded remote bundle behind the standard two-call protocol: `init`
/// wires the shared scope, `get` hands out component factories.
///
/// Both calls are async because real containers cross a language boundary.
/// Implementations must not hold a borrow of the scope across an await.
pub trait RemoteContainer {
    fn init(
        &self,
        scope: Rc<RefCell<SharedScope>>,
    ) -> LocalBoxFuture<'static, Result<(), ContainerError>>;

    fn get(
        &self,
        exposed: &str,
    ) -> LocalBoxFuture<'static, Result<ComponentFactory, ContainerError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    UnknownExport { exposed: String },
    InitFailed(String),
}

impl std::fmt::Display for ContainerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerError::UnknownExport { exposed } => {
                write!(f, "container does not expose '{exposed}'")
            }
            ContainerError::InitFailed(reason) => {
                write!(f, "container init failed: {reason}")
            }
        }
    }
}

/// Transport that turns a descriptor into a live container. Script tags in
/// the browser, manifest files natively, fixed maps in tests.
pub trait ContainerFetcher {
    fn fetch(
        &self,
        descriptor: &RemoteDescriptor,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn RemoteContainer>, LoadError>>;
}

// --- Errors ---

#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    UnknownRemote { remote: String },
    UnknownExport { remote: String, exposed: String },
    Fetch { remote: String, reason: String },
    Container(ContainerError),
    Scope(ScopeError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::UnknownRemote { remote } => write!(f, "unknown remote '{remote}'"),
            LoadError::UnknownExport { remote, exposed } => {
                write!(f, "remote '{remote}' does not expose '{exposed}'")
            }
            LoadError::Fetch { remote, reason } => {
                write!(f, "failed to fetch remote '{remote}': {reason}")
            }
            LoadError::Container(error) => write!(f, "{error}"),
            LoadError::Scope(error) => {
                write!(f, "shared scope rejected the load: {error}")
            }
        }
    }
}

impl From<ContainerError> for LoadError {
    fn from(error: ContainerError) -> Self {
        LoadError::Container(error)
    }
}

impl From<ScopeError> for LoadError {
    fn from(error: ScopeError) -> Self {
        LoadError::Scope(error)
    }
}

// --- Loader ---

type ContainerFuture = Shared<LocalBoxFuture<'static, Result<Rc<dyn RemoteContainer>, LoadError>>>;

struct CachedContainer {
    epoch: u64,
    future: ContainerFuture,
}

/// Resolves `remote/exposed` pairs to component factories.
///
/// # Usage
///
/// ```ignore
/// let loader = Loader::new(registry, Rc::new(fetcher));
/// let factory = loader.resolve("cart", "CartSummary").await?;
/// let handle = mounter.mount(&factory, &anchor, &props).await?;
/// ```
pub struct Loader {
    registry: Rc<RemoteRegistry>,
    fetcher: Rc<dyn ContainerFetcher>,
    scope: Rc<RefCell<SharedScope>>,
    containers: RefCell<HashMap<String, CachedContainer>>,
    next_epoch: Cell<u64>,
}

impl Loader {
    /// Build a loader and seed the shared scope with the host's libraries.
    /// The host registers before any remote loads, so it wins singletons.
    pub fn new(registry: Rc<RemoteRegistry>, fetcher: Rc<dyn ContainerFetcher>) -> Self {
        let mut scope = SharedScope::new();
        for dependency in registry.shared() {
            scope.register(
                &dependency.name,
                dependency.version,
                dependency.singleton,
                registry.host(),
            );
        }
        Self {
            registry,
            fetcher,
            scope: Rc::new(RefCell::new(scope)),
            containers: RefCell::new(HashMap::new()),
            next_epoch: Cell::new(0),
        }
    }

    pub fn registry(&self) -> &RemoteRegistry {
        &self.registry
    }

    pub fn scope(&self) -> &Rc<RefCell<SharedScope>> {
        &self.scope
    }

    /// Resolve an exposed component out of a remote.
    ///
    /// Unknown remotes and exports the descriptor disclaims fail before any
    /// fetch. The container itself stays the source of truth for exports the
    /// descriptor does not advertise.
    pub async fn resolve(
        &self,
        remote: &str,
        exposed: &str,
    ) -> Result<ComponentFactory, LoadError> {
        let Some(descriptor) = self.registry.remote(remote) else {
            return Err(LoadError::UnknownRemote {
                remote: remote.to_owned(),
            });
        };
        if !descriptor.advertises(exposed) {
            return Err(LoadError::UnknownExport {
                remote: remote.to_owned(),
                exposed: exposed.to_owned(),
            });
        }

        let (epoch, future) = self.container_future(descriptor);
        let container = match future.await {
            Ok(container) => container,
            Err(error) => {
                self.evict(remote, epoch);
                return Err(error);
            }
        };

        match container.get(exposed).await {
            Ok(factory) => Ok(factory),
            Err(ContainerError::UnknownExport { exposed }) => Err(LoadError::UnknownExport {
                remote: remote.to_owned(),
                exposed,
            }),
            Err(error) => Err(LoadError::Container(error)),
        }
    }

    pub fn is_cached(&self, remote: &str) -> bool {
        self.containers.borrow().contains_key(remote)
    }

    fn container_future(&self, descriptor: &RemoteDescriptor) -> (u64, ContainerFuture) {
        let mut containers = self.containers.borrow_mut();
        if let Some(cached) = containers.get(&descriptor.name) {
            return (cached.epoch, cached.future.clone());
        }

        let epoch = self.next_epoch.get() + 1;
        self.next_epoch.set(epoch);
        #[cfg(feature = "debug-loader")]
        eprintln!(
            "[LOADER] fetching '{}' from {}",
            descriptor.name, descriptor.manifest_url
        );
        let future = self
            .load_container(descriptor.clone())
            .boxed_local()
            .shared();
        containers.insert(
            descriptor.name.clone(),
            CachedContainer {
                epoch,
                future: future.clone(),
            },
        );
        (epoch, future)
    }

    fn load_container(
        &self,
        descriptor: RemoteDescriptor,
    ) -> impl Future<Output = Result<Rc<dyn RemoteContainer>, LoadError>> + 'static {
        let fetcher = self.fetcher.clone();
        let scope = self.scope.clone();
        async move {
            let container = fetcher.fetch(&descriptor).await?;
            negotiate(&scope, &descriptor)?;
            container
                .init(scope.clone())
                .await
                .map_err(LoadError::Container)?;
            Ok(container)
        }
    }

    /// Drop a failed container future so a later attempt refetches. The
    /// epoch check keeps a slow observer of an old failure from discarding
    /// a newer attempt.
    fn evict(&self, remote: &str, epoch: u64) {
        let mut containers = self.containers.borrow_mut();
        if containers
            .get(remote)
            .is_some_and(|cached| cached.epoch == epoch)
        {
            containers.remove(remote);
            #[cfg(feature = "debug-loader")]
            eprintln!("[LOADER] evicted failed container '{remote}'");
        }
    }
}

/// Offer the remote's library copies to the scope, then check its
/// requirements against the winning copies.
fn negotiate(
    scope: &Rc<RefCell<SharedScope>>,
    descriptor: &RemoteDescriptor,
) -> Result<(), LoadError> {
    let mut scope = scope.borrow_mut();
    for dependency in &descriptor.shared {
        scope.register(
            &dependency.name,
            dependency.version,
            dependency.singleton,
            &descriptor.name,
        );
    }
    for dependency in &descriptor.shared {
        scope.resolve(&dependency.name, &dependency.requirement, &descriptor.name)?;
    }
    Ok(())
}

// --- In-process containers ---

/// A container backed by a plain factory map. Remotes living in the same
/// binary (and tests) use this instead of a wire transport.
#[derive(Default)]
pub struct LocalContainer {
    exposed: BTreeMap<String, ComponentFactory>,
}

impl LocalContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expose(mut self, name: impl Into<String>, factory: ComponentFactory) -> Self {
        self.exposed.insert(name.into(), factory);
        self
    }
}

impl RemoteContainer for LocalContainer {
    fn init(
        &self,
        _scope: Rc<RefCell<SharedScope>>,
    ) -> LocalBoxFuture<'static, Result<(), ContainerError>> {
        future::ready(Ok(())).boxed_local()
    }

    fn get(
        &self,
        exposed: &str,
    ) -> LocalBoxFuture<'static, Result<ComponentFactory, ContainerError>> {
        let result = match self.exposed.get(exposed) {
            Some(factory) => Ok(factory.clone()),
            None => Err(ContainerError::UnknownExport {
                exposed: exposed.to_owned(),
            }),
        };
        future::ready(result).boxed_local()
    }
}

/// Serves pre-built containers from a fixed map.
#[derive(Default)]
pub struct StaticFetcher {
    containers: RefCell<HashMap<String, Rc<dyn RemoteContainer>>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide(&self, remote: impl Into<String>, container: Rc<dyn RemoteContainer>) {
        self.containers.borrow_mut().insert(remote.into(), container);
    }
}

impl ContainerFetcher for StaticFetcher {
    fn fetch(
        &self,
        descriptor: &RemoteDescriptor,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn RemoteContainer>, LoadError>> {
        let result = match self.containers.borrow().get(&descriptor.name) {
            Some(container) => Ok(container.clone()),
            None => Err(LoadError::Fetch {
                remote: descriptor.name.clone(),
                reason: "no container provided under that name".to_owned(),
            }),
        };
        future::ready(result).boxed_local()
    }
}
