//! Tests for one-fetch-per-remote behavior across a whole page lifetime.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fresco::adapter::{ComponentFactory, ForeignInstance, Mounter, Props};
use fresco::loader::{
    ContainerFetcher, LoadError, Loader, LocalContainer, RemoteContainer,
};
use fresco::platform::native::HeadlessAnchor;
use fresco::registry::{RemoteDescriptor, RemoteRegistry};
use fresco::version::Version;
use futures_channel::oneshot;
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;

struct NullInstance;

impl ForeignInstance for NullInstance {
    fn update(&mut self, _props: &Props) {}
    fn destroy(&mut self) {}
}

fn null_factory() -> ComponentFactory {
    Rc::new(|_, _| Ok(Box::new(NullInstance) as Box<dyn ForeignInstance>))
}

fn cart_container() -> Rc<dyn RemoteContainer> {
    Rc::new(
        LocalContainer::new()
            .expose("CartSummary", null_factory())
            .expose("CartPage", null_factory()),
    )
}

/// Counts fetches; the first batch waits on a gate so resolves can overlap.
struct InstrumentedFetcher {
    container: Rc<dyn RemoteContainer>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
    fetches: Cell<usize>,
}

impl ContainerFetcher for InstrumentedFetcher {
    fn fetch(
        &self,
        _descriptor: &RemoteDescriptor,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn RemoteContainer>, LoadError>> {
        self.fetches.set(self.fetches.get() + 1);
        let gate = self.gate.borrow_mut().take();
        let container = self.container.clone();
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(container)
        }
        .boxed_local()
    }
}

fn storefront_registry() -> RemoteRegistry {
    RemoteRegistry::from_json(
        r#"{
            "host": "shell",
            "shared": [
                { "name": "react", "version": "18.2.0", "requirement": "^18.0", "singleton": true }
            ],
            "remotes": {
                "cart": {
                    "name": "cart",
                    "manifest_url": "http://localhost:8080/remoteEntry.js",
                    "exposes": ["CartSummary", "CartPage"],
                    "shared": [
                        { "name": "react", "version": "18.2.0", "requirement": "^18.0", "singleton": true }
                    ]
                }
            }
        }"#,
    )
    .unwrap()
}

#[tokio::test(flavor = "current_thread")]
async fn overlapping_resolves_share_one_container_fetch() {
    let (release, gate) = oneshot::channel();
    let fetcher = Rc::new(InstrumentedFetcher {
        container: cart_container(),
        gate: RefCell::new(Some(gate)),
        fetches: Cell::new(0),
    });
    let loader = Loader::new(Rc::new(storefront_registry()), fetcher.clone());

    // Header badge and routed page ask for different exports at once.
    let (summary, page, ()) = futures_util::join!(
        loader.resolve("cart", "CartSummary"),
        loader.resolve("cart", "CartPage"),
        async {
            let _ = release.send(());
        },
    );

    assert!(summary.is_ok());
    assert!(page.is_ok());
    assert_eq!(fetcher.fetches.get(), 1);

    // Later resolves reuse the same container.
    loader.resolve("cart", "CartSummary").await.unwrap();
    assert_eq!(fetcher.fetches.get(), 1);

    // The host won the singleton slot and the remote's requirement matched.
    let scope = loader.scope().borrow();
    let react = scope.entry("react").unwrap();
    assert_eq!(react.version, Version::new(18, 2, 0));
    assert_eq!(react.provider, "shell");
    assert!(scope.warnings().is_empty());
}

/// Fails the first fetch, then serves the container.
struct FlakyFetcher {
    container: Rc<dyn RemoteContainer>,
    fetches: Cell<usize>,
}

impl ContainerFetcher for FlakyFetcher {
    fn fetch(
        &self,
        descriptor: &RemoteDescriptor,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn RemoteContainer>, LoadError>> {
        self.fetches.set(self.fetches.get() + 1);
        let result = if self.fetches.get() == 1 {
            Err(LoadError::Fetch {
                remote: descriptor.name.clone(),
                reason: "connection refused".to_owned(),
            })
        } else {
            Ok(self.container.clone())
        };
        futures_util::future::ready(result).boxed_local()
    }
}

#[tokio::test(flavor = "current_thread")]
async fn a_failed_remote_is_refetched_and_then_mounts() {
    let fetcher = Rc::new(FlakyFetcher {
        container: cart_container(),
        fetches: Cell::new(0),
    });
    let loader = Loader::new(Rc::new(storefront_registry()), fetcher.clone());

    assert!(loader.resolve("cart", "CartPage").await.is_err());
    assert!(!loader.is_cached("cart"));

    let factory = loader.resolve("cart", "CartPage").await.unwrap();
    assert_eq!(fetcher.fetches.get(), 2);
    assert!(loader.is_cached("cart"));

    // The recovered factory is a working one.
    let mounter = Mounter::new();
    let anchor = HeadlessAnchor::new();
    let handle = mounter
        .mount(&factory, &anchor, &Props::new())
        .await
        .unwrap();
    assert!(mounter.is_mounted(handle));
}
