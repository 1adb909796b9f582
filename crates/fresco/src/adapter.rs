//! Mounting foreign components onto host-owned anchors.
//!
//! Remote bundles hand the host opaque factories; the host hands them an
//! anchor to render into. The [`Mounter`] enforces the lifecycle contract:
//! at most one live instance per anchor, every retired instance destroyed
//! exactly once, stale handles ignored.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

// --- Props ---

/// Untyped key/value props passed to a foreign component.
///
/// Foreign components take JSON-shaped props; a `BTreeMap` keeps the encoded
/// form deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Props(BTreeMap<String, Value>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    #[allow(dead_code)]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

// --- Anchors ---

/// Stable identity of a mount point, kept across remounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(Ulid);

impl AnchorId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A host-owned slot a foreign component renders into.
///
/// One `Anchor` value represents one slot for its whole lifetime; its id must
/// not change across remounts.
pub trait Anchor {
    fn anchor_id(&self) -> AnchorId;
    /// Whether the slot is currently attached to the live surface. Mounting
    /// waits briefly for attachment and fails if it never happens.
    fn is_attached(&self) -> bool;
}

// --- Foreign instances ---

/// A live foreign component instance.
pub trait ForeignInstance {
    /// Push a new props snapshot into the running instance.
    fn update(&mut self, props: &Props);
    /// Tear the instance down. Called exactly once, after which the instance
    /// is discarded.
    fn destroy(&mut self);
}

/// Creates one instance inside the given anchor.
pub type ComponentFactory =
    Rc<dyn Fn(&dyn Anchor, &Props) -> Result<Box<dyn ForeignInstance>, MountError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    /// The anchor never attached within the mount wait.
    AnchorDetached,
    /// The factory refused to produce an instance.
    FactoryFailed(String),
}

impl std::fmt::Display for MountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountError::AnchorDetached => write!(f, "anchor is not attached"),
            MountError::FactoryFailed(reason) => {
                write!(f, "component factory failed: {reason}")
            }
        }
    }
}

// --- Mounter ---

/// Mount attempts yield this many times waiting for the anchor to attach
/// before giving up.
const ATTACH_RETRY_LIMIT: usize = 16;

/// Ticket for a specific mount. Sequence numbers make retired tickets inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountHandle {
    anchor: AnchorId,
    seq: u64,
}

impl MountHandle {
    pub fn anchor(&self) -> AnchorId {
        self.anchor
    }
}

struct LiveMount {
    seq: u64,
    instance: Box<dyn ForeignInstance>,
}

/// Tracks live foreign instances per anchor.
///
/// # Usage
///
/// ```ignore
/// let mounter = Rc::new(Mounter::new());
/// let handle = mounter.mount(&factory, &anchor, &props).await?;
/// mounter.update_props(handle, &new_props);
/// mounter.unmount(handle);
/// ```
#[derive(Default)]
pub struct Mounter {
    live: RefCell<HashMap<AnchorId, LiveMount>>,
    next_seq: Cell<u64>,
}

impl Mounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount an instance into the anchor, replacing whatever was there.
    ///
    /// Waits for the anchor to attach by yielding the turn up to a bounded
    /// number of times. The previous instance (if any) is destroyed before
    /// the factory runs, so the slot never holds two instances at once.
    pub async fn mount(
        &self,
        factory: &ComponentFactory,
        anchor: &dyn Anchor,
        props: &Props,
    ) -> Result<MountHandle, MountError> {
        let mut retries = ATTACH_RETRY_LIMIT;
        while !anchor.is_attached() {
            if retries == 0 {
                return Err(MountError::AnchorDetached);
            }
            retries -= 1;
            yield_now().await;
        }

        let anchor_id = anchor.anchor_id();
        if let Some(mut previous) = self.live.borrow_mut().remove(&anchor_id) {
            previous.instance.destroy();
        }

        let instance = factory(anchor, props)?;
        let seq = self.next_seq.get() + 1;
        self.next_seq.set(seq);
        self.live
            .borrow_mut()
            .insert(anchor_id, LiveMount { seq, instance });
        Ok(MountHandle {
            anchor: anchor_id,
            seq,
        })
    }

    /// Mount and get a guard that unmounts on drop.
    pub async fn mount_scoped(
        self: &Rc<Self>,
        factory: &ComponentFactory,
        anchor: &dyn Anchor,
        props: &Props,
    ) -> Result<MountGuard, MountError> {
        let handle = self.mount(factory, anchor, props).await?;
        Ok(MountGuard {
            mounter: Rc::downgrade(self),
            handle,
        })
    }

    /// Destroy the instance the handle refers to. A handle made stale by a
    /// later mount, or already unmounted, does nothing.
    pub fn unmount(&self, handle: MountHandle) {
        let removed = {
            let mut live = self.live.borrow_mut();
            match live.get(&handle.anchor) {
                Some(mount) if mount.seq == handle.seq => live.remove(&handle.anchor),
                _ => None,
            }
        };
        if let Some(mut mount) = removed {
            mount.instance.destroy();
        }
    }

    /// Push props into the live instance. Returns `false` for stale handles.
    pub fn update_props(&self, handle: MountHandle, props: &Props) -> bool {
        let mut live = self.live.borrow_mut();
        match live.get_mut(&handle.anchor) {
            Some(mount) if mount.seq == handle.seq => {
                mount.instance.update(props);
                true
            }
            _ => false,
        }
    }

    pub fn is_mounted(&self, handle: MountHandle) -> bool {
        self.live
            .borrow()
            .get(&handle.anchor)
            .is_some_and(|mount| mount.seq == handle.seq)
    }

    #[allow(dead_code)]
    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }
}

impl Drop for Mounter {
    fn drop(&mut self) {
        for (_, mut mount) in self.live.borrow_mut().drain() {
            mount.instance.destroy();
        }
    }
}

// --- MountGuard ---

/// Keeps a mount alive for a scope.
#[must_use = "dropping a MountGuard immediately unmounts the instance"]
pub struct MountGuard {
    mounter: Weak<Mounter>,
    handle: MountHandle,
}

impl MountGuard {
    pub fn handle(&self) -> MountHandle {
        self.handle
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if let Some(mounter) = self.mounter.upgrade() {
            mounter.unmount(self.handle);
        }
    }
}

// --- Yielding ---

/// Hands the turn back to the executor once, so attach checks do not spin.
fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            context.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestAnchor {
        id: AnchorId,
        attached: Cell<bool>,
    }

    impl TestAnchor {
        fn attached() -> Self {
            Self {
                id: AnchorId::new(),
                attached: Cell::new(true),
            }
        }

        fn detached() -> Self {
            Self {
                id: AnchorId::new(),
                attached: Cell::new(false),
            }
        }

        fn attach(&self) {
            self.attached.set(true);
        }
    }

    impl Anchor for TestAnchor {
        fn anchor_id(&self) -> AnchorId {
            self.id
        }

        fn is_attached(&self) -> bool {
            self.attached.get()
        }
    }

    struct RecordingInstance {
        label: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl ForeignInstance for RecordingInstance {
        fn update(&mut self, props: &Props) {
            let keys: Vec<&str> = props.iter().map(|(key, _)| key).collect();
            self.log
                .borrow_mut()
                .push(format!("{} update {}", self.label, keys.join(",")));
        }

        fn destroy(&mut self) {
            self.log.borrow_mut().push(format!("{} destroy", self.label));
        }
    }

    fn recording_factory(
        label: &'static str,
        log: &Rc<RefCell<Vec<String>>>,
    ) -> ComponentFactory {
        let log = log.clone();
        Rc::new(move |_anchor, _props| {
            log.borrow_mut().push(format!("{label} create"));
            Ok(Box::new(RecordingInstance {
                label,
                log: log.clone(),
            }) as Box<dyn ForeignInstance>)
        })
    }

    #[tokio::test(flavor = "current_thread")]
    async fn mount_creates_a_single_live_instance() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mounter = Mounter::new();
        let anchor = TestAnchor::attached();

        let handle = mounter
            .mount(&recording_factory("cart", &log), &anchor, &Props::new())
            .await
            .unwrap();

        assert!(mounter.is_mounted(handle));
        assert_eq!(*log.borrow(), vec!["cart create"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn remount_destroys_the_previous_instance_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mounter = Mounter::new();
        let anchor = TestAnchor::attached();

        let first = mounter
            .mount(&recording_factory("a", &log), &anchor, &Props::new())
            .await
            .unwrap();
        let second = mounter
            .mount(&recording_factory("b", &log), &anchor, &Props::new())
            .await
            .unwrap();

        assert!(!mounter.is_mounted(first));
        assert!(mounter.is_mounted(second));
        assert_eq!(*log.borrow(), vec!["a create", "a destroy", "b create"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unmount_destroys_once_and_repeats_are_inert() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mounter = Mounter::new();
        let anchor = TestAnchor::attached();

        let handle = mounter
            .mount(&recording_factory("cart", &log), &anchor, &Props::new())
            .await
            .unwrap();
        mounter.unmount(handle);
        mounter.unmount(handle);

        assert_eq!(*log.borrow(), vec!["cart create", "cart destroy"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stale_handle_cannot_touch_the_replacement() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mounter = Mounter::new();
        let anchor = TestAnchor::attached();

        let first = mounter
            .mount(&recording_factory("a", &log), &anchor, &Props::new())
            .await
            .unwrap();
        let second = mounter
            .mount(&recording_factory("b", &log), &anchor, &Props::new())
            .await
            .unwrap();

        mounter.unmount(first);
        assert!(!mounter.update_props(first, &Props::new()));
        assert!(mounter.is_mounted(second));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn mounting_on_a_detached_anchor_fails() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mounter = Mounter::new();
        let anchor = TestAnchor::detached();

        let error = mounter
            .mount(&recording_factory("cart", &log), &anchor, &Props::new())
            .await
            .unwrap_err();

        assert_eq!(error, MountError::AnchorDetached);
        assert!(log.borrow().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn mount_waits_for_a_late_attaching_anchor() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mounter = Mounter::new();
        let anchor = TestAnchor::detached();

        let (handle, ()) = futures_util::join!(
            async {
                mounter
                    .mount(&recording_factory("cart", &log), &anchor, &Props::new())
                    .await
                    .unwrap()
            },
            async { anchor.attach() },
        );

        assert!(mounter.is_mounted(handle));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn factory_failure_surfaces_and_leaves_the_anchor_empty() {
        let mounter = Mounter::new();
        let anchor = TestAnchor::attached();
        let factory: ComponentFactory =
            Rc::new(|_, _| Err(MountError::FactoryFailed("no export".into())));

        let error = mounter.mount(&factory, &anchor, &Props::new()).await.unwrap_err();

        assert_eq!(error, MountError::FactoryFailed("no export".into()));
        assert_eq!(mounter.live_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn update_props_reaches_the_live_instance() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mounter = Mounter::new();
        let anchor = TestAnchor::attached();

        let handle = mounter
            .mount(&recording_factory("cart", &log), &anchor, &Props::new())
            .await
            .unwrap();
        let updated = mounter.update_props(handle, &Props::new().with("open", true));

        assert!(updated);
        assert_eq!(*log.borrow(), vec!["cart create", "cart update open"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn guard_drop_unmounts() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mounter = Rc::new(Mounter::new());
        let anchor = TestAnchor::attached();

        let guard = mounter
            .mount_scoped(&recording_factory("cart", &log), &anchor, &Props::new())
            .await
            .unwrap();
        let handle = guard.handle();
        drop(guard);

        assert!(!mounter.is_mounted(handle));
        assert_eq!(*log.borrow(), vec!["cart create", "cart destroy"]);
    }
}
