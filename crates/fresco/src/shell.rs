//! Route-level orchestration: resolve the target, mount it, and discard
//! outcomes that a newer navigation has already overtaken.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::adapter::{Anchor, MountError, MountGuard, Mounter, Props};
use crate::loader::{LoadError, Loader};

// --- Route types ---

/// Where a route's content comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTarget {
    pub remote: String,
    pub exposed: String,
    pub props: Props,
}

impl RouteTarget {
    pub fn new(remote: impl Into<String>, exposed: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            exposed: exposed.into(),
            props: Props::new(),
        }
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteError {
    Load(LoadError),
    Mount(MountError),
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::Load(error) => write!(f, "failed to load route content: {error}"),
            RouteError::Mount(error) => write!(f, "failed to mount route content: {error}"),
        }
    }
}

/// Observable lifecycle of the routed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePhase {
    Idle,
    Resolving,
    Mounted,
    Failed,
}

/// What one navigation call amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Mounted,
    /// A newer navigation started while this one was in flight; its work
    /// was discarded.
    Superseded,
    Failed(RouteError),
}

enum RouteState {
    Idle,
    Resolving,
    Mounted { guard: MountGuard },
    Failed { error: RouteError },
}

// --- Shell ---

/// Drives one routed slot: each navigation resolves a remote component and
/// swaps it into the anchor, with stale navigations losing to newer ones.
pub struct Shell {
    loader: Rc<Loader>,
    mounter: Rc<Mounter>,
    state: RefCell<RouteState>,
    epoch: Cell<u64>,
    target: RefCell<Option<RouteTarget>>,
}

impl Shell {
    pub fn new(loader: Rc<Loader>, mounter: Rc<Mounter>) -> Self {
        Self {
            loader,
            mounter,
            state: RefCell::new(RouteState::Idle),
            epoch: Cell::new(0),
            target: RefCell::new(None),
        }
    }

    pub fn loader(&self) -> &Rc<Loader> {
        &self.loader
    }

    pub fn mounter(&self) -> &Rc<Mounter> {
        &self.mounter
    }

    /// Swap the routed slot to `target` inside `anchor`.
    ///
    /// The current content unmounts as soon as the navigation starts, so the
    /// anchor shows the host's own fallback while resolving. If a newer
    /// navigation begins before this one lands, this one's work is discarded
    /// and it reports [`RouteOutcome::Superseded`].
    pub async fn navigate(&self, target: RouteTarget, anchor: &dyn Anchor) -> RouteOutcome {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        *self.target.borrow_mut() = Some(target.clone());
        // Swap outside the borrow: unmounting runs teardown that may call
        // back into the shell.
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), RouteState::Resolving);
        drop(previous);

        let factory = match self.loader.resolve(&target.remote, &target.exposed).await {
            Ok(factory) => factory,
            Err(error) => return self.conclude_failure(epoch, RouteError::Load(error)),
        };
        if self.epoch.get() != epoch {
            return RouteOutcome::Superseded;
        }

        let guard = match self
            .mounter
            .mount_scoped(&factory, anchor, &target.props)
            .await
        {
            Ok(guard) => guard,
            Err(error) => return self.conclude_failure(epoch, RouteError::Mount(error)),
        };
        if self.epoch.get() != epoch {
            // A newer navigation owns the slot now; give the instance back.
            drop(guard);
            return RouteOutcome::Superseded;
        }

        *self.state.borrow_mut() = RouteState::Mounted { guard };
        RouteOutcome::Mounted
    }

    /// Re-run the last requested navigation, typically after a failure.
    /// Returns `None` when nothing was ever navigated to.
    pub async fn retry(&self, anchor: &dyn Anchor) -> Option<RouteOutcome> {
        let target = self.target.borrow().clone();
        match target {
            Some(target) => Some(self.navigate(target, anchor).await),
            None => None,
        }
    }

    /// Unmount and forget the current route. Cancels any in-flight
    /// navigation.
    pub fn reset(&self) {
        self.epoch.set(self.epoch.get() + 1);
        self.target.borrow_mut().take();
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), RouteState::Idle);
        drop(previous);
    }

    pub fn phase(&self) -> RoutePhase {
        match &*self.state.borrow() {
            RouteState::Idle => RoutePhase::Idle,
            RouteState::Resolving => RoutePhase::Resolving,
            RouteState::Mounted { .. } => RoutePhase::Mounted,
            RouteState::Failed { .. } => RoutePhase::Failed,
        }
    }

    pub fn failure(&self) -> Option<RouteError> {
        match &*self.state.borrow() {
            RouteState::Failed { error } => Some(error.clone()),
            _ => None,
        }
    }

    fn conclude_failure(&self, epoch: u64, error: RouteError) -> RouteOutcome {
        if self.epoch.get() != epoch {
            return RouteOutcome::Superseded;
        }
        *self.state.borrow_mut() = RouteState::Failed {
            error: error.clone(),
        };
        RouteOutcome::Failed(error)
    }
}
