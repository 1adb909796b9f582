//! Runtime composition of independently built UI bundles.
//!
//! A host shell resolves components exposed by remote bundles through a
//! container protocol, negotiates shared library versions against its own
//! copies, mounts the resolved components through a framework-neutral
//! adapter, and keeps a storage-backed cart consistent across everything
//! it mounted.

pub mod adapter;
pub mod bus;
pub mod cart;
pub mod loader;
pub mod platform;
pub mod products;
pub mod registry;
pub mod shared_scope;
pub mod shell;
pub mod storage;
pub mod version;

pub use adapter::{Mounter, Props};
pub use bus::EventBus;
pub use cart::CartStore;
pub use loader::Loader;
pub use registry::RemoteRegistry;
pub use shell::Shell;
