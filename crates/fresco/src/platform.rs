//! Platform backends behind the core traits: storage, anchors, and
//! container transports.

#[cfg(feature = "native")]
pub mod native;

#[cfg(all(feature = "browser", target_arch = "wasm32"))]
pub mod browser;
