//! Caching of imported assets.

pub mod memory;

pub use memory::{AssetCache, AssetKey};
