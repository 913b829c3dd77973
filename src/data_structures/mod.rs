//! Viewer data structures.
//!
//! - `asset` holds the CPU-side asset model every parser produces
//! - `bounds` has axis-aligned boxes and the metrics handed to consumers
//! - `instance` holds per-part transformation data and its GPU layout
//! - `model` contains the GPU upload of an asset and its draw calls
//! - `texture` wraps GPU textures and samplers

pub mod asset;
pub mod bounds;
pub mod instance;
pub mod model;
pub mod texture;
