//! asset-viewer
//!
//! Loading, normalization and orbit-viewport core of a cross-platform 3D asset
//! viewer, running natively and on the web. Sources in four formats (STL
//! triangle soups, OBJ meshes with materials, glTF/GLB scenes and zip bundles)
//! are parsed into one CPU-side asset model, normalized to a canonical size
//! standing on the ground plane and handed to a scene that keeps at most one
//! asset on the GPU at a time.
//!
//! High-level modules
//! - `config`: the configuration surface of the viewer
//! - `error`: the error taxonomy every load failure is reported in
//! - `progress`: monotonic load progress shared with the UI
//! - `data_structures`: asset model, bounds, instances, GPU textures and meshes
//! - `resources`: format parsers, texture decoding and the texture assignment heuristic
//! - `loader`: format dispatch, background loads and the stale-load guard
//! - `normalize`: the geometric normalizer
//! - `scene`: lights, grid and the active asset with scoped disposal
//! - `camera`: camera, projection and the orbit controller
//! - `input`: translation of window events into orbit inputs and viewer commands
//! - `context`: GPU and window context of a mounted viewport
//! - `pipelines`: render pipelines and shaders
//! - `viewer`: the winit application running the render loop
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod input;
pub mod loader;
pub mod normalize;
pub mod pipelines;
pub mod progress;
pub mod resources;
pub mod scene;
pub mod viewer;

// Re-exports commonly used types for convenience in downstream code.
pub use config::ViewerConfig;
pub use data_structures::asset::{Asset, AssetFormat};
pub use data_structures::bounds::BoundingMetrics;
pub use error::{LoadError, LoadResult};
pub use loader::{AssetLoader, LoadOutcome, LoadRequest, LoadStatus, PendingLoad, load};
pub use progress::{LoadPhase, LoadProgress};
pub use resources::AssetSource;
pub use viewer::{ViewerHandle, run, run_with};
