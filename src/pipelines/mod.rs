//! Render pipelines and their shaders.
//!
//! - `basic`: opaque mesh pipeline and the shared pipeline builder
//! - `transparent`: blended variant of the mesh pipeline
//! - `light`: light uniform and its bind group
//! - `grid`: ground grid line pipeline

pub mod basic;
pub mod grid;
pub mod light;
pub mod transparent;
