//! Opens a window showing the asset given on the command line.
//!
//! ```text
//! cargo run --example view -- model.glb [viewer.json]
//! ```
//!
//! Further files can be dropped onto the window. Keys: `F` fullscreen, `G`
//! grid, `B` background, `R` auto-rotate, `1`/`2`/`3` sensitivity. Hold Ctrl
//! or Shift while scrolling to orbit vertically.

use std::path::PathBuf;

use asset_viewer::{LoadRequest, ViewerConfig};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let asset = args.next().map(PathBuf::from);
    let config = match args.next() {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };

    asset_viewer::run(config, asset.map(LoadRequest::from))
}
