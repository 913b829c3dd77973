//! The scene: persistent lights and grid plus at most one active asset.
//!
//! GPU resources of an asset live behind a [`ResourceHandle`], which disposes
//! them exactly once: when the asset is replaced, when the scene is cleared or
//! when the scene itself is dropped. The actual upload is delegated to an
//! [`AssetBackend`] so that the bookkeeping works the same with a real device
//! and in tests.

use std::time::Duration;

use cgmath::{Point3, Vector3};
use instant::Instant;

use crate::{
    config::{BackgroundMode, ViewerConfig},
    data_structures::{asset::Asset, bounds::BoundingMetrics},
    resources::bundle::ExtractedEntries,
};

/// Something that holds resources which must be released explicitly.
pub trait Dispose {
    fn dispose(&mut self);
}

/// Owns a [`Dispose`] value and disposes it exactly once.
#[derive(Debug)]
pub struct ResourceHandle<T: Dispose> {
    inner: Option<T>,
}

impl<T: Dispose> ResourceHandle<T> {
    pub fn new(inner: T) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn get(&self) -> Option<&T> {
        self.inner.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.as_mut()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_none()
    }

    /// Disposes now instead of on drop. Calling it again does nothing.
    pub fn release(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.dispose();
        }
    }
}

impl<T: Dispose> Drop for ResourceHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Turns a CPU-side asset into renderable resources.
pub trait AssetBackend {
    type Handle: Dispose;

    fn upload(&mut self, asset: &Asset) -> anyhow::Result<Self::Handle>;
}

/// The asset currently shown, with its uploaded resources.
#[derive(Debug)]
pub struct ActiveAsset<H: Dispose> {
    pub asset: Asset,
    pub handle: ResourceHandle<H>,
}

impl<H: Dispose> ActiveAsset<H> {
    pub fn metrics(&self) -> &BoundingMetrics {
        &self.asset.metrics
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub position: Point3<f32>,
    pub color: Vector3<f32>,
}

/// Ground grid on the y = 0 plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub size: f32,
    pub divisions: u32,
    pub visible: bool,
}

impl Grid {
    /// Four times the canonical size, so normalized assets always fit on it.
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            size: config.target_size * 4.0,
            divisions: 20,
            visible: config.grid_visible,
        }
    }

    /// Line segments of the grid as `[start, end]` pairs.
    pub fn lines(&self) -> Vec<[[f32; 3]; 2]> {
        let half = self.size * 0.5;
        let step = self.size / self.divisions.max(1) as f32;
        (0..=self.divisions)
            .flat_map(|i| {
                let offset = -half + step * i as f32;
                [
                    [[offset, 0.0, -half], [offset, 0.0, half]],
                    [[-half, 0.0, offset], [half, 0.0, offset]],
                ]
            })
            .collect()
    }
}

/// A key light above and in front of the asset and a dim fill light behind it.
pub fn default_lights(target_size: f32) -> Vec<Light> {
    vec![
        Light {
            position: Point3::new(target_size, target_size * 2.0, target_size),
            color: Vector3::new(1.0, 1.0, 1.0),
        },
        Light {
            position: Point3::new(-target_size, target_size, -target_size),
            color: Vector3::new(0.4, 0.4, 0.45),
        },
    ]
}

struct Scratch {
    entries: ExtractedEntries,
    retire_at: Instant,
}

pub struct SceneManager<B: AssetBackend> {
    backend: B,
    active: Option<ActiveAsset<B::Handle>>,
    lights: Vec<Light>,
    grid: Grid,
    background: BackgroundMode,
    scratch: Vec<Scratch>,
    scratch_grace: Duration,
}

impl<B: AssetBackend> SceneManager<B> {
    pub fn new(backend: B, config: &ViewerConfig) -> Self {
        Self {
            backend,
            active: None,
            lights: default_lights(config.target_size),
            grid: Grid::from_config(config),
            background: config.background_mode,
            scratch: Vec::new(),
            scratch_grace: Duration::from_millis(config.scratch_grace_millis),
        }
    }

    /**
     * Uploads `asset` and makes it the active one. The previous asset is disposed
     * after the upload succeeded and before the new one is inserted; on a failed
     * upload the previous asset stays.
     */
    pub fn replace(&mut self, mut asset: Asset) -> anyhow::Result<&ActiveAsset<B::Handle>> {
        let handle = self.backend.upload(&asset)?;

        if let Some(mut previous) = self.active.take() {
            log::info!("Disposing previous {} asset", previous.asset.format);
            previous.handle.release();
        }

        if let Some(entries) = asset.scratch.take() {
            self.scratch.push(Scratch {
                entries,
                retire_at: Instant::now() + self.scratch_grace,
            });
        }

        Ok(self.active.insert(ActiveAsset {
            asset,
            handle: ResourceHandle::new(handle),
        }))
    }

    /// Disposes the active asset, if any.
    pub fn clear(&mut self) {
        if let Some(mut previous) = self.active.take() {
            previous.handle.release();
        }
    }

    /// Hands the active asset to the caller, who becomes responsible for releasing it.
    pub fn take_active(&mut self) -> Option<ActiveAsset<B::Handle>> {
        self.active.take()
    }

    /// Drops extracted bundle entries whose grace period ended before `now`.
    pub fn retire_scratch(&mut self, now: Instant) -> usize {
        let before = self.scratch.len();
        self.scratch.retain(|s| {
            let keep = s.retire_at > now;
            if !keep {
                log::debug!(
                    "Releasing {} extracted entries ({} bytes)",
                    s.entries.len(),
                    s.entries.total_bytes()
                );
            }
            keep
        });
        before - self.scratch.len()
    }

    pub fn pending_scratch(&self) -> usize {
        self.scratch.len()
    }

    pub fn active(&self) -> Option<&ActiveAsset<B::Handle>> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveAsset<B::Handle>> {
        self.active.as_mut()
    }

    pub fn asset_count(&self) -> usize {
        usize::from(self.active.is_some())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn toggle_grid(&mut self) -> bool {
        self.grid.visible = !self.grid.visible;
        self.grid.visible
    }

    pub fn background(&self) -> BackgroundMode {
        self.background
    }

    pub fn set_background(&mut self, mode: BackgroundMode) {
        self.background = mode;
    }

    pub fn cycle_background(&mut self) -> BackgroundMode {
        self.background = self.background.next();
        self.background
    }
}
