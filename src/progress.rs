//! Load progress reporting.
//!
//! A [`LoadProgress`] is shared between the loading task and the render loop.
//! The percentage only ever grows during a load: every write goes through
//! `fetch_max`, so a parser stage reporting a lower value than an earlier one
//! is silently clamped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Coarse loading phases for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadPhase {
    Pending = 0,
    Reading = 1,
    Unpacking = 2,
    DecodingTextures = 3,
    ParsingMesh = 4,
    AssigningTextures = 5,
    Normalizing = 6,
    Complete = 7,
    Failed = 8,
}

impl LoadPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Reading,
            2 => Self::Unpacking,
            3 => Self::DecodingTextures,
            4 => Self::ParsingMesh,
            5 => Self::AssigningTextures,
            6 => Self::Normalizing,
            7 => Self::Complete,
            _ => Self::Failed,
        }
    }
}

/// Shared progress state, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct LoadProgress {
    phase: Arc<AtomicU8>,
    percent: Arc<AtomicU8>,
}

impl LoadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LoadPhase {
        LoadPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    /// Overall progress percentage (0-100).
    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    /// Moves to `phase` and raises the percentage to at least `percent`.
    pub fn set_phase(&self, phase: LoadPhase, percent: u8) {
        self.phase.store(phase as u8, Ordering::Relaxed);
        self.report(percent);
    }

    pub fn report(&self, percent: u8) {
        self.percent.fetch_max(percent.min(100), Ordering::Relaxed);
    }

    /// Reports `done / total` mapped linearly into `[from, to]`.
    pub fn report_fraction(&self, from: u8, to: u8, done: u64, total: u64) {
        if total == 0 {
            self.report(to);
            return;
        }
        let span = to.saturating_sub(from) as u64;
        let pct = from as u64 + span * done.min(total) / total;
        self.report(pct as u8);
    }

    pub fn complete(&self) {
        self.set_phase(LoadPhase::Complete, 100);
    }

    /// Marks the load as failed without lowering the percentage.
    pub fn fail(&self) {
        self.phase.store(LoadPhase::Failed as u8, Ordering::Relaxed);
    }
}
