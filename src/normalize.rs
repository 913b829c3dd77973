//! Geometric normalization.
//!
//! Every parsed asset, regardless of format, goes through the same steps:
//! center it on its bounding box, turn Z-up sources upright, scale it
//! uniformly so its largest dimension equals the target size and finally put
//! it on the ground plane, centered in X/Z. The geometry buffers themselves
//! are never touched, only the root transform is computed.

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::data_structures::{
    asset::{Asset, CanonicalTransform, ParsedAsset},
    bounds::BoundingMetrics,
};

/// Below this the box counts as a single point and no scale is applied.
const DEGENERATE_EXTENT: f32 = 1e-12;

/// Computes the canonical transform for `parsed` and marks all parts for shadows.
pub fn normalize(parsed: ParsedAsset, target_size: f32) -> Asset {
    let ParsedAsset {
        format,
        mut content,
        scratch,
    } = parsed;

    let raw_bounds = content.bounds_with(&Matrix4::identity());
    let mut transform = CanonicalTransform {
        center: raw_bounds.center(),
        reoriented: format.is_z_up(),
        scale: 1.0,
        translation: Vector3::new(0.0, 0.0, 0.0),
    };

    let upright = content.bounds_with(&transform.to_matrix());
    let extent = upright.max_dimension();
    transform.scale = if extent > DEGENERATE_EXTENT && extent.is_finite() {
        target_size / extent
    } else {
        log::warn!("Asset has degenerate bounds ({extent}), keeping its scale");
        1.0
    };

    let scaled = content.bounds_with(&transform.to_matrix());
    if !scaled.is_empty() {
        let center = scaled.center();
        transform.translation = Vector3::new(-center.x, -scaled.min.y, -center.z);
    }

    let bounds = content.bounds_with(&transform.to_matrix());
    content.for_each_part_mut(|part| {
        part.cast_shadow = true;
        part.receive_shadow = true;
    });

    log::info!(
        "Normalized {format} asset: raw extent {:?} -> scale {}, bounds {:?}..{:?}",
        raw_bounds.size(),
        transform.scale,
        bounds.min,
        bounds.max
    );

    Asset {
        format,
        content,
        transform,
        metrics: BoundingMetrics {
            bounds,
            raw_bounds,
            scale: transform.scale,
        },
        scratch,
    }
}

/// Height of the asset's canonical bounds; the camera aims at half of it.
pub fn canonical_height(asset: &Asset) -> f32 {
    let bounds = asset.bounds();
    if bounds.is_empty() {
        return 0.0;
    }
    bounds.max.y - bounds.min.y
}
