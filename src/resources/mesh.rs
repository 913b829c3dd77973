use std::collections::HashMap;

use cgmath::{InnerSpace, Vector3};

use crate::data_structures::asset::Geometry;

/**
 * Triangle soups and many text meshes don't come with vertex normals so they have to be
 * calculated for lighting to work. Face normals are accumulated unnormalized, which weights
 * each face by its area, and averaged per vertex.
 */
pub fn compute_smooth_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); positions.len()];

    for c in indices.chunks_exact(3) {
        let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let pos0: Vector3<f32> = positions[i0].into();
        let pos1: Vector3<f32> = positions[i1].into();
        let pos2: Vector3<f32> = positions[i2].into();

        let face = (pos1 - pos0).cross(pos2 - pos0);

        normals[i0] += face;
        normals[i1] += face;
        normals[i2] += face;
    }

    normals
        .into_iter()
        .map(|n| {
            // Unreferenced or degenerate-only vertices keep a zero normal
            if n.magnitude2() > f32::EPSILON * f32::EPSILON {
                n.normalize().into()
            } else {
                [0.0, 0.0, 0.0]
            }
        })
        .collect()
}

/// Fills in smooth normals when the geometry has none (or a mismatched count).
pub fn ensure_normals(geometry: &mut Geometry) {
    if !geometry.has_normals() {
        geometry.normals = compute_smooth_normals(&geometry.positions, &geometry.indices);
    }
}

/**
 * Merges bit-identical corner positions of a triangle list into shared vertices so that
 * adjacency (and thus smooth normals) can be derived.
 */
pub fn weld(triangles: &[[[f32; 3]; 3]]) -> (Vec<[f32; 3]>, Vec<u32>) {
    let mut lookup: HashMap<[u32; 3], u32> = HashMap::new();
    let mut positions = Vec::new();
    let mut indices = Vec::with_capacity(triangles.len() * 3);

    for triangle in triangles {
        for corner in triangle {
            // -0.0 and 0.0 are the same point
            let key = corner.map(|v| if v == 0.0 { 0u32 } else { v.to_bits() });
            let idx = *lookup.entry(key).or_insert_with(|| {
                positions.push(*corner);
                (positions.len() - 1) as u32
            });
            indices.push(idx);
        }
    }

    (positions, indices)
}
