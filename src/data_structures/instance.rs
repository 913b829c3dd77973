//! Transform data for scene nodes and GPU instancing.
//!
//! [`Instance`] is the translation/rotation/scale triple used for scene-node
//! local transforms and for the canonical transform the normalizer computes.
//! [`InstanceRaw`] is what actually lands in the per-mesh instance buffer.

use cgmath::{Matrix, One, SquareMatrix};

use crate::data_structures::model;

/// Translation, rotation (as quaternion) and scale, applied scale first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

/**
 * The raw instance is the actual data stored on the GPU: the world matrix of
 * one part and the matrix its normals are transformed with.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
}

impl InstanceRaw {
    const ATTRIBS: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4,
        9 => Float32x3,
        10 => Float32x3,
        11 => Float32x3,
    ];

    /// Packs a world matrix together with its normal matrix (inverse transpose).
    pub fn from_matrix(world: cgmath::Matrix4<f32>) -> Self {
        let upper = cgmath::Matrix3::from_cols(
            world.x.truncate(),
            world.y.truncate(),
            world.z.truncate(),
        );
        // Degenerate scales have no inverse; the upper block is still a usable direction map.
        let normal = upper.invert().map(|inv| inv.transpose()).unwrap_or(upper);
        Self {
            model: world.into(),
            normal: normal.into(),
        }
    }
}

impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}
