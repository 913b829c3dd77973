//! CPU-side asset representation.
//!
//! Every parser produces a [`ParsedAsset`]: either a flat list of
//! [`MeshPart`]s or, for scene-graph sources, a [`SceneNode`] tree. The
//! normalizer turns it into an [`Asset`] carrying the canonical transform.
//! Nothing in here touches the GPU; see [`crate::data_structures::model`] for
//! the upload.

use std::fmt;
use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::{
        bounds::{BoundingBox, BoundingMetrics},
        instance::Instance,
    },
    resources::{
        bundle::ExtractedEntries,
        texture::{SamplerConfig, TextureResource},
    },
};

/// The four source encodings the dispatcher understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetFormat {
    /// Binary or ASCII triangle soup (`.stl`).
    TriangleSoup,
    /// Text mesh with optional material manifest (`.obj`).
    MeshText,
    /// Binary or JSON scene graph (`.glb`, `.gltf`).
    SceneBinary,
    /// Zip archive with a mesh, materials and loose textures.
    Bundle,
}

impl AssetFormat {
    /// Only triangle soups are authored Z-up; everything else is taken as Y-up.
    pub fn is_z_up(self) -> bool {
        matches!(self, AssetFormat::TriangleSoup)
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetFormat::TriangleSoup => "triangle-soup",
            AssetFormat::MeshText => "mesh-text",
            AssetFormat::SceneBinary => "scene-binary",
            AssetFormat::Bundle => "bundle",
        };
        f.write_str(name)
    }
}

/// Indexed triangle geometry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 3]>>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty() && self.normals.len() == self.positions.len()
    }
}

/// How a part is shaded.
#[derive(Clone, Debug)]
pub enum MaterialRef {
    /// Flat linear RGBA colour.
    Color([f32; 4]),
    /// Per-vertex colours from the geometry.
    VertexColors,
    Texture {
        texture: Arc<TextureResource>,
        sampler: SamplerConfig,
    },
}

impl MaterialRef {
    pub fn is_color(&self, rgba: [f32; 4]) -> bool {
        matches!(self, MaterialRef::Color(c) if *c == rgba)
    }

    pub fn texture(&self) -> Option<&TextureResource> {
        match self {
            MaterialRef::Texture { texture, .. } => Some(texture),
            _ => None,
        }
    }
}

impl PartialEq for MaterialRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MaterialRef::Color(a), MaterialRef::Color(b)) => a == b,
            (MaterialRef::VertexColors, MaterialRef::VertexColors) => true,
            (
                MaterialRef::Texture { texture: a, sampler: sa },
                MaterialRef::Texture { texture: b, sampler: sb },
            ) => a.key == b.key && sa == sb,
            _ => false,
        }
    }
}

/// A renderable submesh.
#[derive(Clone, Debug)]
pub struct MeshPart {
    /// Identifying name, possibly empty.
    pub name: String,
    /// Declared material name, kept for texture matching even when the manifest is ignored.
    pub material_name: Option<String>,
    pub geometry: Geometry,
    pub material: MaterialRef,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl MeshPart {
    pub fn new(name: impl Into<String>, geometry: Geometry, material: MaterialRef) -> Self {
        Self {
            name: name.into(),
            material_name: None,
            geometry,
            material,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

/// A node of a scene-graph asset with its local transform.
#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    pub name: String,
    pub local: Instance,
    pub parts: Vec<MeshPart>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    fn visit<'a>(&'a self, parent: &Matrix4<f32>, f: &mut dyn FnMut(&'a MeshPart, &Matrix4<f32>)) {
        let world = parent * self.local.to_matrix();
        for part in &self.parts {
            f(part, &world);
        }
        for child in &self.children {
            child.visit(&world, &mut *f);
        }
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(&mut MeshPart)) {
        for part in &mut self.parts {
            f(part);
        }
        for child in &mut self.children {
            child.visit_mut(&mut *f);
        }
    }
}

#[derive(Clone, Debug)]
pub enum AssetContent {
    Parts(Vec<MeshPart>),
    Scene(SceneNode),
}

impl AssetContent {
    /// Calls `f` with every part and the matrix placing it in asset space.
    pub fn for_each_part<'a>(&'a self, mut f: impl FnMut(&'a MeshPart, &Matrix4<f32>)) {
        let identity = Matrix4::identity();
        match self {
            AssetContent::Parts(parts) => parts.iter().for_each(|part| f(part, &identity)),
            AssetContent::Scene(root) => root.visit(&identity, &mut f),
        }
    }

    pub fn for_each_part_mut(&mut self, mut f: impl FnMut(&mut MeshPart)) {
        match self {
            AssetContent::Parts(parts) => parts.iter_mut().for_each(|part| f(part)),
            AssetContent::Scene(root) => root.visit_mut(&mut f),
        }
    }

    pub fn part_count(&self) -> usize {
        let mut count = 0;
        self.for_each_part(|_, _| count += 1);
        count
    }

    /// Bounds of all geometry after applying `transform` on top of the node transforms.
    pub fn bounds_with(&self, transform: &Matrix4<f32>) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        self.for_each_part(|part, local| {
            bounds.extend_transformed(&part.geometry.positions, &(transform * local));
        });
        bounds
    }
}

/// Parser output, before normalization.
#[derive(Clone, Debug)]
pub struct ParsedAsset {
    pub format: AssetFormat,
    pub content: AssetContent,
    /// Extracted archive entries that must outlive the load for a short while.
    pub scratch: Option<ExtractedEntries>,
}

impl ParsedAsset {
    pub fn new(format: AssetFormat, content: AssetContent) -> Self {
        Self {
            format,
            content,
            scratch: None,
        }
    }
}

/// Uniform scale, translation and the fixed Z-up to Y-up reorientation.
///
/// A point `p` of the source maps to `scale * R * (p - center) + translation`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanonicalTransform {
    pub center: cgmath::Point3<f32>,
    pub reoriented: bool,
    pub scale: f32,
    pub translation: cgmath::Vector3<f32>,
}

impl CanonicalTransform {
    pub fn rotation(&self) -> cgmath::Quaternion<f32> {
        use cgmath::{One, Rotation3};
        if self.reoriented {
            cgmath::Quaternion::from_angle_x(cgmath::Deg(-90.0))
        } else {
            cgmath::Quaternion::one()
        }
    }

    /// The same mapping as a translation/rotation/scale [`Instance`].
    pub fn to_instance(&self) -> Instance {
        use cgmath::EuclideanSpace;
        let rotation = self.rotation();
        let offset = rotation * (self.center.to_vec() * -self.scale);
        Instance {
            position: self.translation + offset,
            rotation,
            scale: cgmath::Vector3::new(self.scale, self.scale, self.scale),
        }
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        self.to_instance().to_matrix()
    }
}

/// A normalized, viewport-ready asset.
#[derive(Clone, Debug)]
pub struct Asset {
    pub format: AssetFormat,
    pub content: AssetContent,
    pub transform: CanonicalTransform,
    pub metrics: BoundingMetrics,
    pub scratch: Option<ExtractedEntries>,
}

impl Asset {
    pub fn bounds(&self) -> BoundingBox {
        self.metrics.bounds
    }

    pub fn part_count(&self) -> usize {
        self.content.part_count()
    }

    /// Every part with its final world matrix (canonical transform included).
    pub fn world_parts(&self) -> Vec<(&MeshPart, Matrix4<f32>)> {
        let root = self.transform.to_matrix();
        let mut parts = Vec::new();
        self.content
            .for_each_part(|part, local| parts.push((part, root * local)));
        parts
    }
}
