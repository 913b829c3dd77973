//! GPU-side representation of a loaded asset.
//!
//! [`GpuBackend`] uploads every [`MeshPart`] of an [`Asset`] into its own
//! vertex/index buffer pair and one shared instance buffer holding the parts'
//! world matrices. Flat-coloured and vertex-coloured parts are drawn through a
//! 1x1 white texture with the colour baked into the vertices, so every part
//! goes through the same pipeline.

use std::{collections::HashMap, sync::Arc};

use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        asset::{Asset, MaterialRef, MeshPart},
        instance::InstanceRaw,
        texture::Texture,
    },
    resources::texture::{SamplerConfig, TextureResource},
    scene::{AssetBackend, Dispose},
};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Interleaves a part's geometry with the colour its material implies.
pub fn vertices_of(part: &MeshPart) -> Vec<ModelVertex> {
    let geometry = &part.geometry;
    let flat = match &part.material {
        MaterialRef::Color(rgba) => *rgba,
        MaterialRef::VertexColors | MaterialRef::Texture { .. } => [1.0; 4],
    };
    (0..geometry.positions.len())
        .map(|i| {
            let color = match (&part.material, &geometry.colors) {
                (MaterialRef::VertexColors, Some(colors)) => colors
                    .get(i)
                    .map_or(flat, |&[r, g, b]| [r, g, b, 1.0]),
                _ => flat,
            };
            ModelVertex {
                position: geometry.positions[i],
                tex_coords: geometry
                    .tex_coords
                    .as_ref()
                    .and_then(|uv| uv.get(i).copied())
                    .unwrap_or([0.0, 0.0]),
                normal: geometry.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                color,
            }
        })
        .collect()
}

/// Whether a part needs the blended pipeline.
pub fn is_transparent(part: &MeshPart) -> bool {
    match &part.material {
        MaterialRef::Color(rgba) => rgba[3] < 1.0,
        MaterialRef::VertexColors => false,
        MaterialRef::Texture { texture, .. } => texture.image.pixels().any(|p| p.0[3] < 255),
    }
}

#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub texture: Texture,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    pub fn new(
        device: &wgpu::Device,
        name: &str,
        texture: Texture,
        layout: &wgpu::BindGroupLayout,
    ) -> anyhow::Result<Self> {
        let sampler = texture
            .sampler
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Texture {name} has no sampler"))?;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
            label: Some(name),
        });
        Ok(Self {
            name: name.to_string(),
            texture,
            bind_group,
        })
    }
}

#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub material: usize,
    /// Slot of this part's world matrix in [`GpuAsset::instance_buffer`].
    pub instance: u32,
    pub transparent: bool,
}

/// Everything uploaded for one asset. Released through [`Dispose`].
#[derive(Debug)]
pub struct GpuAsset {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub instance_buffer: wgpu::Buffer,
}

impl GpuAsset {
    pub fn opaque(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.iter().filter(|m| !m.transparent)
    }

    pub fn transparent(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.iter().filter(|m| m.transparent)
    }
}

impl Dispose for GpuAsset {
    fn dispose(&mut self) {
        for mesh in &self.meshes {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
        }
        for material in &self.materials {
            material.texture.destroy();
        }
        self.instance_buffer.destroy();
        log::debug!(
            "Released {} meshes and {} materials",
            self.meshes.len(),
            self.materials.len()
        );
    }
}

pub trait DrawModel<'a> {
    fn draw_mesh(
        &mut self,
        mesh: &'a Mesh,
        material: &'a Material,
        instances: &'a wgpu::Buffer,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );

    fn draw_meshes(
        &mut self,
        asset: &'a GpuAsset,
        meshes: impl Iterator<Item = &'a Mesh>,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );
}

impl<'a> DrawModel<'a> for wgpu::RenderPass<'a> {
    fn draw_mesh(
        &mut self,
        mesh: &'a Mesh,
        material: &'a Material,
        instances: &'a wgpu::Buffer,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_vertex_buffer(1, instances.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &material.bind_group, &[]);
        self.set_bind_group(1, camera_bind_group, &[]);
        self.set_bind_group(2, light_bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, mesh.instance..mesh.instance + 1);
    }

    fn draw_meshes(
        &mut self,
        asset: &'a GpuAsset,
        meshes: impl Iterator<Item = &'a Mesh>,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    ) {
        for mesh in meshes {
            let Some(material) = asset.materials.get(mesh.material) else {
                log::warn!("Mesh {} refers to a missing material", mesh.name);
                continue;
            };
            self.draw_mesh(
                mesh,
                material,
                &asset.instance_buffer,
                camera_bind_group,
                light_bind_group,
            );
        }
    }
}

/// Uploads assets with a wgpu device.
#[derive(Debug)]
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
}

impl GpuBackend {
    /// `layout` has to be the material layout the mesh pipelines were built with.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, layout: wgpu::BindGroupLayout) -> Self {
        Self {
            device,
            queue,
            layout,
        }
    }

    pub fn material_layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    fn upload_material(
        &self,
        name: &str,
        resource: &TextureResource,
        sampler: &SamplerConfig,
    ) -> anyhow::Result<Material> {
        let texture = Texture::from_resource(&self.device, &self.queue, resource, sampler);
        Material::new(&self.device, name, texture, &self.layout)
    }
}

impl AssetBackend for GpuBackend {
    type Handle = GpuAsset;

    fn upload(&mut self, asset: &Asset) -> anyhow::Result<GpuAsset> {
        let white = TextureResource::solid("white", [1.0; 4]);
        let mut materials = vec![self.upload_material("flat", &white, &SamplerConfig::default())?];
        // Parts sharing a decoded texture share its GPU copy
        let mut by_texture: HashMap<*const TextureResource, usize> = HashMap::new();

        let world_parts = asset.world_parts();
        let mut meshes = Vec::with_capacity(world_parts.len());
        let mut instances = Vec::with_capacity(world_parts.len());
        for (slot, (part, world)) in world_parts.into_iter().enumerate() {
            let material = match &part.material {
                MaterialRef::Texture { texture, sampler } => {
                    let key = Arc::as_ptr(texture);
                    match by_texture.get(&key) {
                        Some(index) => *index,
                        None => {
                            materials.push(self.upload_material(&texture.key, texture, sampler)?);
                            by_texture.insert(key, materials.len() - 1);
                            materials.len() - 1
                        }
                    }
                }
                MaterialRef::Color(_) | MaterialRef::VertexColors => 0,
            };

            let vertices = vertices_of(part);
            let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{:?} Vertex Buffer", part.name)),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{:?} Index Buffer", part.name)),
                contents: bytemuck::cast_slice(&part.geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            instances.push(InstanceRaw::from_matrix(world));
            meshes.push(Mesh {
                name: part.name.clone(),
                vertex_buffer,
                index_buffer,
                num_elements: part.geometry.indices.len() as u32,
                material,
                instance: slot as u32,
                transparent: is_transparent(part),
            });
        }

        let instance_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Asset Instance Buffer"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });

        log::info!(
            "Uploaded {} meshes with {} materials",
            meshes.len(),
            materials.len()
        );
        Ok(GpuAsset {
            meshes,
            materials,
            instance_buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::asset::Geometry;

    fn triangle(material: MaterialRef) -> MeshPart {
        let geometry = Geometry {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            tex_coords: Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            colors: Some(vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
            indices: vec![0, 1, 2],
        };
        MeshPart::new("tri", geometry, material)
    }

    #[test]
    fn flat_colour_is_baked_into_vertices() {
        let vertices = vertices_of(&triangle(MaterialRef::Color([0.2, 0.4, 0.6, 1.0])));
        assert!(vertices.iter().all(|v| v.color == [0.2, 0.4, 0.6, 1.0]));
        assert_eq!(vertices[1].tex_coords, [1.0, 0.0]);
    }

    #[test]
    fn vertex_colours_are_used_when_requested() {
        let vertices = vertices_of(&triangle(MaterialRef::VertexColors));
        assert_eq!(vertices[0].color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(vertices[2].color, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn textured_parts_use_white_vertices() {
        let texture = Arc::new(TextureResource::solid("t.png", [0.0, 0.0, 0.0, 1.0]));
        let part = triangle(MaterialRef::Texture {
            texture,
            sampler: SamplerConfig::default(),
        });
        assert!(vertices_of(&part).iter().all(|v| v.color == [1.0; 4]));
        assert!(!is_transparent(&part));
    }

    #[test]
    fn translucent_colour_needs_blending() {
        assert!(is_transparent(&triangle(MaterialRef::Color([1.0, 1.0, 1.0, 0.5]))));
        assert!(!is_transparent(&triangle(MaterialRef::Color([1.0; 4]))));
    }
}
