use wgpu::util::DeviceExt;

use crate::{
    data_structures::{model::Vertex, texture::Texture},
    pipelines::basic::{PrimitiveOptions, mk_render_pipeline},
    scene::Grid,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GridVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex for GridVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<GridVertex>() as wgpu::BufferAddress,
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
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

const LINE_COLOR: [f32; 4] = [0.45, 0.45, 0.5, 1.0];
const AXIS_COLOR: [f32; 4] = [0.7, 0.7, 0.75, 1.0];

/// Line-list vertices for `grid`; the two centre lines are highlighted.
pub fn grid_vertices(grid: &Grid) -> Vec<GridVertex> {
    grid.lines()
        .into_iter()
        .flat_map(|[start, end]| {
            let on_axis = (start[0] == 0.0 && end[0] == 0.0) || (start[2] == 0.0 && end[2] == 0.0);
            let color = if on_axis { AXIS_COLOR } else { LINE_COLOR };
            [
                GridVertex {
                    position: start,
                    color,
                },
                GridVertex {
                    position: end,
                    color,
                },
            ]
        })
        .collect()
}

#[derive(Debug)]
pub struct GridResources {
    pub pipeline: wgpu::RenderPipeline,
    pub buffer: wgpu::Buffer,
    pub vertex_count: u32,
}

impl GridResources {
    pub fn new(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        grid: &Grid,
    ) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Grid Pipeline Layout"),
            bind_group_layouts: &[camera_bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = wgpu::ShaderModuleDescriptor {
            label: Some("Grid Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("grid.wgsl").into()),
        };
        let pipeline = mk_render_pipeline(
            device,
            &layout,
            config.format,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            Some(Texture::DEPTH_FORMAT),
            &[GridVertex::desc()],
            shader,
            PrimitiveOptions {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
        );

        let vertices = grid_vertices(grid);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            pipeline,
            buffer,
            vertex_count: vertices.len() as u32,
        }
    }

    pub fn draw<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>, camera_bind_group: &'a wgpu::BindGroup) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, camera_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.buffer.slice(..));
        render_pass.draw(0..self.vertex_count, 0..1);
    }
}
