use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{ModelVertex, Vertex},
        texture::Texture,
    },
    pipelines::basic::{PrimitiveOptions, mesh_shader, mk_render_pipeline},
};

/**
 * Parts whose colour or texture carries alpha below one. They are drawn after
 * the opaque ones with blending on and without writing depth so that parts
 * behind them stay visible.
 */
pub fn mk_transparent_pipeline(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    layout: &wgpu::PipelineLayout,
) -> wgpu::RenderPipeline {
    mk_render_pipeline(
        device,
        layout,
        config.format,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        Some(Texture::DEPTH_FORMAT),
        &[ModelVertex::desc(), InstanceRaw::desc()],
        mesh_shader(),
        PrimitiveOptions {
            depth_write: false,
            ..Default::default()
        },
    )
}
