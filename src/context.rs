//! GPU and window context of one viewport.
//!
//! Created when the viewport is mounted and dropped when it's torn down. It
//! owns the surface, device and queue, the camera and light uniforms and the
//! pipelines; nothing of it lives in globals.

use std::sync::Arc;

use cgmath::Deg;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    camera::{Camera, CameraResources, CameraUniform, OrbitController, Projection},
    config::ViewerConfig,
    data_structures::texture::{self, Texture},
    pipelines::{
        basic::{mk_basic_pipeline, mk_mesh_layout},
        grid::GridResources,
        light::{LightResources, LightUniform},
        transparent::mk_transparent_pipeline,
    },
    scene::{Grid, Light},
};

const AMBIENT: f32 = 0.15;

#[derive(Debug)]
pub struct Pipelines {
    pub basic: wgpu::RenderPipeline,
    pub transparent: wgpu::RenderPipeline,
}

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub projection: Projection,
    pub light: LightResources,
    pub grid: GridResources,
    pub pipelines: Pipelines,
    pub material_layout: wgpu::BindGroupLayout,
    pub clear_colour: wgpu::Color,
}

impl Context {
    pub async fn new(
        window: Arc<Window>,
        config: &ViewerConfig,
        lights: &[Light],
        grid: &Grid,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("Using adapter {:?}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The shaders assume an sRGB surface; anything else comes out too dark
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("Surface reports no texture formats"))?;
        // Transparent backgrounds need a compositor that honours alpha
        let alpha_mode = surface_caps
            .alpha_modes
            .iter()
            .copied()
            .find(|m| *m == wgpu::CompositeAlphaMode::PreMultiplied)
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let target = config.target_size;
        let camera = Camera::new((target, target, target * 2.0), (0.0, 0.0, 0.0));
        let projection = Projection::new(
            surface_config.width,
            surface_config.height,
            Deg(45.0),
            0.01,
            target * 100.0,
        );
        let mut controller = OrbitController::default();
        controller.set_sensitivity(config.sensitivity_multiplier());
        controller.set_auto_rotate(config.auto_rotate);

        let mut camera_uniform = CameraUniform::new();
        camera_uniform.update_view_proj(&camera, &projection);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("camera_bind_group_layout"),
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        let light = LightResources::new(&device, LightUniform::new(lights, AMBIENT));

        let material_layout = texture::material_layout(&device);
        let mesh_layout = mk_mesh_layout(
            &device,
            &material_layout,
            &camera_bind_group_layout,
            &light.bind_group_layout,
        );
        let pipelines = Pipelines {
            basic: mk_basic_pipeline(&device, &surface_config, &mesh_layout),
            transparent: mk_transparent_pipeline(&device, &surface_config, &mesh_layout),
        };
        let grid = GridResources::new(&device, &surface_config, &camera_bind_group_layout, grid);

        let camera = CameraResources {
            camera,
            controller,
            uniform: camera_uniform,
            buffer: camera_buffer,
            bind_group: camera_bind_group,
            bind_group_layout: camera_bind_group_layout,
        };

        let depth_texture = Texture::create_depth_texture(
            &device,
            [surface_config.width, surface_config.height],
            "depth_texture",
        );

        Ok(Self {
            window,
            depth_texture,
            surface,
            device,
            queue,
            config: surface_config,
            camera,
            projection,
            light,
            grid,
            pipelines,
            material_layout,
            clear_colour: config.background_mode.clear_colour(),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.config.width = width;
        self.config.height = height;
        self.projection.resize(width, height);
        self.surface.configure(&self.device, &self.config);
        self.depth_texture =
            Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
        true
    }
}
