//! The viewer application and its render loop.
//!
//! The loop renders every frame whether or not a load is running. Loads run
//! in the background through [`AssetLoader`]; each frame the pending load is
//! polled and, once it finishes, its asset replaces the active one and the
//! camera is framed on it. Input goes through [`InputBindings`] to the orbit
//! controller or to the viewer toggles.
//!
//! Lifecycle of a frame:
//! 1. Collect the result of the pending load, if there is one
//! 2. Advance the orbit controller and upload the camera uniform
//! 3. Release bundle scratch whose grace period ended
//! 4. Draw grid, opaque parts and blended parts
//! 5. Present

use std::{iter, sync::Arc};

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Fullscreen, Window},
};

use crate::{
    config::ViewerConfig,
    context::Context,
    data_structures::model::{DrawModel, GpuBackend},
    input::{Binding, InputBindings, ViewerCommand},
    loader::{AssetLoader, LoadOutcome, LoadRequest, LoadStatus, PendingLoad},
    scene::{Grid, SceneManager, default_lights},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

const TITLE: &str = "Asset Viewer";

/// Events the host (or the viewer itself) sends into the event loop.
pub enum ViewerEvent {
    #[allow(dead_code)]
    Initialized(Box<ViewerState>),
    Open(LoadRequest),
    Exit,
}

/// Everything that exists while a viewport is mounted.
pub struct ViewerState {
    ctx: Context,
    scene: SceneManager<GpuBackend>,
    loader: AssetLoader,
    pending: Option<PendingLoad>,
    bindings: InputBindings,
    is_surface_configured: bool,
    reported_percent: Option<u8>,
}

impl ViewerState {
    async fn new(window: Arc<Window>, loader: AssetLoader) -> anyhow::Result<Self> {
        let config = loader.config().clone();
        let lights = default_lights(config.target_size);
        let grid = Grid::from_config(&config);
        let ctx = Context::new(window, &config, &lights, &grid).await?;
        let backend = GpuBackend::new(
            ctx.device.clone(),
            ctx.queue.clone(),
            ctx.material_layout.clone(),
        );
        let scene = SceneManager::new(backend, &config);
        Ok(Self {
            ctx,
            scene,
            loader,
            pending: None,
            bindings: InputBindings::new(),
            is_surface_configured: false,
            reported_percent: None,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.ctx.resize(width, height) {
            self.is_surface_configured = true;
        }
    }

    /// Starts a load; a load still in flight is superseded.
    pub fn open(&mut self, request: LoadRequest) {
        if let Some(previous) = self.pending.take() {
            log::info!("Superseding load of {}", previous.name());
        }
        let pending = self.loader.start(request);
        log::info!("Loading {}", pending.name());
        self.pending = Some(pending);
        self.reported_percent = None;
    }

    fn poll_load(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        match pending.poll() {
            LoadStatus::InFlight => {
                let percent = pending.progress().percent();
                if self.reported_percent != Some(percent) {
                    self.reported_percent = Some(percent);
                    let title = format!("{TITLE} - {} {percent}%", pending.name());
                    self.ctx.window.set_title(&title);
                }
            }
            LoadStatus::Finished(Ok(outcome)) => {
                self.pending = None;
                self.show(outcome);
            }
            LoadStatus::Finished(Err(e)) => {
                self.pending = None;
                log::error!("Loading failed: {e}");
                self.ctx.window.set_title(TITLE);
            }
            LoadStatus::Discarded => self.pending = None,
        }
    }

    fn show(&mut self, outcome: LoadOutcome) {
        for warning in &outcome.warnings {
            log::warn!("{warning}");
        }
        let target_size = self.loader.config().target_size;
        let format = outcome.asset.format;
        match self.scene.replace(outcome.asset) {
            Ok(active) => {
                let camera = &mut self.ctx.camera;
                camera
                    .controller
                    .frame(&mut camera.camera, active.metrics(), target_size);
                self.ctx.window.set_title(&format!("{TITLE} - {format}"));
            }
            Err(e) => log::error!("Could not upload the asset: {e:#}"),
        }
    }

    fn command(&mut self, command: ViewerCommand) {
        match command {
            ViewerCommand::ToggleFullscreen => {
                let window = &self.ctx.window;
                let next = match window.fullscreen() {
                    Some(_) => None,
                    None => Some(Fullscreen::Borderless(None)),
                };
                window.set_fullscreen(next);
            }
            ViewerCommand::ToggleGrid => {
                let visible = self.scene.toggle_grid();
                log::debug!("Grid visible: {visible}");
            }
            ViewerCommand::CycleBackground => {
                let mode = self.scene.cycle_background();
                self.ctx.clear_colour = mode.clear_colour();
            }
            ViewerCommand::ToggleAutoRotate => {
                let controller = &mut self.ctx.camera.controller;
                controller.set_auto_rotate(!controller.auto_rotate());
            }
            ViewerCommand::Sensitivity(preset) => {
                let multiplier = self.loader.config().sensitivity_presets.multiplier(preset);
                self.ctx.camera.controller.set_sensitivity(multiplier);
                log::debug!("Sensitivity {preset:?} ({multiplier})");
            }
        }
    }

    fn update(&mut self, dt: instant::Duration) {
        self.poll_load();
        let camera = &mut self.ctx.camera;
        camera.controller.update(&mut camera.camera, dt);
        camera.write(&self.ctx.queue, &self.ctx.projection);
        self.scene.retire_scratch(Instant::now());
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.ctx.window.request_redraw();

        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        let output = self.ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            let camera_bind_group = &self.ctx.camera.bind_group;
            let light_bind_group = &self.ctx.light.bind_group;
            if self.scene.grid().visible {
                self.ctx.grid.draw(&mut render_pass, camera_bind_group);
            }
            if let Some(gpu) = self.scene.active().and_then(|active| active.handle.get()) {
                render_pass.set_pipeline(&self.ctx.pipelines.basic);
                render_pass.draw_meshes(gpu, gpu.opaque(), camera_bind_group, light_bind_group);
                render_pass.set_pipeline(&self.ctx.pipelines.transparent);
                render_pass.draw_meshes(
                    gpu,
                    gpu.transparent(),
                    camera_bind_group,
                    light_bind_group,
                );
            }
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Releases everything before the context goes away.
    fn teardown(&mut self) {
        self.loader.cancel_all();
        self.pending = None;
        self.scene.clear();
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    config: Arc<ViewerConfig>,
    state: Option<ViewerState>,
    // Requests that arrive before the viewport exists
    queued: Vec<LoadRequest>,
    last_time: Instant,
}

impl App {
    fn new(
        event_loop: &EventLoop<ViewerEvent>,
        config: ViewerConfig,
        initial: Option<LoadRequest>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            config: Arc::new(config),
            state: None,
            queued: initial.into_iter().collect(),
            last_time: Instant::now(),
        })
    }

    fn loader(&self) -> AssetLoader {
        #[cfg(not(target_arch = "wasm32"))]
        let loader = AssetLoader::new(self.config.clone(), self.async_runtime.handle().clone());
        #[cfg(target_arch = "wasm32")]
        let loader = AssetLoader::new(self.config.clone());
        loader
    }

    fn mount(&mut self, mut state: ViewerState) {
        let size = state.ctx.window.inner_size();
        state.resize(size.width, size.height);
        for request in self.queued.drain(..) {
            state.open(request);
        }
        state.ctx.window.request_redraw();
        self.state = Some(state);
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes()
            .with_title(TITLE)
            .with_transparent(true);

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Could not create a window: {e}");
                event_loop.exit();
                return;
            }
        };
        let init_future = ViewerState::new(window, self.loader());

        #[cfg(not(target_arch = "wasm32"))]
        match self.async_runtime.block_on(init_future) {
            Ok(state) => self.mount(state),
            Err(e) => {
                log::error!("Viewer initialization failed: {e:#}");
                event_loop.exit();
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match init_future.await {
                    Ok(state) => {
                        let _ = proxy.send_event(ViewerEvent::Initialized(Box::new(state)));
                    }
                    Err(e) => log::error!("Viewer initialization failed: {e:#}"),
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Initialized(state) => self.mount(*state),
            ViewerEvent::Open(request) => match &mut self.state {
                Some(state) => state.open(request),
                None => self.queued.push(request),
            },
            ViewerEvent::Exit => {
                if let Some(state) = &mut self.state {
                    state.teardown();
                }
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        match state.bindings.translate(&event) {
            Some(Binding::Orbit(input)) => {
                let camera = &mut state.ctx.camera;
                camera
                    .controller
                    .handle(input, &mut camera.camera, &state.ctx.projection);
            }
            Some(Binding::Command(command)) => state.command(command),
            None => {}
        }

        match event {
            WindowEvent::CloseRequested => {
                state.teardown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            #[cfg(not(target_arch = "wasm32"))]
            WindowEvent::DroppedFile(path) => state.open(path.into()),
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                state.update(dt);

                match state.render() {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.ctx.window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
            }
            _ => {}
        }
    }
}

/// A handle the host keeps to feed the running viewer.
#[derive(Clone)]
pub struct ViewerHandle {
    proxy: EventLoopProxy<ViewerEvent>,
}

impl ViewerHandle {
    /// Loads `request` in the viewer; returns `false` once the viewer has exited.
    pub fn open(&self, request: impl Into<LoadRequest>) -> bool {
        self.proxy.send_event(ViewerEvent::Open(request.into())).is_ok()
    }

    pub fn exit(&self) -> bool {
        self.proxy.send_event(ViewerEvent::Exit).is_ok()
    }
}

/// Opens a window and runs the viewer until it's closed.
pub fn run(config: ViewerConfig, initial: Option<LoadRequest>) -> anyhow::Result<()> {
    run_with(config, initial, |_| {})
}

/// Like [`run`], handing `on_ready` a [`ViewerHandle`] before the loop starts.
pub fn run_with(
    config: ViewerConfig,
    initial: Option<LoadRequest>,
    on_ready: impl FnOnce(ViewerHandle),
) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::log_1(&format!("Could not initialize logger: {e}").into());
        }
    }

    config.validate()?;
    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config, initial)?;
    on_ready(ViewerHandle {
        proxy: app.proxy.clone(),
    });

    event_loop.run_app(&mut app)?;

    Ok(())
}
