//! Application event loop.
//!
//! This module drives the renderer from a winit window: it loads the scene and the panorama,
//! bakes the environment once, and then renders one frame per redraw request until the
//! window closes.
//!
//! # Lifecycle
//!
//! 1. `resumed` creates the window and starts the asynchronous setup
//! 2. setup loads the glTF document and the HDR panorama, bakes the cubemap and the
//!    irradiance map and builds the scene renderer and the skybox pass
//! 3. every `RedrawRequested` advances the model's spin, records the scene and the skybox
//!    into the surface pass, submits and presents
//!
//! Setup failures stop the event loop and are returned from [`run`].

use std::sync::Arc;

use cgmath::{Matrix4, Vector3};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{
    camera::{Camera, Projection},
    config::Config,
    context::Context,
    gpu::frame::ClearValues,
    math,
    pipelines::{Environment, skybox::SkyboxPass},
    render::SceneRenderer,
    resources::{load_gltf, texture::load_panorama},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Everything a running viewer owns.
pub struct Viewer {
    ctx: Context,
    renderer: SceneRenderer,
    skybox: SkyboxPass,
    environment: Environment,
    camera: Camera,
    projection: Projection,
    config: Config,
    scene: Option<usize>,
    spin: [f32; 3],
}

impl Viewer {
    pub async fn new(window: Arc<Window>, config: Config) -> anyhow::Result<Self> {
        let mut ctx = Context::new(window).await?;
        ctx.states.set_clear_color(config.clear_color);

        let document = load_gltf(&config.scene_path).await?;
        let panorama = load_panorama(&config.panorama_path).await?;
        let environment = Environment::bake(&mut ctx, &panorama, &config)?;

        let mut renderer = SceneRenderer::new(&ctx, document, &config)?;
        renderer.set_irradiance(environment.irradiance.clone());
        let (width, height) = ctx.surface_size().unwrap_or((1, 1));
        let projection = Projection::from_config(&config, width, height);
        renderer.set_projection(&projection);
        let camera = Camera::default();
        renderer.set_camera(&camera);

        Ok(Self {
            skybox: SkyboxPass::new(&ctx),
            scene: renderer.default_scene(),
            ctx,
            renderer,
            environment,
            camera,
            projection,
            config,
            spin: [0.0; 3],
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.ctx.resize(width, height);
        self.projection.resize(width, height);
        self.renderer.set_projection(&self.projection);
    }

    /// The model matrix for this frame: the configured position, rotated by the accumulated
    /// spin.
    fn advance_model(&mut self) -> Matrix4<f32> {
        let step = self.config.spin_per_frame;
        self.spin = self.spin.map(|angle| angle + step);
        math::compose(
            Vector3::from(self.config.model_position),
            math::quaternion_from_euler(self.spin, self.config.spin_order),
            Vector3::new(1.0, 1.0, 1.0),
        )
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let Some((output, target)) = self.ctx.acquire_frame()? else {
            return Ok(());
        };
        let model = self.advance_model();
        let mut frame = self.ctx.new_frame();
        frame.begin_pass(target, Some(ClearValues::from(&self.ctx.states)));

        if let Some(scene) = self.scene {
            if let Err(e) = self.renderer.render_scene(&mut self.ctx, &mut frame, scene, model) {
                log::error!("scene draw failed: {e}");
            }
        }
        let cubemap = self.environment.skybox(self.config.skybox_source);
        if let Err(e) = self.skybox.draw(
            &mut self.ctx,
            &mut frame,
            cubemap,
            self.camera.view_matrix(),
            self.projection.calc_matrix(),
        ) {
            log::error!("skybox draw failed: {e}");
        }

        self.ctx.submit(frame);
        output.present();
        Ok(())
    }
}

enum ViewerEvent {
    #[allow(dead_code)]
    Initialized(Box<Viewer>),
    #[allow(dead_code)]
    Failed(String),
}

struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: winit::event_loop::EventLoopProxy<ViewerEvent>,
    // taken once the window exists
    config: Option<Config>,
    viewer: Option<Viewer>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(event_loop: &EventLoop<ViewerEvent>, config: Config) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy,
            config: Some(config),
            viewer: None,
            error: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(config) = self.config.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("pbr-ngin");

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
            Err(e) => return self.fail(event_loop, e.into()),
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self
                .async_runtime
                .block_on(Viewer::new(window.clone(), config))
            {
                Ok(viewer) => {
                    self.viewer = Some(viewer);
                    window.request_redraw();
                }
                Err(e) => self.fail(event_loop, e),
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let event = match Viewer::new(window, config).await {
                    Ok(viewer) => ViewerEvent::Initialized(Box::new(viewer)),
                    Err(e) => ViewerEvent::Failed(format!("{e:#}")),
                };
                if proxy.send_event(event).is_err() {
                    log::error!("event loop closed before the viewer was ready");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Initialized(viewer) => {
                let mut viewer = *viewer;
                if let Some(window) = viewer.ctx.window().cloned() {
                    let size = window.inner_size();
                    viewer.resize(size.width, size.height);
                    window.request_redraw();
                }
                self.viewer = Some(viewer);
            }
            ViewerEvent::Failed(message) => self.fail(event_loop, anyhow::anyhow!(message)),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let viewer = match &mut self.viewer {
            Some(viewer) => viewer,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => viewer.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                match viewer.render() {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        if let Some((width, height)) = viewer.ctx.surface_size() {
                            viewer.resize(width, height);
                        }
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("out of memory");
                        event_loop.exit();
                    }
                    Err(e) => log::warn!("skipped frame: {e}"),
                }
                if let Some(window) = viewer.ctx.window() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Opens a window and runs the viewer until it is closed.
pub fn run(config: Config) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config)?;
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
