use anyhow::{Context, Result, anyhow};
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec3;
use quadview_common::{ImagePayload, ViewerConfig};
use quadview_input::{InputBridge, InputEvent};
use quadview_render::quad_scene::placeholder_image;
use quadview_render::{FrameScheduler, QuadScene};
use quadview_render_wgpu::WgpuBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

/// Orbit step for one arrow key press, in radians.
const ORBIT_STEP: f32 = 0.05;

#[derive(Parser)]
#[command(name = "quadview-desktop", about = "Textured quad viewer with orbit and billboard controls")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Viewer config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// PNG to texture the quads with; a placeholder is drawn otherwise
    #[arg(long)]
    image: Option<PathBuf>,

    /// Window width (overrides the config)
    #[arg(long)]
    width: Option<u32>,

    /// Window height (overrides the config)
    #[arg(long)]
    height: Option<u32>,
}

/// Everything that exists only once a window does.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    backend: WgpuBackend,
    quads: QuadScene,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

struct ViewerApp {
    config: ViewerConfig,
    image: ImagePayload,
    bridge: InputBridge,
    scheduler: FrameScheduler,
    egui_ctx: EguiContext,
    gpu: Option<Gpu>,
    fatal: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(config: ViewerConfig, image: ImagePayload) -> Self {
        let bridge = InputBridge::new(QuadScene::initial_inputs(&config));
        Self {
            config,
            image,
            bridge,
            scheduler: FrameScheduler::new(),
            egui_ctx: EguiContext::default(),
            gpu: None,
            fatal: None,
        }
    }

    fn init_gpu(&self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title("quadview")
            .with_transparent(true)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("no GPU adapter can draw to this window"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("quadview_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("creating device")?;

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no formats"))?;
        let alpha_mode = if caps.alpha_modes.contains(&wgpu::CompositeAlphaMode::PreMultiplied) {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let egui_renderer = egui_wgpu::Renderer::new(&device, format, None, 1, false);
        let mut backend = WgpuBackend::new(device, queue, format, surface_config.width, surface_config.height);

        let mut scene_config = self.config.clone();
        scene_config.width = surface_config.width;
        scene_config.height = surface_config.height;
        let quads = QuadScene::build(&mut backend, &scene_config, &self.image)?;

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        tracing::info!("GPU initialized with {} backend", adapter.get_info().backend.to_str());
        Ok(Gpu {
            window,
            surface,
            surface_config,
            backend,
            quads,
            egui_winit,
            egui_renderer,
        })
    }

    fn handle_key(&mut self, key: KeyCode) {
        let event = match key {
            KeyCode::KeyB => InputEvent::ToggleBillboard,
            KeyCode::ArrowLeft => InputEvent::NudgeOrbit(-ORBIT_STEP),
            KeyCode::ArrowRight => InputEvent::NudgeOrbit(ORBIT_STEP),
            KeyCode::Digit0 => InputEvent::SetOrbitAngle(0.0),
            _ => return,
        };
        if self.bridge.apply(event) {
            if let Some(gpu) = &self.gpu {
                gpu.window.request_redraw();
            }
        }
    }

    fn redraw(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(gpu.backend.device(), &gpu.surface_config);
                gpu.window.request_redraw();
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };

        // UI first, so this frame's slider and checkbox changes are drawn.
        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let mut events = Vec::new();
        let bridge = &self.bridge;
        let frames = self.scheduler.frames();
        let eye = gpu.quads.scene.camera.eye();
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            draw_ui(ctx, bridge, frames, eye, &mut events);
        });
        for event in events {
            self.bridge.apply(event);
        }
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        gpu.backend
            .set_target(output.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        if let Err(e) = self
            .scheduler
            .tick(&mut gpu.backend, &mut gpu.quads.scene, self.bridge.inputs())
        {
            tracing::error!("frame failed: {e}");
        }

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.surface_config.width, gpu.surface_config.height],
            pixels_per_point: full_output.pixels_per_point,
        };
        let device = gpu.backend.device();
        let queue = gpu.backend.queue();
        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer.update_texture(device, queue, *id, image_delta);
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui_encoder"),
        });
        gpu.egui_renderer
            .update_buffers(device, queue, &mut encoder, &paint_jobs, &screen_descriptor);
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer.render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
    }
}

fn draw_ui(
    ctx: &EguiContext,
    bridge: &InputBridge,
    frames: u64,
    eye: Vec3,
    events: &mut Vec<InputEvent>,
) {
    egui::SidePanel::left("controls")
        .default_width(220.0)
        .show(ctx, |ui| {
            ui.heading("quadview");
            ui.separator();

            let mut slider = bridge.slider_position();
            if ui
                .add(egui::Slider::new(&mut slider, 0.0..=1.0).text("orbit"))
                .changed()
            {
                events.push(InputEvent::OrbitSlider(slider));
            }
            ui.label(format!("angle: {:.1}°", bridge.inputs().orbit_angle.to_degrees()));

            let mut billboard = bridge.inputs().billboard;
            if ui.checkbox(&mut billboard, "billboard").changed() {
                events.push(InputEvent::SetBillboard(billboard));
            }

            ui.separator();
            ui.label(format!("frames: {frames}"));
            ui.label(format!("eye: ({:.2}, {:.2}, {:.2})", eye.x, eye.y, eye.z));
            ui.small("←/→: orbit | 0: reset | B: billboard");
        });
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init_gpu(event_loop) {
            Ok(gpu) => {
                self.scheduler.on_frame(|report| {
                    if !report.is_complete() {
                        tracing::debug!("frame {} skipped {} draws", report.frame, report.skipped.len());
                    }
                });
                gpu.window.request_redraw();
                self.gpu = Some(gpu);
            }
            Err(e) => {
                tracing::error!("could not start renderer: {e:#}");
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.repaint {
                gpu.window.request_redraw();
            }
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.quads.release(&mut gpu.backend);
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.surface_config.width = new_size.width.max(1);
                    gpu.surface_config.height = new_size.height.max(1);
                    gpu.surface.configure(gpu.backend.device(), &gpu.surface_config);
                    gpu.backend
                        .resize(gpu.surface_config.width, gpu.surface_config.height);
                }
                self.bridge.apply(InputEvent::Resize {
                    width: new_size.width,
                    height: new_size.height,
                });
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.handle_key(key),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    // Failed or skipped frames still get a next frame.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn load_image(path: &Path) -> Result<ImagePayload> {
    let rgba = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImagePayload::new(width, height, rgba.into_raw())?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("quadview-desktop starting");

    let mut config = match &cli.config {
        Some(path) => ViewerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    if let Some(width) = cli.width {
        config.width = width;
    }
    if let Some(height) = cli.height {
        config.height = height;
    }
    let image = match &cli.image {
        Some(path) => load_image(path)?,
        None => placeholder_image(128)?,
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::new(config, image);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
