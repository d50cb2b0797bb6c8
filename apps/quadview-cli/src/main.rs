use anyhow::Context;
use clap::{Parser, Subcommand};
use quadview_common::{ImagePayload, ViewerConfig};
use quadview_input::{InputBridge, InputEvent};
use quadview_render::quad_scene::placeholder_image;
use quadview_render::shader::link_program;
use quadview_render::shaders::{QUAD_FRAGMENT_SHADER, QUAD_VERTEX_SHADER};
use quadview_render::{FrameReport, FrameScheduler, QuadScene, RecordingBackend};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quadview-cli", about = "Headless tools for the quadview renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Viewer config (JSON); defaults apply to missing keys
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, crate info and the effective config
    Info,
    /// Run frames against the recording backend and dump what was drawn
    Frames {
        /// Number of frames to run
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
        /// Starting orbit angle in radians (overrides the config)
        #[arg(long)]
        orbit: Option<f32>,
        /// Orbit step per frame in radians
        #[arg(long, default_value = "0.0")]
        spin: f32,
        /// Turn billboarding on
        #[arg(long)]
        billboard: bool,
        /// PNG to texture the quads with
        #[arg(long)]
        image: Option<PathBuf>,
        /// Emit one JSON object per frame instead of text
        #[arg(long)]
        json: bool,
    },
    /// Compile and link a WGSL program, printing its interface
    CheckShaders {
        /// Vertex stage source (defaults to the built-in quad shader)
        #[arg(long)]
        vertex: Option<PathBuf>,
        /// Fragment stage source (defaults to the built-in quad shader)
        #[arg(long)]
        fragment: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct DrawSummary {
    label: String,
    vertices: u32,
    model: Option<[f32; 16]>,
}

#[derive(Serialize)]
struct FrameSummary {
    frame: u64,
    orbit_angle: f32,
    billboard: bool,
    eye: [f32; 3],
    submitted: usize,
    skipped: Vec<String>,
    draws: Vec<DrawSummary>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => ViewerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ViewerConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("quadview-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", quadview_render::crate_info());
            println!("config: {}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Frames {
            count,
            orbit,
            spin,
            billboard,
            image,
            json,
        } => {
            let image = match image {
                Some(path) => load_image(&path)?,
                None => placeholder_image(64)?,
            };
            run_frames(&config, &image, count, orbit, spin, billboard, json)?;
        }
        Commands::CheckShaders { vertex, fragment } => {
            let vertex = read_or(vertex.as_deref(), QUAD_VERTEX_SHADER)?;
            let fragment = read_or(fragment.as_deref(), QUAD_FRAGMENT_SHADER)?;
            let iface = link_program(&vertex, &fragment)?;
            println!("entry points: {} / {}", iface.vertex_entry, iface.fragment_entry);
            for attr in &iface.attributes {
                println!("  attribute {} @location({}) x{}", attr.name, attr.location, attr.components);
            }
            for u in &iface.uniforms {
                println!("  uniform {} @group({}) @binding({}) {:?}", u.name, u.group, u.binding, u.kind);
            }
        }
    }

    Ok(())
}

fn run_frames(
    config: &ViewerConfig,
    image: &ImagePayload,
    count: u32,
    orbit: Option<f32>,
    spin: f32,
    billboard: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut backend = RecordingBackend::new();
    let mut quads = QuadScene::build(&mut backend, config, image)?;
    let mut bridge = InputBridge::new(QuadScene::initial_inputs(config));
    if let Some(angle) = orbit {
        bridge.apply(InputEvent::SetOrbitAngle(angle));
    }
    if billboard {
        bridge.apply(InputEvent::SetBillboard(true));
    }

    let mut scheduler = FrameScheduler::new();
    for i in 0..count {
        if i > 0 && spin != 0.0 {
            bridge.apply(InputEvent::NudgeOrbit(spin));
        }
        let report = scheduler.tick(&mut backend, &mut quads.scene, bridge.inputs())?;
        if json {
            let summary = summarize(&report, &backend, &quads, bridge.inputs().billboard);
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            print!("{}", backend.describe_last_frame());
            for skipped in &report.skipped {
                println!("  skipped `{}`: {}", skipped.label, skipped.error);
            }
        }
    }

    quads.release(&mut backend);
    tracing::info!(
        "ran {} frames; live resources after teardown: {}",
        scheduler.frames(),
        backend.live_programs() + backend.live_buffers() + backend.live_textures()
    );
    Ok(())
}

fn summarize(report: &FrameReport, backend: &RecordingBackend, quads: &QuadScene, billboard: bool) -> FrameSummary {
    FrameSummary {
        frame: report.frame,
        orbit_angle: quads.scene.camera.orbit_angle(),
        billboard,
        eye: quads.scene.camera.eye().to_array(),
        submitted: report.submitted,
        skipped: report.skipped.iter().map(|s| format!("{}: {}", s.label, s.error)).collect(),
        draws: backend
            .last_frame_draws()
            .into_iter()
            .map(|call| DrawSummary {
                label: call.label.clone(),
                vertices: call.vertex_count,
                model: call.matrix_at(0, 0).map(|m| m.to_cols_array()),
            })
            .collect(),
    }
}

fn load_image(path: &Path) -> anyhow::Result<ImagePayload> {
    let rgba = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImagePayload::new(width, height, rgba.into_raw())?)
}

fn read_or(path: Option<&Path>, fallback: &str) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display())),
        None => Ok(fallback.to_string()),
    }
}
