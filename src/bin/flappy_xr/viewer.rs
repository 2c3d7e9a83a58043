use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::{error, info};
use pollster::block_on;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use flappy_xr::{
    setup_scene, DispatchHost, Light, RenderSurface, Scene, SceneConfig, SceneHandle,
    ThreadedAssetLoader, Viewport, WgpuSurface, DEFAULT_ENVIRONMENT, DEFAULT_MODEL,
};

const VIEWER_EYE: Vec3 = Vec3::new(0.0, 1.0, 5.0);

pub fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = options.scene_config();

    if options.summary_only {
        return run_summary(&options, &config);
    }
    match run_interactive(&options, &config) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
            );
            run_summary(&options, &config)
        }
        Err(err) => Err(err),
    }
}

/// Builds the scene without a window, waits for both loads and prints it.
fn run_summary(options: &CliOptions, config: &SceneConfig) -> Result<()> {
    let host = DispatchHost::new(Viewport::new(options.size.0, options.size.1));
    let loader = ThreadedAssetLoader::new(&options.assets);
    let handle = setup_scene(&host, &loader, config)?;
    loader.wait();
    print_summary(&handle);
    handle.teardown();
    Ok(())
}

fn print_summary(handle: &SceneHandle) {
    {
        let camera = handle.camera.borrow();
        println!(
            "Camera: fov {:.1}, aspect {:.2}, near {}, far {}",
            camera.fov, camera.aspect, camera.near, camera.far
        );
    }
    {
        let renderer = handle.renderer.borrow();
        let settings = renderer.settings();
        let (width, height) = renderer.size();
        println!(
            "Renderer: {width}x{height} @{:.2}x ({}, antialias {}, {:?}, xr {})",
            renderer.pixel_ratio(),
            renderer.surface_label(),
            on_off(settings.antialias),
            settings.output_encoding,
            on_off(settings.xr_enabled),
        );
    }
    handle.scene.read(|scene| {
        println!("Lights: {}", describe_lights(scene));
        match scene.environment.as_deref() {
            Some(environment) => {
                println!("Environment: {} levels", environment.levels().len())
            }
            None => println!("Environment: not loaded"),
        }
        if scene.children.is_empty() {
            println!("Model: not loaded");
        }
        for child in &scene.children {
            println!("Model: {} ({} meshes)", child.name, child.mesh_count());
        }
    });
}

fn describe_lights(scene: &Scene) -> String {
    scene
        .lights
        .iter()
        .map(|light| match light {
            Light::Hemisphere(light) => format!(
                "hemisphere {}/{}",
                hex(light.sky_color),
                hex(light.ground_color)
            ),
            Light::Directional(light) => format!("directional {}", hex(light.color)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn hex(color: Vec3) -> String {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u32;
    format!(
        "#{:06x}",
        channel(color.x) << 16 | channel(color.y) << 8 | channel(color.z)
    )
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn window_viewport(size: PhysicalSize<u32>, scale_factor: f64) -> Viewport {
    let logical: LogicalSize<u32> = size.to_logical(scale_factor);
    Viewport::new(logical.width, logical.height).with_pixel_ratio(scale_factor as f32)
}

fn run_interactive(options: &CliOptions, config: &SceneConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Flappy XR")
            .with_inner_size(LogicalSize::new(options.size.0, options.size.1))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let surface_window = Arc::clone(&window);
    let host = DispatchHost::with_surface_factory(
        window_viewport(window.inner_size(), window.scale_factor()),
        move |settings| {
            let surface = block_on(WgpuSurface::new(Arc::clone(&surface_window), settings))?;
            Ok(Box::new(surface) as Box<dyn RenderSurface>)
        },
    );
    let loader = ThreadedAssetLoader::new(&options.assets);
    let handle = setup_scene(&host, &loader, config)?;
    handle.camera.borrow_mut().position = VIEWER_EYE;
    handle.camera.borrow_mut().look_at(Vec3::ZERO);
    info!("viewing {} from {}", config.model_path, options.assets.display());

    let mut app = AppState {
        window,
        host,
        handle,
        last_error: None,
    };
    event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        if let Err(err) = app.process_event(&event) {
            app.last_error = Some(err);
            elwt.exit();
        }
        if app.closing(&event) {
            elwt.exit();
        }
    })?;

    match app.last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct AppState {
    window: Arc<Window>,
    host: DispatchHost,
    handle: SceneHandle,
    last_error: Option<anyhow::Error>,
}

impl AppState {
    fn process_event(&mut self, event: &Event<()>) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.window.id() => {
                match event {
                    WindowEvent::Resized(size) => {
                        self.host
                            .resize(window_viewport(*size, self.window.scale_factor()));
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        let viewport = window_viewport(self.window.inner_size(), *scale_factor);
                        self.handle
                            .renderer
                            .borrow_mut()
                            .set_pixel_ratio(viewport.device_pixel_ratio);
                        self.host.resize(viewport);
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(err) = self.handle.render_frame() {
                            error!("{err:#}");
                            return Err(err);
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                self.window.request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn closing(&self, event: &Event<()>) -> bool {
        matches!(
            event,
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                window_id,
            } if *window_id == self.window.id()
        )
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

const USAGE: &str = "Usage: flappy-xr [--assets <dir>] [--environment <path>] [--model <path>] [--size <WxH>] [--summary-only]";

#[derive(Debug)]
struct CliOptions {
    assets: PathBuf,
    environment: String,
    model: String,
    size: (u32, u32),
    summary_only: bool,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            assets: PathBuf::from("."),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            size: (1280, 720),
            summary_only: false,
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} needs a value. {USAGE}"))
            };
            match arg.as_str() {
                "--assets" => options.assets = PathBuf::from(value("--assets")?),
                "--environment" => options.environment = value("--environment")?,
                "--model" => options.model = value("--model")?,
                "--size" => options.size = parse_size(&value("--size")?)?,
                "--summary-only" => options.summary_only = true,
                other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
            }
        }
        Ok(options)
    }

    fn scene_config(&self) -> SceneConfig {
        SceneConfig {
            environment_path: self.environment.clone(),
            model_path: self.model.clone(),
            ..SceneConfig::default()
        }
    }
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("size must look like 1280x720, got {value}"))?;
    let width = width
        .parse()
        .with_context(|| format!("invalid width in {value}"))?;
    let height = height
        .parse()
        .with_context(|| format!("invalid height in {value}"))?;
    Ok((width, height))
}
