//! Renderer state shared by every backend.
//!
//! [`Renderer`] tracks what the page asked for (logical size, pixel ratio,
//! encoding, XR) and pushes the derived [`SurfaceConfig`] to whichever
//! [`RenderSurface`] the host mounted.

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::camera::PerspectiveCamera;
use crate::scene::Scene;

#[cfg(not(target_arch = "wasm32"))]
pub use native::WgpuSurface;
#[cfg(target_arch = "wasm32")]
pub use wasm::CanvasSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputEncoding {
    Linear,
    Srgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererSettings {
    pub antialias: bool,
    pub output_encoding: OutputEncoding,
    pub xr_enabled: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            antialias: true,
            output_encoding: OutputEncoding::Srgb,
            xr_enabled: true,
        }
    }
}

/// What a surface must present: physical buffer plus the CSS box it fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub logical_width: u32,
    pub logical_height: u32,
    pub sample_count: u32,
    pub output_encoding: OutputEncoding,
    pub xr_enabled: bool,
}

/// Everything a surface needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub scene: &'a Scene,
    pub camera: &'a PerspectiveCamera,
}

/// Output target mounted by a host: a window swapchain, a canvas, or nothing.
pub trait RenderSurface {
    fn label(&self) -> &str;

    /// Applies a new configuration. Never called with a zero-area buffer.
    fn configure(&mut self, config: &SurfaceConfig);

    fn render(&mut self, frame: &Frame<'_>) -> Result<()>;
}

/// Surface that accepts configuration and frames without drawing anything.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    config: Option<SurfaceConfig>,
    frames: u64,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&SurfaceConfig> {
        self.config.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderSurface for HeadlessSurface {
    fn label(&self) -> &str {
        "headless"
    }

    fn configure(&mut self, config: &SurfaceConfig) {
        self.config = Some(*config);
    }

    fn render(&mut self, _frame: &Frame<'_>) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}

pub struct Renderer {
    settings: RendererSettings,
    pixel_ratio: f32,
    size: (u32, u32),
    surface: Box<dyn RenderSurface>,
    configured: Option<SurfaceConfig>,
    frames: u64,
}

impl Renderer {
    pub fn new(settings: RendererSettings, surface: Box<dyn RenderSurface>) -> Self {
        Self {
            settings,
            pixel_ratio: 1.0,
            size: (0, 0),
            surface,
            configured: None,
            frames: 0,
        }
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn xr_enabled(&self) -> bool {
        self.settings.xr_enabled
    }

    pub fn surface_label(&self) -> &str {
        self.surface.label()
    }

    pub fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
        if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            self.pixel_ratio = pixel_ratio;
            self.reconfigure();
        }
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// Sets the logical (CSS pixel) size of the output.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.reconfigure();
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Physical size: logical size scaled by the pixel ratio, rounded down.
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        let scale = |value: u32| (value as f32 * self.pixel_ratio).floor() as u32;
        (scale(self.size.0), scale(self.size.1))
    }

    /// Last configuration pushed to the surface.
    pub fn surface_config(&self) -> Option<&SurfaceConfig> {
        self.configured.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<()> {
        if self.configured.is_none() {
            return Ok(());
        }
        self.surface.render(&Frame { scene, camera })?;
        self.frames += 1;
        Ok(())
    }

    fn reconfigure(&mut self) {
        let (width, height) = self.drawing_buffer_size();
        if width == 0 || height == 0 {
            return;
        }
        let config = SurfaceConfig {
            width,
            height,
            logical_width: self.size.0,
            logical_height: self.size.1,
            sample_count: if self.settings.antialias { 4 } else { 1 },
            output_encoding: self.settings.output_encoding,
            xr_enabled: self.settings.xr_enabled,
        };
        if self.configured != Some(config) {
            self.surface.configure(&config);
            self.configured = Some(config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> Renderer {
        Renderer::new(RendererSettings::default(), Box::new(HeadlessSurface::new()))
    }

    #[test]
    fn drawing_buffer_scales_with_pixel_ratio() {
        let mut renderer = renderer();
        renderer.set_pixel_ratio(1.5);
        renderer.set_size(801, 600);
        assert_eq!(renderer.size(), (801, 600));
        assert_eq!(renderer.drawing_buffer_size(), (1201, 900));
        let config = renderer.surface_config().unwrap();
        assert_eq!((config.width, config.height), (1201, 900));
        assert_eq!((config.logical_width, config.logical_height), (801, 600));
        assert_eq!(config.sample_count, 4);
        assert_eq!(config.output_encoding, OutputEncoding::Srgb);
        assert!(config.xr_enabled);
    }

    #[test]
    fn zero_area_keeps_previous_configuration() {
        let mut renderer = renderer();
        renderer.set_size(640, 480);
        renderer.set_size(640, 0);
        assert_eq!(renderer.size(), (640, 0));
        assert_eq!(renderer.surface_config().unwrap().height, 480);
    }

    #[test]
    fn invalid_pixel_ratio_is_ignored() {
        let mut renderer = renderer();
        renderer.set_pixel_ratio(0.0);
        renderer.set_pixel_ratio(f32::NAN);
        assert_eq!(renderer.pixel_ratio(), 1.0);
    }

    #[test]
    fn frames_wait_for_a_configured_surface() {
        let mut renderer = renderer();
        let scene = Scene::new();
        let camera = PerspectiveCamera::new(70.0, 1.0, 0.1, 5000.0);
        renderer.render(&scene, &camera).unwrap();
        assert_eq!(renderer.frames_rendered(), 0);
        renderer.set_size(10, 10);
        renderer.render(&scene, &camera).unwrap();
        assert_eq!(renderer.frames_rendered(), 1);
    }

    #[test]
    fn aliased_output_uses_single_sample() {
        let settings = RendererSettings {
            antialias: false,
            ..RendererSettings::default()
        };
        let mut renderer = Renderer::new(settings, Box::new(HeadlessSurface::new()));
        renderer.set_size(2, 2);
        assert_eq!(renderer.surface_config().unwrap().sample_count, 1);
    }
}
