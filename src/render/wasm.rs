use anyhow::{anyhow, Result};
use glam::{Vec3, Vec4Swizzles};
use log::warn;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use super::{Frame, OutputEncoding, RenderSurface, SurfaceConfig};
use crate::scene::VERTEX_STRIDE;

/// Flat-shaded fallback that draws into a 2D canvas.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    size: (u32, u32),
    encoding: OutputEncoding,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let context = canvas
            .get_context("2d")
            .map_err(|err| anyhow!("failed to query canvas context: {err:?}"))?
            .ok_or_else(|| anyhow!("canvas does not support 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| anyhow!("failed to cast canvas context"))?;

        let size = (canvas.width(), canvas.height());
        Ok(Self {
            canvas,
            context,
            size,
            encoding: OutputEncoding::Srgb,
        })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    fn clear_background(&self) {
        self.context.set_fill_style(&"#06060a".into());
        self.context
            .fill_rect(0.0, 0.0, self.size.0 as f64, self.size.1 as f64);
    }

    fn to_screen(&self, clip: glam::Vec4) -> Option<(f64, f64)> {
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.xy() / clip.w;
        let x = (ndc.x as f64 * 0.5 + 0.5) * self.size.0 as f64;
        let y = (0.5 - ndc.y as f64 * 0.5) * self.size.1 as f64;
        Some((x, y))
    }

    fn css_color(&self, color: Vec3) -> String {
        let color = match self.encoding {
            OutputEncoding::Srgb => color.clamp(Vec3::ZERO, Vec3::ONE).powf(1.0 / 2.2),
            OutputEncoding::Linear => color.clamp(Vec3::ZERO, Vec3::ONE),
        };
        let channel = |value: f32| (value * 255.0).round() as u8;
        format!(
            "rgb({}, {}, {})",
            channel(color.x),
            channel(color.y),
            channel(color.z)
        )
    }
}

impl RenderSurface for CanvasSurface {
    fn label(&self) -> &str {
        "canvas-2d"
    }

    fn configure(&mut self, config: &SurfaceConfig) {
        self.size = (config.width, config.height);
        self.encoding = config.output_encoding;
        self.canvas.set_width(config.width);
        self.canvas.set_height(config.height);

        let style = self.canvas.style();
        for (property, value) in [
            ("width", format!("{}px", config.logical_width)),
            ("height", format!("{}px", config.logical_height)),
        ] {
            if let Err(err) = style.set_property(property, &value) {
                warn!("failed to set canvas {property}: {err:?}");
            }
        }
        let xr = if config.xr_enabled { "enabled" } else { "disabled" };
        if let Err(err) = self.canvas.set_attribute("data-xr", xr) {
            warn!("failed to tag canvas for XR: {err:?}");
        }
    }

    fn render(&mut self, frame: &Frame<'_>) -> Result<()> {
        self.clear_background();

        let scene = frame.scene;
        let view_proj = frame.camera.view_projection();
        let ambient = scene
            .environment
            .as_deref()
            .map(|environment| environment.irradiance())
            .unwrap_or(Vec3::ZERO);

        let draw_list = scene.draw_list();
        for item in &draw_list {
            let clip = view_proj * item.model;
            let vertex = |index: u32| {
                let start = index as usize * VERTEX_STRIDE;
                let position = Vec3::from_slice(&item.mesh.vertices[start..start + 3]);
                let normal = Vec3::from_slice(&item.mesh.vertices[start + 3..start + 6]);
                (clip * position.extend(1.0), item.normal * normal)
            };

            for triangle in item.mesh.indices.chunks_exact(3) {
                let corners = [vertex(triangle[0]), vertex(triangle[1]), vertex(triangle[2])];
                let Some(points) = corners
                    .iter()
                    .map(|(clip, _)| self.to_screen(*clip))
                    .collect::<Option<Vec<_>>>()
                else {
                    continue;
                };

                let normal = (corners[0].1 + corners[1].1 + corners[2].1).normalize_or_zero();
                let mut light = ambient;
                if let Some(hemisphere) = scene.hemisphere_light() {
                    light += hemisphere.irradiance(normal);
                }
                if let Some(sun) = scene.directional_light() {
                    light += sun.color * sun.intensity * normal.dot(-sun.direction()).max(0.0);
                }

                self.context
                    .set_fill_style(&self.css_color(light * item.mesh.color).into());
                self.context.begin_path();
                self.context.move_to(points[0].0, points[0].1);
                self.context.line_to(points[1].0, points[1].1);
                self.context.line_to(points[2].0, points[2].1);
                self.context.close_path();
                self.context.fill();
            }
        }

        self.context.set_fill_style(&"white".into());
        let summary = format!(
            "Meshes: {}  Lights: {}  Environment: {}",
            draw_list.len(),
            scene.lights.len(),
            if scene.environment.is_some() {
                "ready"
            } else {
                "loading"
            },
        );
        self.context
            .fill_text(&summary, 10.0, 24.0)
            .map_err(|err| anyhow!("failed to draw summary: {err:?}"))?;
        Ok(())
    }
}
