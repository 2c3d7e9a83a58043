//! Image-based lighting: decode an equirectangular panorama and prefilter it
//! into a roughness-indexed mip chain.
//!
//! Level 0 keeps the sharpest reflection; every following level halves the
//! resolution and is blurred once more, standing in for a rougher surface.
//! Sampling blends the two levels that bracket the requested roughness.

use std::f32::consts::PI;

use glam::Vec3;
use log::debug;

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("failed to decode environment image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("environment image has zero area")]
    Empty,
}

/// Linear RGB panorama in equirectangular layout, row-major from the zenith.
#[derive(Debug, Clone, PartialEq)]
pub struct EquirectTexture {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<Vec3>,
}

impl EquirectTexture {
    /// Decodes any format the `image` crate knows (EXR, Radiance HDR, PNG).
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvironmentError> {
        let image = image::load_from_memory(bytes)?.into_rgb32f();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EnvironmentError::Empty);
        }
        let texels = image
            .pixels()
            .map(|pixel| Vec3::from_array(pixel.0))
            .collect();
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    pub fn from_fn(width: u32, height: u32, mut texel: impl FnMut(u32, u32) -> Vec3) -> Self {
        let mut texels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                texels.push(texel(x, y));
            }
        }
        Self {
            width,
            height,
            texels,
        }
    }

    fn texel(&self, x: u32, y: u32) -> Vec3 {
        self.texels[(y * self.width + x) as usize]
    }

    fn downsample(&self) -> Self {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        Self::from_fn(width, height, |x, y| {
            let x0 = (x * 2).min(self.width - 1);
            let x1 = (x * 2 + 1).min(self.width - 1);
            let y0 = (y * 2).min(self.height - 1);
            let y1 = (y * 2 + 1).min(self.height - 1);
            (self.texel(x0, y0) + self.texel(x1, y0) + self.texel(x0, y1) + self.texel(x1, y1))
                * 0.25
        })
    }

    // Longitude wraps around, latitude clamps at the poles.
    fn blur(&self) -> Self {
        let horizontal = Self::from_fn(self.width, self.height, |x, y| {
            let left = self.texel((x + self.width - 1) % self.width, y);
            let right = self.texel((x + 1) % self.width, y);
            (left + self.texel(x, y) * 2.0 + right) * 0.25
        });
        Self::from_fn(self.width, self.height, |x, y| {
            let up = horizontal.texel(x, y.saturating_sub(1));
            let down = horizontal.texel(x, (y + 1).min(self.height - 1));
            (up + horizontal.texel(x, y) * 2.0 + down) * 0.25
        })
    }
}

/// One prefiltered level of an [`EnvironmentMap`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentLevel {
    pub roughness: f32,
    pub texture: EquirectTexture,
}

/// Prefiltered environment used for reflections and ambient light.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    levels: Vec<EnvironmentLevel>,
}

impl EnvironmentMap {
    /// Decodes `bytes` and prefilters them with the default generator.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvironmentError> {
        let texture = EquirectTexture::decode(bytes)?;
        Ok(PmremGenerator::default().from_equirectangular(&texture))
    }

    pub fn levels(&self) -> &[EnvironmentLevel] {
        &self.levels
    }

    /// Radiance arriving from `direction` as seen by a surface of `roughness`.
    pub fn sample(&self, direction: Vec3, roughness: f32) -> Vec3 {
        let last = self.levels.len() - 1;
        let position = roughness.clamp(0.0, 1.0) * last as f32;
        let lower = (position.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        let t = position - lower as f32;
        let a = sample_nearest(&self.levels[lower].texture, direction);
        let b = sample_nearest(&self.levels[upper].texture, direction);
        a.lerp(b, t)
    }

    /// Average radiance of the roughest level.
    pub fn irradiance(&self) -> Vec3 {
        let texture = &self.levels[self.levels.len() - 1].texture;
        let sum: Vec3 = texture.texels.iter().copied().sum();
        sum / texture.texels.len() as f32
    }
}

fn sample_nearest(texture: &EquirectTexture, direction: Vec3) -> Vec3 {
    let direction = direction.normalize_or_zero();
    let u = 0.5 + direction.z.atan2(direction.x) / (2.0 * PI);
    let v = direction.y.clamp(-1.0, 1.0).acos() / PI;
    let x = ((u * texture.width as f32) as u32).min(texture.width - 1);
    let y = ((v * texture.height as f32) as u32).min(texture.height - 1);
    texture.texel(x, y)
}

/// Builds [`EnvironmentMap`]s from equirectangular panoramas.
#[derive(Debug, Clone, Copy)]
pub struct PmremGenerator {
    /// Widest level kept; larger sources are box-filtered down first.
    pub max_width: u32,
    pub max_levels: usize,
}

impl Default for PmremGenerator {
    fn default() -> Self {
        Self {
            max_width: 256,
            max_levels: 6,
        }
    }
}

impl PmremGenerator {
    pub fn from_equirectangular(&self, source: &EquirectTexture) -> EnvironmentMap {
        let mut base = source.clone();
        while base.width > self.max_width.max(1) {
            base = base.downsample();
        }

        let mut textures = vec![base];
        while textures.len() < self.max_levels.max(1) {
            let previous = &textures[textures.len() - 1];
            if previous.width == 1 && previous.height == 1 {
                break;
            }
            let next = previous.downsample().blur();
            textures.push(next);
        }

        let last = (textures.len() - 1).max(1) as f32;
        let levels: Vec<EnvironmentLevel> = textures
            .into_iter()
            .enumerate()
            .map(|(index, texture)| EnvironmentLevel {
                roughness: index as f32 / last,
                texture,
            })
            .collect();
        debug!(
            "prefiltered {}x{} environment into {} levels",
            source.width,
            source.height,
            levels.len()
        );
        EnvironmentMap { levels }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn uniform(width: u32, height: u32, color: Vec3) -> EquirectTexture {
        EquirectTexture::from_fn(width, height, |_, _| color)
    }

    #[test]
    fn levels_halve_with_increasing_roughness() {
        let map = PmremGenerator::default().from_equirectangular(&uniform(64, 32, Vec3::ONE));
        let levels = map.levels();
        assert_eq!(levels.len(), 6);
        assert_eq!(levels[0].roughness, 0.0);
        assert_eq!(levels[5].roughness, 1.0);
        for pair in levels.windows(2) {
            assert!(pair[1].roughness > pair[0].roughness);
            assert_eq!(pair[1].texture.width, pair[0].texture.width / 2);
        }
    }

    #[test]
    fn oversized_sources_are_reduced_first() {
        let generator = PmremGenerator {
            max_width: 16,
            max_levels: 2,
        };
        let map = generator.from_equirectangular(&uniform(128, 64, Vec3::ONE));
        assert_eq!(map.levels()[0].texture.width, 16);
        assert_eq!(map.levels()[0].texture.height, 8);
    }

    #[test]
    fn uniform_panorama_stays_uniform() {
        let color = Vec3::new(0.2, 0.4, 0.8);
        let map = PmremGenerator::default().from_equirectangular(&uniform(32, 16, color));
        for roughness in [0.0, 0.3, 1.0] {
            let sample = map.sample(Vec3::new(0.3, 0.5, -1.0), roughness);
            assert!((sample - color).length() < 1e-5);
        }
        assert!((map.irradiance() - color).length() < 1e-5);
    }

    #[test]
    fn sharp_level_resolves_sky_and_ground() {
        let sky = Vec3::new(0.5, 0.7, 1.0);
        let ground = Vec3::new(0.2, 0.1, 0.0);
        let panorama = EquirectTexture::from_fn(32, 16, |_, y| if y < 8 { sky } else { ground });
        let map = PmremGenerator::default().from_equirectangular(&panorama);
        assert_eq!(map.sample(Vec3::Y, 0.0), sky);
        assert_eq!(map.sample(Vec3::NEG_Y, 0.0), ground);
        let rough = map.sample(Vec3::Y, 1.0);
        assert!(rough.x < sky.x && rough.x > ground.x);
    }

    #[test]
    fn decodes_png_panoramas() {
        let image = RgbImage::from_pixel(4, 2, Rgb([255, 0, 0]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        let map = EnvironmentMap::decode(bytes.get_ref()).unwrap();
        assert!((map.sample(Vec3::X, 0.0) - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(matches!(
            EnvironmentMap::decode(b"not an image"),
            Err(EnvironmentError::Decode(_))
        ));
    }
}
