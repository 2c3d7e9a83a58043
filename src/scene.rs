use std::sync::Arc;

use glam::{Mat3, Mat4, Quat, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentMap;

/// Converts a `0xRRGGBB` colour into linear-ish `[0, 1]` components.
pub fn rgb_from_hex(hex: u32) -> Vec3 {
    let r = ((hex >> 16) & 0xff) as f32;
    let g = ((hex >> 8) & 0xff) as f32;
    let b = (hex & 0xff) as f32;
    Vec3::new(r / 255.0, g / 255.0, b / 255.0)
}

/// Sky/ground gradient light applied to every surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HemisphereLight {
    pub sky_color: Vec3,
    pub ground_color: Vec3,
    pub intensity: f32,
}

impl HemisphereLight {
    pub fn new(sky: u32, ground: u32) -> Self {
        Self {
            sky_color: rgb_from_hex(sky),
            ground_color: rgb_from_hex(ground),
            intensity: 1.0,
        }
    }

    /// Light received by a surface with the given normal.
    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        let weight = 0.5 * normal.normalize_or_zero().y + 0.5;
        self.ground_color.lerp(self.sky_color, weight) * self.intensity
    }
}

/// Light shining from `position` towards the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

impl DirectionalLight {
    pub fn new(color: u32) -> Self {
        Self {
            color: rgb_from_hex(color),
            intensity: 1.0,
            position: Vec3::Y,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Unit vector the light travels along.
    pub fn direction(&self) -> Vec3 {
        (-self.position).normalize_or_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Light {
    Hemisphere(HemisphereLight),
    Directional(DirectionalLight),
}

/// Interleaved triangle mesh: `position.xyz` followed by `normal.xyz`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    #[serde(default = "default_color")]
    pub color: Vec3,
}

pub const VERTEX_STRIDE: usize = 6;

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

/// Node of a loaded model hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub meshes: Vec<MeshData>,
    pub children: Vec<SceneNode>,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Calls `visit` with the world matrix of every mesh below this node.
    pub fn visit_meshes<'a>(&'a self, parent: Mat4, visit: &mut impl FnMut(Mat4, &'a MeshData)) {
        let world = parent * self.local_matrix();
        for mesh in &self.meshes {
            visit(world, mesh);
        }
        for child in &self.children {
            child.visit_meshes(world, visit);
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len() + self.children.iter().map(SceneNode::mesh_count).sum::<usize>()
    }

    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}

/// Mesh reference produced when flattening the scene for drawing.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem<'a> {
    pub model: Mat4,
    pub normal: Mat3,
    pub mesh: &'a MeshData,
}

/// Root of the scene graph.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub lights: Vec<Light>,
    pub children: Vec<SceneNode>,
    pub environment: Option<Arc<EnvironmentMap>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn add(&mut self, node: SceneNode) {
        self.children.push(node);
    }

    pub fn hemisphere_light(&self) -> Option<&HemisphereLight> {
        self.lights.iter().find_map(|light| match light {
            Light::Hemisphere(light) => Some(light),
            Light::Directional(_) => None,
        })
    }

    pub fn directional_light(&self) -> Option<&DirectionalLight> {
        self.lights.iter().find_map(|light| match light {
            Light::Directional(light) => Some(light),
            Light::Hemisphere(_) => None,
        })
    }

    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn mesh_count(&self) -> usize {
        self.children.iter().map(SceneNode::mesh_count).sum()
    }

    pub fn draw_list(&self) -> Vec<DrawItem<'_>> {
        let mut items = Vec::new();
        for child in &self.children {
            child.visit_meshes(Mat4::IDENTITY, &mut |model, mesh| {
                items.push(DrawItem {
                    model,
                    normal: Mat3::from_mat4(model).inverse().transpose(),
                    mesh,
                });
            });
        }
        items
    }
}

/// Thread-safe handle to a scene that asset completions write into.
///
/// Completions only ever touch `environment` or append to `children`, so
/// their order does not matter.
#[derive(Debug, Default)]
pub struct SharedScene {
    inner: Arc<RwLock<Scene>>,
}

impl Clone for SharedScene {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SharedScene {
    pub fn new(scene: Scene) -> Self {
        Self {
            inner: Arc::new(RwLock::new(scene)),
        }
    }

    pub fn add(&self, node: SceneNode) {
        self.inner.write().add(node);
    }

    pub fn set_environment(&self, environment: EnvironmentMap) {
        self.inner.write().environment = Some(Arc::new(environment));
    }

    pub fn environment(&self) -> Option<Arc<EnvironmentMap>> {
        self.inner.read().environment.clone()
    }

    /// Runs `f` against the current scene under a read lock.
    pub fn read<R>(&self, f: impl FnOnce(&Scene) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Scene) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn snapshot(&self) -> Scene {
        self.inner.read().clone()
    }
}
