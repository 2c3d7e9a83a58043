use std::path::Path;

use glam::{Quat, Vec3};
use log::debug;

use crate::obj::{generate_normals, parse_obj};
use crate::scene::{MeshData, SceneNode};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("invalid OBJ on line {line}: {message}")]
    Obj { line: usize, message: String },
    #[error("model is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("{0}")]
    Empty(String),
    #[error("index {index} points past the {vertices} vertices of its mesh")]
    IndexOutOfRange { index: u32, vertices: usize },
    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Gltf,
    Obj,
}

impl ModelFormat {
    pub fn from_path(path: &str) -> Result<Self, ModelError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("glb") | Some("gltf") => Ok(Self::Gltf),
            Some("obj") => Ok(Self::Obj),
            _ => Err(ModelError::UnsupportedFormat(path.to_string())),
        }
    }
}

/// Decodes a model file into a node hierarchy rooted at a single node.
pub fn load_model(path: &str, bytes: &[u8]) -> Result<SceneNode, ModelError> {
    let name = Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("model")
        .to_string();
    let root = match ModelFormat::from_path(path)? {
        ModelFormat::Gltf => load_gltf(&name, bytes)?,
        ModelFormat::Obj => {
            let mut root = SceneNode::new(name);
            root.meshes.push(parse_obj(std::str::from_utf8(bytes)?)?);
            root
        }
    };
    debug!("loaded model {path} with {} mesh(es)", root.mesh_count());
    Ok(root)
}

fn load_gltf(name: &str, bytes: &[u8]) -> Result<SceneNode, ModelError> {
    let (document, buffers, _images) = gltf::import_slice(bytes)?;
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| ModelError::Empty("glTF file has no scenes".into()))?;

    let mut root = SceneNode::new(scene.name().unwrap_or(name));
    for node in scene.nodes() {
        root.children.push(convert_node(&node, &buffers)?);
    }
    Ok(root)
}

fn convert_node(
    node: &gltf::Node<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<SceneNode, ModelError> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let mut out = SceneNode {
        name: node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node-{}", node.index())),
        translation: Vec3::from_array(translation),
        rotation: Quat::from_array(rotation),
        scale: Vec3::from_array(scale),
        ..SceneNode::default()
    };

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if let Some(converted) = convert_primitive(&primitive, buffers)? {
                out.meshes.push(converted);
            }
        }
    }
    for child in node.children() {
        out.children.push(convert_node(&child, buffers)?);
    }
    Ok(out)
}

fn convert_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<Option<MeshData>, ModelError> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        debug!("skipping non-triangle primitive {}", primitive.index());
        return Ok(None);
    }
    let reader =
        primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
    let Some(positions) = reader.read_positions() else {
        return Ok(None);
    };
    let positions: Vec<[f32; 3]> = positions.collect();
    let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    if let Some(&index) = indices.iter().find(|&&index| index as usize >= positions.len()) {
        return Err(ModelError::IndexOutOfRange {
            index,
            vertices: positions.len(),
        });
    }
    let [r, g, b, _] = primitive
        .material()
        .pbr_metallic_roughness()
        .base_color_factor();

    let mut mesh = MeshData {
        vertices: Vec::with_capacity(positions.len() * 6),
        indices,
        color: Vec3::new(r, g, b),
    };
    for (i, position) in positions.iter().enumerate() {
        let normal = normals
            .as_ref()
            .and_then(|normals| normals.get(i).copied())
            .unwrap_or([0.0; 3]);
        mesh.vertices.extend_from_slice(position);
        mesh.vertices.extend_from_slice(&normal);
    }
    if normals.is_none() {
        generate_normals(&mut mesh);
    }
    Ok(Some(mesh))
}
