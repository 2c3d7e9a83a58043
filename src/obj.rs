use std::collections::HashMap;

use glam::Vec3;

use crate::model::ModelError;
use crate::scene::{MeshData, VERTEX_STRIDE};

/// Parses a Wavefront OBJ document into a single interleaved mesh.
///
/// Polygons are fan-triangulated, negative (relative) indices are resolved,
/// and smooth normals are generated when the file does not provide them.
pub fn parse_obj(data: &str) -> Result<MeshData, ModelError> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut triangles: Vec<[Corner; 3]> = Vec::new();

    for (index, line) in data.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        match parts.next() {
            Some("v") => positions.push(parse_vec3(parts).map_err(|m| obj_error(line_no, m))?),
            Some("vn") => normals.push(parse_vec3(parts).map_err(|m| obj_error(line_no, m))?),
            Some("f") => {
                let polygon = parse_face(parts).map_err(|m| obj_error(line_no, m))?;
                for i in 1..polygon.len() - 1 {
                    triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(ModelError::Empty("OBJ file does not define any vertices".into()));
    }

    let mut mesh = weld(&positions, &normals, &triangles)?;
    if has_missing_normals(&mesh) {
        generate_normals(&mut mesh);
    }
    Ok(mesh)
}

fn obj_error(line: usize, message: String) -> ModelError {
    ModelError::Obj { line, message }
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3, String> {
    let mut component = || -> Result<f32, String> {
        let text = parts.next().ok_or("missing vector component")?;
        text.parse::<f32>()
            .map_err(|err| format!("bad component {text:?}: {err}"))
    };
    Ok(Vec3::new(component()?, component()?, component()?))
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    position: i32,
    normal: i32,
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<Corner>, String> {
    let mut corners = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let position = segments
            .next()
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or_else(|| format!("bad vertex reference {part:?}"))?;
        // Texture coordinates are skipped; the renderer does not sample textures.
        let _texcoord = segments.next();
        let normal = segments
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i32>().unwrap_or(0))
            .unwrap_or(0);
        corners.push(Corner { position, normal });
    }
    if corners.len() < 3 {
        return Err("faces must reference at least 3 vertices".to_string());
    }
    Ok(corners)
}

fn resolve(index: i32, len: usize) -> Option<usize> {
    match index {
        i if i > 0 => {
            let zero_based = i as usize - 1;
            (zero_based < len).then_some(zero_based)
        }
        i if i < 0 => {
            let back = i.unsigned_abs() as usize;
            (back <= len).then(|| len - back)
        }
        _ => None,
    }
}

fn weld(positions: &[Vec3], normals: &[Vec3], triangles: &[[Corner; 3]]) -> Result<MeshData, ModelError> {
    let mut lookup: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut mesh = MeshData {
        color: Vec3::ONE,
        ..MeshData::default()
    };

    for corner in triangles.iter().flatten() {
        let position = resolve(corner.position, positions.len()).ok_or_else(|| {
            ModelError::Empty(format!("vertex index {} out of range", corner.position))
        })?;
        let normal = resolve(corner.normal, normals.len());
        let next = mesh.vertex_count() as u32;
        let index = *lookup.entry((position, normal)).or_insert_with(|| {
            let p = positions[position];
            let n = normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
            mesh.vertices.extend_from_slice(&[p.x, p.y, p.z, n.x, n.y, n.z]);
            next
        });
        mesh.indices.push(index);
    }
    Ok(mesh)
}

fn has_missing_normals(mesh: &MeshData) -> bool {
    mesh.vertices
        .chunks_exact(VERTEX_STRIDE)
        .any(|vertex| vertex[3..6] == [0.0, 0.0, 0.0])
}

/// Replaces every normal with the area-weighted average of adjacent faces.
pub(crate) fn generate_normals(mesh: &mut MeshData) {
    let mut accum = vec![Vec3::ZERO; mesh.vertex_count()];
    let position = |vertices: &[f32], i: usize| {
        Vec3::from_slice(&vertices[i * VERTEX_STRIDE..i * VERTEX_STRIDE + 3])
    };

    for triangle in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let (pa, pb, pc) = (
            position(&mesh.vertices, a),
            position(&mesh.vertices, b),
            position(&mesh.vertices, c),
        );
        let face = (pb - pa).cross(pc - pa);
        accum[a] += face;
        accum[b] += face;
        accum[c] += face;
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let normal = normal.normalize_or_zero();
        mesh.vertices[i * VERTEX_STRIDE + 3..i * VERTEX_STRIDE + 6]
            .copy_from_slice(&normal.to_array());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_triangle() {
        let mesh = parse_obj("\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 18);
    }

    #[test]
    fn generates_unit_normals_when_missing() {
        let mesh = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        for vertex in mesh.vertices.chunks_exact(VERTEX_STRIDE) {
            assert_eq!(Vec3::from_slice(&vertex[3..6]), Vec3::Z);
        }
    }

    #[test]
    fn quads_are_fanned_and_negative_indices_resolve() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf -4//1 -3//1 -2//1 -1//1\n";
        let mesh = parse_obj(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse_obj("v 0 0 0\nv 1 nope 0\n").unwrap_err();
        assert!(matches!(err, ModelError::Obj { line: 2, .. }));
        assert!(parse_obj("# only a comment\n").is_err());
        assert!(parse_obj("v 0 0 0\nf 1 2\n").is_err());
    }
}
