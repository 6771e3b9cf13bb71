//! Wavefront OBJ scene import
//!
//! OBJ carries no node hierarchy, skeleton or animations; the importer
//! produces a single mesh under a named root node. Face corners are expanded
//! into flat vertex arrays with fan triangulation for polygons.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{MaterialData, MeshData, Scene, SceneNode};
use crate::error::CompileError;

/// Import an OBJ file into an owned scene graph
pub fn import_scene(input: &Path) -> Result<Scene, CompileError> {
    let file = File::open(input).map_err(|e| CompileError::io(input, e))?;
    let (mesh, material_name) = parse_obj(BufReader::new(file), input)?;

    if mesh.positions.is_empty() {
        return Err(CompileError::malformed(input, "no vertices found in OBJ file"));
    }

    // Material name comes from the first usemtl statement; resolution
    // against an asset id is the mesh compiler's job
    let material_name = if material_name.is_empty() {
        "default".to_string()
    } else {
        material_name
    };

    Ok(Scene {
        root: SceneNode {
            name: "RootNode".to_string(),
            mesh_indices: vec![0],
            ..Default::default()
        },
        meshes: vec![MeshData {
            name: input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("mesh")
                .to_string(),
            material_index: 0,
            ..mesh
        }],
        materials: vec![MaterialData {
            name: material_name,
            diffuse_texture: None,
        }],
        ..Default::default()
    })
}

/// Parse OBJ statements into an expanded mesh plus the first usemtl
/// material name
fn parse_obj<R: BufRead>(reader: R, input: &Path) -> Result<(MeshData, String), CompileError> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut tex_coords: Vec<[f32; 2]> = Vec::new();
    let mut normals_raw: Vec<[f32; 3]> = Vec::new();
    let mut material_name = String::new();

    // Final vertex data (expanded from faces)
    let mut mesh = MeshData::default();

    for line in reader.lines() {
        let line = line.map_err(|e| CompileError::io(input, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "v" if parts.len() >= 4 => {
                let x: f32 = parts[1].parse().unwrap_or(0.0);
                let y: f32 = parts[2].parse().unwrap_or(0.0);
                let z: f32 = parts[3].parse().unwrap_or(0.0);
                positions.push([x, y, z]);
            }
            "vt" if parts.len() >= 3 => {
                let u: f32 = parts[1].parse().unwrap_or(0.0);
                let v: f32 = parts[2].parse().unwrap_or(0.0);
                tex_coords.push([u, v]);
            }
            "vn" if parts.len() >= 4 => {
                let x: f32 = parts[1].parse().unwrap_or(0.0);
                let y: f32 = parts[2].parse().unwrap_or(0.0);
                let z: f32 = parts[3].parse().unwrap_or(0.0);
                normals_raw.push([x, y, z]);
            }
            "usemtl" if parts.len() >= 2 && material_name.is_empty() => {
                material_name = parts[1].to_string();
            }
            "f" if parts.len() >= 4 => {
                let face_verts: Vec<(usize, Option<usize>, Option<usize>)> = parts[1..]
                    .iter()
                    .filter_map(|v| parse_obj_vertex(v))
                    .collect();

                if face_verts.len() < 3 {
                    continue;
                }

                // Fan triangulation for convex polygons
                for i in 1..face_verts.len() - 1 {
                    for &corner in &[0, i, i + 1] {
                        let (vi, vti, vni) = face_verts[corner];

                        mesh.indices.push(mesh.positions.len() as u32);
                        mesh.positions
                            .push(positions.get(vi).copied().unwrap_or([0.0; 3]));

                        if let Some(ti) = vti {
                            mesh.uvs
                                .push(tex_coords.get(ti).copied().unwrap_or([0.0; 2]));
                        }
                        if let Some(ni) = vni {
                            mesh.normals
                                .push(normals_raw.get(ni).copied().unwrap_or([0.0, 1.0, 0.0]));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // Partially referenced attributes would desync the arrays; drop them
    if !mesh.uvs.is_empty() && mesh.uvs.len() != mesh.positions.len() {
        mesh.uvs.clear();
    }
    if !mesh.normals.is_empty() && mesh.normals.len() != mesh.positions.len() {
        mesh.normals.clear();
    }

    Ok((mesh, material_name))
}

/// Parse an OBJ vertex reference: "v", "v/vt", "v/vt/vn", or "v//vn"
fn parse_obj_vertex(s: &str) -> Option<(usize, Option<usize>, Option<usize>)> {
    let parts: Vec<&str> = s.split('/').collect();

    // OBJ indices are 1-based
    let vi = parts.first()?.parse::<usize>().ok()?.checked_sub(1)?;

    let vti = parts
        .get(1)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|i| i.checked_sub(1));

    let vni = parts
        .get(2)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|i| i.checked_sub(1));

    Some((vi, vti, vni))
}
