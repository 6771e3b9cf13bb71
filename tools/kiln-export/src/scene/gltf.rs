//! glTF/GLB scene import
//!
//! Builds the owned [`Scene`] tree from a glTF file: node hierarchy, one
//! `MeshData` per primitive, materials, skinning data regrouped into
//! per-bone weight lists, and animation channels resampled onto integer
//! tick boundaries so the animation compiler can index keys by tick.

use glam::Mat4;
use gltf::animation::util::ReadOutputs;
use hashbrown::HashMap;
use std::path::Path;

use super::{
    AnimationChannel, AnimationData, MaterialData, MeshBone, MeshData, QuatKey, Scene, SceneNode,
    VectorKey,
};
use crate::config::{FLIP_UVS, REMOVE_REDUNDANT_MATERIALS};
use crate::error::CompileError;

/// Tick rate animations are resampled to; glTF keys are authored in seconds
pub const ANIMATION_TICKS_PER_SECOND: f32 = 30.0;

/// Import a glTF/GLB file into an owned scene graph
pub fn import_scene(input: &Path, import_flags: u32) -> Result<Scene, CompileError> {
    let (document, buffers, _images) = gltf::import(input)
        .map_err(|e| CompileError::external(input, format!("failed to load glTF: {e}")))?;

    let scene_def = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| CompileError::malformed(input, "glTF file contains no scene"))?;

    // Materials; an extra default entry backs primitives without one
    let mut materials: Vec<MaterialData> = document.materials().map(convert_material).collect();
    let default_material_index = materials.len();
    materials.push(MaterialData {
        name: "default".to_string(),
        diffuse_texture: None,
    });

    // Flatten mesh primitives; remember raw skin vertex data per mesh for
    // the per-bone regrouping below
    let mut meshes = Vec::new();
    let mut raw_skins: Vec<Option<RawSkinVertices>> = Vec::new();
    let mut primitive_map: HashMap<usize, Vec<usize>> = HashMap::new();
    for mesh in document.meshes() {
        let mut indices = Vec::new();
        for primitive in mesh.primitives() {
            let (data, raw_skin) = convert_primitive(
                &mesh,
                &primitive,
                &buffers,
                import_flags,
                default_material_index,
                input,
            )?;
            indices.push(meshes.len());
            meshes.push(data);
            raw_skins.push(raw_skin);
        }
        primitive_map.insert(mesh.index(), indices);
    }

    // Regroup JOINTS_0/WEIGHTS_0 into per-bone weight lists
    for node in document.nodes() {
        if let (Some(mesh), Some(skin)) = (node.mesh(), node.skin()) {
            for &mesh_index in &primitive_map[&mesh.index()] {
                attach_skin(
                    &mut meshes[mesh_index],
                    &raw_skins[mesh_index],
                    &skin,
                    &buffers,
                )?;
            }
        }
    }

    if import_flags & REMOVE_REDUNDANT_MATERIALS != 0 {
        remove_redundant_materials(&mut materials, &mut meshes);
    }

    // Node hierarchy; multiple scene roots hang under a synthetic named root
    let roots: Vec<gltf::Node> = scene_def.nodes().collect();
    let root = if roots.len() == 1 {
        convert_node(&roots[0], &primitive_map)
    } else {
        SceneNode {
            name: "RootNode".to_string(),
            transform: Mat4::IDENTITY,
            mesh_indices: Vec::new(),
            children: roots
                .iter()
                .map(|node| convert_node(node, &primitive_map))
                .collect(),
        }
    };

    let animations = document
        .animations()
        .map(|animation| convert_animation(&animation, &buffers, input))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Scene {
        root,
        meshes,
        materials,
        animations,
    })
}

fn node_name(node: &gltf::Node) -> String {
    node.name().unwrap_or("").to_string()
}

fn convert_node(node: &gltf::Node, primitive_map: &HashMap<usize, Vec<usize>>) -> SceneNode {
    SceneNode {
        name: node_name(node),
        transform: Mat4::from_cols_array_2d(&node.transform().matrix()),
        mesh_indices: node
            .mesh()
            .map(|mesh| primitive_map[&mesh.index()].clone())
            .unwrap_or_default(),
        children: node
            .children()
            .map(|child| convert_node(&child, primitive_map))
            .collect(),
    }
}

fn convert_material(material: gltf::Material) -> MaterialData {
    let name = material
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("material_{}", material.index().unwrap_or(0)));

    let diffuse_texture = material
        .pbr_metallic_roughness()
        .base_color_texture()
        .and_then(|info| {
            let image = info.texture().source();
            match image.source() {
                gltf::image::Source::Uri { uri, .. } => Some(uri.to_string()),
                gltf::image::Source::View { .. } => image.name().map(str::to_string),
            }
        });

    MaterialData {
        name,
        diffuse_texture,
    }
}

/// JOINTS_0/WEIGHTS_0 as stored per vertex, before regrouping per bone
type RawSkinVertices = (Vec<[u16; 4]>, Vec<[f32; 4]>);

fn convert_primitive(
    mesh: &gltf::Mesh,
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    import_flags: u32,
    default_material_index: usize,
    input: &Path,
) -> Result<(MeshData, Option<RawSkinVertices>), CompileError> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        return Err(CompileError::malformed(
            input,
            format!(
                "mesh '{}' uses primitive mode {:?}, only triangles are supported",
                mesh.name().unwrap_or("unnamed"),
                primitive.mode()
            ),
        ));
    }

    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    // Positions (required)
    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| {
            CompileError::malformed(
                input,
                format!("mesh '{}' has no positions", mesh.name().unwrap_or("unnamed")),
            )
        })?
        .collect();

    // UVs (optional)
    let uvs: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map(|iter| {
            iter.into_f32()
                .map(|uv| {
                    if import_flags & FLIP_UVS != 0 {
                        [uv[0], 1.0 - uv[1]]
                    } else {
                        uv
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    // Normals (optional)
    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .map(|iter| iter.collect())
        .unwrap_or_default();

    // Tangents (optional) - vec4: xyz = direction, w = handedness sign
    let mut tangents = Vec::new();
    let mut bitangents = Vec::new();
    if !normals.is_empty() {
        if let Some(iter) = reader.read_tangents() {
            for (i, t) in iter.enumerate() {
                let tangent = glam::Vec3::new(t[0], t[1], t[2]);
                let normal = glam::Vec3::from(normals[i.min(normals.len() - 1)]);
                tangents.push(tangent.to_array());
                bitangents.push((normal.cross(tangent) * t[3]).to_array());
            }
        }
    }

    // Skinning data (optional) - JOINTS_0 and WEIGHTS_0
    let joints: Option<Vec<[u16; 4]>> = reader.read_joints(0).map(|iter| iter.into_u16().collect());
    let weights: Option<Vec<[f32; 4]>> =
        reader.read_weights(0).map(|iter| iter.into_f32().collect());
    let raw_skin = match (joints, weights) {
        (Some(j), Some(w)) if j.len() == positions.len() && w.len() == positions.len() => {
            Some((j, w))
        }
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!(
                "mesh '{}' has partial skinning data (joints or weights missing), ignoring skinning",
                mesh.name().unwrap_or("unnamed")
            );
            None
        }
        _ => None,
    };

    // Indices; unindexed primitives get a sequential list
    let indices: Vec<u32> = reader
        .read_indices()
        .map(|iter| iter.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    let material_index = primitive
        .material()
        .index()
        .unwrap_or(default_material_index);

    Ok((
        MeshData {
            name: mesh.name().unwrap_or("").to_string(),
            positions,
            normals,
            tangents,
            bitangents,
            uvs,
            indices,
            material_index,
            bones: Vec::new(),
        },
        raw_skin,
    ))
}

/// Turn per-vertex joint/weight quadruples into per-bone weight lists
fn attach_skin(
    mesh: &mut MeshData,
    raw_skin: &Option<RawSkinVertices>,
    skin: &gltf::Skin,
    buffers: &[gltf::buffer::Data],
) -> Result<(), CompileError> {
    // A mesh instanced by several skinned nodes keeps the first skin
    if !mesh.bones.is_empty() {
        return Ok(());
    }
    let Some((joint_indices, joint_weights)) = raw_skin else {
        return Ok(());
    };

    let joints: Vec<gltf::Node> = skin.joints().collect();
    let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
    let inverse_bind_matrices: Vec<Mat4> = reader
        .read_inverse_bind_matrices()
        .map(|iter| iter.map(|m| Mat4::from_cols_array_2d(&m)).collect())
        .unwrap_or_else(|| vec![Mat4::IDENTITY; joints.len()]);

    let mut per_joint: Vec<Vec<(u32, f32)>> = vec![Vec::new(); joints.len()];
    for (vertex_index, (indices, weights)) in
        joint_indices.iter().zip(joint_weights.iter()).enumerate()
    {
        for slot in 0..4 {
            let joint = indices[slot] as usize;
            let weight = weights[slot];
            if weight > 0.0 && joint < per_joint.len() {
                per_joint[joint].push((vertex_index as u32, weight));
            }
        }
    }

    mesh.bones = joints
        .iter()
        .enumerate()
        .filter_map(|(joint, node)| {
            let weights = std::mem::take(&mut per_joint[joint]);
            if weights.is_empty() {
                return None;
            }
            Some(MeshBone {
                name: node_name(node),
                offset_matrix: inverse_bind_matrices
                    .get(joint)
                    .copied()
                    .unwrap_or(Mat4::IDENTITY),
                weights,
            })
        })
        .collect();

    Ok(())
}

/// Drop materials sharing a name and remap mesh material indices
fn remove_redundant_materials(materials: &mut Vec<MaterialData>, meshes: &mut [MeshData]) {
    let mut kept: Vec<MaterialData> = Vec::new();
    let mut remap = Vec::with_capacity(materials.len());
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for material in materials.drain(..) {
        match by_name.get(&material.name) {
            Some(&index) => remap.push(index),
            None => {
                by_name.insert(material.name.clone(), kept.len());
                remap.push(kept.len());
                kept.push(material);
            }
        }
    }

    for mesh in meshes {
        mesh.material_index = remap[mesh.material_index];
    }
    *materials = kept;
}

// ============================================================================
// Animation import
// ============================================================================

#[derive(Default)]
struct RawChannel {
    name: String,
    rest_translation: [f32; 3],
    rest_rotation: [f32; 4],
    rest_scale: [f32; 3],
    translation_times: Vec<f32>,
    translations: Vec<[f32; 3]>,
    rotation_times: Vec<f32>,
    rotations: Vec<[f32; 4]>,
    scale_times: Vec<f32>,
    scales: Vec<[f32; 3]>,
}

fn convert_animation(
    animation: &gltf::Animation,
    buffers: &[gltf::buffer::Data],
    input: &Path,
) -> Result<AnimationData, CompileError> {
    let name = animation.name().unwrap_or("unnamed").to_string();

    let mut order: Vec<usize> = Vec::new();
    let mut raw: HashMap<usize, RawChannel> = HashMap::new();
    let mut max_time = 0.0f32;

    for channel in animation.channels() {
        let node = channel.target().node();
        let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));

        let times: Vec<f32> = reader
            .read_inputs()
            .map(|iter| iter.collect())
            .unwrap_or_default();
        if let Some(&t) = times.last() {
            max_time = max_time.max(t);
        }

        let entry = raw.entry(node.index()).or_insert_with(|| {
            order.push(node.index());
            let (translation, rotation, scale) = node.transform().decomposed();
            RawChannel {
                name: node_name(&node),
                rest_translation: translation,
                rest_rotation: rotation,
                rest_scale: scale,
                ..Default::default()
            }
        });

        match reader.read_outputs() {
            Some(ReadOutputs::Translations(iter)) => {
                entry.translation_times = times;
                entry.translations = iter.collect();
            }
            Some(ReadOutputs::Rotations(rotations)) => {
                entry.rotation_times = times;
                entry.rotations = rotations.into_f32().collect();
            }
            Some(ReadOutputs::Scales(iter)) => {
                entry.scale_times = times;
                entry.scales = iter.collect();
            }
            _ => {} // Morph target weights are not supported
        }
    }

    if max_time <= 0.0 {
        return Err(CompileError::malformed(
            input,
            format!("animation '{name}' has zero duration"),
        ));
    }

    let duration_in_ticks = max_time * ANIMATION_TICKS_PER_SECOND;
    let tick_count = duration_in_ticks.floor() as usize + 1;

    let channels = order
        .iter()
        .map(|node_index| {
            let channel = &raw[node_index];
            AnimationChannel {
                bone_name: channel.name.clone(),
                position_keys: resample_vec3(
                    &channel.translation_times,
                    &channel.translations,
                    channel.rest_translation,
                    tick_count,
                ),
                rotation_keys: resample_quat(
                    &channel.rotation_times,
                    &channel.rotations,
                    channel.rest_rotation,
                    tick_count,
                ),
                scale_keys: resample_vec3(
                    &channel.scale_times,
                    &channel.scales,
                    channel.rest_scale,
                    tick_count,
                ),
            }
        })
        .collect();

    Ok(AnimationData {
        name,
        duration_in_ticks,
        ticks_per_second: ANIMATION_TICKS_PER_SECOND,
        channels,
    })
}

fn resample_vec3(
    times: &[f32],
    values: &[[f32; 3]],
    rest: [f32; 3],
    tick_count: usize,
) -> Vec<VectorKey> {
    if values.is_empty() {
        return vec![VectorKey {
            time: 0.0,
            value: rest,
        }];
    }
    if values.len() == 1 {
        return vec![VectorKey {
            time: 0.0,
            value: values[0],
        }];
    }
    (0..tick_count)
        .map(|tick| VectorKey {
            time: tick as f32,
            value: interpolate_vec3(times, values, tick as f32 / ANIMATION_TICKS_PER_SECOND),
        })
        .collect()
}

fn resample_quat(
    times: &[f32],
    values: &[[f32; 4]],
    rest: [f32; 4],
    tick_count: usize,
) -> Vec<QuatKey> {
    if values.is_empty() {
        return vec![QuatKey {
            time: 0.0,
            value: rest,
        }];
    }
    if values.len() == 1 {
        return vec![QuatKey {
            time: 0.0,
            value: values[0],
        }];
    }
    (0..tick_count)
        .map(|tick| QuatKey {
            time: tick as f32,
            value: interpolate_quat(times, values, tick as f32 / ANIMATION_TICKS_PER_SECOND),
        })
        .collect()
}

// ============================================================================
// Interpolation
// ============================================================================

fn keyframe_span(times: &[f32], t: f32) -> Option<(usize, f32)> {
    if times.len() < 2 {
        return None;
    }
    let mut i = 0;
    while i < times.len() - 1 && times[i + 1] < t {
        i += 1;
    }
    if i >= times.len() - 1 {
        return None;
    }
    let t0 = times[i];
    let t1 = times[i + 1];
    let factor = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
    Some((i, factor.clamp(0.0, 1.0)))
}

fn interpolate_vec3(times: &[f32], values: &[[f32; 3]], t: f32) -> [f32; 3] {
    let Some((i, factor)) = keyframe_span(times, t) else {
        return *values.last().unwrap_or(&[0.0, 0.0, 0.0]);
    };
    let v0 = values[i];
    let v1 = values[i + 1];
    [
        v0[0] + (v1[0] - v0[0]) * factor,
        v0[1] + (v1[1] - v0[1]) * factor,
        v0[2] + (v1[2] - v0[2]) * factor,
    ]
}

fn interpolate_quat(times: &[f32], values: &[[f32; 4]], t: f32) -> [f32; 4] {
    let Some((i, factor)) = keyframe_span(times, t) else {
        return *values.last().unwrap_or(&[0.0, 0.0, 0.0, 1.0]);
    };
    slerp(values[i], values[i + 1], factor)
}

/// Spherical linear interpolation along the shortest path
fn slerp(q0: [f32; 4], q1: [f32; 4], t: f32) -> [f32; 4] {
    let mut dot = q0[0] * q1[0] + q0[1] * q1[1] + q0[2] * q1[2] + q0[3] * q1[3];

    let mut q1 = q1;
    if dot < 0.0 {
        q1 = [-q1[0], -q1[1], -q1[2], -q1[3]];
        dot = -dot;
    }

    // Nearly parallel: fall back to normalized lerp
    if dot > 0.9995 {
        return normalize_quat([
            q0[0] + t * (q1[0] - q0[0]),
            q0[1] + t * (q1[1] - q0[1]),
            q0[2] + t * (q1[2] - q0[2]),
            q0[3] + t * (q1[3] - q0[3]),
        ]);
    }

    let theta_0 = dot.acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();

    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    [
        s0 * q0[0] + s1 * q1[0],
        s0 * q0[1] + s1 * q1[1],
        s0 * q0[2] + s1 * q1[2],
        s0 * q0[3] + s1 * q1[3],
    ]
}

fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if len > 0.0 {
        [q[0] / len, q[1] / len, q[2] / len, q[3] / len]
    } else {
        [0.0, 0.0, 0.0, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_vec3_midpoint() {
        let times = [0.0, 1.0];
        let values = [[0.0, 0.0, 0.0], [2.0, 4.0, 6.0]];
        assert_eq!(interpolate_vec3(&times, &values, 0.5), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_interpolate_vec3_clamps_past_end() {
        let times = [0.0, 1.0];
        let values = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        assert_eq!(interpolate_vec3(&times, &values, 5.0), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_slerp_endpoints() {
        let q0 = [0.0, 0.0, 0.0, 1.0];
        let q1 = normalize_quat([0.0, 0.707, 0.0, 0.707]);
        let start = slerp(q0, q1, 0.0);
        let end = slerp(q0, q1, 1.0);
        for axis in 0..4 {
            assert!((start[axis] - q0[axis]).abs() < 1e-5);
            assert!((end[axis] - q1[axis]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_resample_single_key_stays_single() {
        let keys = resample_vec3(&[0.0], &[[1.0, 2.0, 3.0]], [0.0; 3], 11);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].value, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_resample_multi_key_hits_tick_count() {
        let times = [0.0, 1.0];
        let values = [[0.0; 3], [1.0, 0.0, 0.0]];
        let tick_count = ANIMATION_TICKS_PER_SECOND as usize + 1;
        let keys = resample_vec3(&times, &values, [0.0; 3], tick_count);
        assert_eq!(keys.len(), tick_count);
        assert_eq!(keys[0].value, [0.0; 3]);
        let last = keys.last().unwrap().value;
        assert!((last[0] - 1.0).abs() < 1e-5);
    }
}
