//! Mesh compiler
//!
//! Two recursive passes over the imported scene graph. The first pass counts
//! vertices and indices and resolves every mesh's material to an asset id,
//! emitting one sub-mesh per source mesh. The second pass fills one shared
//! vertex/index buffer: positions are transformed into object space by the
//! accumulated node transform, tangent frames are QTangent-encoded, skinning
//! data lands in at most four slots per vertex, and every mesh's indices are
//! offset by the running vertex base. The counts of both passes must agree
//! exactly; a mismatch means the traversals diverged and the compile aborts.
//!
//! The serialized payload (header, buffers, attribute table, sub-meshes,
//! optional skeleton block) is LZ4-compressed behind a file-format header.

use glam::{Mat3, Mat4, Vec3};
use std::path::Path;

use kiln_common::formats::{
    vertex_attributes, FileFormatHeader, MeshHeader, SkeletonBlock, SubMeshEntry,
    INDEX_FORMAT_UINT16, INDEX_FORMAT_UINT32, MAX_SUB_MESHES, MAX_UINT16_VERTEX_COUNT,
    MESH_FORMAT_TYPE, MESH_FORMAT_VERSION,
};
use kiln_common::packing::{f32_to_unorm8, vertex_stride, MAX_BONE_INFLUENCES_PER_VERTEX};
use kiln_common::{encode_qtangent, string_hash32};

use crate::config::{AssetConfig, CALCULATE_TANGENT_SPACE};
use crate::error::CompileError;
use crate::scene::{MaterialData, MeshData, Scene, SceneNode};
use crate::skeleton::{build_skeleton, Skeleton};
use crate::tangent::generate_tangent_space;

/// A fully compiled mesh: the parsed header plus the uncompressed payload
#[derive(Debug)]
pub struct CompiledMesh {
    pub header: MeshHeader,
    pub payload: Vec<u8>,
}

/// Compile an imported scene into a mesh payload.
///
/// The scene is taken mutably because tangent generation fills per-mesh
/// tangent data in place before it is consumed.
pub fn compile_mesh(
    scene: &mut Scene,
    config: &AssetConfig,
    source: &Path,
) -> Result<CompiledMesh, CompileError> {
    let mut skeleton = build_skeleton(scene, source)?;
    let counting = count_vertices_and_indices(scene, config, source)?;

    if counting.number_of_vertices == 0 {
        return Err(CompileError::malformed(source, "scene contains no vertices"));
    }

    let skinned = scene.meshes.iter().any(MeshData::is_skinned);
    let import_flags = config.resolved_import_flags()?;

    let mut state = FillState {
        vertex_data: Vec::with_capacity(
            counting.number_of_vertices as usize * vertex_stride(skinned) as usize,
        ),
        indices: Vec::with_capacity(counting.number_of_indices as usize),
        vertices_written: 0,
        min_bounding_box: Vec3::splat(f32::MAX),
        max_bounding_box: Vec3::splat(f32::MIN),
        skinned,
        calculate_tangents: import_flags & CALCULATE_TANGENT_SPACE != 0,
    };

    let root_transform = scene.root.transform;
    {
        let Scene { root, meshes, .. } = scene;
        fill_recursive(root, Mat4::IDENTITY, meshes, &mut skeleton, &mut state, source)?;
    }

    // The counting pass predicted these exactly; a mismatch means the two
    // traversals diverged
    if state.vertices_written != counting.number_of_vertices
        || state.indices.len() as u32 != counting.number_of_indices
    {
        return Err(CompileError::malformed(
            source,
            format!(
                "vertex/index count mismatch between passes: counted {}/{} but wrote {}/{}",
                counting.number_of_vertices,
                counting.number_of_indices,
                state.vertices_written,
                state.indices.len()
            ),
        ));
    }

    Ok(serialize(&state, &counting, skeleton.as_ref(), root_transform))
}

/// LZ4-compress the payload and write the asset file
pub fn write_mesh_asset(compiled: &CompiledMesh, output: &Path) -> Result<(), CompileError> {
    let compressed = lz4_flex::compress_prepend_size(&compiled.payload);

    let mut data = Vec::with_capacity(FileFormatHeader::SIZE + compressed.len());
    data.extend_from_slice(
        &FileFormatHeader::new(MESH_FORMAT_TYPE, MESH_FORMAT_VERSION).to_bytes(),
    );
    data.extend_from_slice(&compressed);

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CompileError::io(output, e))?;
    }
    std::fs::write(output, data).map_err(|e| CompileError::io(output, e))?;

    tracing::info!(
        "compiled mesh: {} vertices, {} indices, {} sub-meshes, {} bones -> {}",
        compiled.header.number_of_vertices,
        compiled.header.number_of_indices,
        compiled.header.number_of_sub_meshes,
        compiled.header.number_of_bones,
        output.display()
    );

    Ok(())
}

// ============================================================================
// Pass 1: counting
// ============================================================================

struct CountingPass {
    number_of_vertices: u32,
    number_of_indices: u32,
    sub_meshes: Vec<SubMeshEntry>,
}

fn count_vertices_and_indices(
    scene: &Scene,
    config: &AssetConfig,
    source: &Path,
) -> Result<CountingPass, CompileError> {
    let mut pass = CountingPass {
        number_of_vertices: 0,
        number_of_indices: 0,
        sub_meshes: Vec::new(),
    };
    count_recursive(&scene.root, scene, config, source, &mut pass)?;

    if pass.sub_meshes.len() > MAX_SUB_MESHES {
        return Err(CompileError::malformed(
            source,
            format!("mesh has more than {MAX_SUB_MESHES} sub-meshes"),
        ));
    }
    Ok(pass)
}

fn count_recursive(
    node: &SceneNode,
    scene: &Scene,
    config: &AssetConfig,
    source: &Path,
    pass: &mut CountingPass,
) -> Result<(), CompileError> {
    for &mesh_index in &node.mesh_indices {
        let mesh = &scene.meshes[mesh_index];
        let material_asset_id =
            resolve_material_asset_id(scene.materials.get(mesh.material_index), config, source)?;

        pass.sub_meshes.push(SubMeshEntry {
            material_asset_id,
            start_index: pass.number_of_indices,
            index_count: mesh.indices.len() as u32,
        });
        pass.number_of_vertices += mesh.vertex_count() as u32;
        pass.number_of_indices += mesh.indices.len() as u32;
    }

    for child in &node.children {
        count_recursive(child, scene, config, source, pass)?;
    }
    Ok(())
}

/// Resolve a material to its asset id: the explicit mapping table first,
/// then the material name as an asset-id string, then the diffuse texture
/// filename stem as a last resort
fn resolve_material_asset_id(
    material: Option<&MaterialData>,
    config: &AssetConfig,
    source: &Path,
) -> Result<u64, CompileError> {
    let material =
        material.ok_or_else(|| CompileError::malformed(source, "mesh references no material"))?;

    if let Some(&asset_id) = config.material_name_to_asset_id.get(&material.name) {
        return Ok(asset_id);
    }
    if let Ok(asset_id) = material.name.parse::<u64>() {
        return Ok(asset_id);
    }
    if let Some(texture) = &material.diffuse_texture {
        let stem = Path::new(texture).file_stem().and_then(|s| s.to_str());
        if let Some(Ok(asset_id)) = stem.map(str::parse::<u64>) {
            return Ok(asset_id);
        }
    }

    Err(CompileError::malformed(
        source,
        format!(
            "cannot resolve material '{}' to a material asset id",
            material.name
        ),
    ))
}

// ============================================================================
// Pass 2: fill
// ============================================================================

struct FillState {
    vertex_data: Vec<u8>,
    indices: Vec<u32>,
    vertices_written: u32,
    min_bounding_box: Vec3,
    max_bounding_box: Vec3,
    skinned: bool,
    calculate_tangents: bool,
}

fn fill_recursive(
    node: &SceneNode,
    parent_transform: Mat4,
    meshes: &mut [MeshData],
    skeleton: &mut Option<Skeleton>,
    state: &mut FillState,
    source: &Path,
) -> Result<(), CompileError> {
    let node_transform = parent_transform * node.transform;

    for &mesh_index in &node.mesh_indices {
        let mesh = &mut meshes[mesh_index];

        if state.calculate_tangents && mesh.has_uvs() {
            generate_tangent_space(mesh)
                .map_err(|e| CompileError::external(source, e.to_string()))?;
        }

        let skin_slots = if mesh.is_skinned() {
            let skeleton = skeleton.as_mut().ok_or_else(|| {
                CompileError::malformed(
                    source,
                    format!("mesh '{}' is skinned but the scene has no skeleton", mesh.name),
                )
            })?;
            Some(build_skin_slots(mesh, skeleton, source)?)
        } else {
            None
        };

        let normal_matrix = Mat3::from_mat4(node_transform).inverse().transpose();

        for i in 0..mesh.vertex_count() {
            // Position, transformed into object space
            let position = node_transform.transform_point3(Vec3::from(mesh.positions[i]));
            state.min_bounding_box = state.min_bounding_box.min(position);
            state.max_bounding_box = state.max_bounding_box.max(position);
            for value in position.to_array() {
                state.vertex_data.extend_from_slice(&value.to_le_bytes());
            }

            // UV, zero-filled when the mesh has none
            let uv = mesh.uvs.get(i).copied().unwrap_or([0.0, 0.0]);
            state.vertex_data.extend_from_slice(&uv[0].to_le_bytes());
            state.vertex_data.extend_from_slice(&uv[1].to_le_bytes());

            // Tangent frame, rotated by the normal matrix and QTangent-encoded
            let tangent = mesh.tangents.get(i).map(|&t| Vec3::from(t)).unwrap_or(Vec3::X);
            let bitangent = mesh
                .bitangents
                .get(i)
                .map(|&b| Vec3::from(b))
                .unwrap_or(Vec3::Y);
            let normal = mesh.normals.get(i).map(|&n| Vec3::from(n)).unwrap_or(Vec3::Z);
            let qtangent = encode_qtangent(
                normal_matrix * tangent,
                normal_matrix * bitangent,
                normal_matrix * normal,
            );
            for value in qtangent {
                state.vertex_data.extend_from_slice(&value.to_le_bytes());
            }

            if state.skinned {
                match &skin_slots {
                    Some(slots) => {
                        state.vertex_data.extend_from_slice(&slots[i].0);
                        state.vertex_data.extend_from_slice(&slots[i].1);
                    }
                    None => {
                        // Rigid mesh inside a skinned model: full weight on
                        // bone 0
                        state.vertex_data.extend_from_slice(&[0, 0, 0, 0]);
                        state.vertex_data.extend_from_slice(&[255, 0, 0, 0]);
                    }
                }
            }
        }

        // Offset local indices into the shared vertex buffer
        let base = state.vertices_written;
        for &index in &mesh.indices {
            state.indices.push(index + base);
        }
        state.vertices_written += mesh.vertex_count() as u32;
    }

    for child in &node.children {
        fill_recursive(child, node_transform, meshes, skeleton, state, source)?;
    }
    Ok(())
}

/// Distribute per-bone weight lists into at most four slots per vertex.
///
/// Slots fill in arrival order; a slot counts as occupied once its weight
/// byte is non-zero. Weights past the fourth slot are dropped without
/// renormalization. Also records each bone's offset matrix into the
/// skeleton.
fn build_skin_slots(
    mesh: &MeshData,
    skeleton: &mut Skeleton,
    source: &Path,
) -> Result<Vec<([u8; 4], [u8; 4])>, CompileError> {
    let mut slots = vec![([0u8; 4], [0u8; 4]); mesh.vertex_count()];

    for bone in &mesh.bones {
        let bone_id = string_hash32(&bone.name);
        let bone_index = skeleton.bone_index_by_id(bone_id).ok_or_else(|| {
            CompileError::malformed(
                source,
                format!(
                    "mesh '{}' references bone '{}' which is not part of the skeleton",
                    mesh.name, bone.name
                ),
            )
        })?;
        skeleton.offset_matrices[bone_index as usize] = bone.offset_matrix;

        for &(vertex_index, weight) in &bone.weights {
            let vertex_index = vertex_index as usize;
            if vertex_index >= slots.len() {
                return Err(CompileError::malformed(
                    source,
                    format!(
                        "bone '{}' references vertex {} of {}",
                        bone.name,
                        vertex_index,
                        slots.len()
                    ),
                ));
            }

            let (indices, weights) = &mut slots[vertex_index];
            if let Some(slot) = weights[..MAX_BONE_INFLUENCES_PER_VERTEX]
                .iter()
                .position(|&w| w == 0)
            {
                indices[slot] = bone_index;
                weights[slot] = f32_to_unorm8(weight);
            }
        }
    }

    Ok(slots)
}

// ============================================================================
// Serialization
// ============================================================================

fn serialize(
    state: &FillState,
    counting: &CountingPass,
    skeleton: Option<&Skeleton>,
    root_transform: Mat4,
) -> CompiledMesh {
    let center = (state.min_bounding_box + state.max_bounding_box) * 0.5;
    let radius = (state.max_bounding_box - center).length();

    let index_format = if counting.number_of_vertices <= MAX_UINT16_VERTEX_COUNT {
        INDEX_FORMAT_UINT16
    } else {
        INDEX_FORMAT_UINT32
    };
    let attributes = vertex_attributes(state.skinned);

    let header = MeshHeader {
        min_bounding_box: state.min_bounding_box.to_array(),
        max_bounding_box: state.max_bounding_box.to_array(),
        bounding_sphere_center: center.to_array(),
        bounding_sphere_radius: radius,
        bytes_per_vertex: vertex_stride(state.skinned),
        number_of_vertices: counting.number_of_vertices,
        index_format,
        number_of_indices: counting.number_of_indices,
        number_of_vertex_attributes: attributes.len() as u8,
        number_of_sub_meshes: counting.sub_meshes.len() as u16,
        number_of_bones: skeleton.map(Skeleton::number_of_bones).unwrap_or(0),
    };

    let mut payload = Vec::new();
    payload.extend_from_slice(&header.to_bytes());
    payload.extend_from_slice(&state.vertex_data);

    if index_format == INDEX_FORMAT_UINT16 {
        for &index in &state.indices {
            payload.extend_from_slice(&(index as u16).to_le_bytes());
        }
    } else {
        for &index in &state.indices {
            payload.extend_from_slice(&index.to_le_bytes());
        }
    }

    for attribute in &attributes {
        payload.extend_from_slice(&attribute.to_bytes());
    }
    for sub_mesh in &counting.sub_meshes {
        payload.extend_from_slice(&sub_mesh.to_bytes());
    }

    if let Some(skeleton) = skeleton {
        // Undo the root-level coordinate compensation baked into vertex
        // positions, then flip to the runtime's row-major convention
        let root_inverse = root_transform.inverse();
        let block = SkeletonBlock {
            parent_ids: skeleton.parent_ids.clone(),
            bone_ids: skeleton.bone_ids.clone(),
            local_matrices: skeleton
                .local_matrices
                .iter()
                .map(|matrix| matrix.transpose())
                .collect(),
            offset_matrices: skeleton
                .offset_matrices
                .iter()
                .map(|matrix| (*matrix * root_inverse).transpose())
                .collect(),
        };
        block.write(&mut payload);
    }

    CompiledMesh { header, payload }
}
