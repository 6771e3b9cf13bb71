//! Scene graph adapter
//!
//! An owned, importer-agnostic view of an authored scene: a node tree plus
//! flat mesh/material/animation tables referenced by index. Importers (see
//! [`gltf`] and [`obj`]) build this once per compile; the compilers only
//! read it, apart from the tangent generator which fills mesh tangent data
//! in place.

pub mod gltf;
pub mod obj;

use glam::Mat4;

/// Node name the MD5 importer gives the synthetic scene root
pub const MD5_ROOT_NODE_NAME: &str = "<MD5_Root>";
/// Node name the MD5 importer gives the bone-hierarchy container
pub const MD5_HIERARCHY_NODE_NAME: &str = "<MD5_Hierarchy>";

/// One imported scene, root of everything a compiler consumes
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub root: SceneNode,
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    pub animations: Vec<AnimationData>,
}

/// A node of the scene hierarchy
#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    pub name: String,
    /// Local transform relative to the parent node
    pub transform: Mat4,
    /// Indices into `Scene::meshes`
    pub mesh_indices: Vec<usize>,
    pub children: Vec<SceneNode>,
}

/// One triangle mesh
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Empty when the mesh carries no normals
    pub normals: Vec<[f32; 3]>,
    /// Filled by the importer or the tangent generator; empty otherwise
    pub tangents: Vec<[f32; 3]>,
    pub bitangents: Vec<[f32; 3]>,
    /// Empty when the mesh carries no texture coordinates
    pub uvs: Vec<[f32; 2]>,
    /// Triangle list indices into the vertex arrays
    pub indices: Vec<u32>,
    /// Index into `Scene::materials`
    pub material_index: usize,
    /// Bones influencing this mesh, with per-bone weight lists
    pub bones: Vec<MeshBone>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    pub fn is_skinned(&self) -> bool {
        !self.bones.is_empty()
    }
}

/// One bone influencing a mesh
#[derive(Debug, Clone)]
pub struct MeshBone {
    /// Name of the corresponding node in the hierarchy
    pub name: String,
    /// Object space -> bone space (inverse bind) matrix
    pub offset_matrix: Mat4,
    /// (vertex index, weight) pairs in authored order
    pub weights: Vec<(u32, f32)>,
}

/// One material as authored
#[derive(Debug, Clone, Default)]
pub struct MaterialData {
    pub name: String,
    /// Filename bound to the diffuse/base-color texture slot, if any
    pub diffuse_texture: Option<String>,
}

/// One animation clip
#[derive(Debug, Clone, Default)]
pub struct AnimationData {
    pub name: String,
    /// Clip length in animation ticks
    pub duration_in_ticks: f32,
    /// Tick-to-seconds conversion of the source clip
    pub ticks_per_second: f32,
    pub channels: Vec<AnimationChannel>,
}

/// Keyframes of one animated bone
#[derive(Debug, Clone, Default)]
pub struct AnimationChannel {
    /// Name of the animated node; hashed into the bone id on export
    pub bone_name: String,
    pub position_keys: Vec<VectorKey>,
    pub rotation_keys: Vec<QuatKey>,
    pub scale_keys: Vec<VectorKey>,
}

/// A vec3 keyframe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorKey {
    /// Key time in ticks
    pub time: f32,
    pub value: [f32; 3],
}

/// A quaternion keyframe [x, y, z, w]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuatKey {
    /// Key time in ticks
    pub time: f32,
    pub value: [f32; 4],
}
