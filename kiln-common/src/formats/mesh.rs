//! KilnMesh binary format (.kmesh)
//!
//! GPU-ready mesh format with packed vertices, sub-mesh table and optional
//! skeleton block. The payload after the file-format header is LZ4
//! block-compressed (size-prepended).
//!
//! # Payload layout (decompressed)
//! ```text
//! 0x00: MeshHeader (54 bytes)
//! 0x36: vertex buffer (number_of_vertices × bytes_per_vertex)
//! var:  index buffer (number_of_indices × 2 or 4 bytes)
//! var:  vertex attributes (number_of_vertex_attributes × 6 bytes)
//! var:  sub-meshes (number_of_sub_meshes × 16 bytes)
//! var:  skeleton block, only if number_of_bones > 0:
//!       parent u8 × n, bone_id u32 × n,
//!       local matrix f32 × 16 × n, offset matrix f32 × 16 × n
//! ```
//!
//! For the per-vertex layout and stride, see `packing`.

use glam::Mat4;

/// Fourcc tag of mesh assets
pub const MESH_FORMAT_TYPE: u32 = u32::from_le_bytes(*b"MESH");
/// Bumped whenever the mesh payload layout changes
pub const MESH_FORMAT_VERSION: u32 = 2;

/// Index buffer stores u16 values
pub const INDEX_FORMAT_UINT16: u8 = 0;
/// Index buffer stores u32 values
pub const INDEX_FORMAT_UINT32: u8 = 1;

/// Largest vertex count that still fits u16 indices
pub const MAX_UINT16_VERTEX_COUNT: u32 = 65535;

/// Maximum number of sub-meshes per mesh (header field is u16)
pub const MAX_SUB_MESHES: usize = 65535;

/// Sentinel parent index of the root bone
pub const ROOT_BONE_PARENT: u8 = 0xFF;

// ============================================================================
// Mesh Header
// ============================================================================

/// KilnMesh header (54 bytes)
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct MeshHeader {
    /// Axis-aligned bounding box minimum corner (object space)
    pub min_bounding_box: [f32; 3],
    /// Axis-aligned bounding box maximum corner (object space)
    pub max_bounding_box: [f32; 3],
    /// Bounding sphere center (box midpoint)
    pub bounding_sphere_center: [f32; 3],
    /// Bounding sphere radius (half the box diagonal)
    pub bounding_sphere_radius: f32,
    /// Vertex stride in bytes (28, or 36 when skinned)
    pub bytes_per_vertex: u8,
    /// Number of vertices in the vertex buffer
    pub number_of_vertices: u32,
    /// INDEX_FORMAT_UINT16 or INDEX_FORMAT_UINT32
    pub index_format: u8,
    /// Number of indices in the index buffer
    pub number_of_indices: u32,
    /// Number of vertex attribute descriptors
    pub number_of_vertex_attributes: u8,
    /// Number of sub-mesh entries
    pub number_of_sub_meshes: u16,
    /// Number of bones in the skeleton block (0 = no skeleton)
    pub number_of_bones: u8,
}

impl MeshHeader {
    pub const SIZE: usize = 54;

    /// Bytes per index for the stored index format
    pub fn bytes_per_index(&self) -> usize {
        if self.index_format == INDEX_FORMAT_UINT32 {
            4
        } else {
            2
        }
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        write_vec3(&mut bytes[0..12], self.min_bounding_box);
        write_vec3(&mut bytes[12..24], self.max_bounding_box);
        write_vec3(&mut bytes[24..36], self.bounding_sphere_center);
        bytes[36..40].copy_from_slice(&self.bounding_sphere_radius.to_le_bytes());
        bytes[40] = self.bytes_per_vertex;
        bytes[41..45].copy_from_slice(&self.number_of_vertices.to_le_bytes());
        bytes[45] = self.index_format;
        bytes[46..50].copy_from_slice(&self.number_of_indices.to_le_bytes());
        bytes[50] = self.number_of_vertex_attributes;
        bytes[51..53].copy_from_slice(&self.number_of_sub_meshes.to_le_bytes());
        bytes[53] = self.number_of_bones;
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            min_bounding_box: read_vec3(&bytes[0..12]),
            max_bounding_box: read_vec3(&bytes[12..24]),
            bounding_sphere_center: read_vec3(&bytes[24..36]),
            bounding_sphere_radius: f32::from_le_bytes([
                bytes[36], bytes[37], bytes[38], bytes[39],
            ]),
            bytes_per_vertex: bytes[40],
            number_of_vertices: u32::from_le_bytes([bytes[41], bytes[42], bytes[43], bytes[44]]),
            index_format: bytes[45],
            number_of_indices: u32::from_le_bytes([bytes[46], bytes[47], bytes[48], bytes[49]]),
            number_of_vertex_attributes: bytes[50],
            number_of_sub_meshes: u16::from_le_bytes([bytes[51], bytes[52]]),
            number_of_bones: bytes[53],
        })
    }
}

fn write_vec3(out: &mut [u8], v: [f32; 3]) {
    out[0..4].copy_from_slice(&v[0].to_le_bytes());
    out[4..8].copy_from_slice(&v[1].to_le_bytes());
    out[8..12].copy_from_slice(&v[2].to_le_bytes());
}

fn read_vec3(bytes: &[u8]) -> [f32; 3] {
    [
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        f32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
    ]
}

// ============================================================================
// Vertex Attributes
// ============================================================================

/// Vertex attribute semantic, as consumed by the renderer interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VertexSemantic {
    Position = 0,
    TexCoord = 1,
    QTangent = 2,
    BlendIndices = 3,
    BlendWeights = 4,
}

impl VertexSemantic {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Position),
            1 => Some(Self::TexCoord),
            2 => Some(Self::QTangent),
            3 => Some(Self::BlendIndices),
            4 => Some(Self::BlendWeights),
            _ => None,
        }
    }
}

/// Vertex attribute data format, as consumed by the renderer interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VertexAttributeFormat {
    Float32x3 = 0,
    Float32x2 = 1,
    Snorm16x4 = 2,
    Uint8x4 = 3,
    Unorm8x4 = 4,
}

impl VertexAttributeFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Float32x3),
            1 => Some(Self::Float32x2),
            2 => Some(Self::Snorm16x4),
            3 => Some(Self::Uint8x4),
            4 => Some(Self::Unorm8x4),
            _ => None,
        }
    }
}

/// One vertex attribute descriptor (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct VertexAttribute {
    pub semantic: VertexSemantic,
    pub data_format: VertexAttributeFormat,
    /// Byte offset of the attribute inside one vertex record
    pub byte_offset: u32,
}

impl VertexAttribute {
    pub const SIZE: usize = 6;

    /// Write descriptor to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.semantic as u8;
        bytes[1] = self.data_format as u8;
        bytes[2..6].copy_from_slice(&self.byte_offset.to_le_bytes());
        bytes
    }

    /// Read descriptor from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            semantic: VertexSemantic::from_u8(bytes[0])?,
            data_format: VertexAttributeFormat::from_u8(bytes[1])?,
            byte_offset: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
        })
    }
}

/// Attribute descriptors matching the packed vertex layout
pub fn vertex_attributes(skinned: bool) -> Vec<VertexAttribute> {
    let mut attributes = vec![
        VertexAttribute {
            semantic: VertexSemantic::Position,
            data_format: VertexAttributeFormat::Float32x3,
            byte_offset: 0,
        },
        VertexAttribute {
            semantic: VertexSemantic::TexCoord,
            data_format: VertexAttributeFormat::Float32x2,
            byte_offset: 12,
        },
        VertexAttribute {
            semantic: VertexSemantic::QTangent,
            data_format: VertexAttributeFormat::Snorm16x4,
            byte_offset: 20,
        },
    ];
    if skinned {
        attributes.push(VertexAttribute {
            semantic: VertexSemantic::BlendIndices,
            data_format: VertexAttributeFormat::Uint8x4,
            byte_offset: 28,
        });
        attributes.push(VertexAttribute {
            semantic: VertexSemantic::BlendWeights,
            data_format: VertexAttributeFormat::Unorm8x4,
            byte_offset: 32,
        });
    }
    attributes
}

// ============================================================================
// Sub-meshes
// ============================================================================

/// One sub-mesh entry (16 bytes): a material reference plus the contiguous
/// index range rendered with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SubMeshEntry {
    pub material_asset_id: u64,
    pub start_index: u32,
    pub index_count: u32,
}

impl SubMeshEntry {
    pub const SIZE: usize = 16;

    /// Write entry to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.material_asset_id.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.start_index.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.index_count.to_le_bytes());
        bytes
    }

    /// Read entry from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            material_asset_id: u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
            start_index: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            index_count: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

// ============================================================================
// Skeleton Block
// ============================================================================

/// Skeleton block as stored inside a mesh asset: four parallel arrays in one
/// contiguous run of bytes
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonBlock {
    /// Parent bone index per bone; ROOT_BONE_PARENT for the root
    pub parent_ids: Vec<u8>,
    /// 32-bit bone name hashes
    pub bone_ids: Vec<u32>,
    /// Local bind-pose matrices
    pub local_matrices: Vec<Mat4>,
    /// Inverse bind (offset) matrices
    pub offset_matrices: Vec<Mat4>,
}

impl SkeletonBlock {
    /// Serialized size for a given bone count
    pub fn byte_size(number_of_bones: usize) -> usize {
        number_of_bones * (1 + 4 + 64 + 64)
    }

    /// Append the block to a byte buffer
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.parent_ids);
        for id in &self.bone_ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        for matrix in &self.local_matrices {
            write_mat4(out, matrix);
        }
        for matrix in &self.offset_matrices {
            write_mat4(out, matrix);
        }
    }

    /// Read a block of `number_of_bones` bones from bytes
    pub fn read(bytes: &[u8], number_of_bones: usize) -> Option<Self> {
        if bytes.len() < Self::byte_size(number_of_bones) {
            return None;
        }
        let n = number_of_bones;
        let parent_ids = bytes[0..n].to_vec();

        let mut offset = n;
        let mut bone_ids = Vec::with_capacity(n);
        for _ in 0..n {
            bone_ids.push(u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]));
            offset += 4;
        }

        let mut local_matrices = Vec::with_capacity(n);
        for _ in 0..n {
            local_matrices.push(read_mat4(&bytes[offset..offset + 64]));
            offset += 64;
        }
        let mut offset_matrices = Vec::with_capacity(n);
        for _ in 0..n {
            offset_matrices.push(read_mat4(&bytes[offset..offset + 64]));
            offset += 64;
        }

        Some(Self {
            parent_ids,
            bone_ids,
            local_matrices,
            offset_matrices,
        })
    }
}

fn write_mat4(out: &mut Vec<u8>, matrix: &Mat4) {
    for value in matrix.to_cols_array() {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn read_mat4(bytes: &[u8]) -> Mat4 {
    let mut values = [0.0f32; 16];
    for (i, value) in values.iter_mut().enumerate() {
        let o = i * 4;
        *value = f32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);
    }
    Mat4::from_cols_array(&values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_header_roundtrip() {
        let header = MeshHeader {
            min_bounding_box: [-1.0, -2.0, -3.0],
            max_bounding_box: [1.0, 2.0, 3.0],
            bounding_sphere_center: [0.0, 0.0, 0.0],
            bounding_sphere_radius: 3.74,
            bytes_per_vertex: 36,
            number_of_vertices: 1234,
            index_format: INDEX_FORMAT_UINT16,
            number_of_indices: 2502,
            number_of_vertex_attributes: 5,
            number_of_sub_meshes: 3,
            number_of_bones: 12,
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), MeshHeader::SIZE);

        let parsed = MeshHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_mesh_header_rejects_short_input() {
        assert!(MeshHeader::from_bytes(&[0; MeshHeader::SIZE - 1]).is_none());
    }

    #[test]
    fn test_vertex_attributes_match_packed_layout() {
        let plain = vertex_attributes(false);
        assert_eq!(plain.len(), 3);
        assert_eq!(plain[2].byte_offset, 20);

        let skinned = vertex_attributes(true);
        assert_eq!(skinned.len(), 5);
        assert_eq!(skinned[3].byte_offset, 28);
        assert_eq!(skinned[4].byte_offset, 32);
    }

    #[test]
    fn test_vertex_attribute_roundtrip() {
        for attribute in vertex_attributes(true) {
            let bytes = attribute.to_bytes();
            let parsed = VertexAttribute::from_bytes(&bytes).unwrap();
            assert_eq!(parsed, attribute);
        }
    }

    #[test]
    fn test_sub_mesh_roundtrip() {
        let entry = SubMeshEntry {
            material_asset_id: 0xDEAD_BEEF_CAFE,
            start_index: 300,
            index_count: 66,
        };
        let parsed = SubMeshEntry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_skeleton_block_roundtrip() {
        let block = SkeletonBlock {
            parent_ids: vec![ROOT_BONE_PARENT, 0, 1],
            bone_ids: vec![11, 22, 33],
            local_matrices: vec![
                Mat4::IDENTITY,
                Mat4::from_translation(glam::Vec3::new(0.0, 1.0, 0.0)),
                Mat4::from_rotation_z(0.5),
            ],
            offset_matrices: vec![Mat4::IDENTITY; 3],
        };

        let mut bytes = Vec::new();
        block.write(&mut bytes);
        assert_eq!(bytes.len(), SkeletonBlock::byte_size(3));

        let parsed = SkeletonBlock::read(&bytes, 3).unwrap();
        assert_eq!(parsed, block);
    }
}
