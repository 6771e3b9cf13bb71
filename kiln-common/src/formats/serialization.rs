//! Binary serialization trait for format headers.
//!
//! All Kiln format headers implement `BinarySerializable` for consistent
//! serialization/deserialization. This provides a unified interface for
//! generic code while each header retains its type-specific `to_bytes()`
//! method returning a fixed-size array for efficiency.

/// Trait for binary-serializable format headers.
///
/// The trait uses `Vec<u8>` for the return type because associated const
/// generics in return types (`[u8; Self::SIZE]`) are not yet stable in Rust.
/// For performance-critical code, use the type-specific `to_bytes()` methods
/// directly.
pub trait BinarySerializable: Sized {
    /// Size of the serialized header in bytes.
    const SIZE: usize;

    /// Serialize to bytes.
    fn serialize(&self) -> Vec<u8>;

    /// Deserialize from bytes.
    ///
    /// Returns `None` if the byte slice is too short or contains invalid data.
    fn deserialize(bytes: &[u8]) -> Option<Self>;
}

impl BinarySerializable for super::FileFormatHeader {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

impl BinarySerializable for super::MeshHeader {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

impl BinarySerializable for super::VertexAttribute {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

impl BinarySerializable for super::SubMeshEntry {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

impl BinarySerializable for super::SkeletonAnimationHeader {
    const SIZE: usize = Self::SIZE;

    fn serialize(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{
        FileFormatHeader, MeshHeader, SkeletonAnimationHeader, SubMeshEntry, INDEX_FORMAT_UINT32,
        MESH_FORMAT_TYPE, MESH_FORMAT_VERSION,
    };

    #[test]
    fn test_file_format_header_trait() {
        let header = FileFormatHeader::new(MESH_FORMAT_TYPE, MESH_FORMAT_VERSION);
        let bytes = header.serialize();
        assert_eq!(bytes.len(), <FileFormatHeader as BinarySerializable>::SIZE);

        let parsed = FileFormatHeader::deserialize(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_mesh_header_trait() {
        let header = MeshHeader {
            min_bounding_box: [0.0; 3],
            max_bounding_box: [1.0; 3],
            bounding_sphere_center: [0.5; 3],
            bounding_sphere_radius: 0.866,
            bytes_per_vertex: 28,
            number_of_vertices: 70000,
            index_format: INDEX_FORMAT_UINT32,
            number_of_indices: 210000,
            number_of_vertex_attributes: 3,
            number_of_sub_meshes: 1,
            number_of_bones: 0,
        };
        let bytes = header.serialize();
        assert_eq!(bytes.len(), 54);

        let parsed = MeshHeader::deserialize(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_deserialize_insufficient_bytes() {
        assert!(FileFormatHeader::deserialize(&[0; 7]).is_none());
        assert!(MeshHeader::deserialize(&[0; 53]).is_none());
        assert!(SubMeshEntry::deserialize(&[0; 15]).is_none());
        assert!(SkeletonAnimationHeader::deserialize(&[0; 12]).is_none());
    }
}
