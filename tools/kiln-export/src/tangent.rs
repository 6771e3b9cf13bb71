//! Tangent-space generation
//!
//! Per-triangle tangent/bitangent accumulation with Gram-Schmidt
//! orthonormalization against the vertex normal, handedness taken from the
//! accumulated bitangent. All state lives in the call; the generator can run
//! on any number of meshes concurrently.

use glam::Vec3;
use thiserror::Error;

use crate::scene::MeshData;

#[derive(Debug, Error)]
pub enum TangentError {
    #[error("mesh '{mesh}' has {uvs} texture coordinates for {vertices} vertices")]
    UvCountMismatch {
        mesh: String,
        uvs: usize,
        vertices: usize,
    },

    #[error("mesh '{mesh}' has texture coordinates but no normals")]
    MissingNormals { mesh: String },

    #[error("mesh '{mesh}' index buffer length {indices} is not a multiple of 3")]
    BadIndexCount { mesh: String, indices: usize },
}

/// Compute tangents and bitangents for a mesh, in place.
///
/// Requires texture coordinates and normals; triangles with degenerate UV
/// area contribute nothing. Existing tangent data is overwritten.
pub fn generate_tangent_space(mesh: &mut MeshData) -> Result<(), TangentError> {
    let vertex_count = mesh.positions.len();
    if mesh.uvs.len() != vertex_count {
        return Err(TangentError::UvCountMismatch {
            mesh: mesh.name.clone(),
            uvs: mesh.uvs.len(),
            vertices: vertex_count,
        });
    }
    if mesh.normals.len() != vertex_count {
        return Err(TangentError::MissingNormals {
            mesh: mesh.name.clone(),
        });
    }
    if mesh.indices.len() % 3 != 0 {
        return Err(TangentError::BadIndexCount {
            mesh: mesh.name.clone(),
            indices: mesh.indices.len(),
        });
    }

    let mut tangents = vec![Vec3::ZERO; vertex_count];
    let mut bitangents = vec![Vec3::ZERO; vertex_count];

    for triangle in mesh.indices.chunks_exact(3) {
        let i0 = triangle[0] as usize;
        let i1 = triangle[1] as usize;
        let i2 = triangle[2] as usize;
        if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
            continue;
        }

        let p0 = Vec3::from(mesh.positions[i0]);
        let p1 = Vec3::from(mesh.positions[i1]);
        let p2 = Vec3::from(mesh.positions[i2]);

        let uv0 = mesh.uvs[i0];
        let uv1 = mesh.uvs[i1];
        let uv2 = mesh.uvs[i2];

        let edge1 = p1 - p0;
        let edge2 = p2 - p0;
        let duv1 = [uv1[0] - uv0[0], uv1[1] - uv0[1]];
        let duv2 = [uv2[0] - uv0[0], uv2[1] - uv0[1]];

        let det = duv1[0] * duv2[1] - duv2[0] * duv1[1];
        if det.abs() < 1e-8 {
            continue;
        }
        let r = 1.0 / det;

        let tangent = (edge1 * duv2[1] - edge2 * duv1[1]) * r;
        let bitangent = (edge2 * duv1[0] - edge1 * duv2[0]) * r;

        for &index in &[i0, i1, i2] {
            tangents[index] += tangent;
            bitangents[index] += bitangent;
        }
    }

    mesh.tangents.clear();
    mesh.bitangents.clear();
    mesh.tangents.reserve(vertex_count);
    mesh.bitangents.reserve(vertex_count);

    for i in 0..vertex_count {
        let normal = Vec3::from(mesh.normals[i]).normalize_or_zero();
        let normal = if normal == Vec3::ZERO { Vec3::Z } else { normal };

        // Gram-Schmidt against the normal
        let accumulated = tangents[i];
        let tangent = (accumulated - normal * normal.dot(accumulated)).normalize_or_zero();
        let tangent = if tangent == Vec3::ZERO {
            normal.any_orthonormal_vector()
        } else {
            tangent
        };

        // Handedness from the accumulated bitangent
        let orthogonal = normal.cross(tangent);
        let sign = if orthogonal.dot(bitangents[i]) < 0.0 {
            -1.0
        } else {
            1.0
        };

        mesh.tangents.push(tangent.to_array());
        mesh.bitangents.push((orthogonal * sign).to_array());
    }

    Ok(())
}
