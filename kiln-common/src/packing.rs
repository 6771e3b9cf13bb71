//! Vertex data packing utilities
//!
//! Provides the packed per-vertex wire layout shared by the mesh compiler and
//! the runtime loader:
//! - position: f32 × 3 (12 bytes)
//! - uv: f32 × 2 (8 bytes)
//! - tangent frame: QTangent, snorm16 × 4 (8 bytes)
//! - skinned only: bone indices u8 × 4 + bone weights unorm8 × 4 (8 bytes)
//!
//! 28 bytes per vertex, 36 when skinned. Any layout change must bump
//! `MESH_FORMAT_VERSION` in `formats::mesh`.

use glam::{Mat3, Quat, Vec3};

/// Bytes per vertex without skinning data
pub const BYTES_PER_VERTEX: u8 = 28;
/// Bytes per vertex with skinning data
pub const BYTES_PER_SKINNED_VERTEX: u8 = 36;

/// Maximum number of bones per skeleton (bone indices are stored as u8,
/// 0xFF is reserved as the no-parent sentinel)
pub const MAX_BONES: usize = 255;

/// Maximum bone influences per vertex; further weights are dropped
pub const MAX_BONE_INFLUENCES_PER_VERTEX: usize = 4;

/// Vertex stride in bytes for the packed wire format
#[inline]
pub const fn vertex_stride(skinned: bool) -> u8 {
    if skinned {
        BYTES_PER_SKINNED_VERTEX
    } else {
        BYTES_PER_VERTEX
    }
}

// ============================================================================
// Basic Conversion Functions
// ============================================================================

/// Convert f32 to signed normalized 16-bit integer (snorm16)
///
/// Maps f32 range [-1.0, 1.0] to i16 range [-32767, 32767].
#[inline]
pub fn f32_to_snorm16(value: f32) -> i16 {
    let clamped = value.clamp(-1.0, 1.0);
    (clamped * 32767.0).round() as i16
}

/// Convert f32 to unsigned normalized 8-bit integer (unorm8)
///
/// Maps f32 range [0.0, 1.0] to u8 range [0, 255].
#[inline]
pub fn f32_to_unorm8(value: f32) -> u8 {
    let clamped = value.clamp(0.0, 1.0);
    (clamped * 255.0) as u8
}

// ============================================================================
// QTangent Packing
// ============================================================================

/// Smallest snorm16 magnitude that survives quantization; used to keep the
/// handedness sign of the w component away from zero.
const QTANGENT_BIAS: f32 = 1.0 / 32767.0;

/// Encode a tangent-space basis as a QTangent (snorm16 × 4 quaternion).
///
/// The basis is orthonormalized (normal wins, tangent is Gram-Schmidt
/// projected) and converted to a rotation quaternion whose x/y/z axes map to
/// tangent/bitangent/normal. Handedness of the authored bitangent is encoded
/// in the sign of w: the runtime decoder reconstructs the bitangent as
/// `cross(normal, tangent)` and flips it when w is negative. The sign
/// convention must match the decoder exactly; a mismatch inverts lighting
/// without any error being raised.
pub fn encode_qtangent(tangent: Vec3, bitangent: Vec3, normal: Vec3) -> [i16; 4] {
    let n = normal.normalize_or_zero();
    let n = if n == Vec3::ZERO { Vec3::Z } else { n };

    // Gram-Schmidt: make the tangent orthogonal to the normal
    let t = tangent - n * n.dot(tangent);
    let t = t.normalize_or_zero();
    let t = if t == Vec3::ZERO { n.any_orthonormal_vector() } else { t };

    // Right-handed frame for the rotation; the authored bitangent only
    // contributes its handedness sign
    let b = n.cross(t);
    let reflected = b.dot(bitangent) < 0.0;

    let mut q = Quat::from_mat3(&Mat3::from_cols(t, b, n)).normalize();

    // q and -q are the same rotation; force w positive so the sign bit is
    // free to carry handedness
    if q.w < 0.0 {
        q = -q;
    }

    // Keep w away from zero so its sign survives 16-bit quantization
    if q.w < QTANGENT_BIAS {
        let scale = (1.0 - QTANGENT_BIAS * QTANGENT_BIAS).sqrt();
        q = Quat::from_xyzw(q.x * scale, q.y * scale, q.z * scale, QTANGENT_BIAS);
    }

    if reflected {
        q = -q;
    }

    [
        f32_to_snorm16(q.x),
        f32_to_snorm16(q.y),
        f32_to_snorm16(q.z),
        f32_to_snorm16(q.w),
    ]
}

/// Decode a QTangent back to a (tangent, bitangent, normal) basis.
///
/// Inverse of [`encode_qtangent`]; this is what the runtime vertex shader
/// does, expressed on the CPU for loaders and tests.
pub fn decode_qtangent(packed: [i16; 4]) -> (Vec3, Vec3, Vec3) {
    let reflected = packed[3] < 0;
    let q = Quat::from_xyzw(
        packed[0] as f32 / 32767.0,
        packed[1] as f32 / 32767.0,
        packed[2] as f32 / 32767.0,
        packed[3] as f32 / 32767.0,
    )
    .normalize();

    let tangent = q.mul_vec3(Vec3::X);
    let normal = q.mul_vec3(Vec3::Z);
    let mut bitangent = normal.cross(tangent);
    if reflected {
        bitangent = -bitangent;
    }
    (tangent, bitangent, normal)
}

// ============================================================================
// Bone Weight Packing
// ============================================================================

/// Pack bone weights as unorm8x4 (4 bytes)
#[inline]
pub fn pack_bone_weights_unorm8(weights: [f32; 4]) -> [u8; 4] {
    [
        f32_to_unorm8(weights[0]),
        f32_to_unorm8(weights[1]),
        f32_to_unorm8(weights[2]),
        f32_to_unorm8(weights[3]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_snorm16_range() {
        assert_eq!(f32_to_snorm16(-1.0), -32767);
        assert_eq!(f32_to_snorm16(0.0), 0);
        assert_eq!(f32_to_snorm16(1.0), 32767);
        assert_eq!(f32_to_snorm16(2.0), 32767);
    }

    #[test]
    fn test_f32_to_unorm8_range() {
        assert_eq!(f32_to_unorm8(0.0), 0);
        assert_eq!(f32_to_unorm8(0.5), 127);
        assert_eq!(f32_to_unorm8(1.0), 255);
    }

    #[test]
    fn test_vertex_stride() {
        assert_eq!(vertex_stride(false), 28);
        assert_eq!(vertex_stride(true), 36);
    }

    #[test]
    fn test_qtangent_roundtrip_identity() {
        let packed = encode_qtangent(Vec3::X, Vec3::Y, Vec3::Z);
        let (t, b, n) = decode_qtangent(packed);
        assert!((t - Vec3::X).length() < 0.01, "tangent {:?}", t);
        assert!((b - Vec3::Y).length() < 0.01, "bitangent {:?}", b);
        assert!((n - Vec3::Z).length() < 0.01, "normal {:?}", n);
    }

    #[test]
    fn test_qtangent_roundtrip_rotated_frames() {
        let frames = [
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_X, Vec3::NEG_Y, Vec3::Z),
            (
                Vec3::new(0.707, 0.707, 0.0),
                Vec3::new(-0.707, 0.707, 0.0),
                Vec3::Z,
            ),
        ];

        for (t_in, b_in, n_in) in frames {
            let packed = encode_qtangent(t_in, b_in, n_in);
            let (t, b, n) = decode_qtangent(packed);
            assert!((t - t_in.normalize()).length() < 0.01, "tangent {:?}", t_in);
            assert!((b - b_in.normalize()).length() < 0.01, "bitangent {:?}", b_in);
            assert!((n - n_in.normalize()).length() < 0.01, "normal {:?}", n_in);
        }
    }

    #[test]
    fn test_qtangent_preserves_handedness() {
        // Right-handed frame: w strictly positive
        let right = encode_qtangent(Vec3::X, Vec3::Y, Vec3::Z);
        assert!(right[3] > 0);

        // Mirrored bitangent: w strictly negative, basis still decodes
        let left = encode_qtangent(Vec3::X, Vec3::NEG_Y, Vec3::Z);
        assert!(left[3] < 0);

        let (t, b, n) = decode_qtangent(left);
        assert!((t - Vec3::X).length() < 0.01);
        assert!((b - Vec3::NEG_Y).length() < 0.01);
        assert!((n - Vec3::Z).length() < 0.01);
    }

    #[test]
    fn test_qtangent_handles_degenerate_input() {
        // Zero vectors must not produce NaN in the packed output
        let packed = encode_qtangent(Vec3::ZERO, Vec3::ZERO, Vec3::ZERO);
        let (t, b, n) = decode_qtangent(packed);
        for v in [t, b, n] {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn test_pack_bone_weights() {
        assert_eq!(
            pack_bone_weights_unorm8([1.0, 0.5, 0.0, 0.0]),
            [255, 127, 0, 0]
        );
    }
}
