//! kiln-common
//!
//! Shared pieces of the Kiln asset pipeline: binary asset formats, vertex
//! packing, and the transform-track compression codec. Consumed by the
//! export tool (`kiln-export`) and by runtime loaders.

pub mod formats;
pub mod packing;
pub mod tracks;

pub use formats::*;
pub use packing::{
    decode_qtangent, encode_qtangent, f32_to_snorm16, f32_to_unorm8, pack_bone_weights_unorm8,
    vertex_stride, BYTES_PER_SKINNED_VERTEX, BYTES_PER_VERTEX, MAX_BONES,
    MAX_BONE_INFLUENCES_PER_VERTEX,
};
pub use tracks::{
    compress_tracks, decompress_tracks, CompressionSettings, TrackError, TransformTrack,
};

/// 32-bit hash of a source name (bone names, asset names).
///
/// The same function is used when compiling skeletons and when compiling
/// animations, so bone ids cross-reference at runtime. Hash collisions are
/// accepted; the skeleton builder rejects duplicate hashes per skeleton.
#[inline]
pub fn string_hash32(name: &str) -> u32 {
    xxhash_rust::xxh32::xxh32(name.as_bytes(), 0)
}
