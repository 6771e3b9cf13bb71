//! KilnSkeletonAnimation binary format (.kanim)
//!
//! Container for compressed per-bone transform tracks. The track payload is
//! already compressed by the track codec, so the container itself is stored
//! uncompressed (unlike the mesh asset).
//!
//! # Layout
//! ```text
//! 0x00: FileFormatHeader (8 bytes)
//! 0x08: SkeletonAnimationHeader (13 bytes)
//! 0x15: bone_id u32 LE × number_of_channels
//! var:  compressed track bytes (compressed_tracks_size)
//! ```

/// Fourcc tag of skeleton-animation assets
pub const SKELETON_ANIMATION_FORMAT_TYPE: u32 = u32::from_le_bytes(*b"SKAN");
/// Bumped whenever the animation layout or codec framing changes
pub const SKELETON_ANIMATION_FORMAT_VERSION: u32 = 1;

/// Maximum number of channels per animation (header field is u8)
pub const MAX_ANIMATION_CHANNELS: usize = 255;

/// KilnSkeletonAnimation header (13 bytes)
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct SkeletonAnimationHeader {
    /// Number of bone channels (max 255)
    pub number_of_channels: u8,
    /// Clip duration in animation ticks
    pub duration_in_ticks: f32,
    /// Tick-to-seconds conversion
    pub ticks_per_second: f32,
    /// Byte size of the compressed track payload
    pub compressed_tracks_size: u32,
}

impl SkeletonAnimationHeader {
    pub const SIZE: usize = 13;

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.number_of_channels;
        bytes[1..5].copy_from_slice(&self.duration_in_ticks.to_le_bytes());
        bytes[5..9].copy_from_slice(&self.ticks_per_second.to_le_bytes());
        bytes[9..13].copy_from_slice(&self.compressed_tracks_size.to_le_bytes());
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            number_of_channels: bytes[0],
            duration_in_ticks: f32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            ticks_per_second: f32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
            compressed_tracks_size: u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_animation_header_roundtrip() {
        let header = SkeletonAnimationHeader {
            number_of_channels: 64,
            duration_in_ticks: 10.0,
            ticks_per_second: 24.0,
            compressed_tracks_size: 4096,
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), SkeletonAnimationHeader::SIZE);

        let parsed = SkeletonAnimationHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_animation_header_rejects_short_input() {
        assert!(SkeletonAnimationHeader::from_bytes(&[0; 12]).is_none());
    }
}
