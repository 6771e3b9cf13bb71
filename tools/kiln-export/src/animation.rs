//! Skeleton-animation compiler
//!
//! Builds one fixed-rate transform track per bone channel and hands the raw
//! tracks to the track codec. Channels are sampled at exactly one sample per
//! integer tick; denser authored keys inside a tick window are discarded by
//! the tick indexing. A channel with a single authored key broadcasts that
//! value across all samples, which the codec collapses back into a constant
//! track.

use glam::Quat;
use std::path::Path;

use kiln_common::formats::{
    FileFormatHeader, SkeletonAnimationHeader, MAX_ANIMATION_CHANNELS,
    SKELETON_ANIMATION_FORMAT_TYPE, SKELETON_ANIMATION_FORMAT_VERSION,
};
use kiln_common::tracks::{compress_tracks, CompressionSettings, TransformTrack};
use kiln_common::string_hash32;

use crate::config::AssetConfig;
use crate::error::CompileError;
use crate::scene::{AnimationChannel, AnimationData, QuatKey, Scene, VectorKey, MD5_ROOT_NODE_NAME};

/// Scale keys within this distance of 1.0 count as unit scale
const UNIT_SCALE_TOLERANCE: f32 = 1e-4;

/// A fully compiled animation clip
#[derive(Debug)]
pub struct CompiledAnimation {
    pub header: SkeletonAnimationHeader,
    /// Bone name hashes, one per channel, same order as the tracks
    pub bone_ids: Vec<u32>,
    pub compressed_tracks: Vec<u8>,
}

/// Compile one animation clip of an imported scene
pub fn compile_skeleton_animation(
    scene: &Scene,
    config: &AssetConfig,
    source: &Path,
) -> Result<CompiledAnimation, CompileError> {
    let animation = select_animation(scene, config.animation_index, source)?;

    if animation.channels.is_empty() {
        return Err(CompileError::malformed(
            source,
            format!("animation '{}' has no channels", animation.name),
        ));
    }
    if animation.channels.len() > MAX_ANIMATION_CHANNELS {
        return Err(CompileError::malformed(
            source,
            format!(
                "animation '{}' has {} channels, maximum is {}",
                animation.name,
                animation.channels.len(),
                MAX_ANIMATION_CHANNELS
            ),
        ));
    }

    // One sample per integer tick across the whole clip
    let sample_count = animation.duration_in_ticks.max(0.0).floor() as u32 + 1;

    let ignore_bone_scale = config.ignore_bone_scale || all_scale_keys_unit(animation);
    if ignore_bone_scale && !config.ignore_bone_scale {
        tracing::debug!(
            "animation '{}': every scale key is unit scale, forcing constant scale tracks",
            animation.name
        );
    }

    // The importer's coordinate compensation sits on the scene root; the
    // root bone's rotations have to compensate the same way
    let root_rotation = Quat::from_mat4(&scene.root.transform).normalize();
    let is_md5_hierarchy = scene.root.name == MD5_ROOT_NODE_NAME;

    let mut bone_ids = Vec::with_capacity(animation.channels.len());
    let mut tracks = Vec::with_capacity(animation.channels.len());

    for (channel_index, channel) in animation.channels.iter().enumerate() {
        bone_ids.push(string_hash32(&channel.bone_name));
        tracks.push(build_track(
            channel,
            channel_index == 0,
            root_rotation,
            is_md5_hierarchy,
            ignore_bone_scale,
            sample_count,
        ));
    }

    let settings = CompressionSettings::default();
    let compressed_tracks = compress_tracks(&tracks, sample_count, &settings)
        .map_err(|e| CompileError::external(source, format!("track compression failed: {e}")))?;

    Ok(CompiledAnimation {
        header: SkeletonAnimationHeader {
            number_of_channels: animation.channels.len() as u8,
            duration_in_ticks: animation.duration_in_ticks,
            ticks_per_second: animation.ticks_per_second,
            compressed_tracks_size: compressed_tracks.len() as u32,
        },
        bone_ids,
        compressed_tracks,
    })
}

/// Write the compiled clip: file-format header, animation header, bone-id
/// table, then the codec bytes verbatim (no outer compression, the payload
/// is already compressed)
pub fn write_skeleton_animation_asset(
    compiled: &CompiledAnimation,
    output: &Path,
) -> Result<(), CompileError> {
    let mut data = Vec::with_capacity(
        FileFormatHeader::SIZE
            + SkeletonAnimationHeader::SIZE
            + compiled.bone_ids.len() * 4
            + compiled.compressed_tracks.len(),
    );
    data.extend_from_slice(
        &FileFormatHeader::new(SKELETON_ANIMATION_FORMAT_TYPE, SKELETON_ANIMATION_FORMAT_VERSION)
            .to_bytes(),
    );
    data.extend_from_slice(&compiled.header.to_bytes());
    for bone_id in &compiled.bone_ids {
        data.extend_from_slice(&bone_id.to_le_bytes());
    }
    data.extend_from_slice(&compiled.compressed_tracks);

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CompileError::io(output, e))?;
    }
    std::fs::write(output, data).map_err(|e| CompileError::io(output, e))?;

    tracing::info!(
        "compiled animation: {} channels, {:.1} ticks at {} ticks/s, {} compressed bytes -> {}",
        compiled.header.number_of_channels,
        compiled.header.duration_in_ticks,
        compiled.header.ticks_per_second,
        compiled.header.compressed_tracks_size,
        output.display()
    );

    Ok(())
}

/// List the animations of an imported scene
pub fn list_animations(scene: &Scene, source: &Path) {
    if scene.animations.is_empty() {
        tracing::info!("no animations in {}", source.display());
        return;
    }
    tracing::info!("animations in {}:", source.display());
    for (index, animation) in scene.animations.iter().enumerate() {
        tracing::info!(
            "  [{}] '{}': {} channels, {:.1} ticks ({:.2}s)",
            index,
            animation.name,
            animation.channels.len(),
            animation.duration_in_ticks,
            animation.duration_in_ticks / animation.ticks_per_second.max(f32::MIN_POSITIVE)
        );
    }
}

fn select_animation<'a>(
    scene: &'a Scene,
    animation_index: Option<usize>,
    source: &Path,
) -> Result<&'a AnimationData, CompileError> {
    match (scene.animations.len(), animation_index) {
        (0, _) => Err(CompileError::malformed(source, "scene contains no animations")),
        (1, None) => Ok(&scene.animations[0]),
        (count, None) => Err(CompileError::malformed(
            source,
            format!(
                "scene contains multiple animations ({count}), an explicit animation index is required"
            ),
        )),
        (count, Some(index)) => scene.animations.get(index).ok_or_else(|| {
            CompileError::malformed(
                source,
                format!("animation index {index} is out of range ({count} animations)"),
            )
        }),
    }
}

fn all_scale_keys_unit(animation: &AnimationData) -> bool {
    animation.channels.iter().all(|channel| {
        channel.scale_keys.iter().all(|key| {
            key.value
                .iter()
                .all(|&component| (component - 1.0).abs() <= UNIT_SCALE_TOLERANCE)
        })
    })
}

fn build_track(
    channel: &AnimationChannel,
    is_root_channel: bool,
    root_rotation: Quat,
    is_md5_hierarchy: bool,
    ignore_bone_scale: bool,
    sample_count: u32,
) -> TransformTrack {
    let mut track = TransformTrack::default();

    for tick in 0..sample_count {
        let mut rotation = sample_quat(&channel.rotation_keys, tick, sample_count);
        if is_root_channel {
            rotation = root_rotation * rotation;
        }
        // Somehow the rotations come out flipped unless the hierarchy stems
        // from an MD5 import; the conjugate matches what the runtime renders
        // correctly. Other source formats haven't been tried. Do not "fix"
        // this without re-validating existing compiled content.
        if !is_md5_hierarchy {
            rotation = rotation.conjugate();
        }
        track
            .rotations
            .push([rotation.x, rotation.y, rotation.z, rotation.w]);

        track
            .translations
            .push(sample_vec3(&channel.position_keys, tick, sample_count, [0.0, 0.0, 0.0]));

        track.scales.push(if ignore_bone_scale {
            [1.0, 1.0, 1.0]
        } else {
            sample_vec3(&channel.scale_keys, tick, sample_count, [1.0, 1.0, 1.0])
        });
    }

    track
}

/// Pick the key for a tick. A single authored key broadcasts across all
/// samples; otherwise the channel must be keyed per tick. The release build
/// clamps the index, producing data without failing.
fn sample_vec3(keys: &[VectorKey], tick: u32, sample_count: u32, default: [f32; 3]) -> [f32; 3] {
    match keys.len() {
        0 => default,
        1 => keys[0].value,
        len => {
            debug_assert_eq!(
                len as u32, sample_count,
                "channel key count must match the sample count"
            );
            keys[(tick as usize).min(len - 1)].value
        }
    }
}

fn sample_quat(keys: &[QuatKey], tick: u32, sample_count: u32) -> Quat {
    let value = match keys.len() {
        0 => [0.0, 0.0, 0.0, 1.0],
        1 => keys[0].value,
        len => {
            debug_assert_eq!(
                len as u32, sample_count,
                "channel key count must match the sample count"
            );
            keys[(tick as usize).min(len - 1)].value
        }
    };
    Quat::from_xyzw(value[0], value[1], value[2], value[3]).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneNode;
    use glam::Mat4;
    use kiln_common::tracks::decompress_tracks;

    fn quat_key(time: f32, q: Quat) -> QuatKey {
        QuatKey {
            time,
            value: [q.x, q.y, q.z, q.w],
        }
    }

    /// q and -q are the same rotation; the codec may flip the sign
    fn assert_same_rotation(stored: [f32; 4], expected: Quat) {
        let dot = stored[0] * expected.x
            + stored[1] * expected.y
            + stored[2] * expected.z
            + stored[3] * expected.w;
        assert!(dot.abs() > 0.999, "stored {stored:?} expected {expected:?}");
    }

    fn constant_channel(bone_name: &str, rotation: Quat) -> AnimationChannel {
        AnimationChannel {
            bone_name: bone_name.to_string(),
            position_keys: vec![VectorKey {
                time: 0.0,
                value: [0.0, 1.0, 0.0],
            }],
            rotation_keys: vec![quat_key(0.0, rotation)],
            scale_keys: vec![VectorKey {
                time: 0.0,
                value: [1.0, 1.0, 1.0],
            }],
        }
    }

    fn scene_with_animation(animation: AnimationData) -> Scene {
        Scene {
            root: SceneNode {
                name: "RootNode".to_string(),
                ..Default::default()
            },
            animations: vec![animation],
            ..Default::default()
        }
    }

    fn ten_tick_animation() -> AnimationData {
        AnimationData {
            name: "walk".to_string(),
            duration_in_ticks: 10.0,
            ticks_per_second: 24.0,
            channels: vec![constant_channel("root", Quat::IDENTITY)],
        }
    }

    #[test]
    fn test_sample_count_is_duration_plus_one() {
        let scene = scene_with_animation(ten_tick_animation());
        let compiled =
            compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test")).unwrap();

        let (tracks, sample_count) = decompress_tracks(&compiled.compressed_tracks).unwrap();
        assert_eq!(sample_count, 11);
        assert_eq!(tracks[0].rotations.len(), 11);
    }

    #[test]
    fn test_single_key_broadcasts_constant_track() {
        let scene = scene_with_animation(ten_tick_animation());
        let compiled =
            compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test")).unwrap();

        let (tracks, _) = decompress_tracks(&compiled.compressed_tracks).unwrap();
        let rotations = &tracks[0].rotations;
        for rotation in rotations {
            assert_eq!(rotation, &rotations[0]);
        }
        let translations = &tracks[0].translations;
        for translation in translations {
            assert_eq!(translation, &translations[0]);
        }
    }

    #[test]
    fn test_multiple_animations_without_index_rejected() {
        let mut scene = scene_with_animation(ten_tick_animation());
        scene.animations.push(ten_tick_animation());

        let error =
            compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test"))
                .unwrap_err();
        assert!(error.to_string().contains("multiple animations"));
    }

    #[test]
    fn test_explicit_index_selects_animation() {
        let mut scene = scene_with_animation(ten_tick_animation());
        let mut second = ten_tick_animation();
        second.duration_in_ticks = 4.0;
        scene.animations.push(second);

        let config = AssetConfig {
            animation_index: Some(1),
            ..Default::default()
        };
        let compiled =
            compile_skeleton_animation(&scene, &config, Path::new("test")).unwrap();
        let (_, sample_count) = decompress_tracks(&compiled.compressed_tracks).unwrap();
        assert_eq!(sample_count, 5);

        let config = AssetConfig {
            animation_index: Some(5),
            ..Default::default()
        };
        let error = compile_skeleton_animation(&scene, &config, Path::new("test")).unwrap_err();
        assert!(error.to_string().contains("out of range"));
    }

    #[test]
    fn test_no_animations_rejected() {
        let scene = Scene {
            root: SceneNode {
                name: "RootNode".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let error = compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test"))
            .unwrap_err();
        assert!(error.to_string().contains("no animations"));
    }

    #[test]
    fn test_zero_channel_animation_rejected() {
        let mut animation = ten_tick_animation();
        animation.channels.clear();
        let scene = scene_with_animation(animation);
        let error = compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test"))
            .unwrap_err();
        assert!(error.to_string().contains("no channels"));
    }

    #[test]
    fn test_rotations_conjugated_for_non_md5_hierarchies() {
        let rotation = Quat::from_rotation_x(0.5);
        let mut animation = ten_tick_animation();
        // Second channel avoids the root compensation path
        animation.channels.push(constant_channel("spine", rotation));

        let scene = scene_with_animation(animation.clone());
        let compiled =
            compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test")).unwrap();
        let (tracks, _) = decompress_tracks(&compiled.compressed_tracks).unwrap();

        assert_same_rotation(tracks[1].rotations[0], rotation.conjugate());
        // The flip is observable: conjugate and original differ for this key
        let stored = tracks[1].rotations[0];
        assert!((stored[0] - rotation.x).abs() > 0.1);

        // MD5 hierarchies skip the flip
        let mut md5_scene = scene_with_animation(animation);
        md5_scene.root.name = MD5_ROOT_NODE_NAME.to_string();
        let compiled =
            compile_skeleton_animation(&md5_scene, &AssetConfig::default(), Path::new("test"))
                .unwrap();
        let (tracks, _) = decompress_tracks(&compiled.compressed_tracks).unwrap();
        assert_same_rotation(tracks[1].rotations[0], rotation);
    }

    #[test]
    fn test_root_channel_gets_root_compensation() {
        let root_rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let mut scene = scene_with_animation(ten_tick_animation());
        scene.root.transform = Mat4::from_quat(root_rotation);

        let compiled =
            compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test")).unwrap();
        let (tracks, _) = decompress_tracks(&compiled.compressed_tracks).unwrap();

        // Channel rotation is identity, so the stored value is the
        // conjugated root rotation
        assert_same_rotation(tracks[0].rotations[0], root_rotation.conjugate());
    }

    #[test]
    fn test_bone_scale_forced_to_unit_when_requested() {
        let mut animation = ten_tick_animation();
        animation.channels[0].scale_keys = vec![VectorKey {
            time: 0.0,
            value: [2.0, 2.0, 2.0],
        }];
        let scene = scene_with_animation(animation);

        let config = AssetConfig {
            ignore_bone_scale: true,
            ..Default::default()
        };
        let compiled =
            compile_skeleton_animation(&scene, &config, Path::new("test")).unwrap();
        let (tracks, _) = decompress_tracks(&compiled.compressed_tracks).unwrap();
        assert_eq!(tracks[0].scales[0], [1.0, 1.0, 1.0]);

        // Without the flag the authored scale survives
        let compiled =
            compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test")).unwrap();
        let (tracks, _) = decompress_tracks(&compiled.compressed_tracks).unwrap();
        assert!((tracks[0].scales[0][0] - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_bone_ids_use_the_skeleton_hash() {
        let scene = scene_with_animation(ten_tick_animation());
        let compiled =
            compile_skeleton_animation(&scene, &AssetConfig::default(), Path::new("test")).unwrap();
        assert_eq!(compiled.bone_ids, vec![string_hash32("root")]);
        assert_eq!(compiled.header.number_of_channels, 1);
        assert_eq!(compiled.header.duration_in_ticks, 10.0);
    }
}
