//! Skeleton builder
//!
//! Flattens the bone hierarchy of an imported scene into four parallel
//! arrays, depth-first pre-order, so the whole skeleton serializes as one
//! contiguous block. The root bone is always index 0; array indices are the
//! bone indices written into skinned vertices, so the traversal order is
//! part of the wire contract.

use glam::Mat4;
use std::path::Path;

use kiln_common::packing::MAX_BONES;
use kiln_common::string_hash32;
use kiln_common::ROOT_BONE_PARENT;

use crate::error::CompileError;
use crate::scene::{Scene, SceneNode, MD5_HIERARCHY_NODE_NAME, MD5_ROOT_NODE_NAME};

/// A flattened bone hierarchy
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    /// Parent bone index per bone; ROOT_BONE_PARENT for bone 0
    pub parent_ids: Vec<u8>,
    /// 32-bit bone name hashes, depth-first pre-order
    pub bone_ids: Vec<u32>,
    /// Local bind-pose matrices
    pub local_matrices: Vec<Mat4>,
    /// Object space -> bone space matrices, filled in during vertex synthesis
    pub offset_matrices: Vec<Mat4>,
}

impl Skeleton {
    pub fn number_of_bones(&self) -> u8 {
        self.bone_ids.len() as u8
    }

    /// Linear scan; bone counts are capped at 255
    pub fn bone_index_by_id(&self, bone_id: u32) -> Option<u8> {
        self.bone_ids
            .iter()
            .position(|&id| id == bone_id)
            .map(|index| index as u8)
    }
}

/// Detect the bone-hierarchy root and flatten it into a skeleton.
///
/// Importer conventions:
/// - an unnamed scene root must have exactly one child, which is the bone
///   root
/// - a root named `<MD5_Hierarchy>` carries bone data in a layout that is
///   not supported yet; logged and skipped
/// - a root named `<MD5_Root>` holds a `<MD5_Hierarchy>` child whose single
///   child is the bone root
///
/// Any other root name means the scene carries no skeleton. The importer's
/// coordinate compensation on the scene root is folded into bone 0's local
/// matrix after the recursive fill.
pub fn build_skeleton(scene: &Scene, source: &Path) -> Result<Option<Skeleton>, CompileError> {
    let root = &scene.root;

    let bone_root = if root.name.is_empty() {
        if root.children.len() != 1 {
            return Err(CompileError::malformed(
                source,
                format!(
                    "there can be only a single root bone, the unnamed scene root has {} children",
                    root.children.len()
                ),
            ));
        }
        &root.children[0]
    } else if root.name == MD5_HIERARCHY_NODE_NAME {
        tracing::warn!(
            "{}: bone data below a bare {} root is not supported yet, skipping skeleton",
            source.display(),
            MD5_HIERARCHY_NODE_NAME
        );
        return Ok(None);
    } else if root.name == MD5_ROOT_NODE_NAME {
        let hierarchy = root
            .children
            .iter()
            .find(|child| child.name == MD5_HIERARCHY_NODE_NAME)
            .ok_or_else(|| {
                CompileError::malformed(
                    source,
                    format!("{MD5_ROOT_NODE_NAME} node has no {MD5_HIERARCHY_NODE_NAME} child"),
                )
            })?;
        if hierarchy.children.len() != 1 {
            return Err(CompileError::malformed(
                source,
                format!(
                    "there can be only a single root bone, {} has {} children",
                    MD5_HIERARCHY_NODE_NAME,
                    hierarchy.children.len()
                ),
            ));
        }
        &hierarchy.children[0]
    } else {
        return Ok(None);
    };

    let mut skeleton = Skeleton::default();
    fill_recursive(bone_root, ROOT_BONE_PARENT, &mut skeleton, source)?;

    // Fold the importer's coordinate compensation on the scene root into the
    // root bone
    skeleton.local_matrices[0] = root.transform * skeleton.local_matrices[0];

    Ok(Some(skeleton))
}

fn fill_recursive(
    node: &SceneNode,
    parent: u8,
    skeleton: &mut Skeleton,
    source: &Path,
) -> Result<(), CompileError> {
    if skeleton.bone_ids.len() >= MAX_BONES {
        return Err(CompileError::malformed(
            source,
            format!("skeleton has more than {MAX_BONES} bones"),
        ));
    }

    let bone_id = string_hash32(&node.name);
    if skeleton.bone_ids.contains(&bone_id) {
        return Err(CompileError::malformed(
            source,
            format!("duplicate bone name '{}' (hash collision)", node.name),
        ));
    }

    let index = skeleton.bone_ids.len() as u8;
    skeleton.parent_ids.push(parent);
    skeleton.bone_ids.push(bone_id);
    skeleton.local_matrices.push(node.transform);
    skeleton.offset_matrices.push(Mat4::IDENTITY);

    for child in &node.children {
        fill_recursive(child, index, skeleton, source)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn bone(name: &str, children: Vec<SceneNode>) -> SceneNode {
        SceneNode {
            name: name.to_string(),
            transform: Mat4::IDENTITY,
            mesh_indices: Vec::new(),
            children,
        }
    }

    fn unnamed_root(children: Vec<SceneNode>) -> Scene {
        Scene {
            root: SceneNode {
                name: String::new(),
                transform: Mat4::IDENTITY,
                mesh_indices: Vec::new(),
                children,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_single_bone() {
        let scene = unnamed_root(vec![bone("root", vec![])]);
        let skeleton = build_skeleton(&scene, Path::new("test")).unwrap().unwrap();
        assert_eq!(skeleton.number_of_bones(), 1);
        assert_eq!(skeleton.parent_ids, vec![ROOT_BONE_PARENT]);
        assert_eq!(skeleton.bone_ids[0], string_hash32("root"));
    }

    #[test]
    fn test_depth_first_preorder_indices() {
        // root -> (spine -> head, arm)
        let scene = unnamed_root(vec![bone(
            "root",
            vec![bone("spine", vec![bone("head", vec![])]), bone("arm", vec![])],
        )]);
        let skeleton = build_skeleton(&scene, Path::new("test")).unwrap().unwrap();

        assert_eq!(skeleton.number_of_bones(), 4);
        assert_eq!(
            skeleton.bone_ids,
            vec![
                string_hash32("root"),
                string_hash32("spine"),
                string_hash32("head"),
                string_hash32("arm"),
            ]
        );
        assert_eq!(skeleton.parent_ids, vec![ROOT_BONE_PARENT, 0, 1, 0]);
    }

    #[test]
    fn test_bone_index_assignment_is_deterministic() {
        let make = || {
            unnamed_root(vec![bone(
                "root",
                vec![bone("left", vec![]), bone("right", vec![])],
            )])
        };
        let first = build_skeleton(&make(), Path::new("test")).unwrap().unwrap();
        let second = build_skeleton(&make(), Path::new("test")).unwrap().unwrap();
        assert_eq!(first.bone_ids, second.bone_ids);
        assert_eq!(first.parent_ids, second.parent_ids);
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let scene = unnamed_root(vec![bone("a", vec![]), bone("b", vec![])]);
        let error = build_skeleton(&scene, Path::new("test")).unwrap_err();
        assert!(error.to_string().contains("single root bone"));
    }

    #[test]
    fn test_duplicate_bone_name_rejected() {
        let scene = unnamed_root(vec![bone("root", vec![bone("root", vec![])])]);
        let error = build_skeleton(&scene, Path::new("test")).unwrap_err();
        assert!(error.to_string().contains("duplicate bone name"));
    }

    #[test]
    fn test_named_root_means_no_skeleton() {
        let mut scene = unnamed_root(vec![bone("child", vec![])]);
        scene.root.name = "RootNode".to_string();
        assert!(build_skeleton(&scene, Path::new("test")).unwrap().is_none());
    }

    #[test]
    fn test_md5_hierarchy_root_is_skipped() {
        let mut scene = unnamed_root(vec![bone("child", vec![])]);
        scene.root.name = MD5_HIERARCHY_NODE_NAME.to_string();
        assert!(build_skeleton(&scene, Path::new("test")).unwrap().is_none());
    }

    #[test]
    fn test_md5_root_convention() {
        let scene = Scene {
            root: SceneNode {
                name: MD5_ROOT_NODE_NAME.to_string(),
                transform: Mat4::IDENTITY,
                mesh_indices: Vec::new(),
                children: vec![
                    bone(MD5_HIERARCHY_NODE_NAME, vec![bone("origin", vec![])]),
                    bone("<MD5_Mesh>", vec![]),
                ],
            },
            ..Default::default()
        };
        let skeleton = build_skeleton(&scene, Path::new("test")).unwrap().unwrap();
        assert_eq!(skeleton.number_of_bones(), 1);
        assert_eq!(skeleton.bone_ids[0], string_hash32("origin"));
    }

    #[test]
    fn test_root_transform_folded_into_bone_zero() {
        let mut scene = unnamed_root(vec![bone("root", vec![])]);
        scene.root.transform = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let skeleton = build_skeleton(&scene, Path::new("test")).unwrap().unwrap();
        let translation = skeleton.local_matrices[0].w_axis;
        assert!((translation.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_bone_count_cap() {
        // A chain of 256 bones no longer fits u8 indices
        let mut node = bone("bone_255", vec![]);
        for i in (0..255).rev() {
            node = bone(&format!("bone_{i}"), vec![node]);
        }
        let scene = unnamed_root(vec![node]);
        let error = build_skeleton(&scene, Path::new("test")).unwrap_err();
        assert!(error.to_string().contains("more than 255 bones"));
    }
}
