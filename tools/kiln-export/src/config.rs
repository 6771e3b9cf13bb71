//! JSON project manifest and per-asset compiler configuration
//!
//! A project manifest lists the assets to build plus the output directory
//! and cache file. Field names follow the authored JSON convention
//! (PascalCase). Import flags arrive as a pipe-separated string of names,
//! e.g. `"CalculateTangentSpace | FlipUvs"`.

use hashbrown::HashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::CompileError;

/// Run the tangent-space generator during vertex synthesis
pub const CALCULATE_TANGENT_SPACE: u32 = 1;
/// Flip the V texture coordinate on import
pub const FLIP_UVS: u32 = 2;
/// Collapse materials sharing a name on import
pub const REMOVE_REDUNDANT_MATERIALS: u32 = 4;

/// Flags applied when the configuration does not name any
pub const DEFAULT_IMPORT_FLAGS: u32 = CALCULATE_TANGENT_SPACE;

/// Parse a pipe-separated list of import flag names
pub fn parse_import_flags(value: &str) -> Result<u32, String> {
    let mut flags = 0u32;
    for name in value.split('|') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        flags |= match name {
            "CalculateTangentSpace" => CALCULATE_TANGENT_SPACE,
            "FlipUvs" => FLIP_UVS,
            "RemoveRedundantMaterials" => REMOVE_REDUNDANT_MATERIALS,
            _ => return Err(format!("unknown import flag '{name}'")),
        };
    }
    Ok(flags)
}

/// One asset's compiler block
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct AssetConfig {
    /// Source file, relative to the manifest
    pub input_file: PathBuf,

    /// Selects the clip when the source holds several animations
    #[serde(default)]
    pub animation_index: Option<usize>,

    /// Force unit bone scale for the whole animation
    #[serde(default)]
    pub ignore_bone_scale: bool,

    /// Pipe-separated import flag names; defaults apply when absent
    #[serde(default)]
    pub import_flags: Option<String>,

    /// Material name -> material asset id
    #[serde(default)]
    pub material_name_to_asset_id: HashMap<String, u64>,
}

impl AssetConfig {
    /// Parse the configured import flags, falling back to the defaults
    pub fn resolved_import_flags(&self) -> Result<u32, CompileError> {
        match &self.import_flags {
            Some(value) => parse_import_flags(value)
                .map_err(|reason| CompileError::malformed(&self.input_file, reason)),
            None => Ok(DEFAULT_IMPORT_FLAGS),
        }
    }
}

/// Project manifest: everything the `build` command compiles
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ProjectManifest {
    pub output_directory: PathBuf,

    /// Compile cache location; defaults to `compile-cache.json` in the
    /// output directory
    #[serde(default)]
    pub cache_file: Option<PathBuf>,

    #[serde(default)]
    pub mesh_assets: Vec<AssetConfig>,

    #[serde(default)]
    pub skeleton_animation_assets: Vec<AssetConfig>,
}

impl ProjectManifest {
    pub fn cache_file(&self) -> PathBuf {
        self.cache_file
            .clone()
            .unwrap_or_else(|| self.output_directory.join("compile-cache.json"))
    }
}

/// Load and parse a project manifest
pub fn load_manifest(path: &Path) -> Result<ProjectManifest, CompileError> {
    let data = std::fs::read(path).map_err(|e| CompileError::io(path, e))?;
    serde_json::from_slice(&data)
        .map_err(|e| CompileError::malformed(path, format!("invalid manifest: {e}")))
}

/// Check a manifest without compiling anything
pub fn validate(manifest: &ProjectManifest, manifest_path: &Path) -> Result<(), CompileError> {
    for config in manifest
        .mesh_assets
        .iter()
        .chain(manifest.skeleton_animation_assets.iter())
    {
        if !config.input_file.exists() {
            return Err(CompileError::malformed(
                manifest_path,
                format!("input file {} does not exist", config.input_file.display()),
            ));
        }
        config.resolved_import_flags()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_flags() {
        assert_eq!(
            parse_import_flags("CalculateTangentSpace").unwrap(),
            CALCULATE_TANGENT_SPACE
        );
        assert_eq!(
            parse_import_flags("CalculateTangentSpace | FlipUvs").unwrap(),
            CALCULATE_TANGENT_SPACE | FLIP_UVS
        );
        assert_eq!(parse_import_flags("").unwrap(), 0);
        assert!(parse_import_flags("Nonsense").is_err());
    }

    #[test]
    fn test_asset_config_from_json() {
        let json = r#"{
            "InputFile": "character.glb",
            "AnimationIndex": 2,
            "IgnoreBoneScale": true,
            "ImportFlags": "CalculateTangentSpace | RemoveRedundantMaterials",
            "MaterialNameToAssetId": { "body": 4100, "eyes": 4101 }
        }"#;
        let config: AssetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.input_file, PathBuf::from("character.glb"));
        assert_eq!(config.animation_index, Some(2));
        assert!(config.ignore_bone_scale);
        assert_eq!(
            config.resolved_import_flags().unwrap(),
            CALCULATE_TANGENT_SPACE | REMOVE_REDUNDANT_MATERIALS
        );
        assert_eq!(config.material_name_to_asset_id["body"], 4100);
    }

    #[test]
    fn test_asset_config_defaults() {
        let config: AssetConfig = serde_json::from_str(r#"{ "InputFile": "a.glb" }"#).unwrap();
        assert_eq!(config.animation_index, None);
        assert!(!config.ignore_bone_scale);
        assert_eq!(config.resolved_import_flags().unwrap(), DEFAULT_IMPORT_FLAGS);
    }

    #[test]
    fn test_manifest_from_json() {
        let json = r#"{
            "OutputDirectory": "build/assets",
            "MeshAssets": [{ "InputFile": "a.glb" }],
            "SkeletonAnimationAssets": [{ "InputFile": "b.glb", "AnimationIndex": 0 }]
        }"#;
        let manifest: ProjectManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.mesh_assets.len(), 1);
        assert_eq!(manifest.skeleton_animation_assets.len(), 1);
        assert_eq!(
            manifest.cache_file(),
            PathBuf::from("build/assets/compile-cache.json")
        );
    }
}
