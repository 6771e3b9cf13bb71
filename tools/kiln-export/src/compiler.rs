//! Asset compilers and the cache-aware compile gate
//!
//! The compiler kinds form a small closed set behind one trait; the gate
//! asks the cache whether any input changed, the output is missing or the
//! format version was bumped, and only commits cache entries after a fully
//! successful compile. A failing asset leaves the cache untouched so the
//! next run retries it.

use std::path::{Path, PathBuf};

use kiln_common::formats::{
    MESH_ASSET_EXTENSION, MESH_FORMAT_VERSION, SKELETON_ANIMATION_ASSET_EXTENSION,
    SKELETON_ANIMATION_FORMAT_VERSION,
};

use crate::animation::{compile_skeleton_animation, write_skeleton_animation_asset};
use crate::cache::CacheManager;
use crate::config::{AssetConfig, ProjectManifest};
use crate::error::CompileError;
use crate::mesh::{compile_mesh, write_mesh_asset};
use crate::scene::{self, Scene};

/// What the compile gate decided for one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Cache hit, output left untouched
    Skipped,
    /// Output written and cache entries committed
    Compiled,
}

/// One asset compiler kind
pub trait AssetCompiler {
    /// Extension of produced asset files
    fn output_extension(&self) -> &'static str;

    /// Format version of produced asset files; part of the cache key
    fn format_version(&self) -> u32;

    /// Import the source and write the output file
    fn compile(&self, config: &AssetConfig, output_file: &Path) -> Result<(), CompileError>;
}

pub struct MeshAssetCompiler;

impl AssetCompiler for MeshAssetCompiler {
    fn output_extension(&self) -> &'static str {
        MESH_ASSET_EXTENSION
    }

    fn format_version(&self) -> u32 {
        MESH_FORMAT_VERSION
    }

    fn compile(&self, config: &AssetConfig, output_file: &Path) -> Result<(), CompileError> {
        let mut scene = import_scene(config)?;
        let compiled = compile_mesh(&mut scene, config, &config.input_file)?;
        write_mesh_asset(&compiled, output_file)
    }
}

pub struct SkeletonAnimationAssetCompiler;

impl AssetCompiler for SkeletonAnimationAssetCompiler {
    fn output_extension(&self) -> &'static str {
        SKELETON_ANIMATION_ASSET_EXTENSION
    }

    fn format_version(&self) -> u32 {
        SKELETON_ANIMATION_FORMAT_VERSION
    }

    fn compile(&self, config: &AssetConfig, output_file: &Path) -> Result<(), CompileError> {
        let scene = import_scene(config)?;
        let compiled = compile_skeleton_animation(&scene, config, &config.input_file)?;
        write_skeleton_animation_asset(&compiled, output_file)
    }
}

/// Import the configured source file into a scene graph
pub fn import_scene(config: &AssetConfig) -> Result<Scene, CompileError> {
    let input = &config.input_file;
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "gltf" | "glb" => scene::gltf::import_scene(input, config.resolved_import_flags()?),
        "obj" => scene::obj::import_scene(input),
        _ => Err(CompileError::malformed(
            input,
            format!("unsupported input format '{extension}' (use .gltf, .glb or .obj)"),
        )),
    }
}

/// Output path for an asset: input file stem plus the compiler's extension
pub fn output_file_for(
    compiler: &dyn AssetCompiler,
    config: &AssetConfig,
    output_directory: &Path,
) -> PathBuf {
    let stem = config
        .input_file
        .file_stem()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("asset"));
    output_directory
        .join(stem)
        .with_extension(compiler.output_extension())
}

/// Compile one asset through the cache gate
pub fn compile_if_changed(
    compiler: &dyn AssetCompiler,
    config: &AssetConfig,
    output_directory: &Path,
    cache: &mut CacheManager,
) -> Result<CompileOutcome, CompileError> {
    let output_file = output_file_for(compiler, config, output_directory);
    let input_files = [config.input_file.clone()];

    let (recompile, entries) =
        cache.needs_to_be_compiled(&input_files, &output_file, compiler.format_version())?;
    if !recompile {
        tracing::debug!("{} is up to date", output_file.display());
        return Ok(CompileOutcome::Skipped);
    }

    compiler.compile(config, &output_file)?;

    // Committed only after the output was written; an error above leaves the
    // cache untouched and forces a retry on the next run
    cache.store_or_update_entries(&output_file, entries);
    Ok(CompileOutcome::Compiled)
}

/// Per-project build report
#[derive(Debug, Default)]
pub struct BuildSummary {
    pub compiled: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, CompileError)>,
}

/// Compile every asset of a project manifest, continuing past per-asset
/// failures
pub fn build_project(
    manifest: &ProjectManifest,
    output_override: Option<&Path>,
) -> Result<BuildSummary, CompileError> {
    let output_directory = output_override.unwrap_or(&manifest.output_directory);
    std::fs::create_dir_all(output_directory)
        .map_err(|e| CompileError::io(output_directory, e))?;

    let mut cache = CacheManager::load(&manifest.cache_file());
    let mut summary = BuildSummary::default();

    let mesh_compiler = MeshAssetCompiler;
    let animation_compiler = SkeletonAnimationAssetCompiler;
    let assets: Vec<(&dyn AssetCompiler, &AssetConfig)> = manifest
        .mesh_assets
        .iter()
        .map(|config| (&mesh_compiler as &dyn AssetCompiler, config))
        .chain(
            manifest
                .skeleton_animation_assets
                .iter()
                .map(|config| (&animation_compiler as &dyn AssetCompiler, config)),
        )
        .collect();

    for (compiler, config) in assets {
        match compile_if_changed(compiler, config, output_directory, &mut cache) {
            Ok(CompileOutcome::Compiled) => summary.compiled += 1,
            Ok(CompileOutcome::Skipped) => summary.skipped += 1,
            Err(error) => {
                tracing::error!("failed to compile {}: {error}", config.input_file.display());
                summary.failed.push((config.input_file.clone(), error));
            }
        }
    }

    cache.save()?;

    tracing::info!(
        "build finished: {} compiled, {} up to date, {} failed",
        summary.compiled,
        summary.skipped,
        summary.failed.len()
    );
    Ok(summary)
}
