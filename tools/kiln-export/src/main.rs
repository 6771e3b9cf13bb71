//! kiln-export - Kiln asset compiler
//!
//! Bakes authored 3D content (glTF/GLB/OBJ) into engine-ready binary assets
//! (.kmesh, .kanim), driven by a JSON project manifest or per-file commands.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kiln_export::{animation, compiler, config};

#[derive(Parser)]
#[command(name = "kiln-export")]
#[command(about = "Kiln asset compiler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build all assets from a project manifest
    Build {
        /// Path to the project manifest (JSON)
        #[arg(default_value = "kiln-project.json")]
        manifest: PathBuf,

        /// Output directory (overrides manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a project manifest without building
    Check {
        /// Path to the project manifest (JSON)
        #[arg(default_value = "kiln-project.json")]
        manifest: PathBuf,
    },

    /// Compile a single mesh asset
    Mesh {
        /// Input scene file (glTF/GLB/OBJ)
        input: PathBuf,

        /// Output .kmesh file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pipe-separated import flags (e.g. "CalculateTangentSpace | FlipUvs")
        #[arg(short, long)]
        import_flags: Option<String>,
    },

    /// Compile a single skeleton-animation asset
    Animation {
        /// Input scene file (glTF/GLB)
        input: PathBuf,

        /// Output .kanim file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Animation index (required when the scene holds several)
        #[arg(short, long)]
        animation: Option<usize>,

        /// Force unit bone scale
        #[arg(long)]
        ignore_bone_scale: bool,

        /// List available animations instead of compiling
        #[arg(long)]
        list: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { manifest, output } => {
            tracing::info!("building assets from {}", manifest.display());
            let project = config::load_manifest(&manifest)?;
            let summary = compiler::build_project(&project, output.as_deref())?;
            if !summary.failed.is_empty() {
                bail!("{} asset(s) failed to compile", summary.failed.len());
            }
        }

        Commands::Check { manifest } => {
            tracing::info!("checking manifest {}", manifest.display());
            let project = config::load_manifest(&manifest)?;
            config::validate(&project, &manifest)?;
            tracing::info!("manifest is valid");
        }

        Commands::Mesh {
            input,
            output,
            import_flags,
        } => {
            let asset = config::AssetConfig {
                input_file: input.clone(),
                import_flags,
                ..Default::default()
            };
            let output = output.unwrap_or_else(|| {
                input.with_extension(kiln_common::formats::MESH_ASSET_EXTENSION)
            });
            tracing::info!("compiling {} -> {}", input.display(), output.display());

            let mut scene = compiler::import_scene(&asset)?;
            let compiled = kiln_export::compile_mesh(&mut scene, &asset, &input)?;
            kiln_export::write_mesh_asset(&compiled, &output)?;
        }

        Commands::Animation {
            input,
            output,
            animation: animation_index,
            ignore_bone_scale,
            list,
        } => {
            let asset = config::AssetConfig {
                input_file: input.clone(),
                animation_index,
                ignore_bone_scale,
                ..Default::default()
            };
            let scene = compiler::import_scene(&asset)?;

            if list {
                animation::list_animations(&scene, &input);
            } else {
                let output = output.unwrap_or_else(|| {
                    input.with_extension(kiln_common::formats::SKELETON_ANIMATION_ASSET_EXTENSION)
                });
                tracing::info!("compiling {} -> {}", input.display(), output.display());

                let compiled = kiln_export::compile_skeleton_animation(&scene, &asset, &input)?;
                kiln_export::write_skeleton_animation_asset(&compiled, &output)?;
            }
        }
    }

    Ok(())
}
