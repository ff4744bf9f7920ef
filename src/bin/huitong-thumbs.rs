//! Provides the `huitong-thumbs` tool for managing catalog thumbnails.
//!
//! Renders single models to PNG, registers models and drives thumbnail
//! generation for a whole catalog through the sequential queue.
//!
//! # Examples
//! ```text
//! huitong-thumbs render duck.glb --size 512
//! huitong-thumbs --config huitong.toml backfill --include-placeholders
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};

use huitong_thumbs::catalog::{find_preset, presets, ThumbnailState};
use huitong_thumbs::config::{api_key, StorageBackend};
use huitong_thumbs::fallback;
use huitong_thumbs::loader::ModelSource;
use huitong_thumbs::storage::{sanitize_name, RestObjectStore};
use huitong_thumbs::{Config, GenerationQueue, ThumbnailOutcome, ThumbnailService};

/// Thumbnail generation for the Huitong model catalog.
#[derive(Parser, Debug)]
#[command(name = "huitong-thumbs", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "huitong.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one model to a PNG file without touching the catalog.
    Render {
        /// URL, path or data URI of a GLB/GLTF model.
        model: String,
        /// Edge length of the square output.
        #[arg(long, default_value_t = 256)]
        size: u32,
        /// Output file; defaults to the model name with a .png extension.
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Material preset (id or name) applied to every surface.
        #[arg(long)]
        material: Option<String>,
    },
    /// Write the placeholder image for a model name.
    Placeholder {
        name: String,
        #[arg(long, default_value_t = 256)]
        size: u32,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Register a model and generate its thumbnail.
    Add {
        name: String,
        /// URL or path of the model file.
        source: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List models with their thumbnail state.
    List,
    /// Generate thumbnails for every model that lacks one.
    Backfill {
        /// Also retry models that currently show a placeholder.
        #[arg(long)]
        include_placeholders: bool,
    },
    /// Regenerate the thumbnail of one model, replacing the previous one.
    Regenerate { id: String },
    /// Delete a model and its thumbnail.
    Delete { id: String },
    /// Remove models that share both name and source, keeping the oldest.
    Dedupe {
        /// Only report what would be removed.
        #[arg(long)]
        dry_run: bool,
    },
    /// Create the public storage bucket for the rest backend.
    InitBucket,
    /// Print the built-in material presets.
    Presets {
        /// Insert presets missing from the catalog.
        #[arg(long)]
        seed: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Render {
            model,
            size,
            out,
            material,
        } => render(&config, &model, size, out, material.as_deref()).await,
        Command::Placeholder { name, size, out } => {
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.png", sanitize_name(&name))));
            let png = fallback::placeholder_png(&name, size, size)?;
            write_png(&out, &png).await
        }
        Command::Add {
            name,
            source,
            description,
        } => {
            let service = Arc::new(config.build_service().await?);
            let record = service.register_model(&name, description, &source).await?;
            println!("{}", record.id);
            generate(service, vec![record.id]).await
        }
        Command::List => {
            let service = config.build_service().await?;
            for model in service.catalog().list_models().await? {
                let state = ThumbnailState::of(&model, false);
                println!("{}\t{:?}\t{}", model.id, state, model.name);
            }
            Ok(())
        }
        Command::Backfill {
            include_placeholders,
        } => {
            let service = Arc::new(config.build_service().await?);
            let ids = service
                .backfill_candidates(include_placeholders)
                .await?
                .into_iter()
                .map(|m| m.id)
                .collect::<Vec<_>>();
            info!("{} models need a thumbnail", ids.len());
            generate(service, ids).await
        }
        Command::Regenerate { id } => {
            let service = Arc::new(config.build_service().await?);
            generate(service, vec![id]).await
        }
        Command::Delete { id } => {
            let service = config.build_service().await?;
            match service.delete_model(&id).await? {
                Some(record) => println!("deleted {} ({})", record.name, record.id),
                None => bail!("model {id} not found"),
            }
            Ok(())
        }
        Command::Dedupe { dry_run } => {
            let service = config.build_service().await?;
            let report = service.dedupe(dry_run).await?;
            for model in &report.removed {
                println!("{}\t{}\t{}", model.id, model.name, model.source);
            }
            let verb = if dry_run { "would remove" } else { "removed" };
            info!("{verb} {} duplicates, {} models kept", report.removed.len(), report.kept);
            Ok(())
        }
        Command::InitBucket => {
            if config.storage.backend != StorageBackend::Rest {
                bail!("init-bucket needs storage.backend = \"rest\"");
            }
            let endpoint = config
                .storage
                .endpoint
                .as_deref()
                .context("storage.endpoint is not set")?;
            let store = RestObjectStore::new(
                endpoint,
                &config.storage.bucket,
                api_key(&config.storage.api_key),
                config.pipeline.fetch_timeout(),
            )?;
            if store.ensure_bucket().await? {
                println!("created bucket {}", store.bucket());
            } else {
                println!("bucket {} already exists", store.bucket());
            }
            Ok(())
        }
        Command::Presets { seed } => {
            for preset in presets() {
                println!(
                    "{}\t{}\t{}\troughness={:.2}\tmetallic={:.2}",
                    preset.id, preset.name, preset.color, preset.roughness, preset.metallic
                );
            }
            if seed {
                let service = config.build_service().await?;
                let catalog = service.catalog();
                for preset in presets() {
                    if catalog.get_material(&preset.id).await?.is_none() {
                        catalog.insert_material(preset).await?;
                    }
                }
                info!("presets seeded into the {} catalog", catalog.name());
            }
            Ok(())
        }
    }
}

async fn render(
    config: &Config,
    model: &str,
    size: u32,
    out: Option<PathBuf>,
    material: Option<&str>,
) -> anyhow::Result<()> {
    let source = ModelSource::parse(model)?;
    let mut options = config.pipeline.render_options();
    options.width = size;
    options.height = size;
    if let Some(key) = material {
        let preset = find_preset(key).with_context(|| format!("unknown material preset {key}"))?;
        options.material = Some(preset.surface());
    }

    let out = out.unwrap_or_else(|| default_output(&source));
    let service = config.build_service().await?;
    info!("rendering {source} ({size}x{size})");
    let png = match service.pipeline().render(&source, &options).await {
        Ok(png) => png,
        Err(e) => {
            warn!("rendering failed, writing placeholder: {e}");
            let name = out.file_stem().and_then(|s| s.to_str()).unwrap_or("model");
            fallback::placeholder_png(name, size, size)?
        }
    };
    write_png(&out, &png).await
}

async fn generate(service: Arc<ThumbnailService>, ids: Vec<String>) -> anyhow::Result<()> {
    let queue = GenerationQueue::start(service);
    let receivers: Vec<_> = ids.iter().map(|id| (id.clone(), queue.submit(id))).collect();

    let mut failures = 0usize;
    for (id, receiver) in receivers {
        match receiver.await.context("generation worker stopped")? {
            Ok(ThumbnailOutcome::Rendered(thumbnail)) => {
                println!("{id}\trendered\t{}", thumbnail.reference.reference());
            }
            Ok(ThumbnailOutcome::Placeholder { thumbnail, cause }) => {
                println!("{id}\tplaceholder\t{}", thumbnail.reference.reference());
                warn!("model {id}: {cause}");
            }
            Ok(ThumbnailOutcome::Unavailable { cause }) => {
                println!("{id}\tunavailable");
                warn!("model {id}: {cause}");
                failures += 1;
            }
            Err(e) => {
                warn!("model {id}: {e}");
                failures += 1;
            }
        }
    }
    queue.shutdown().await;

    if failures > 0 {
        bail!("{failures} of {} models got no thumbnail", ids.len());
    }
    Ok(())
}

fn default_output(source: &ModelSource) -> PathBuf {
    match source {
        ModelSource::File(path) => path.with_extension("png"),
        other => {
            let name = other.to_string();
            let stem = name
                .rsplit('/')
                .next()
                .and_then(|last| last.split('.').next())
                .filter(|s| !s.is_empty())
                .unwrap_or("thumbnail");
            PathBuf::from(format!("{}.png", sanitize_name(stem)))
        }
    }
}

async fn write_png(out: &Path, png: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(out, png)
        .await
        .with_context(|| format!("writing {}", out.display()))?;
    info!("saved {}", out.display());
    Ok(())
}
