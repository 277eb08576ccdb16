use ai_pipeline::{
    AspectRatio, AssetHandle, BackendConfig, BackendFactory, BackendType, ImageStyle,
    MediaCache, Orchestrator, OutputType, ReferenceImage, StaticCredentials, TemplatePreset,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use jobs::{JobEvent, ProgressBoard, ProgressSender};
use project::{HistoryRecord, HistoryStore, SqliteKvStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use studio::{Studio, StudioEvent, MAX_SELECTION};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bulkgen")]
#[command(about = "Batch image and video generation from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generate local placeholders instead of calling the remote service
    #[arg(long, global = true)]
    offline: bool,

    /// Backend configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one asset set per prompt, all prompts in parallel
    Generate {
        /// Prompts; each one becomes its own job
        prompts: Vec<String>,

        /// Read prompts from a file, one per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Start from a template preset (product-mockup, youtube-thumbnail, ...)
        #[arg(short, long)]
        template: Option<TemplatePreset>,

        /// Generate videos instead of images
        #[arg(long)]
        video: bool,

        /// Image style
        #[arg(short, long)]
        style: Option<ImageStyle>,

        /// Aspect ratio (1:1, 16:9, 9:16, 4:3, 3:4)
        #[arg(short, long)]
        aspect: Option<AspectRatio>,

        /// Images per prompt (1-8)
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Keep subject and style consistent across images
        #[arg(long)]
        consistency: bool,

        /// Reference image to edit or animate from
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Extend the first generated video with this prompt
        #[arg(long)]
        extend: Option<String>,

        /// Upscale the first three generated images
        #[arg(long)]
        upscale: bool,

        /// Output directory
        #[arg(short, long, default_value = "bulkgen-output")]
        out: PathBuf,
    },

    /// Turn 2-3 images into one 16:9 video, in the order given
    Animate {
        images: Vec<PathBuf>,

        /// What should happen between the frames
        #[arg(short, long)]
        prompt: String,

        /// Output directory
        #[arg(short, long, default_value = "bulkgen-output")]
        out: PathBuf,
    },

    /// Upscale image files
    Upscale {
        images: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "bulkgen-output")]
        out: PathBuf,
    },

    /// Suggest prompts for a theme
    Ideas {
        theme: String,

        /// Suggest video prompts
        #[arg(long)]
        video: bool,
    },

    /// Inspect past generations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored generations, newest first
    List {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one generation's settings and assets
    Show { id: i64 },
    /// Remove all stored generations
    Clear,
    /// Write one generation's assets to a directory
    Export {
        id: i64,

        #[arg(short, long, default_value = "bulkgen-output")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let config = load_config(cli.config.as_deref(), cli.offline)?;
    let (progress, events) = ProgressSender::channel();
    let view = spawn_progress_view(events);
    let mut studio = build_studio(&config, progress)?;

    let outcome = match cli.command {
        Commands::Generate {
            prompts,
            file,
            template,
            video,
            style,
            aspect,
            count,
            consistency,
            reference,
            extend,
            upscale,
            out,
        } => {
            let options = GenerateOptions {
                prompts,
                file,
                template,
                video,
                style,
                aspect,
                count,
                consistency,
                reference,
                extend,
                upscale,
            };
            generate_command(&mut studio, options, &out).await
        }
        Commands::Animate { images, prompt, out } => {
            animate_command(&mut studio, images, &prompt, &out).await
        }
        Commands::Upscale { images, out } => upscale_command(&mut studio, images, &out).await,
        Commands::Ideas { theme, video } => ideas_command(&mut studio, &theme, video).await,
        Commands::History { action } => history_command(&mut studio, action).await,
    };

    // Closing the last sender ends the progress view
    drop(studio);
    if view.join().is_err() {
        warn!("progress view panicked");
    }
    outcome
}

fn load_config(path: Option<&Path>, offline: bool) -> Result<BackendConfig> {
    let mut config = match path {
        Some(path) => BackendConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => BackendConfig::new(BackendType::Gemini, project::default_media_dir()),
    };

    if offline {
        config.backend_type = BackendType::Offline;
        if path.is_none() {
            config = config.with_poll_interval(1);
        }
    }

    if config.api_key.is_none() {
        config.api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok();
    }

    Ok(config)
}

fn build_studio(config: &BackendConfig, progress: ProgressSender) -> Result<Studio> {
    let backend = BackendFactory::create(config)?;
    info!("Using {} backend", backend.name());

    let credentials = Arc::new(StaticCredentials::new(config.api_key.clone()));
    let orchestrator = Orchestrator::new(backend, credentials, MediaCache::new(&config.media_dir))
        .with_poll_interval(config.poll_interval());
    info!(media = %orchestrator.media().root().display(), "Media cache ready");

    let store = SqliteKvStore::open_or_create(&project::default_db_path())?;
    let history = HistoryStore::new(Arc::new(store));

    Ok(Studio::new(orchestrator, history).with_progress(progress))
}

/// One spinner per slot, ordered by slot, fed from the progress channel
fn spawn_progress_view(events: Receiver<JobEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{spinner:.cyan} [{prefix}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let mut board = ProgressBoard::new();
        let mut bars: BTreeMap<usize, ProgressBar> = BTreeMap::new();

        for event in events.iter() {
            board.apply(&event);

            let position = bars.range(..event.slot).count();
            let bar = bars.entry(event.slot).or_insert_with(|| {
                let bar = multi.insert(position, ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(truncate(&event.prompt, 32));
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            });

            match board.get(event.slot) {
                Some(entry) => bar.set_message(entry.message.clone()),
                None => bar.finish_with_message(event.status.message()),
            }

            // Slots are reused by the next operation
            if event.status.is_terminal() {
                bars.remove(&event.slot);
            }
        }
    })
}

struct GenerateOptions {
    prompts: Vec<String>,
    file: Option<PathBuf>,
    template: Option<TemplatePreset>,
    video: bool,
    style: Option<ImageStyle>,
    aspect: Option<AspectRatio>,
    count: Option<u32>,
    consistency: bool,
    reference: Option<PathBuf>,
    extend: Option<String>,
    upscale: bool,
}

async fn generate_command(studio: &mut Studio, options: GenerateOptions, out: &Path) -> Result<()> {
    let mut lines = options.prompts;
    if let Some(file) = &options.file {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("read prompts from {}", file.display()))?;
        lines.extend(text.lines().map(str::to_string));
    }

    if let Some(template) = options.template {
        studio.apply_template(template);
    }
    if !lines.is_empty() {
        studio.settings_mut().set_prompts(lines.join("\n"));
    }

    let settings = studio.settings_mut();
    if let Some(style) = options.style {
        settings.style = style;
    }
    if let Some(aspect) = options.aspect {
        settings.aspect_ratio = aspect;
    }
    if let Some(count) = options.count {
        settings.number_of_images = count;
    }
    if options.consistency {
        settings.maintain_consistency = true;
    }
    if let Some(path) = &options.reference {
        settings.reference_image = Some(
            ReferenceImage::from_path(path)
                .with_context(|| format!("read reference image {}", path.display()))?,
        );
    }
    let output_type = if options.video {
        OutputType::Video
    } else {
        OutputType::Image
    };
    settings.set_output_type(output_type);

    let prompt_count = settings.prompt_list().len();
    info!("Generating {} from {} prompt(s)", output_type, prompt_count);
    let generated = studio.generate().await?.len();
    info!("Generated {} asset(s)", generated);

    if let Some(prompt) = &options.extend {
        match studio.results().iter().position(AssetHandle::can_extend) {
            Some(index) => {
                studio.extend_video(index, prompt).await?;
                info!("Extended video {}", index);
            }
            None => warn!("Nothing to extend: no video in the results"),
        }
    }

    if options.upscale {
        let images: Vec<usize> = studio
            .results()
            .iter()
            .enumerate()
            .filter(|(_, asset)| asset.is_image())
            .map(|(i, _)| i)
            .take(MAX_SELECTION)
            .collect();
        if images.is_empty() {
            warn!("Nothing to upscale: no images in the results");
        }
        for index in images {
            studio.toggle_select(index);
        }
        if !studio.selection().is_empty() {
            report_bulk(studio).await?;
        }
    }

    write_results(studio, out)
}

async fn animate_command(
    studio: &mut Studio,
    images: Vec<PathBuf>,
    prompt: &str,
    out: &Path,
) -> Result<()> {
    for path in &images {
        let index = studio.push_asset(load_image(path)?);
        studio.toggle_select(index);
    }

    let index = studio.create_animation(prompt).await?;
    let video = &studio.results()[index..=index];
    for path in studio::export_assets(video, out)? {
        println!("{}", path.display());
    }
    Ok(())
}

async fn upscale_command(studio: &mut Studio, images: Vec<PathBuf>, out: &Path) -> Result<()> {
    for chunk in images.chunks(MAX_SELECTION) {
        for path in chunk {
            let index = studio.push_asset(load_image(path)?);
            studio.toggle_select(index);
        }
        report_bulk(studio).await?;
    }

    let upscaled: Vec<AssetHandle> = studio
        .results()
        .iter()
        .filter(|asset| asset.is_upscaled)
        .cloned()
        .collect();
    for path in studio::export_assets(&upscaled, out)? {
        println!("{}", path.display());
    }
    Ok(())
}

/// Run a bulk upscale over the selection with a progress bar
async fn report_bulk(studio: &mut Studio) -> Result<()> {
    let events = studio.subscribe();
    let bar = ProgressBar::new(studio.selection().len() as u64);
    bar.set_style(
        ProgressStyle::with_template("Upscaling [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let watcher = {
        let bar = bar.clone();
        thread::spawn(move || {
            for event in events.iter() {
                if let StudioEvent::BulkProgress(progress) = event {
                    bar.set_length(progress.total as u64);
                    bar.set_position(progress.current as u64);
                }
            }
        })
    };

    let result = studio.bulk_upscale().await;
    studio.unsubscribe_all();
    if watcher.join().is_err() {
        warn!("bulk progress watcher panicked");
    }
    bar.finish();

    let report = result?;
    info!("Upscaled {} image(s), {} failed", report.upscaled, report.failed);
    if let Some(banner) = studio.banner() {
        warn!("{}", banner);
    }
    Ok(())
}

async fn ideas_command(studio: &mut Studio, theme: &str, video: bool) -> Result<()> {
    if video {
        studio.settings_mut().set_output_type(OutputType::Video);
    }
    let ideas = studio.suggest_prompts(theme).await?;
    for (i, idea) in ideas.iter().enumerate() {
        println!("{}. {}", i + 1, idea);
    }
    Ok(())
}

async fn history_command(studio: &mut Studio, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List { json } => {
            let records = studio.history();
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            if records.is_empty() {
                println!("No history yet.");
            }
            for record in &records {
                println!("{}", summarize(record));
            }
        }
        HistoryAction::Show { id } => {
            let record = studio
                .history()
                .into_iter()
                .find(|r| r.id == id)
                .with_context(|| format!("no history record {}", id))?;
            println!("{}", summarize(&record));
            let settings = &record.settings;
            println!("  style: {}  aspect: {}  template: {}", settings.style, settings.aspect_ratio, settings.template.label());
            println!("  consistency: {}  images per prompt: {}", settings.maintain_consistency, settings.number_of_images);
            for line in settings.prompt_list() {
                println!("  > {}", line);
            }
            for asset in &record.assets {
                println!(
                    "  - {} {} ({} bytes){}",
                    asset.kind,
                    asset.prompt,
                    asset.bytes.len(),
                    if asset.is_upscaled { " [upscaled]" } else { "" }
                );
            }
        }
        HistoryAction::Clear => {
            studio.clear_history();
            info!("History cleared");
        }
        HistoryAction::Export { id, out } => {
            if !studio.load_history(id).await? {
                anyhow::bail!("no history record {}", id);
            }
            write_results(studio, &out)?;
        }
    }
    Ok(())
}

fn summarize(record: &HistoryRecord) -> String {
    let when = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(record.id)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string());
    let first = record
        .settings
        .prompt_list()
        .into_iter()
        .next()
        .unwrap_or_default();
    format!(
        "{}  {}  {} x{}  {}",
        record.id,
        when,
        record.settings.output_type,
        record.assets.len(),
        truncate(&first, 60)
    )
}

fn load_image(path: &Path) -> Result<AssetHandle> {
    let image = ReferenceImage::from_path(path)
        .with_context(|| format!("read image {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(AssetHandle::image(name, image.bytes, image.mime_type))
}

fn write_results(studio: &Studio, out: &Path) -> Result<()> {
    for path in studio.export(out)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "bulkgen", "--offline", "generate", "A cat", "A dog", "--style", "low-poly",
            "--aspect", "16:9", "-n", "2",
        ])
        .unwrap();
        assert!(cli.offline);
        match cli.command {
            Commands::Generate {
                prompts,
                style,
                aspect,
                count,
                ..
            } => {
                assert_eq!(prompts, vec!["A cat", "A dog"]);
                assert_eq!(style, Some(ImageStyle::LowPoly));
                assert_eq!(aspect, Some(AspectRatio::Landscape));
                assert_eq!(count, Some(2));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn offline_flag_switches_backend() {
        let config = load_config(None, true).unwrap();
        assert_eq!(config.backend_type, BackendType::Offline);
        assert_eq!(config.poll_interval_secs, 1);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }
}
