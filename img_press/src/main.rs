use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use console::style;
use press_core::config::{default_config_path, default_history_path};
use press_core::history::DEFAULT_MAX_ITEMS;
use press_core::report::{print_summary_report, render_statistics};
use press_core::{
    build_requests, collect_inputs, format_bytes, init_logging, AppConfig, BatchProgress,
    BatchRunner, BatchSummary, CancelToken, CompressionOutcome, CompressionPipeline,
    CompressionRequest, FormatRegistry, HistoryStore, LogConfig, ResizePolicy, Theme,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "img-press")]
#[command(version, about = "Batch image converter and compressor", long_about = None)]
struct Cli {
    /// Config file [default: ~/.img-press/config.json]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// History file [default: ~/.img-press/history.json]
    #[arg(long, global = true, value_name = "FILE")]
    history: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert and compress images
    Compress(CompressArgs),

    /// Report the size a conversion would produce without writing it
    Estimate {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        encode: EncodeArgs,

        #[arg(long)]
        json: bool,
    },

    /// Show dimensions, colour type and format of an image
    Info {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// List supported formats and optional dependencies
    Formats {
        #[arg(long)]
        json: bool,
    },

    /// Inspect or export the compression history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show or change saved defaults
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Clone, Default)]
struct EncodeArgs {
    /// Target format (jpeg, png, webp, avif, heic, ...) [default: from config]
    #[arg(short, long)]
    format: Option<String>,

    /// Quality 1-100 for lossy formats [default: from config]
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    #[arg(long, value_name = "PIXELS")]
    max_width: Option<u32>,

    #[arg(long, value_name = "PIXELS")]
    max_height: Option<u32>,

    /// Cap width and height independently instead of keeping the aspect ratio
    #[arg(long)]
    stretch: bool,
}

#[derive(Args, Clone)]
struct CompressArgs {
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    encode: EncodeArgs,

    /// Output directory [default: next to each source]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Print outcomes as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Do not record this batch in the history
    #[arg(long)]
    no_history: bool,
}

#[derive(Subcommand)]
enum HistoryAction {
    List {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },
    Stats {
        #[arg(long)]
        json: bool,
    },
    Search {
        query: String,
    },
    /// Export to CSV or JSON (picked from the extension unless --as is given)
    Export {
        path: PathBuf,

        #[arg(long = "as", value_enum)]
        export_as: Option<ExportFormat>,
    },
    Remove {
        index: usize,
    },
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    SetQuality {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,
    },
    SetFormat {
        format: String,
    },
    SetTheme {
        theme: String,
    },
    /// Default resize bounds; omit both to disable resizing
    SetMaxSize {
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        stretch: bool,
    },
    Reset,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }
}

struct Paths {
    config: PathBuf,
    history: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = init_logging("img-press", LogConfig::default().with_verbosity(cli.verbose));

    let paths = Paths {
        config: cli.config.clone().unwrap_or_else(default_config_path),
        history: cli.history.clone().unwrap_or_else(default_history_path),
    };

    match cli.command {
        Commands::Compress(args) => {
            let registry = FormatRegistry::global();
            let report = run_compress(&args, &paths, registry, !args.json)?;
            if report.failed > 0 || report.cancelled {
                std::process::exit(1);
            }
        }
        Commands::Estimate {
            input,
            encode,
            json,
        } => estimate(&input, &encode, json, &paths)?,
        Commands::Info { input, json } => info(&input, json)?,
        Commands::Formats { json } => list_formats(FormatRegistry::global(), json)?,
        Commands::History { action } => history(action, &paths)?,
        Commands::Config { action } => config(action, &paths)?,
    }

    Ok(())
}

#[derive(Debug)]
struct CompressReport {
    outcomes: Vec<CompressionOutcome>,
    failed: usize,
    cancelled: bool,
}

/// Merge command-line overrides into the configured defaults.
fn resolve_request_defaults(
    config: &AppConfig,
    encode: &EncodeArgs,
) -> (String, u8, Option<ResizePolicy>) {
    let format = encode
        .format
        .clone()
        .unwrap_or_else(|| config.preferred_format.clone());
    let quality = encode.quality.unwrap_or(config.default_quality);

    let resize = if encode.max_width.is_some() || encode.max_height.is_some() {
        ResizePolicy::from_bounds(encode.max_width, encode.max_height, !encode.stretch)
    } else {
        config.resize_policy().map(|mut policy| {
            if encode.stretch {
                policy.preserve_aspect = false;
            }
            policy
        })
    };
    (format, quality, resize)
}

fn check_target(registry: &FormatRegistry, format: &str) -> Result<()> {
    let descriptor = match registry.resolve(format) {
        Ok(d) => d,
        Err(e) => bail!("{}. Run `img-press formats` to list supported formats", e),
    };
    if !descriptor.supports_write {
        let writable: Vec<_> = registry.writable().map(|f| f.identifier).collect();
        bail!(
            "{} is read-only; choose one of: {}",
            descriptor.identifier,
            writable.join(", ")
        );
    }
    if let (Some(dependency), false) = (
        descriptor.required_dependency,
        descriptor.dependency_available,
    ) {
        bail!(
            "{} output needs {}. {}",
            descriptor.identifier,
            dependency,
            dependency.install_hint()
        );
    }
    Ok(())
}

fn run_compress(
    args: &CompressArgs,
    paths: &Paths,
    registry: &FormatRegistry,
    show_progress: bool,
) -> Result<CompressReport> {
    let mut config = AppConfig::load(&paths.config);
    let mut settings = config.compression_settings();
    let (format, quality, resize) = resolve_request_defaults(&config, &args.encode);
    check_target(registry, &format)?;
    settings.target_format = format;
    settings.quality = quality;
    settings.resize_policy = resize;
    settings.output_directory = args.output.clone();

    let inputs = collect_inputs(&args.inputs, registry, args.recursive);
    if inputs.is_empty() {
        bail!("No input images found");
    }
    let requests = build_requests(&inputs, &settings);
    tracing::info!(
        files = requests.len(),
        format = %settings.target_format,
        quality = settings.quality,
        "Starting batch"
    );

    let token = CancelToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %e, "Could not install Ctrl+C handler");
    }

    let runner = BatchRunner::new(CompressionPipeline::new(registry)).with_cancel_token(token.clone());
    let hidden = !show_progress || !console::Term::stderr().is_term();
    let mut progress = BatchProgress::new(requests.len(), hidden);

    let start = Instant::now();
    let outcomes = runner.run(&requests, |_, _, outcome| progress.record(outcome));
    let duration = start.elapsed();

    let cancelled = token.is_cancelled() && outcomes.len() < requests.len();
    if cancelled {
        progress.abandon();
    } else {
        progress.finish();
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    if args.json {
        let value = json!({
            "cancelled": cancelled,
            "requested": requests.len(),
            "succeeded": summary.succeeded,
            "failed": summary.failed,
            "outcomes": outcomes,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_summary_report(&summary, duration, requests.len());
        if cancelled {
            eprintln!("{}", style("Cancelled by user").yellow());
        }
        print_dependency_hints(&outcomes, registry);
    }

    if !args.no_history {
        let mut store = HistoryStore::open(&paths.history, DEFAULT_MAX_ITEMS);
        store.record(&outcomes);
        if let Err(e) = store.save() {
            tracing::warn!(path = %paths.history.display(), error = %e, "Failed to save history");
        }
    }

    remember_batch(&mut config, args, &settings.target_format);
    if let Err(e) = config.save(&paths.config) {
        tracing::warn!(path = %paths.config.display(), error = %e, "Failed to save config");
    }

    Ok(CompressReport {
        failed: summary.failed,
        outcomes,
        cancelled,
    })
}

fn remember_batch(config: &mut AppConfig, args: &CompressArgs, format: &str) {
    if let Some(dir) = &args.output {
        config.last_output_dir = Some(dir.clone());
    }
    for input in args.inputs.iter().rev() {
        let dir = if input.is_dir() {
            Some(input.as_path())
        } else {
            input.parent().filter(|p| !p.as_os_str().is_empty())
        };
        if let Some(dir) = dir {
            config.add_recent_directory(dir);
        }
    }
    config.add_recent_format(format);
}

fn print_dependency_hints(outcomes: &[CompressionOutcome], registry: &FormatRegistry) {
    let missing = outcomes
        .iter()
        .any(|o| o.status == press_core::OutcomeStatus::DependencyMissing);
    if !missing {
        return;
    }
    for dependency in registry.missing_dependencies() {
        eprintln!(
            "{} {}: {}",
            style("hint").cyan().bold(),
            dependency,
            dependency.install_hint()
        );
    }
}

fn estimate(input: &Path, encode: &EncodeArgs, json: bool, paths: &Paths) -> Result<()> {
    let registry = FormatRegistry::global();
    let config = AppConfig::load(&paths.config);
    let (format, quality, resize) = resolve_request_defaults(&config, encode);
    check_target(registry, &format)?;

    let output_dir = input.parent().unwrap_or_else(|| Path::new("."));
    let request = CompressionRequest::new(input, format, quality, output_dir).with_resize(resize);
    let pipeline = CompressionPipeline::new(registry);
    let estimated = pipeline
        .estimate(&request)
        .with_context(|| format!("Cannot estimate {}", input.display()))?;
    let original = std::fs::metadata(input)
        .with_context(|| format!("Cannot read {}", input.display()))?
        .len();
    let reduction = if original > 0 {
        (1.0 - estimated as f64 / original as f64) * 100.0
    } else {
        0.0
    };

    if json {
        let value = json!({
            "input": input,
            "format": request.target_format(),
            "quality": request.quality(),
            "original_size": original,
            "estimated_size": estimated,
            "reduction_percent": reduction,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "{} → {} ({}) at quality {}: {:.1}% {}",
            format_bytes(original),
            format_bytes(estimated),
            request.target_format(),
            request.quality(),
            reduction.abs(),
            if reduction >= 0.0 { "smaller" } else { "larger" }
        );
    }
    Ok(())
}

fn info(input: &Path, json: bool) -> Result<()> {
    let pipeline = CompressionPipeline::new(FormatRegistry::global());
    let info = pipeline
        .inspect(input)
        .with_context(|| format!("Cannot inspect {}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", style(input.display()).bold());
        println!("  Format:     {}", info.format.to_uppercase());
        println!("  Dimensions: {}x{}", info.width, info.height);
        println!("  Color:      {}", info.color_type);
        println!("  Alpha:      {}", if info.has_alpha { "yes" } else { "no" });
        println!("  Size:       {}", format_bytes(info.file_size));
    }
    Ok(())
}

fn list_formats(registry: &FormatRegistry, json: bool) -> Result<()> {
    if json {
        let value = json!({
            "formats": registry.descriptors(),
            "missing_dependencies": registry.missing_dependencies(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let mark = |ok: bool| {
        if ok {
            style("✓").green().to_string()
        } else {
            style("✗").red().to_string()
        }
    };

    println!(
        "{:<6} {:<22} {:<5} {:<5} {:<5} {}",
        "ID", "EXTENSIONS", "READ", "WRITE", "LOSSY", "REQUIRES"
    );
    for f in registry.descriptors() {
        let requires = match f.required_dependency {
            Some(dep) if f.dependency_available => format!("{} (found)", dep),
            Some(dep) => style(format!("{} (missing)", dep)).yellow().to_string(),
            None => "-".to_string(),
        };
        println!(
            "{:<6} {:<22} {:<5} {:<5} {:<5} {}",
            f.identifier,
            f.extensions.join(" "),
            mark(f.can_read()),
            mark(f.can_write()),
            if f.lossy { "yes" } else { "no" },
            requires
        );
    }

    for dependency in registry.missing_dependencies() {
        println!();
        println!("{} {}", style("hint").cyan().bold(), dependency.install_hint());
    }
    Ok(())
}

fn history(action: HistoryAction, paths: &Paths) -> Result<()> {
    let mut store = HistoryStore::open(&paths.history, DEFAULT_MAX_ITEMS);

    match action {
        HistoryAction::List { limit, json } => {
            let recent = store.recent(limit);
            if json {
                println!("{}", serde_json::to_string_pretty(recent)?);
                return Ok(());
            }
            if recent.is_empty() {
                println!("History is empty");
                return Ok(());
            }
            let offset = store.len() - recent.len();
            for (i, entry) in recent.iter().enumerate() {
                let status = if entry.success {
                    style("ok ").green()
                } else {
                    style("err").red()
                };
                println!(
                    "{:>3} {} {} {} → {} {} → {} ({:.1}%)",
                    offset + i,
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    status,
                    entry.input_filename,
                    if entry.output_filename.is_empty() {
                        "-"
                    } else {
                        &entry.output_filename
                    },
                    format_bytes(entry.original_size),
                    format_bytes(entry.compressed_size),
                    entry.compression_ratio
                );
                if !entry.success {
                    println!("      {}", style(&entry.message).dim());
                }
            }
        }
        HistoryAction::Stats { json } => {
            let stats = store.statistics();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", render_statistics(&stats));
            }
        }
        HistoryAction::Search { query } => {
            let hits = store.search(&query);
            println!("{} match(es) for {:?}", hits.len(), query);
            for entry in hits {
                println!(
                    "  {} {} → {} [{}] {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.input_filename,
                    entry.output_filename,
                    entry.format,
                    entry.message
                );
            }
        }
        HistoryAction::Export { path, export_as } => {
            match export_as.unwrap_or_else(|| ExportFormat::from_path(&path)) {
                ExportFormat::Csv => store.export_csv(&path),
                ExportFormat::Json => store.export_json(&path),
            }
            .with_context(|| format!("Failed to export history to {}", path.display()))?;
            println!("Exported {} entries to {}", store.len(), path.display());
        }
        HistoryAction::Remove { index } => {
            let removed = store.remove(index)?;
            store.save().context("Failed to save history")?;
            println!("Removed {}", removed.input_filename);
        }
        HistoryAction::Clear => {
            store.clear();
            store.save().context("Failed to save history")?;
            println!("History cleared");
        }
    }
    Ok(())
}

fn config(action: ConfigAction, paths: &Paths) -> Result<()> {
    let mut config = AppConfig::load(&paths.config);

    match action {
        ConfigAction::Show => {
            println!("# {}", paths.config.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        ConfigAction::SetQuality { quality } => config.set_quality(quality)?,
        ConfigAction::SetFormat { format } => config.set_preferred_format(&format)?,
        ConfigAction::SetTheme { theme } => config.theme = theme.parse::<Theme>()?,
        ConfigAction::SetMaxSize {
            width,
            height,
            stretch,
        } => {
            config.max_width = width;
            config.max_height = height;
            config.keep_aspect_ratio = !stretch;
        }
        ConfigAction::Reset => config = AppConfig::default(),
    }

    config.validate()?;
    config
        .save(&paths.config)
        .with_context(|| format!("Failed to save {}", paths.config.display()))?;
    println!("Saved {}", paths.config.display());
    Ok(())
}
