use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use slidetiler::config::Config;
use slidetiler::invoker::{ContainerSpec, Transport};
use slidetiler::log::Logger;
use slidetiler::resolver::InputSpec;
use slidetiler::{tlog, tlog_error, Result, RunSummary, TilingRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Local,
    Docker,
    Podman,
}

/// Slidetiler - tile whole-slide images with an external tool and zip the tiles
#[derive(Parser, Debug)]
#[command(name = "slidetiler")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    SLIDETILER_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Input image or zip bundle of images (repeatable)
    #[arg(long = "input", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Original name for the matching --input (repeatable, same order)
    #[arg(long = "original-name", alias = "original_name")]
    pub original_names: Vec<String>,

    /// Path of the zip archive receiving the tiles
    #[arg(long = "output-zip", alias = "output_zip")]
    pub output_zip: PathBuf,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// How to run the tiling tool
    #[arg(long, value_enum)]
    pub transport: Option<TransportKind>,

    /// Path to the local tiling script (local transport)
    #[arg(long = "pyhist-script")]
    pub pyhist_script: Option<PathBuf>,

    /// Interpreter for the local script (local transport)
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Container image reference (docker/podman transports)
    #[arg(long = "container-image")]
    pub container_image: Option<String>,

    /// Maximum number of parallel workers (defaults to CPU count)
    #[arg(long = "max-workers")]
    pub max_workers: Option<usize>,

    /// Per-image tool timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Log file (default: tile_processing.log)
    #[arg(long = "log-file")]
    pub log_file: Option<String>,

    /// Replace an existing archive instead of appending to it
    #[arg(long)]
    pub fresh: bool,

    /// Exit non-zero if any image failed
    #[arg(long)]
    pub strict: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the effective configuration (file plus flags) to this TOML file
    #[arg(long = "save-config")]
    pub save_config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,
}

impl Cli {
    /// Layer command-line flags over the file configuration.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(kind) = self.transport {
            config.transport = match kind {
                TransportKind::Local => match config.transport {
                    local @ Transport::Local { .. } => local,
                    _ => Transport::default(),
                },
                TransportKind::Docker => match config.transport {
                    Transport::Docker(spec) | Transport::Podman(spec) => Transport::Docker(spec),
                    _ => Transport::Docker(ContainerSpec::default()),
                },
                TransportKind::Podman => match config.transport {
                    Transport::Docker(spec) | Transport::Podman(spec) => Transport::Podman(spec),
                    _ => Transport::Podman(ContainerSpec::default()),
                },
            };
        }

        match &mut config.transport {
            Transport::Local {
                interpreter,
                script,
            } => {
                if let Some(path) = &self.pyhist_script {
                    *script = path.clone();
                }
                if let Some(bin) = &self.interpreter {
                    *interpreter = bin.clone();
                }
            }
            Transport::Docker(spec) | Transport::Podman(spec) => {
                if let Some(image) = &self.container_image {
                    spec.image = image.clone();
                }
            }
        }

        if self.max_workers.is_some() {
            config.max_workers = self.max_workers;
        }
        if self.timeout.is_some() {
            config.timeout_secs = self.timeout;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file.clone();
        }
        config.fresh_archive |= self.fresh;
        config.strict |= self.strict;
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let config = cli.apply(base);
    config.validate()?;
    if let Some(path) = &cli.save_config {
        config.save(path)?;
    }

    let logger = Logger::to_file(config.log_path(), Logger::level_for(cli.debug));
    let inputs = InputSpec::pair(cli.inputs.clone(), cli.original_names.clone())?;
    let strict = config.strict;
    let base_dir = std::env::current_dir()?;

    let rt = tokio::runtime::Runtime::new()?;
    let run = TilingRun::new(config, logger.clone(), base_dir);
    let result = rt.block_on(run.execute(inputs, &cli.output_zip));

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            tlog_error!(logger, "Run failed: {}", e);
            eprintln!("slidetiler: {}", e);
            std::process::exit(1);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if strict && summary.has_failures() {
        tlog!(logger, "Strict mode: {} image(s) failed", summary.failed);
        std::process::exit(2);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Archive:        {}", summary.archive.display());
    println!("Images:         {}", summary.tasks);
    println!("  succeeded:    {}", summary.succeeded);
    println!("  failed:       {}", summary.failed);
    println!("  no tiles:     {}", summary.without_tiles);
    println!("Skipped inputs: {}", summary.skipped_inputs);
    println!("Tiles written:  {}", summary.entries_written);
}
