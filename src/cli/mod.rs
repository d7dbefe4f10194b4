//! Command-line front end for slixtools
//!
//! - `validate`: Check a file against the size and format rules
//! - `pages`: Expand a page reference list
//! - `image`: Resize, compress or convert an image
//! - `gif`: Build an animated GIF from still images
//! - `pdf`: Inspect, split, reorder, rotate or merge PDFs
//! - `completions`: Generate shell completions

pub mod completions;
pub mod convert;
pub mod inspect;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand, ValueEnum};
use slixtools::infrastructure::{Config, init_logging};
use slixtools::tasks::ImageFormat;
use slixtools::validation::FileKind;
use std::path::PathBuf;

/// CLI arguments for slixtools
#[derive(Parser, Debug)]
#[command(name = "slixtools")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the config file; RUST_LOG overrides both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for produced files (overrides the config file)
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a file against size and format rules
    Validate {
        /// File to check
        file: PathBuf,
        /// Rule set to apply
        #[arg(short, long, value_enum, default_value_t = KindArg::General)]
        kind: KindArg,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Expand a page reference list such as "1-3,5"
    Pages {
        /// Page references
        selection: String,
        /// Pages in the document
        #[arg(short = 'n', long)]
        count: u32,
        /// Treat the list as a full page order
        #[arg(long)]
        order: bool,
    },

    /// Image operations
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },

    /// Build an animated GIF from still images
    Gif {
        /// Images, one per frame, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Frames per second
        #[arg(long, default_value_t = 10)]
        fps: u32,
        /// Output width
        #[arg(long)]
        width: Option<u32>,
        /// Output height
        #[arg(long)]
        height: Option<u32>,
        /// Encoder speed, 1 (best) to 30 (fastest)
        #[arg(short, long, default_value_t = 10)]
        quality: u8,
        /// Play this many times instead of looping forever
        #[arg(long)]
        loops: Option<u16>,
    },

    /// PDF operations
    Pdf {
        #[command(subcommand)]
        action: PdfAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ImageAction {
    /// Resize into a box
    Resize {
        /// Input image
        file: PathBuf,
        /// Target width
        #[arg(long)]
        width: u32,
        /// Target height
        #[arg(long)]
        height: u32,
        /// Stretch to the exact size instead of keeping the aspect ratio
        #[arg(long)]
        exact: bool,
        #[command(flatten)]
        encoding: EncodingArgs,
    },

    /// Re-encode at a lower quality
    Compress {
        /// Input image
        file: PathBuf,
        /// Quality 1-100
        #[arg(short, long, default_value_t = 80)]
        quality: u8,
        /// Output format
        #[arg(short, long)]
        format: Option<ImageFormat>,
    },

    /// Change the image format
    Convert {
        /// Input image
        file: PathBuf,
        /// Target format
        #[arg(short, long)]
        format: ImageFormat,
        /// Quality 1-100, for lossy formats
        #[arg(short, long)]
        quality: Option<u8>,
    },
}

/// Output encoding shared by image commands
#[derive(ClapArgs, Debug, Clone, Copy)]
struct EncodingArgs {
    /// Output format (defaults to the input format)
    #[arg(short, long)]
    format: Option<ImageFormat>,
    /// Quality 1-100
    #[arg(short, long)]
    quality: Option<u8>,
}

#[derive(Subcommand, Debug)]
enum PdfAction {
    /// Print page count and metadata
    Info {
        /// Input document
        file: PathBuf,
    },

    /// Keep the selected pages
    Extract {
        /// Input document
        file: PathBuf,
        /// Pages to keep, e.g. "1-3,5"
        #[arg(short, long)]
        pages: String,
    },

    /// Remove the selected pages
    Delete {
        /// Input document
        file: PathBuf,
        /// Pages to remove
        #[arg(short, long)]
        pages: String,
    },

    /// Put pages in a new order
    Reorder {
        /// Input document
        file: PathBuf,
        /// Every page exactly once, e.g. "3,1,2"
        #[arg(long)]
        order: String,
    },

    /// Rotate the selected pages
    Rotate {
        /// Input document
        file: PathBuf,
        /// Pages to rotate (all when empty)
        #[arg(short, long, default_value = "")]
        pages: String,
        /// Clockwise degrees, a multiple of 90
        #[arg(short, long, default_value_t = 90, allow_negative_numbers = true)]
        degrees: i64,
    },

    /// Concatenate documents
    Merge {
        /// Documents in output order
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Image,
    Video,
    Pdf,
    General,
}

impl From<KindArg> for FileKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Image => FileKind::Image,
            KindArg::Video => FileKind::Video,
            KindArg::Pdf => FileKind::Pdf,
            KindArg::General => FileKind::General,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(level) = &args.log_level {
        config.log_level.clone_from(level);
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir.clone_from(dir);
    }
    Ok(config)
}

/// Parse and execute CLI arguments
pub fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.log_level);

    match args.command {
        Command::Validate { file, kind, json } => {
            inspect::validate_file(&file, &config.validation_options(kind.into()), json)?;
        }
        Command::Pages {
            selection,
            count,
            order,
        } => {
            println!("{}", inspect::expand_pages(&selection, count, order)?);
        }
        Command::Image { action } => {
            let job = match action {
                ImageAction::Resize {
                    file,
                    width,
                    height,
                    exact,
                    encoding,
                } => convert::Job::Resize {
                    file,
                    width,
                    height,
                    exact,
                    format: encoding.format,
                    quality: encoding.quality,
                },
                ImageAction::Compress {
                    file,
                    quality,
                    format,
                } => convert::Job::Compress {
                    file,
                    quality,
                    format,
                },
                ImageAction::Convert {
                    file,
                    format,
                    quality,
                } => convert::Job::Convert {
                    file,
                    format,
                    quality,
                },
            };
            convert::run_job(&config, job)?;
        }
        Command::Gif {
            files,
            fps,
            width,
            height,
            quality,
            loops,
        } => {
            convert::run_job(
                &config,
                convert::Job::Gif {
                    files,
                    fps,
                    width,
                    height,
                    quality,
                    loops,
                },
            )?;
        }
        Command::Pdf { action } => {
            let job = match action {
                PdfAction::Info { file } => {
                    println!("{}", inspect::pdf_info(&file)?);
                    return Ok(());
                }
                PdfAction::Extract { file, pages } => convert::Job::Extract { file, pages },
                PdfAction::Delete { file, pages } => convert::Job::Delete { file, pages },
                PdfAction::Reorder { file, order } => convert::Job::Reorder { file, order },
                PdfAction::Rotate {
                    file,
                    pages,
                    degrees,
                } => convert::Job::Rotate {
                    file,
                    pages,
                    degrees,
                },
                PdfAction::Merge { files } => convert::Job::Merge { files },
            };
            convert::run_job(&config, job)?;
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
        }
    }

    Ok(())
}
