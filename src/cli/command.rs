use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        "\nddvd ", env!("DDVD_VERSION"),
        "\ngit ", env!("VERGEN_GIT_DESCRIBE"),
        "\nbuilt ", env!("BUILD_TIMESTAMP"),
    ),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for inspecting and playing back DVD video object streams",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat device warnings as fatal errors.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// YAML player configuration; command-line flags take precedence.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play a VOB or sector dump through file-backed devices.
    Play(PlayArgs),

    /// Print stream information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct PlayArgs {
    /// Input VOB or raw sector dump.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Write the video elementary PES stream here.
    #[arg(long, value_name = "PATH")]
    pub video_out: Option<PathBuf>,

    /// Write the audio PES stream here.
    #[arg(long, value_name = "PATH")]
    pub audio_out: Option<PathBuf>,

    /// Dump every presented overlay frame as raw ARGB into this directory.
    #[arg(long, value_name = "DIR")]
    pub dump_overlay: Option<PathBuf>,

    /// Comma-separated remote-control keys, e.g. "ffwd,play,skip:+30".
    #[arg(long, value_name = "KEYS", value_delimiter = ',', conflicts_with = "interactive")]
    pub keys: Vec<String>,

    /// Delay between scripted keys.
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub key_interval: u64,

    /// Read keys line by line from stdin.
    #[arg(long)]
    pub interactive: bool,

    /// Pace video output to its timestamps instead of running flat out.
    #[arg(long)]
    pub realtime: bool,

    /// Load a resume position from this YAML file and store the exit position in it.
    #[arg(long, value_name = "FILE")]
    pub resume: Option<PathBuf>,

    /// Preferred two-letter language code.
    #[arg(long, value_name = "CODE")]
    pub language: Option<String>,

    #[arg(long, value_enum)]
    pub tv_aspect: Option<TvAspectArg>,

    #[arg(long, value_enum)]
    pub tv_mode: Option<TvModeArg>,

    #[arg(long, value_enum)]
    pub tv_system: Option<TvSystemArg>,

    /// Overlay bits per pixel.
    #[arg(long, value_enum)]
    pub color_depth: Option<ColorDepthArg>,

    /// Pass AC3 through to the audio device instead of re-encoding.
    #[arg(long)]
    pub ac3_passthrough: bool,

    /// PTS layout of the source.
    #[arg(long, value_enum)]
    pub pts_encoding: Option<PtsEncodingArg>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input VOB or raw sector dump (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Print the report as YAML.
    #[arg(long)]
    pub yaml: bool,

    /// List every decoded subpicture.
    #[arg(long)]
    pub list_spu: bool,

    /// PTS layout of the source.
    #[arg(long, value_enum)]
    pub pts_encoding: Option<PtsEncodingArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
pub enum TvAspectArg {
    #[value(name = "4:3")]
    #[serde(rename = "4:3")]
    Ratio4x3,
    #[value(name = "16:9")]
    #[serde(rename = "16:9")]
    Ratio16x9,
    #[value(name = "16:10")]
    #[serde(rename = "16:10")]
    Ratio16x10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TvModeArg {
    Letterbox,
    Panscan,
    Justscale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TvSystemArg {
    Pal,
    Ntsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorDepthArg {
    #[value(name = "8")]
    Indexed8,
    #[value(name = "32")]
    Argb32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtsEncodingArg {
    Standard,
    Legacy,
}
