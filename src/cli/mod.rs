//! CLI module for framedex
//!
//! Command-line argument parsing and command execution.

use clap::{Args, Parser, Subcommand};

pub mod commands;

/// framedex - deterministic frame-indexed H.265 video I/O
///
/// Inspect, validate, and sample closed-GOP HEVC files used as
/// machine-vision frame stores.
#[derive(Parser)]
#[command(name = "framedex")]
#[command(about = "Deterministic frame-indexed H.265 video I/O")]
#[command(version)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print a file's frame-index attributes
    Info(InfoArgs),
    /// Validate a file against the random-access contract
    Verify(VerifyArgs),
    /// Read one frame and save it as a PNG
    Grab(GrabArgs),
    /// Re-encode any video into the compliant closed-GOP format
    Import(ImportArgs),
}

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: String,

    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the verify command
#[derive(Args)]
pub struct VerifyArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: String,
}

/// Arguments for the grab command
#[derive(Args)]
pub struct GrabArgs {
    /// Input video file
    #[arg(short, long)]
    pub input: String,

    /// 1-based frame index
    #[arg(short = 'n', long, default_value = "1")]
    pub index: u64,

    /// Output PNG path
    #[arg(short, long)]
    pub output: String,
}

/// Arguments for the import command
#[derive(Args)]
pub struct ImportArgs {
    /// Input video file (any demuxable format)
    #[arg(short, long)]
    pub input: String,

    /// Output MP4 path
    #[arg(short, long)]
    pub output: String,

    /// Keyframe interval of the output
    #[arg(long, default_value = "50")]
    pub gop_size: u32,

    /// Output quality, 0 (best) to 51
    #[arg(long, default_value = "18")]
    pub crf: u8,

    /// Output format (auto, gray, rgb)
    #[arg(long, default_value = "auto")]
    pub format: String,
}
