use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI for inspecting, dumping and verifying optical disc images.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Info(InfoCommand),
    Dump(DumpCommand),
    Verify(VerifyCommand),
}

/// Prints the disc type and a per-track table for an image.
#[derive(Parser, Debug, Clone)]
pub struct InfoCommand {
    /// Image file (.cue, .toc, .ccd or .chd)
    #[arg(value_name = "IMAGE")]
    pub input: PathBuf,
}

/// Streams raw 2448-byte disc frames for an LBA range into a file.
#[derive(Parser, Debug, Clone)]
pub struct DumpCommand {
    /// Image file (.cue, .toc, .ccd or .chd)
    #[arg(value_name = "IMAGE")]
    pub input: PathBuf,

    /// Output file for the raw frames
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// First LBA to dump
    #[arg(long, default_value_t = 0)]
    pub start: i32,

    /// Number of sectors to dump, up to the lead-out if omitted
    #[arg(long)]
    pub count: Option<i32>,
}

/// Walks every data sector, checking EDC and attempting L-EC repair.
#[derive(Parser, Debug, Clone)]
pub struct VerifyCommand {
    /// Image file (.cue, .toc, .ccd or .chd)
    #[arg(value_name = "IMAGE")]
    pub input: PathBuf,
}
