//! Cli things
//!

use std::path::PathBuf;

use clap::builder::TypedValueParser;
use clap::Parser;

pub const DEFAULT_DB_PATH: &str = "./data/notes.db";
pub const DEFAULT_UPLOADS_DIR: &str = "./uploads";
pub const DEFAULT_STATIC_DIR: &str = "./static";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;

/// Expand a leading `~` so paths from `.env` files behave like shell paths
pub fn expand_path(path: &std::path::Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
}

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct CliOpts {
    #[clap(
        long,
        help = "Path to the database file",
        env = "NOTEBOX_DB_PATH",
        default_value = DEFAULT_DB_PATH
    )]
    pub db_path: PathBuf,

    #[clap(
        long,
        help = "Directory uploaded files are stored in",
        env = "NOTEBOX_UPLOADS_DIR",
        default_value = DEFAULT_UPLOADS_DIR
    )]
    pub uploads_dir: PathBuf,

    #[clap(
        long,
        help = "Directory the frontend is served from",
        env = "NOTEBOX_STATIC_DIR",
        default_value = DEFAULT_STATIC_DIR
    )]
    pub static_dir: PathBuf,

    #[clap(long, help = "Address to listen on", env = "NOTEBOX_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[clap(long, help = "Port to listen on", env = "NOTEBOX_PORT", default_value_t = 8000)]
    pub port: u16,

    #[clap(
        long,
        help = "Maximum size of a single uploaded file, in MB",
        env = "NOTEBOX_MAX_UPLOAD_MB",
        default_value_t = DEFAULT_MAX_UPLOAD_MB,
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize)
    )]
    pub max_upload_mb: usize,

    #[clap(long, help = "Enable debug logging", env = "NOTEBOX_DEBUG")]
    pub debug: bool,
}

impl CliOpts {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
