use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use segdl::commands::{run_download, DownloadOptions};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL to download (http, https or ftp)
    #[arg(index = 1)]
    url: String,

    /// Directory to save the downloaded file
    #[arg(short = 'o', long = "output-dir", default_value = "downloads")]
    output_dir: PathBuf,

    /// Number of concurrent segments (defaults to number of logical CPUs)
    #[arg(short = 's', long)]
    segments: Option<usize>,

    /// Global rate limit in bytes per second (e.g., 1048576 for 1MB/s)
    #[arg(short = 'r', long)]
    rate_limit: Option<u32>,

    /// Username for HTTP Basic auth / FTP login
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Password for HTTP Basic auth / FTP login
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Re-download even if the destination file already exists
    #[arg(short = 'f', long)]
    force: bool,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = match args.verbose {
        0 => "segdl=info",
        1 => "segdl=debug",
        _ => "segdl=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut output_dir = args.output_dir;
    if output_dir.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            output_dir = cwd.join(output_dir);
        }
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_download(DownloadOptions {
        url: args.url,
        output_dir,
        segments: args.segments.unwrap_or_else(num_cpus::get),
        rate_limit: args.rate_limit,
        username: args.user,
        password: args.password,
        force: args.force,
    }))
}
