use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use governor::{Quota, RateLimiter};
use indicatif::{HumanBytes, MultiProgress, ProgressDrawTarget};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tracing::{info, warn};
use url::Url;

use crate::planner::plan_ranges;
use crate::progress::TransferProgress;
use crate::transfer::{self, Credentials, SharedRateLimiter, TransferUnit};
use crate::utils::{get_filename_from_url, sanitize_filename};

pub struct DownloadOptions {
    pub url: String,
    pub output_dir: PathBuf,
    pub segments: usize,
    pub rate_limit: Option<u32>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub force: bool,
}

/// Probe the resource, plan one range per segment, run the transfer units
/// concurrently, and report the outcome.
///
/// Three terminal outcomes exist per unit and they are reported distinctly:
/// complete (no remaining bytes), stopped early (no error, remaining bytes
/// nonzero), and failed. An error in one unit stops its siblings; the units
/// themselves never coordinate.
pub async fn run_download(opts: DownloadOptions) -> Result<()> {
    let url = Url::parse(&opts.url).context("invalid URL")?;
    let credentials = match (opts.username, opts.password) {
        (Some(username), password) => Some(Credentials {
            username,
            password: password.unwrap_or_default(),
        }),
        _ => Credentials::from_url(&url),
    };

    if !opts.output_dir.exists() {
        fs::create_dir_all(&opts.output_dir)
            .await
            .context("Failed to create output directory")?;
    }

    let filename = sanitize_filename(&get_filename_from_url(&url));
    let filepath = opts.output_dir.join(&filename);

    if filepath.exists() && !opts.force {
        let metadata = fs::metadata(&filepath).await?;
        let created: DateTime<Local> = metadata.created()?.into();
        println!(
            "{:>12} {:>17} Skipped {}",
            format!("{}", HumanBytes(metadata.len())),
            created.format("%Y-%m-%d %H:%M"),
            filename
        );
        return Ok(());
    }

    let total_size = transfer::probe_size(&url, credentials.as_ref())
        .await
        .context("Failed to determine download size")?;
    let ranges = plan_ranges(total_size, opts.segments.max(1));
    info!(
        total_size,
        segments = ranges.len(),
        "planned segmented download"
    );

    // The transfer units only position-write their own regions; sizing the
    // destination up front is the caller's job.
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&filepath)
        .await
        .context("Failed to create destination file")?;
    file.set_len(total_size)
        .await
        .context("Failed to allocate destination file")?;
    drop(file);

    let multi_progress = MultiProgress::new();
    multi_progress.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
    let progress = Arc::new(TransferProgress::new(&multi_progress, total_size, &filename));

    let rate_limiter: Option<SharedRateLimiter> = opts
        .rate_limit
        .and_then(NonZeroU32::new)
        .map(|limit| Arc::new(RateLimiter::direct(Quota::per_second(limit))));

    let mut units: Vec<Arc<dyn TransferUnit>> = Vec::with_capacity(ranges.len());
    for (index, range) in ranges.iter().enumerate() {
        let unit = transfer::unit_for_url(
            url.clone(),
            *range,
            index,
            progress.clone(),
            credentials.clone(),
            filepath.clone(),
            rate_limiter.clone(),
        )?;
        units.push(Arc::from(unit));
    }

    // Ctrl-c propagates a cooperative stop to every unit; each observes it
    // at its next chunk boundary.
    let signal_units = units.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping all transfer units");
            for unit in &signal_units {
                unit.request_stop();
            }
        }
    });

    let mut handles = Vec::with_capacity(units.len());
    for unit in &units {
        let unit = unit.clone();
        handles.push(tokio::spawn(async move { unit.download().await }));
    }

    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Stop the siblings on the first failure, then keep joining.
                if first_error.is_none() {
                    for unit in &units {
                        unit.request_stop();
                    }
                    first_error = Some(e);
                }
            }
            Err(e) => bail!("transfer task panicked: {}", e),
        }
    }

    if let Some(e) = first_error {
        progress.finish_failed(&filename);
        return Err(e).context(format!("Failed to download {}", filename));
    }

    let remaining: u64 = units.iter().map(|u| u.remaining_bytes()).sum();
    if remaining > 0 {
        progress.finish_stopped(&filename);
        info!(remaining, "download stopped before completion");
    } else {
        progress.finish_complete(&filename);
        info!(bytes = progress.bytes_written(), "download complete");
    }

    Ok(())
}
