use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use mc_uploader::config::{self, UploadConfig};
use mc_uploader::uploader::{BulkUploader, McProject};

#[derive(Parser, Debug)]
#[command(version, about = "Upload a directory tree to a Materials Commons project")]
struct CliArgs {
    /// Directory to upload
    directory: PathBuf,

    /// Target project id
    #[arg(short, long)]
    project_id: String,

    /// Upload one file at a time without retries
    #[arg(long)]
    sequential: bool,

    /// Log every failed attempt
    #[arg(short, long)]
    verbose: bool,

    /// Skip files larger than this many megabytes
    #[arg(long)]
    size_limit: Option<u64>,

    /// Number of concurrent upload workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Retries per file in parallel mode
    #[arg(long)]
    retries: Option<u32>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

impl CliArgs {
    fn upload_config(&self, stored: &config::Config) -> UploadConfig {
        let mut upload = UploadConfig::from(stored);
        if self.sequential {
            upload.parallel = false;
        }
        if self.verbose {
            upload.verbose = true;
        }
        if let Some(limit) = self.size_limit {
            upload.size_limit_megabytes = limit;
        }
        if let Some(workers) = self.workers {
            upload.max_workers = workers;
        }
        if let Some(retries) = self.retries {
            upload.retry.max_retries = retries;
        }
        upload
    }
}

async fn run(args: CliArgs) -> anyhow::Result<bool> {
    let stored = config::load_config().context("Failed to load configuration")?;
    let upload_config = args.upload_config(&stored);

    let project = McProject::new(&stored.mcurl, &stored.apikey, &args.project_id, &args.directory)
        .context("Failed to set up project client")?;

    let uploader = BulkUploader::new(upload_config).context("Invalid upload settings")?;

    let cancel = uploader.cancellation_token();
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, cancelling upload...");
        cancel.cancel();
    })
    .context("Error setting Ctrl-C handler")?;

    let report = uploader
        .upload_directory(Arc::new(project), &args.directory)
        .await
        .with_context(|| format!("Upload of {} failed", args.directory.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for failure in &report.failed {
            println!("FAILED {}: {}", failure.file_path.display(), failure.error);
        }
        println!(
            "{} of {} files uploaded{}",
            report.uploaded.len(),
            report.total_files,
            if report.cancelled { " (cancelled)" } else { "" }
        );
    }

    Ok(report.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let default_level = config::load_config()
        .map(|c| c.log_level)
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    log::info!("Starting Materials Commons uploader");

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
