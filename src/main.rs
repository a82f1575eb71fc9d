use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use verification_allocator::diagnostics::RunLog;
use verification_allocator::models::{Config, UploadConfig};
use verification_allocator::pipeline::{self, RunSummary};
use verification_allocator::upload::{CommandUploader, Uploader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = Command::new("verification-allocator")
        .version("1.0")
        .about("Filters a verification export and allocates the remaining appointments to agents")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("allocation.toml"),
        )
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("FILE")
                .help("Raw export to process (overrides input_file)"),
        )
        .arg(
            Arg::new("help-sheet")
                .long("help-sheet")
                .value_name("FILE")
                .help("Reference sheet with provider, visit type and insurance rules"),
        )
        .arg(
            Arg::new("escalation")
                .long("escalation")
                .value_name("FILE")
                .help("Escalation tracker export"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .help("Directory for the generated files"),
        )
        .arg(
            Arg::new("no-upload")
                .long("no-upload")
                .action(ArgAction::SetTrue)
                .help("Skip the configured upload step"),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("allocation.toml");

    // Load or create configuration
    let mut config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("failed to load {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!(
            "⚠️  Please edit {} and point input_file at your export, then run the program again.",
            config_file
        );
        return Ok(());
    };

    if let Some(input) = matches.get_one::<String>("input") {
        config.input_file = input.clone();
    }
    if let Some(help) = matches.get_one::<String>("help-sheet") {
        config.help_file = Some(help.clone());
    }
    if let Some(tracker) = matches.get_one::<String>("escalation") {
        config.escalation_file = Some(tracker.clone());
    }
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        config.output_directory = Some(dir.clone());
    }
    let upload = if matches.get_flag("no-upload") {
        None
    } else {
        config.upload.clone()
    };

    if let Err(e) = config.validate() {
        println!("❌ Error: {}", e);
        println!("   Please fix {} and run the program again", config_file);
        return Ok(());
    }

    println!("📂 Input: {}", config.input_file);
    match &config.help_file {
        Some(help) => println!("📖 Help sheet: {}", help),
        None => println!("📖 Help sheet: none (location, workable and insurance rules disabled)"),
    }
    match &config.escalation_file {
        Some(tracker) => println!("🚩 Escalation tracker: {}", tracker),
        None => println!("🚩 Escalation tracker: none"),
    }
    println!(
        "👥 Agents: {} ({} buckets per scope)",
        config.agents.len(),
        config.allocation.cycle_size
    );

    let mut log = RunLog::to_directory(Path::new(config.log_dir()))
        .with_context(|| format!("failed to open run log in {}", config.log_dir()))?;
    if let Some(path) = log.path() {
        println!("📝 Run log: {}", path.display());
    }

    let (result, mut log) = tokio::task::spawn_blocking(move || {
        let result = pipeline::run_from_files(&config, &mut log);
        (result, log)
    })
    .await
    .context("pipeline task panicked")?;

    let summary = result.context("pipeline run failed")?;
    print_summary(&summary, &log);

    if let Some(upload) = upload {
        run_upload(&upload, &summary, &mut log).await?;
    }

    println!("\n✅ Allocation complete!");
    Ok(())
}

async fn run_upload(config: &UploadConfig, summary: &RunSummary, log: &mut RunLog) -> Result<()> {
    println!("\n📤 Uploading {} via {}", summary.output_path.display(), config.command);
    let uploader = CommandUploader::from_config(config);
    let path = summary.output_path.clone();
    let outcome = tokio::task::spawn_blocking(move || uploader.upload(&path))
        .await
        .context("upload task panicked")?;

    match outcome {
        Ok(()) => {
            log.info("Upload finished");
            println!("   ✅ Upload finished");
        }
        Err(e) => {
            log.warn(format!("Processed but upload failed: {}", e));
            println!("   ❌ Processed but upload failed: {}", e);
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, log: &RunLog) {
    println!("\n📊 SUMMARY");
    println!("==========\n");

    for stage in log.stages() {
        println!("   {}", stage);
    }

    if !log.diagnostics().is_empty() {
        println!("\n⚠️  Warnings:");
        for diagnostic in log.diagnostics() {
            println!("   - {}", diagnostic);
        }
    }

    if !summary.scopes.is_empty() {
        println!("\n🗂️  Allocation scopes:");
        for scope in &summary.scopes {
            println!(
                "   {} {}: {} rows, buckets {:?}",
                scope.group,
                scope.location.as_deref().unwrap_or("(all locations)"),
                scope.total(),
                scope.bucket_sizes
            );
        }
    }

    println!("\n📈 Rows allocated: {}", summary.processed_count);
    println!("🗑️  Rows excluded: {}", summary.excluded_count);
    println!("📄 Output: {}", summary.output_path.display());
    println!("📄 Excluded rows: {}", summary.warnings_path.display());
    println!("📄 Allocation trace: {}", summary.debug_path.display());
}
