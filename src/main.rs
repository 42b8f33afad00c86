//! Main entry point for the archive-api binary.
//!
//! `serve` runs the HTTP service; `inspect` and `build` run the same archive
//! operations against local files.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt};

use archive_api::archive::{self, AllowList, BuildOptions, InputFile, policy};
use archive_api::cli::{BuildArgs, Command, InspectArgs};
use archive_api::{Cli, MemoryReader, ZipExtractor, server};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment and flags still apply
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Serve(args) => server::serve(args.into_config()?).await,
        Command::Inspect(args) => inspect_file(args).await,
        Command::Build(args) => build_file(args).await,
    }
}

/// Compact console logging on stderr, filtered by `RUST_LOG`.
fn init_tracing() {
    let console_fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(Format::default().compact().with_target(false));
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archive_api=info,tower_http=info".into()),
        )
        .with(console_fmt)
        .init();
}

/// Print the JSON summary of a local archive, optionally checking every member.
async fn inspect_file(args: InspectArgs) -> Result<()> {
    let raw = Bytes::from(
        tokio::fs::read(&args.file)
            .await
            .with_context(|| format!("Cannot read {}", args.file.display()))?,
    );
    let name = base_name(&args.file);

    let summary = archive::inspect(raw.clone(), &name).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if args.verify {
        let extractor = ZipExtractor::new(Arc::new(MemoryReader::new(raw)));
        let checked = extractor.verify().await?;
        eprintln!("Verified {} members", checked);
    }

    Ok(())
}

/// Bundle local files, declaring each file's type from its extension.
async fn build_file(args: BuildArgs) -> Result<()> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let name = base_name(path);
        let declared_type = policy::type_for_extension(&name).unwrap_or_default();
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        files.push(InputFile::new(name, declared_type, content));
    }

    let options = BuildOptions {
        compression: args.compression.into(),
        ..BuildOptions::default()
    };
    let zip = tokio::task::spawn_blocking(move || {
        archive::build(&files, &AllowList::archive_build(), &options)
    })
    .await??;

    tokio::fs::write(&args.output, &zip)
        .await
        .with_context(|| format!("Cannot write {}", args.output.display()))?;
    eprintln!("Wrote {} ({} bytes)", args.output.display(), zip.len());
    Ok(())
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
