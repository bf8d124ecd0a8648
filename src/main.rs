use std::path::Path;

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod eid;
mod images;
mod lock;
mod recognition;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use app::{import::ImportReport, EntryView, RecognitionService};
use config::Config;
use lock::FileLock;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_photo(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runtime for commands that extract embeddings. Extraction runs on the
/// blocking pool under the configured timeout, as in the daemon.
fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

async fn import(
    service: &RecognitionService,
    group: &str,
    dir: &Path,
) -> anyhow::Result<ImportReport> {
    let items = app::import::plan(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?;

    let progress = ProgressBar::new(items.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut report = ImportReport::default();
    for item in items {
        progress.set_message(item.identity.clone());

        let result = match read_photo(&item.path) {
            Ok(raw) => service
                .register(group, &item.identity, raw)
                .await
                .map_err(anyhow::Error::from),
            Err(err) => Err(err),
        };

        match result {
            Ok(_) => report.imported += 1,
            Err(err) => {
                progress.println(format!("{}: {err:#}", item.path.display()));
                report
                    .failed
                    .push((item.path.display().to_string(), format!("{err:#}")));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(report)
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = cli::Args::parse();

    let config = Config::load()?;
    let base_path = config.base_path().to_path_buf();

    match args.command {
        cli::Command::Daemon { listen } => {
            let _lock = FileLock::try_acquire(&base_path)?;
            let listen = listen.unwrap_or_else(|| config.listen.clone());
            let service = RecognitionService::open(config)?;
            web::start_daemon(service, listen)
        }

        cli::Command::Group { action } => match action {
            cli::GroupArgs::Create { name, owner } => {
                let _lock = FileLock::try_acquire(&base_path)?;
                let service = RecognitionService::open(config)?;
                print_json(&service.create_group(&name, &owner)?)
            }
            cli::GroupArgs::List {} => {
                let service = RecognitionService::open(config)?;
                print_json(&service.groups())
            }
        },

        cli::Command::Add {
            group,
            identity,
            photos,
        } => {
            let _lock = FileLock::try_acquire(&base_path)?;
            let service = RecognitionService::open(config)?;

            let added = runtime()?.block_on(async {
                let mut added = Vec::with_capacity(photos.len());
                for path in photos {
                    let raw = read_photo(&path)?;
                    let entry = service
                        .register(&group, &identity, raw)
                        .await
                        .with_context(|| format!("failed to add {}", path.display()))?;
                    added.push(EntryView::from(&*entry));
                }
                anyhow::Ok(added)
            })?;
            print_json(&added)
        }

        cli::Command::Import { group, dir } => {
            let _lock = FileLock::try_acquire(&base_path)?;
            let service = RecognitionService::open(config)?;

            let report = runtime()?.block_on(import(&service, &group, &dir))?;
            eprintln!(
                "{} photos imported, {} failed",
                report.imported,
                report.failed.len()
            );
            print_json(&report)
        }

        cli::Command::Identify {
            group,
            top_n,
            min_score,
            photo,
        } => {
            let service = RecognitionService::open(config)?;
            let raw = read_photo(&photo)?;
            let options = service.match_options(top_n, min_score);

            let matches = runtime()?.block_on(service.identify(&group, raw, options))?;
            if matches.is_empty() {
                eprintln!("no matches found");
            }
            print_json(&matches)
        }

        cli::Command::List { group } => {
            let service = RecognitionService::open(config)?;
            let entries: Vec<EntryView> = service
                .entries(&group)?
                .iter()
                .map(|entry| EntryView::from(&**entry))
                .collect();
            print_json(&entries)
        }

        cli::Command::Remove {
            group,
            identity,
            slot,
            yes,
        } => {
            let _lock = FileLock::try_acquire(&base_path)?;
            let service = RecognitionService::open(config)?;

            if !yes {
                match inquire::prompt_confirmation(format!(
                    "Remove photo #{slot} of '{identity}' from '{group}'?"
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            let removed = service.remove(&group, &identity, slot)?;
            print_json(&EntryView::from(&*removed))
        }

        cli::Command::Embed { photo } => {
            let service = RecognitionService::open(config)?;
            let raw = read_photo(&photo)?;
            let embedding = runtime()?.block_on(service.embed(raw))?;
            print_json(&embedding)
        }
    }
}
