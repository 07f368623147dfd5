use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod cli;
mod config;
mod dedup;
mod lock;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use app::{AppFactory, AppPaths};
use cli::{CacheAction, Command};
use config::Config;
use lock::FileLock;

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    let paths = AppFactory::get_paths()?;

    match args.command {
        #[cfg(feature = "markdown-docs")]
        Command::MarkdownDocs {} => {
            clap_markdown::print_help_markdown::<cli::Args>();
            Ok(())
        }

        Command::Daemon { addr } => {
            let lock = FileLock::try_acquire(&paths.base_path)?;
            let app = AppFactory::create_app(&paths, None)?;
            let addr = addr.unwrap_or_else(|| app.config().daemon.listen_addr.clone());
            web::start_daemon(app, addr, lock)
        }

        Command::Signature { url, file } => {
            let config = Config::load_with(&paths.base_path)?;
            let text = cli::read_input(file.as_deref())?;
            cli::handle_signature(&text, url.as_deref(), config.dedup.signature_prefix_chars)
        }

        Command::Check {
            tab,
            url,
            mode,
            explain,
            file,
        } => {
            let text = cli::read_input(file.as_deref())?;
            let (app, _lock) = open_app(&paths, mode)?;
            cli::handle_check(&app, &tab, &url, explain, &text)
        }

        Command::Store {
            tab,
            id,
            metadata,
            file,
        } => {
            let text = cli::read_input(file.as_deref())?;
            let (app, _lock) = open_app(&paths, None)?;
            cli::handle_store(&app, &tab, &id, metadata, &text)
        }

        Command::Search { query, limit } => {
            let (app, _lock) = open_app(&paths, None)?;
            cli::handle_search(&app, &query, limit)
        }

        Command::Cache { action } => {
            let (app, _lock) = open_app(&paths, None)?;
            match action {
                CacheAction::Stats {} => cli::handle_cache_stats(&app),
                CacheAction::Clear {} => cli::handle_cache_clear(&app),
            }
        }

        Command::Mode { mode } => {
            let (app, _lock) = open_app(&paths, None)?;
            cli::handle_mode(&app, mode)
        }
    }
}

/// One-shot commands hold the base directory lock while they run.
fn open_app(
    paths: &AppPaths,
    mode: Option<dedup::EmbeddingMode>,
) -> anyhow::Result<(app::App, FileLock)> {
    let lock = FileLock::try_acquire(&paths.base_path)?;
    let app = AppFactory::create_app(paths, mode)?;
    Ok((app, lock))
}
