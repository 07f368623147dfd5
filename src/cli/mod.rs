use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::dedup::EmbeddingMode;

mod handlers;

pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate api docs in markdown format
    #[cfg(feature = "markdown-docs")]
    #[clap(hide = true)]
    MarkdownDocs {},

    /// Start urmind as a service.
    Daemon {
        /// Listen address, overrides `daemon.listen_addr`
        #[clap(long)]
        addr: Option<String>,
    },

    /// Decide whether a text batch should be summarized and stored
    Check {
        /// Tab the batch was extracted from
        #[clap(short, long)]
        tab: String,

        /// Page url the batch was extracted from
        #[clap(short, long)]
        url: String,

        /// Use this embedding mode instead of the stored preference
        #[clap(short, long)]
        mode: Option<EmbeddingMode>,

        /// Print how the verdict was reached
        #[clap(long, default_value = "false")]
        explain: bool,

        /// Read the batch from a file instead of stdin
        file: Option<PathBuf>,
    },

    /// Record processed content in the similarity index
    Store {
        /// Tab the content belongs to
        #[clap(short, long)]
        tab: String,

        /// Content id
        #[clap(short, long)]
        id: String,

        /// Extra metadata as key=value, may be repeated
        #[clap(long = "meta", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,

        /// Read the content from a file instead of stdin
        file: Option<PathBuf>,
    },

    /// Semantic search over stored content
    Search {
        query: String,

        #[clap(short, long, default_value = "10")]
        limit: usize,
    },

    /// Signature cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or change the embedding mode preference
    Mode {
        /// `online` or `offline`; prints the current mode when omitted
        mode: Option<EmbeddingMode>,
    },

    /// Print the signature and cache key of a batch
    Signature {
        /// Page url, to also print the cache key
        #[clap(short, long)]
        url: Option<String>,

        file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Number of cached signatures and their keys
    Stats {},

    /// Forget every cached signature
    Clear {},
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=value: empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
