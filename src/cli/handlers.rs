use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::app::App;
use crate::dedup::{signature, EmbeddingMode, TabScope};

/// Read a text batch from `file`, or stdin when no file is given.
pub fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

pub fn handle_check(app: &App, tab: &str, url: &str, explain: bool, text: &str) -> Result<()> {
    let scope = TabScope::new(tab);

    if explain {
        let decision = app.explain(text, &scope, url);
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        let verdict = app.should_process_content(text, &scope, url);
        println!("{}", if verdict { "process" } else { "skip" });
    }
    Ok(())
}

pub fn handle_store(
    app: &App,
    tab: &str,
    id: &str,
    metadata: Vec<(String, String)>,
    text: &str,
) -> Result<()> {
    let metadata: HashMap<String, String> = metadata.into_iter().collect();
    app.store_content(id, &TabScope::new(tab), text, metadata)?;
    println!("stored {id}");
    Ok(())
}

pub fn handle_search(app: &App, query: &str, limit: usize) -> Result<()> {
    let results = app.search(query, limit)?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

pub fn handle_cache_stats(app: &App) -> Result<()> {
    let stats = app.cache_stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub fn handle_cache_clear(app: &App) -> Result<()> {
    let before = app.cache_stats()?.size;
    app.clear_cache()?;
    println!("{before} signatures removed");
    Ok(())
}

pub fn handle_mode(app: &App, mode: Option<EmbeddingMode>) -> Result<()> {
    if let Some(mode) = mode {
        app.set_embedding_mode(mode)?;
    }
    let prefs = app.preferences()?;
    if !prefs.valid {
        println!("stored preference is invalid, using {}", prefs.embedding_mode);
    } else {
        println!("{}", prefs.embedding_mode);
    }
    Ok(())
}

/// Needs no app: signatures are pure functions of the text.
pub fn handle_signature(text: &str, url: Option<&str>, prefix_chars: usize) -> Result<()> {
    let sig = signature::generate_signature_with(text, prefix_chars);
    println!("signature: {sig}");
    if let Some(url) = url {
        println!("key: {}", signature::cache_key(url, &sig));
    }
    Ok(())
}
