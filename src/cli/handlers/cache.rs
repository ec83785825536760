// src/cli/handlers/cache.rs

use crate::{
    CancellationToken,
    cli::handlers::commons,
    core::cache,
    state,
};
use anyhow::Result;
use clap::Parser;
use colored::*;

// --- Command Argument Parsing ---

/// (Internal) Compiles documents and inspects the compiled-result cache.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, hide = true)]
struct CacheArgs {
    /// Documents to compile before listing the cache.
    #[arg(required = true)]
    documents: Vec<String>,

    /// Project root shared by all documents.
    #[arg(long)]
    root: Option<String>,

    /// Print each cached output in full.
    #[arg(long)]
    show: bool,
}

// --- Main Handler ---

pub fn handle(args: Vec<String>, token: &CancellationToken) -> Result<()> {
    let cache_args = CacheArgs::try_parse_from(&args)?;

    for document in &cache_args.documents {
        let doc_args = commons::DocumentArgs {
            document: document.clone(),
            root: cache_args.root.clone(),
            ..Default::default()
        };
        let loaded = commons::load(&doc_args, token)?;
        let result = commons::block_on(token, commons::walk(&loaded.session, &loaded.document))??;
        if commons::report(&result) {
            println!("{} '{}' had errors and was not cached", "Note:".yellow(), document);
        }
    }

    let names = state::compiled_names();
    println!("\n--- {} ({}) ---", "Compiled results".yellow(), names.len());
    for name in names {
        let Some(result) = state::compiled(&name) else {
            continue;
        };
        println!(
            "  {:<30} {}  vars: {:<3} local: {}",
            name.cyan(),
            cache::content_hash(result.shire_output.as_bytes()).dimmed(),
            result.variable_table.len(),
            result.is_local_command
        );
        if cache_args.show {
            println!("{}\n", result.shire_output);
        }
    }
    Ok(())
}
