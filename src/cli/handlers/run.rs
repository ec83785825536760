// src/cli/handlers/run.rs

use crate::{CancellationToken, cli::handlers::commons};
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Runs a document end to end and prints the final prompt."
)]
struct RunArgs {
    #[command(flatten)]
    doc: commons::DocumentArgs,

    /// Write the prompt of the last document in the chain to this file.
    #[arg(long, short)]
    output: Option<String>,
}

///
/// Main entry point for the 'run' command.
/// Follows `[flow]:` chains; every document's prompt is printed in order.
///
pub fn handle(args: Vec<String>, token: &CancellationToken) -> Result<()> {
    // 1. Parse this handler's specific arguments.
    let run_args = RunArgs::try_parse_from(&args)?;

    // 2. Load the document. The pipeline context only lives for this run.
    let loaded = commons::load(&run_args.doc, token)?;
    let context = loaded.session.context.clone();
    scopeguard::defer! {
        context.clear();
    }

    // 3. Walk, resolve and render the chain.
    let rendered = commons::block_on(token, commons::run_chain(&loaded.session, loaded.document))??;

    // 4. Print.
    let multiple = rendered.len() > 1;
    for doc in &rendered {
        if multiple {
            println!("\n--- {} ---", doc.name.cyan());
        }
        match &doc.prompt {
            Some(prompt) => println!("{}", prompt),
            None => println!(
                "{}",
                format!("'{}' skipped: its 'when' condition is false.", doc.name).yellow()
            ),
        }
        commons::report(&doc.result);
        if let Some(agent) = &doc.result.execute_agent {
            println!("{} @{}", "Hand off to agent".blue(), agent.name);
        }
    }

    if let Some(path) = run_args.output {
        let last = rendered
            .iter()
            .rev()
            .find_map(|doc| doc.prompt.as_deref())
            .unwrap_or_default();
        std::fs::write(&path, last).with_context(|| format!("Failed to write '{}'", path))?;
        println!("{} {}", "Prompt written to".green(), path);
    }
    Ok(())
}
