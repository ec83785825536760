// src/cli/handlers/compile.rs

use crate::{CancellationToken, cli::handlers::commons, models::ParsedResult};
use anyhow::Result;
use clap::Parser;
use colored::*;

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Walks a document, runs its commands and prints the template before rendering."
)]
struct CompileArgs {
    #[command(flatten)]
    doc: commons::DocumentArgs,

    /// Also print the compiled header.
    #[arg(long, short)]
    verbose: bool,
}

pub fn handle(args: Vec<String>, token: &CancellationToken) -> Result<()> {
    // 1. Parse this handler's specific arguments.
    let compile_args = CompileArgs::try_parse_from(&args)?;

    // 2. Load the document and walk it.
    let loaded = commons::load(&compile_args.doc, token)?;
    let result = commons::block_on(token, commons::walk(&loaded.session, &loaded.document))??;

    // 3. Print.
    if compile_args.verbose {
        print_summary(&result);
    }
    println!("{}", result.shire_output);
    commons::report(&result);
    Ok(())
}

fn print_summary(result: &ParsedResult) {
    println!("\n--- {} ---", "Compiled".yellow());
    match &result.config {
        Some(config) => {
            println!("  {:<15} {}", "name".blue(), config.name);
            if !config.description.is_empty() {
                println!("  {:<15} {}", "description".blue(), config.description);
            }
            println!("  {:<15} {:?}", "interaction".blue(), config.interaction);
            println!("  {:<15} {:?}", "location".blue(), config.action_location);
            if let Some(when) = &config.when {
                println!("  {:<15} {}", "when".blue(), when);
            }
            for (name, pipeline) in &config.variables {
                println!("  {:<15} {} = {}", "variable".blue(), name.cyan(), pipeline);
            }
        }
        None => println!("  {}", "(no header)".dimmed()),
    }
    if let Some(agent) = &result.execute_agent {
        println!("  {:<15} @{}", "agent".blue(), agent.name);
    }
    if let Some(next) = &result.next_job {
        println!("  {:<15} {}", "next job".blue(), next.name);
    }
    if result.is_local_command {
        println!("  {:<15} {}", "local".blue(), "yes".green());
    }
    println!("---------------------------------\n");
}
