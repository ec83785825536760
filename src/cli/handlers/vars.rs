// src/cli/handlers/vars.rs

use crate::{CancellationToken, cli::handlers::commons, core::variables};
use anyhow::Result;
use clap::Parser;
use colored::*;

const PREVIEW_WIDTH: usize = 60;

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Lists the variables a document references, with their resolved values."
)]
struct VarsArgs {
    #[command(flatten)]
    doc: commons::DocumentArgs,

    /// Also list the builtin editor and system variables.
    #[arg(long)]
    builtins: bool,
}

pub fn handle(args: Vec<String>, token: &CancellationToken) -> Result<()> {
    let vars_args = VarsArgs::try_parse_from(&args)?;
    let loaded = commons::load(&vars_args.doc, token)?;
    let session = &loaded.session;

    let (result, bindings) = commons::block_on(token, async {
        let result = commons::walk(session, &loaded.document).await?;
        let bindings = variables::resolve(session, result.config.as_ref()).await;
        anyhow::Ok((result, bindings))
    })??;

    println!("\n--- {} '{}' ---", "Variables of".yellow(), loaded.document.name.cyan());
    if result.variable_table.is_empty() {
        println!("  {}", "(none referenced)".dimmed());
    }
    for (name, info) in result.variable_table.iter() {
        let value = bindings
            .get(name)
            .map(|v| preview(v))
            .unwrap_or_else(|| "<unbound>".dimmed().to_string());
        println!(
            "  {:<20} {:<8} line {:<5} {}",
            name.cyan(),
            format!("{:?}", info.var_type),
            info.line_declared + 1,
            value
        );
    }

    if vars_args.builtins {
        println!("\n--- {} ---", "Builtins".yellow());
        for (name, about) in variables::EDITOR_VARIABLES
            .iter()
            .chain(variables::SYSTEM_VARIABLES.iter())
        {
            println!("  {:<20} {}", name.cyan(), about.dimmed());
        }
    }
    println!("---------------------------------");
    commons::report(&result);
    Ok(())
}

/// First line of a value, cut to the preview width.
fn preview(value: &str) -> String {
    let first = value.lines().next().unwrap_or("");
    let mut out: String = first.chars().take(PREVIEW_WIDTH).collect();
    if first.chars().count() > PREVIEW_WIDTH || value.lines().nth(1).is_some() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_cuts_long_and_multiline_values() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("a\nb"), "a...");
        assert_eq!(preview(&"x".repeat(70)), format!("{}...", "x".repeat(60)));
    }
}
