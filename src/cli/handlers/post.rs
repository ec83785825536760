// src/cli/handlers/post.rs

use crate::{
    CancellationToken,
    cli::handlers::commons,
    core::{
        post_processor::{self, PostContext},
        variables,
    },
};
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::io::Read;

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Applies a document's onStreamingEnd and afterStreaming handlers to generated text."
)]
struct PostArgs {
    #[command(flatten)]
    doc: commons::DocumentArgs,

    /// File holding the generated text; `-` reads stdin.
    #[arg(long, short, default_value = "-")]
    input: String,
}

pub fn handle(args: Vec<String>, token: &CancellationToken) -> Result<()> {
    // 1. Parse arguments and read the generated text.
    let post_args = PostArgs::try_parse_from(&args)?;
    let generated = read_input(&post_args.input)?;

    // 2. Load and walk the document to get its header and variables.
    let loaded = commons::load(&post_args.doc, token)?;
    let session = &loaded.session;

    // 3. Run the handlers.
    let output = commons::block_on(token, async {
        let result = commons::walk(session, &loaded.document).await?;
        let Some(config) = result.config else {
            println!("{}", "The document has no header; nothing to do.".yellow());
            return anyhow::Ok(generated);
        };
        let bindings = variables::resolve(session, Some(&config)).await;
        let mut ctx = PostContext::new(generated, bindings);

        if !config.on_streaming_end.is_empty() {
            post_processor::on_streaming_end(session, &config.on_streaming_end, &mut ctx)
                .await
                .context("onStreamingEnd failed")?;
        }
        if let Some(after) = &config.after_streaming {
            post_processor::after_streaming(session, after, &mut ctx)
                .await
                .context("afterStreaming failed")?;
        }
        Ok(ctx.gen_text)
    })??;

    println!("{}", output);
    Ok(())
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read generated text from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(source).with_context(|| format!("Failed to read '{}'", source))
}
