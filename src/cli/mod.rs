// src/cli/mod.rs

use clap::Parser;

pub mod dispatcher;
pub mod handlers;

const HELP_TEMPLATE: &str = "\
<title>shire</title> {version}
Runs prompt documents: front-matter config, pattern pipelines, conditions and commands.

<group>USAGE</group>
  <cmd>shire</cmd> <hl><action></hl> <document.shire> [options]
  <cmd>shire</cmd> <document.shire> [options]   <dim>same as `run`</dim>

<group>ACTIONS</group>
  <cmd>run</cmd>       Walk, resolve and render a document, following [flow]: chains
  <cmd>compile</cmd>   Print the template produced by the walk, before rendering
  <cmd>vars</cmd>      List referenced variables and their resolved values
  <cmd>post</cmd>      Apply onStreamingEnd and afterStreaming to generated text

<group>COMMON OPTIONS</group>
  --root <dir>        Project root <dim>(default: nearest .shire/ or .git)</dim>
  --file <path>       The file open in the editor
  --selection <text>  The selected text

Run <cmd>shire</cmd> <hl><action> --help</hl> for the options of one action.
";

/// Builds the help text, turning the template's tags into ANSI styles
/// (or stripping them when color is off).
fn build_help_string() -> &'static str {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();
    let styles: [(&str, &str); 5] = [
        ("title", "\x1b[1;33m"), // bold yellow
        ("hl", "\x1b[1;36m"),    // bold cyan
        ("cmd", "\x1b[36m"),     // cyan
        ("group", "\x1b[1;32m"), // bold green
        ("dim", "\x1b[2m"),
    ];

    let mut help = HELP_TEMPLATE.to_string();
    for (tag, code) in styles {
        let (open, close) = if use_colors { (code, "\x1b[0m") } else { ("", "") };
        help = help
            .replace(&format!("<{}>", tag), open)
            .replace(&format!("</{}>", tag), close);
    }
    Box::leak(help.into_boxed_str())
}

/// shire: a script engine for prompt documents.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// Everything after `shire`; the dispatcher splits off the action.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
