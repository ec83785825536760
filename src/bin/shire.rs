// src/bin/shire.rs

use shire::{
    CancellationToken,
    cli::{Cli, dispatcher, handlers::commons::Interrupted},
    system::executor::ExecutionError,
};
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Sets up logging, parses arguments, dispatches and handles errors in one place.
fn main() {
    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));
    env_logger::init();

    let cli = Cli::parse();
    log::debug!("CLI args parsed: {:?}", cli);

    if let Err(e) = dispatcher::dispatch(cli.args, &cancellation_token) {
        // Ctrl+C: exit quietly with the shell's interruption code.
        let interrupted = e.chain().any(|cause| {
            cause.downcast_ref::<Interrupted>().is_some()
                || matches!(
                    cause.downcast_ref::<ExecutionError>(),
                    Some(ExecutionError::Cancelled)
                )
        });
        if interrupted {
            std::process::exit(130);
        }

        // clap errors already carry their own formatting.
        if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
            clap_err.exit();
        }

        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
