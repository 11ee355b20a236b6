mod app;
mod commands;
mod output;

use anyhow::Context;
use cilgraph::analysis::callgraph::CancellationToken;
use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cancellation = CancellationToken::new();
    let handler_token = cancellation.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            eprintln!("\nCancelled.");
            std::process::exit(130);
        }
        eprintln!("\nCancelling, press Ctrl+C again to abort.");
        handler_token.cancel();
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // Show cilgraph info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("cilgraph", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Disasm {
            path,
            method,
            strict,
            header,
            bytes,
        } => commands::disasm::run(
            path,
            method.as_deref(),
            commands::disasm::DisasmOptions {
                strict: *strict,
                header: *header,
                bytes: *bytes,
            },
            &cli.global,
        ),
        Command::Callgraph {
            path,
            r#type,
            method,
            depth,
            search_paths,
            strict,
            budget,
            no_continuations,
            leaves,
        } => commands::callgraph::run(
            path,
            r#type,
            method,
            &commands::callgraph::CallgraphOptions {
                depth: *depth,
                search_paths,
                strict: *strict,
                budget: *budget,
                continuations: !*no_continuations,
                leaves,
            },
            cancellation,
            &cli.global,
        ),
    }
}
