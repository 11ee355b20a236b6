use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cilgraph - CIL disassembly, control flow and call graph exploration
#[derive(Debug, Parser)]
#[command(name = "cilgraph", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Disassemble method bodies with loop, branch, switch and region annotations.
    Disasm {
        /// Module manifest (.json) or raw method bytes (.il, .bin).
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Only methods matching Type::Name, or Name alone (manifests only).
        #[arg(long, value_name = "[TYPE::]NAME")]
        method: Option<String>,

        /// Stop at the first undecodable byte instead of skipping it.
        #[arg(long)]
        strict: bool,

        /// Treat a raw file as a complete method: header, code and exception sections.
        #[arg(long)]
        header: bool,

        /// Show instruction bytes alongside each instruction.
        #[arg(long)]
        bytes: bool,
    },

    /// Print the call tree rooted at a method, loading referenced modules on demand.
    Callgraph {
        /// Module manifest (.json) containing the root method.
        #[arg(value_name = "MANIFEST")]
        path: PathBuf,

        /// Fully qualified name of the root type.
        #[arg(long, value_name = "TYPE")]
        r#type: String,

        /// Name of the root method.
        #[arg(long, value_name = "NAME")]
        method: String,

        /// Maximum call depth below the root.
        #[arg(long, default_value_t = cilgraph::analysis::callgraph::DEFAULT_MAX_DEPTH)]
        depth: usize,

        /// Additional directories searched for referenced modules, in order.
        #[arg(long = "search-path", value_name = "DIR")]
        search_paths: Vec<PathBuf>,

        /// Decode method bodies strictly; undecodable bodies fail their node.
        #[arg(long)]
        strict: bool,

        /// Stop after resolving this many methods.
        #[arg(long, value_name = "N")]
        budget: Option<usize>,

        /// Do not follow async state machines into their MoveNext method.
        #[arg(long)]
        no_continuations: bool,

        /// Additional leaf namespace (prefix if it ends in '.', exact type otherwise).
        #[arg(long = "leaf", value_name = "NAMESPACE")]
        leaves: Vec<String>,
    },
}
