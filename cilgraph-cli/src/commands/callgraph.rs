use std::{
    collections::BTreeMap,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use cilgraph::{
    analysis::callgraph::{
        CallGraphWalker, CallNode, CancellationToken, NodeStatus, Traversal, WalkOptions,
    },
    assembly::DecodeMode,
    metadata::{
        introspection::ModuleLocator,
        manifest::{ManifestIntrospector, SearchPaths},
    },
};
use log::{debug, info};

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

/// Walker settings taken from the command line.
pub struct CallgraphOptions<'a> {
    pub depth: usize,
    pub search_paths: &'a [PathBuf],
    pub strict: bool,
    pub budget: Option<usize>,
    pub continuations: bool,
    pub leaves: &'a [String],
}

impl CallgraphOptions<'_> {
    fn walk_options(&self) -> WalkOptions {
        let mut options = WalkOptions::default()
            .max_depth(self.depth)
            .expand_continuations(self.continuations);
        for leaf in self.leaves {
            options = options.leaf_namespace(leaf.as_str());
        }
        if self.strict {
            options = options.decode_mode(DecodeMode::Strict);
        }
        if let Some(budget) = self.budget {
            options = options.step_budget(budget);
        }
        options
    }
}

pub fn run(
    path: &Path,
    type_name: &str,
    method: &str,
    opts: &CallgraphOptions<'_>,
    cancellation: CancellationToken,
    global: &GlobalOptions,
) -> anyhow::Result<()> {
    let mut search_paths = SearchPaths::for_module(path);
    for dir in opts.search_paths {
        search_paths.push(dir.clone());
    }

    let service = ManifestIntrospector::new().with_search_paths(&search_paths);
    for source in service.source_descriptions() {
        debug!("Module source: {source}");
    }

    let walker =
        CallGraphWalker::new(&service, opts.walk_options()).with_cancellation(cancellation);
    let traversal = walker.walk(
        &ModuleLocator::Path(path.to_path_buf()),
        type_name,
        method,
    );
    info!(
        "Analyzed {} methods across {} modules",
        traversal.analyzed,
        traversal.modules_loaded.len()
    );

    print_output(&traversal, global, |traversal| {
        let stdout = io::stdout();
        let mut w = BufWriter::new(stdout.lock());
        print_tree(&mut w, traversal)?;
        print_summary(&mut w, traversal)?;
        w.flush()?;
        Ok(())
    })
}

/// Print the call tree with box-drawing glyphs, one node per line.
fn print_tree(w: &mut dyn Write, traversal: &Traversal) -> io::Result<()> {
    writeln!(w, "{}", node_line(&traversal.root))?;
    print_children(w, &traversal.root, "")
}

fn print_children(w: &mut dyn Write, node: &CallNode, prefix: &str) -> io::Result<()> {
    let count = node.children.len();
    for (index, child) in node.children.iter().enumerate() {
        let last = index + 1 == count;
        let (branch, continuation) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        writeln!(w, "{prefix}{branch}{}", node_line(child))?;
        print_children(w, child, &format!("{prefix}{continuation}"))?;
    }
    Ok(())
}

fn node_line(node: &CallNode) -> String {
    let mut line = node.label.clone();
    if node.via_continuation {
        line.push_str(" (async)");
    }

    match &node.status {
        NodeStatus::Expanded => {
            if let Some(summary) = &node.summary {
                line.push_str(&format!(
                    "  [{} bytes, {} instr",
                    summary.body_size, summary.instructions
                ));
                for (count, what) in [
                    (summary.loops, "loop"),
                    (summary.conditionals, "branch"),
                    (summary.switches, "switch"),
                ] {
                    if count > 0 {
                        let plural = if count == 1 { "" } else { "s" };
                        line.push_str(&format!(", {count} {what}{plural}"));
                    }
                }
                if summary.diagnostics > 0 {
                    line.push_str(&format!(", {} warnings", summary.diagnostics));
                }
                line.push(']');
            }
        }
        NodeStatus::Failed(failure) => line.push_str(&format!("  [failed: {failure}]")),
        other => line.push_str(&format!("  [{}]", status_name(other))),
    }
    line
}

fn status_name(status: &NodeStatus) -> &'static str {
    match status {
        NodeStatus::Expanded => "expanded",
        NodeStatus::AlreadyAnalyzed => "already analyzed",
        NodeStatus::DepthExceeded => "depth limit",
        NodeStatus::SystemLeaf => "system",
        NodeStatus::Indirect => "indirect",
        NodeStatus::NoBody => "no body",
        NodeStatus::Failed(_) => "failed",
        NodeStatus::Cancelled => "cancelled",
        NodeStatus::BudgetExhausted => "budget exhausted",
    }
}

/// Print the lazy-loading summary and a per-status node count.
fn print_summary(w: &mut dyn Write, traversal: &Traversal) -> io::Result<()> {
    writeln!(w)?;
    writeln!(
        w,
        "Modules loaded: {}",
        if traversal.modules_loaded.is_empty() {
            "none".to_string()
        } else {
            traversal.modules_loaded.join(", ")
        }
    )?;
    writeln!(w, "Methods analyzed: {}", traversal.analyzed)?;
    if traversal.truncated {
        writeln!(w, "Traversal truncated, see node statuses below")?;
    }
    writeln!(w)?;

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for node in traversal.nodes() {
        *counts.entry(status_name(&node.status)).or_default() += 1;
    }

    let mut tw = TabWriter::new(&[("Status", Align::Left), ("Nodes", Align::Right)]).indent("  ");
    for (status, count) in counts {
        tw.row([status.to_string(), count.to_string()]);
    }
    tw.write_to(w)
}
