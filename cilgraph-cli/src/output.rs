use std::io::{self, Write};

use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use crate::app::GlobalOptions;

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
pub fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(data)?;
        println!("{json}");
        Ok(())
    } else {
        display_fn(data)
    }
}

/// Column alignment for tabular output.
#[derive(Clone, Copy)]
pub enum Align {
    Left,
    Right,
}

/// Borderless, whitespace-aligned columns for summaries.
pub struct TabWriter {
    table: Table,
    indent: String,
}

impl TabWriter {
    /// One `(header, alignment)` pair per column.
    pub fn new(columns: &[(&str, Align)]) -> Self {
        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(columns.iter().map(|(name, _)| *name).collect::<Vec<_>>());

        // Two spaces between columns, none at the outer edges
        let last = columns.len().saturating_sub(1);
        for (index, (_, align)) in columns.iter().enumerate() {
            if let Some(column) = table.column_mut(index) {
                column.set_cell_alignment(match align {
                    Align::Left => CellAlignment::Left,
                    Align::Right => CellAlignment::Right,
                });
                column.set_padding((u16::from(index != 0), u16::from(index != last)));
            }
        }

        Self {
            table,
            indent: String::new(),
        }
    }

    pub fn indent(mut self, prefix: &str) -> Self {
        self.indent = prefix.to_string();
        self
    }

    pub fn row<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .add_row(values.into_iter().map(Into::into).collect::<Vec<String>>());
    }

    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        for line in self.table.to_string().lines() {
            writeln!(w, "{}{}", self.indent, line.trim_end())?;
        }
        Ok(())
    }
}
