use std::io::{self, Write};

use cilgraph::{
    analysis::{
        cfg::{BranchClass, BranchCondition, MethodAnalysis},
        regions::ProtectedRegion,
    },
    assembly::{encode_instruction, Immediate, Instruction, Operand},
    metadata::token::Token,
};
use serde::Serialize;

use crate::commands::common::region_keyword;

/// Display options for disassembly output.
pub struct DisasmOptions {
    pub strict: bool,
    pub header: bool,
    pub bytes: bool,
}

/// One method, ready for printing or JSON output.
#[derive(Debug, Serialize)]
pub struct Listing {
    pub name: String,
    pub token: Option<String>,
    pub has_body: bool,
    pub body_size: usize,
    pub loops: usize,
    pub conditionals: usize,
    pub switches: usize,
    pub regions: Vec<RegionLine>,
    pub instructions: Vec<InstructionLine>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegionLine {
    pub kind: &'static str,
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstructionLine {
    pub offset: usize,
    pub bytes: String,
    pub mnemonic: &'static str,
    pub operand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Enclosing regions, innermost first
    pub regions: Vec<&'static str>,
}

impl Listing {
    /// A method without IL body (abstract, extern, runtime provided).
    pub fn bodiless(name: String, token: Option<Token>) -> Self {
        Listing {
            name,
            token: token.map(|t| format!("0x{:08X}", t.value())),
            has_body: false,
            body_size: 0,
            loops: 0,
            conditionals: 0,
            switches: 0,
            regions: Vec::new(),
            instructions: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Build the listing of an analyzed body. `resolve` names method tokens where possible.
    pub fn from_analysis(
        name: String,
        token: Option<Token>,
        analysis: &MethodAnalysis,
        resolve: &dyn Fn(Token) -> Option<String>,
    ) -> Self {
        let instructions = analysis
            .instructions()
            .iter()
            .map(|instruction| InstructionLine {
                offset: instruction.offset,
                bytes: instruction_bytes(instruction),
                mnemonic: instruction.mnemonic(),
                operand: format_operand(instruction, resolve),
                branch: analysis
                    .branch_at(instruction.offset)
                    .map(describe_branch),
                regions: analysis
                    .regions_at(instruction.offset)
                    .iter()
                    .map(|region| region_keyword(region.kind))
                    .collect(),
            })
            .collect();

        Listing {
            body_size: analysis.body.body_len,
            loops: analysis.loop_count(),
            conditionals: analysis.conditional_count(),
            switches: analysis.switch_count(),
            regions: analysis
                .regions
                .regions()
                .iter()
                .map(|region| region_line(region, resolve))
                .collect(),
            instructions,
            diagnostics: analysis.diagnostics.iter().map(ToString::to_string).collect(),
            has_body: true,
            ..Listing::bodiless(name, token)
        }
    }
}

/// Writes listings in an ildasm-like text format.
pub struct CilFormatter {
    pub opts: DisasmOptions,
}

impl CilFormatter {
    pub fn new(opts: DisasmOptions) -> Self {
        Self { opts }
    }

    /// Write a complete method: header comment, regions, instructions, diagnostics.
    pub fn format_listing(&self, w: &mut dyn Write, listing: &Listing) -> io::Result<()> {
        write!(w, ".method {}", listing.name)?;
        if let Some(token) = &listing.token {
            write!(w, " /* {token} */")?;
        }
        writeln!(w)?;
        writeln!(w, "{{")?;

        if !listing.has_body {
            writeln!(w, "  // no body")?;
            writeln!(w, "}}")?;
            writeln!(w)?;
            return Ok(());
        }

        writeln!(
            w,
            "  // {} bytes, {} loops, {} conditionals, {} switches",
            listing.body_size, listing.loops, listing.conditionals, listing.switches
        )?;
        Self::format_regions(w, &listing.regions)?;

        for line in &listing.instructions {
            self.format_instruction(w, line)?;
        }

        for diagnostic in &listing.diagnostics {
            writeln!(w, "  // warning: {diagnostic}")?;
        }

        writeln!(w, "}} // end of method {}", listing.name)?;
        writeln!(w)?;
        Ok(())
    }

    fn format_regions(w: &mut dyn Write, regions: &[RegionLine]) -> io::Result<()> {
        for region in regions {
            write!(
                w,
                "  // .{} IL_{:04x} to IL_{:04x}",
                region.kind, region.start, region.end
            )?;
            if let Some(filter) = region.filter_start {
                write!(w, " filter IL_{filter:04x}")?;
            }
            if let Some(catch_type) = &region.catch_type {
                write!(w, " catch {catch_type}")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    /// Write a single instruction line.
    fn format_instruction(&self, w: &mut dyn Write, line: &InstructionLine) -> io::Result<()> {
        if self.opts.bytes {
            write!(w, "  /* {:<24} */", line.bytes)?;
        }

        write!(w, "  IL_{:04x}: {:<12}", line.offset, line.mnemonic)?;
        if !line.operand.is_empty() {
            write!(w, " {}", line.operand)?;
        }

        let mut notes = Vec::new();
        if let Some(branch) = &line.branch {
            notes.push(branch.clone());
        }
        if !line.regions.is_empty() {
            notes.push(format!("in {}", line.regions.join(" < ")));
        }
        if !notes.is_empty() {
            write!(w, "  // {}", notes.join("; "))?;
        }

        writeln!(w)?;
        Ok(())
    }
}

fn region_line(
    region: &ProtectedRegion,
    resolve: &dyn Fn(Token) -> Option<String>,
) -> RegionLine {
    RegionLine {
        kind: region_keyword(region.kind),
        start: region.start,
        end: region.end,
        filter_start: region.filter.as_ref().map(|filter| filter.start),
        catch_type: region
            .catch_type
            .map(|token| resolve(token).unwrap_or_else(|| format!("0x{:08X}", token.value()))),
    }
}

fn describe_branch(class: &BranchClass) -> String {
    match class {
        BranchClass::Loop { target, condition } => {
            format!("loop back to IL_{target:04x}{}", describe_condition(condition))
        }
        BranchClass::Conditional { target, condition } => {
            format!("forward to IL_{target:04x}{}", describe_condition(condition))
        }
        BranchClass::Switch { targets } => format!("switch, {} cases", targets.len()),
    }
}

fn describe_condition(condition: &BranchCondition) -> String {
    match condition {
        BranchCondition::Always => String::new(),
        BranchCondition::When {
            predicate,
            unsigned,
        } => {
            let name: &'static str = (*predicate).into();
            if *unsigned {
                format!(" if {name} (unsigned)")
            } else {
                format!(" if {name}")
            }
        }
    }
}

/// Format operand for display.
fn format_operand(
    instruction: &Instruction,
    resolve: &dyn Fn(Token) -> Option<String>,
) -> String {
    match &instruction.operand {
        Operand::None => String::new(),
        Operand::Immediate(imm) => format_immediate(imm),
        Operand::Variable(index) => format!("{index}"),
        Operand::Target(branch) => format_target(branch.target),
        Operand::Switch(entries) => {
            let labels: Vec<String> = entries
                .iter()
                .map(|entry| format_target(entry.target))
                .collect();
            format!("({})", labels.join(", "))
        }
        Operand::Token(token) => match resolve(*token) {
            Some(name) => format!("{name} /* 0x{:08X} */", token.value()),
            None => format!("(0x{:08X})", token.value()),
        },
    }
}

fn format_target(target: i64) -> String {
    if target < 0 {
        format!("IL_-{:04x}", target.unsigned_abs())
    } else {
        format!("IL_{target:04x}")
    }
}

fn format_immediate(imm: &Immediate) -> String {
    match imm {
        Immediate::Int8(v) => format!("{v}"),
        Immediate::Int16(v) => format!("{v}"),
        Immediate::Int32(v) => format!("{v}"),
        Immediate::Int64(v) => format!("{v}"),
        Immediate::Float32(v) => format!("{v}"),
        Immediate::Float64(v) => format!("{v}"),
    }
}

/// Hex bytes of an instruction, re-encoded from the decoded form.
fn instruction_bytes(instruction: &Instruction) -> String {
    let mut bytes = Vec::with_capacity(instruction.size);
    if encode_instruction(instruction, &mut bytes).is_err() {
        return "??".to_string();
    }
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
