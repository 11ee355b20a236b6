//! CIL instruction representation, operand kinds, and opcode descriptors.
//!
//! This module defines the type system for decoded CIL instructions. An
//! [`crate::assembly::instruction::OpcodeDescriptor`] is the static, read-only description of an
//! opcode (mnemonic, operand kind, control flow behaviour). An
//! [`crate::assembly::instruction::Instruction`] is one decoded occurrence of such an opcode at
//! a given offset, together with its typed [`crate::assembly::instruction::Operand`].
//!
//! # Key Components
//!
//! - [`crate::assembly::instruction::OperandKind`] - Encoding class of an opcode's inline operand
//! - [`crate::assembly::instruction::Operand`] - Typed operand value
//! - [`crate::assembly::instruction::FlowType`] - Control flow behaviour of an opcode
//! - [`crate::assembly::instruction::BranchPredicate`] - Trigger condition of a conditional branch
//! - [`crate::assembly::instruction::Instruction`] - A decoded instruction
//!
//! # Usage Examples
//!
//! ```rust
//! use cilgraph::assembly::{OperandKind, FlowType, INSTRUCTIONS};
//!
//! let br_s = &INSTRUCTIONS[0x2B];
//! assert_eq!(br_s.name, "br.s");
//! assert_eq!(br_s.operand_kind, OperandKind::ShortBranchTarget);
//! assert_eq!(br_s.flow, FlowType::UnconditionalBranch);
//! assert_eq!(OperandKind::ShortBranchTarget.size(), Some(1));
//! ```

use std::fmt::{self, UpperHex};

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::metadata::token::Token;

/// Encoding class of an opcode's inline operand.
///
/// The kind fixes how many bytes follow the opcode and how they are interpreted.
/// Token kinds are all four bytes wide and are returned opaquely.
///
/// # Thread Safety
///
/// [`OperandKind`] is [`std::marker::Send`] and [`std::marker::Sync`] as it only contains unit variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum OperandKind {
    /// No operand present
    None,
    /// Signed 8-bit integer (`ldc.i4.s`, `unaligned.`, `no.`)
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer (`ldc.i4`)
    Int32,
    /// Signed 64-bit integer (`ldc.i8`)
    Int64,
    /// 32-bit floating point (`ldc.r4`)
    Float32,
    /// 64-bit floating point (`ldc.r8`)
    Float64,
    /// Signed 8-bit displacement relative to the next instruction
    ShortBranchTarget,
    /// Signed 32-bit displacement relative to the next instruction
    LongBranchTarget,
    /// Jump table: 4-byte count followed by `count` signed 32-bit displacements
    SwitchTable,
    /// Method reference (`call`, `callvirt`, `newobj`, `ldftn`, `jmp`)
    MethodToken,
    /// Field reference (`ldfld`, `stsfld`, ...)
    FieldToken,
    /// Type reference (`box`, `newarr`, `ldtoken`, ...)
    TypeToken,
    /// User string heap reference (`ldstr`)
    StringToken,
    /// Stand-alone signature (`calli`)
    SignatureToken,
    /// Unsigned 8-bit argument or local index
    VariableIndexShort,
    /// Unsigned 16-bit argument or local index
    VariableIndexLong,
}

impl OperandKind {
    /// Returns the size in bytes of this operand kind.
    ///
    /// Returns `None` for [`OperandKind::SwitchTable`], whose width is `4 + 4 * count` and can
    /// only be known after reading the leading count.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cilgraph::assembly::OperandKind;
    ///
    /// assert_eq!(OperandKind::None.size(), Some(0));
    /// assert_eq!(OperandKind::VariableIndexLong.size(), Some(2));
    /// assert_eq!(OperandKind::MethodToken.size(), Some(4));
    /// assert_eq!(OperandKind::Float64.size(), Some(8));
    /// assert_eq!(OperandKind::SwitchTable.size(), None);
    /// ```
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::Int8 | OperandKind::ShortBranchTarget | OperandKind::VariableIndexShort => {
                Some(1)
            }
            OperandKind::Int16 | OperandKind::VariableIndexLong => Some(2),
            OperandKind::Int32
            | OperandKind::Float32
            | OperandKind::LongBranchTarget
            | OperandKind::MethodToken
            | OperandKind::FieldToken
            | OperandKind::TypeToken
            | OperandKind::StringToken
            | OperandKind::SignatureToken => Some(4),
            OperandKind::Int64 | OperandKind::Float64 => Some(8),
            OperandKind::SwitchTable => None,
        }
    }

    /// Returns `true` for the metadata token kinds.
    #[must_use]
    pub const fn is_token(&self) -> bool {
        matches!(
            self,
            OperandKind::MethodToken
                | OperandKind::FieldToken
                | OperandKind::TypeToken
                | OperandKind::StringToken
                | OperandKind::SignatureToken
        )
    }

    /// Returns `true` for the relative displacement kinds, including switch tables.
    #[must_use]
    pub const fn is_branch_target(&self) -> bool {
        matches!(
            self,
            OperandKind::ShortBranchTarget
                | OperandKind::LongBranchTarget
                | OperandKind::SwitchTable
        )
    }
}

/// How an opcode affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Multi-way branch (switch statement)
    Switch,
    /// Call to another method; execution resumes at the next instruction
    Call,
    /// Returns from, or otherwise exits, the current method
    Return,
    /// Exception throwing (`throw`, `rethrow`)
    Throw,
    /// Leave protected region (try/catch/finally)
    Leave,
    /// End of a finally, fault or filter block
    EndFinally,
}

/// Trigger condition of a conditional branch.
///
/// Derived purely from the opcode. The unsigned / unordered comparison variants
/// (`bge.un`, `blt.un.s`, ...) share the predicate of their signed counterpart and
/// are marked through [`OpcodeDescriptor::unsigned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum BranchPredicate {
    /// `beq`: taken if the two operands are equal
    Equal,
    /// `bne.un`: taken if the two operands differ
    NotEqual,
    /// `blt`: taken if the first operand is less than the second
    LessThan,
    /// `ble`: taken if the first operand is less than or equal to the second
    LessOrEqual,
    /// `bgt`: taken if the first operand is greater than the second
    GreaterThan,
    /// `bge`: taken if the first operand is greater than or equal to the second
    GreaterOrEqual,
    /// `brtrue`: taken if the operand is non-zero / non-null
    Truthy,
    /// `brfalse`: taken if the operand is zero / null
    Falsy,
}

/// Static description of an opcode.
///
/// Descriptors live in the [`crate::assembly::INSTRUCTIONS`] and
/// [`crate::assembly::INSTRUCTIONS_FE`] tables, which are `const` data: built at compile time
/// and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeDescriptor {
    /// Mnemonic (e.g. `ldloc.s`); empty for unassigned byte values
    pub name: &'static str,
    /// Full opcode value: `0x00XX` for single-byte, `0xFEXX` for two-byte forms
    pub value: u16,
    /// How the inline operand is encoded
    pub operand_kind: OperandKind,
    /// Control flow behaviour
    pub flow: FlowType,
    /// Trigger condition for conditional branches
    pub predicate: Option<BranchPredicate>,
    /// `true` for the `.un` comparison branch variants
    pub unsigned: bool,
}

impl OpcodeDescriptor {
    /// Returns `true` if the opcode is encoded with the `0xFE` escape byte.
    #[must_use]
    pub const fn is_two_byte_form(&self) -> bool {
        self.value > 0xFF
    }

    /// Number of bytes the opcode itself occupies (1 or 2).
    #[must_use]
    pub const fn size(&self) -> usize {
        if self.is_two_byte_form() {
            2
        } else {
            1
        }
    }

    /// Returns `true` if this table slot names a real opcode.
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        !self.name.is_empty()
    }

    /// Returns `true` if the opcode never continues with the next instruction.
    ///
    /// Unconditional jumps, returns, throws, `leave` and `endfinally` / `endfilter` transfer
    /// control elsewhere. Conditional branches and switches do fall through.
    #[must_use]
    pub const fn ends_flow(&self) -> bool {
        matches!(
            self.flow,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::Leave
                | FlowType::EndFinally
        )
    }
}

/// Represents an immediate value type embedded in CIL instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Signed 16-bit immediate value
    Int16(i16),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:02X}"),
            Immediate::Int16(value) => write!(f, "{value:04X}"),
            Immediate::Int32(value) => write!(f, "{value:08X}"),
            Immediate::Int64(value) => write!(f, "{value:016X}"),
            Immediate::Float32(value) => write!(f, "{:08X}", value.to_bits()),
            Immediate::Float64(value) => write!(f, "{:016X}", value.to_bits()),
        }
    }
}

/// A relative branch displacement together with the absolute offset it points at.
///
/// `target` is computed as `offset_after_operand + relative` in 64-bit arithmetic and is not
/// range-checked here; [`crate::assembly::resolve_targets`] validates it against the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchOffset {
    /// Displacement as encoded in the instruction stream
    pub relative: i32,
    /// Absolute offset within the method body
    pub target: i64,
}

/// Typed operand of a decoded instruction.
///
/// # Examples
///
/// ```rust
/// use cilgraph::assembly::{Operand, Immediate};
/// use cilgraph::metadata::token::Token;
///
/// let immediate = Operand::Immediate(Immediate::Int32(42));
/// let local = Operand::Variable(3);
/// let method = Operand::Token(Token::new(0x0A000001));
/// assert_eq!(method.token(), Some(Token::new(0x0A000001)));
/// assert_eq!(local.token(), None);
/// # let _ = immediate;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Argument or local variable index
    Variable(u16),
    /// Branch target of `br`, `brtrue.s`, `leave`, ...
    Target(BranchOffset),
    /// Switch table entries, in table order
    Switch(Vec<BranchOffset>),
    /// Opaque metadata token
    Token(Token),
}

impl Operand {
    /// Returns the token if this operand is one.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self {
            Operand::Token(token) => Some(*token),
            _ => None,
        }
    }
}

/// A decoded CIL instruction.
///
/// Instructions reference their [`OpcodeDescriptor`] from the static tables. For any
/// well-formed stream `offset + size` equals the offset of the next instruction, and `size`
/// equals `opcode.size()` plus the operand width.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Absolute byte offset within the method body
    pub offset: usize,
    /// Total size of this instruction in bytes (opcode plus operand)
    pub size: usize,
    /// Static description of the opcode
    pub opcode: &'static OpcodeDescriptor,
    /// The operand data for this instruction
    pub operand: Operand,
}

impl Instruction {
    /// Mnemonic of the instruction (e.g. `call`, `br.s`).
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.opcode.name
    }

    /// Control flow behaviour of the instruction.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow
    }

    /// Offset of the instruction that follows this one in stream order.
    #[must_use]
    pub fn next_offset(&self) -> usize {
        self.offset + self.size
    }

    /// Width of the operand bytes.
    #[must_use]
    pub fn operand_size(&self) -> usize {
        self.size - self.opcode.size()
    }

    /// Check if this instruction is a branch instruction.
    ///
    /// Returns `true` for conditional branches, unconditional jumps, switches and `leave`.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.opcode.flow,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// Returns `true` if control can continue with the next instruction in stream order.
    #[must_use]
    pub fn has_fall_through(&self) -> bool {
        !self.opcode.ends_flow()
    }

    /// Returns the metadata token operand, if any.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.operand.token()
    }
}
