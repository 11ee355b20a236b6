//! Static opcode tables for the single-byte and `0xFE`-escaped CIL opcode spaces.
//!
//! Both tables are indexed by the (second) opcode byte. Unassigned byte values hold an
//! undefined descriptor with an empty name; the decoder reports those as unknown opcodes.
//! The tables are built by `const fn`, so they are fixed at compile time and shared freely
//! between threads.
//!
//! Opcode values follow ECMA-335 Partition III.

use crate::assembly::instruction::{BranchPredicate, FlowType, OpcodeDescriptor, OperandKind};

use BranchPredicate::{
    Equal, Falsy, GreaterOrEqual, GreaterThan, LessOrEqual, LessThan, NotEqual, Truthy,
};
use OperandKind::{
    FieldToken, Float32, Float64, Int32, Int64, Int8, LongBranchTarget, MethodToken,
    ShortBranchTarget, SignatureToken, StringToken, SwitchTable, TypeToken, VariableIndexLong,
    VariableIndexShort,
};

/// Escape byte selecting the two-byte opcode table.
pub const FE_PREFIX: u8 = 0xFE;

const UNDEFINED: OpcodeDescriptor = OpcodeDescriptor {
    name: "",
    value: 0,
    operand_kind: OperandKind::None,
    flow: FlowType::Sequential,
    predicate: None,
    unsigned: false,
};

const fn op(
    name: &'static str,
    value: u16,
    operand_kind: OperandKind,
    flow: FlowType,
) -> OpcodeDescriptor {
    OpcodeDescriptor {
        name,
        value,
        operand_kind,
        flow,
        predicate: None,
        unsigned: false,
    }
}

const fn plain(name: &'static str, value: u16) -> OpcodeDescriptor {
    op(name, value, OperandKind::None, FlowType::Sequential)
}

const fn with(name: &'static str, value: u16, operand_kind: OperandKind) -> OpcodeDescriptor {
    op(name, value, operand_kind, FlowType::Sequential)
}

const fn cond(
    name: &'static str,
    value: u16,
    operand_kind: OperandKind,
    predicate: BranchPredicate,
    unsigned: bool,
) -> OpcodeDescriptor {
    OpcodeDescriptor {
        name,
        value,
        operand_kind,
        flow: FlowType::ConditionalBranch,
        predicate: Some(predicate),
        unsigned,
    }
}

/// Descriptors of all single-byte opcodes, indexed by opcode byte.
pub static INSTRUCTIONS: [OpcodeDescriptor; 256] = single_byte_table();

/// Descriptors of all `0xFE`-prefixed opcodes, indexed by the second byte.
pub static INSTRUCTIONS_FE: [OpcodeDescriptor; 32] = extended_table();

/// Looks up a single-byte opcode. Returns `None` for unassigned bytes and for the `0xFE` escape.
#[must_use]
pub fn lookup(byte: u8) -> Option<&'static OpcodeDescriptor> {
    let descriptor = &INSTRUCTIONS[byte as usize];
    descriptor.is_defined().then_some(descriptor)
}

/// Looks up the opcode following a `0xFE` escape.
#[must_use]
pub fn lookup_extended(byte: u8) -> Option<&'static OpcodeDescriptor> {
    INSTRUCTIONS_FE
        .get(byte as usize)
        .filter(|descriptor| descriptor.is_defined())
}

/// Finds a descriptor by mnemonic in either table.
#[must_use]
pub fn find_by_name(name: &str) -> Option<&'static OpcodeDescriptor> {
    INSTRUCTIONS
        .iter()
        .chain(INSTRUCTIONS_FE.iter())
        .find(|descriptor| descriptor.is_defined() && descriptor.name == name)
}

#[allow(clippy::too_many_lines)]
const fn single_byte_table() -> [OpcodeDescriptor; 256] {
    use FlowType::{Call, EndFinally, Leave, Return, Switch, Throw, UnconditionalBranch};

    let mut t = [UNDEFINED; 256];

    t[0x00] = plain("nop", 0x00);
    t[0x01] = plain("break", 0x01);
    t[0x02] = plain("ldarg.0", 0x02);
    t[0x03] = plain("ldarg.1", 0x03);
    t[0x04] = plain("ldarg.2", 0x04);
    t[0x05] = plain("ldarg.3", 0x05);
    t[0x06] = plain("ldloc.0", 0x06);
    t[0x07] = plain("ldloc.1", 0x07);
    t[0x08] = plain("ldloc.2", 0x08);
    t[0x09] = plain("ldloc.3", 0x09);
    t[0x0A] = plain("stloc.0", 0x0A);
    t[0x0B] = plain("stloc.1", 0x0B);
    t[0x0C] = plain("stloc.2", 0x0C);
    t[0x0D] = plain("stloc.3", 0x0D);
    t[0x0E] = with("ldarg.s", 0x0E, VariableIndexShort);
    t[0x0F] = with("ldarga.s", 0x0F, VariableIndexShort);
    t[0x10] = with("starg.s", 0x10, VariableIndexShort);
    t[0x11] = with("ldloc.s", 0x11, VariableIndexShort);
    t[0x12] = with("ldloca.s", 0x12, VariableIndexShort);
    t[0x13] = with("stloc.s", 0x13, VariableIndexShort);
    t[0x14] = plain("ldnull", 0x14);
    t[0x15] = plain("ldc.i4.m1", 0x15);
    t[0x16] = plain("ldc.i4.0", 0x16);
    t[0x17] = plain("ldc.i4.1", 0x17);
    t[0x18] = plain("ldc.i4.2", 0x18);
    t[0x19] = plain("ldc.i4.3", 0x19);
    t[0x1A] = plain("ldc.i4.4", 0x1A);
    t[0x1B] = plain("ldc.i4.5", 0x1B);
    t[0x1C] = plain("ldc.i4.6", 0x1C);
    t[0x1D] = plain("ldc.i4.7", 0x1D);
    t[0x1E] = plain("ldc.i4.8", 0x1E);
    t[0x1F] = with("ldc.i4.s", 0x1F, Int8);
    t[0x20] = with("ldc.i4", 0x20, Int32);
    t[0x21] = with("ldc.i8", 0x21, Int64);
    t[0x22] = with("ldc.r4", 0x22, Float32);
    t[0x23] = with("ldc.r8", 0x23, Float64);
    t[0x25] = plain("dup", 0x25);
    t[0x26] = plain("pop", 0x26);
    // jmp leaves the current method for good
    t[0x27] = op("jmp", 0x27, MethodToken, Return);
    t[0x28] = op("call", 0x28, MethodToken, Call);
    t[0x29] = op("calli", 0x29, SignatureToken, Call);
    t[0x2A] = op("ret", 0x2A, OperandKind::None, Return);

    t[0x2B] = op("br.s", 0x2B, ShortBranchTarget, UnconditionalBranch);
    t[0x2C] = cond("brfalse.s", 0x2C, ShortBranchTarget, Falsy, false);
    t[0x2D] = cond("brtrue.s", 0x2D, ShortBranchTarget, Truthy, false);
    t[0x2E] = cond("beq.s", 0x2E, ShortBranchTarget, Equal, false);
    t[0x2F] = cond("bge.s", 0x2F, ShortBranchTarget, GreaterOrEqual, false);
    t[0x30] = cond("bgt.s", 0x30, ShortBranchTarget, GreaterThan, false);
    t[0x31] = cond("ble.s", 0x31, ShortBranchTarget, LessOrEqual, false);
    t[0x32] = cond("blt.s", 0x32, ShortBranchTarget, LessThan, false);
    t[0x33] = cond("bne.un.s", 0x33, ShortBranchTarget, NotEqual, true);
    t[0x34] = cond("bge.un.s", 0x34, ShortBranchTarget, GreaterOrEqual, true);
    t[0x35] = cond("bgt.un.s", 0x35, ShortBranchTarget, GreaterThan, true);
    t[0x36] = cond("ble.un.s", 0x36, ShortBranchTarget, LessOrEqual, true);
    t[0x37] = cond("blt.un.s", 0x37, ShortBranchTarget, LessThan, true);
    t[0x38] = op("br", 0x38, LongBranchTarget, UnconditionalBranch);
    t[0x39] = cond("brfalse", 0x39, LongBranchTarget, Falsy, false);
    t[0x3A] = cond("brtrue", 0x3A, LongBranchTarget, Truthy, false);
    t[0x3B] = cond("beq", 0x3B, LongBranchTarget, Equal, false);
    t[0x3C] = cond("bge", 0x3C, LongBranchTarget, GreaterOrEqual, false);
    t[0x3D] = cond("bgt", 0x3D, LongBranchTarget, GreaterThan, false);
    t[0x3E] = cond("ble", 0x3E, LongBranchTarget, LessOrEqual, false);
    t[0x3F] = cond("blt", 0x3F, LongBranchTarget, LessThan, false);
    t[0x40] = cond("bne.un", 0x40, LongBranchTarget, NotEqual, true);
    t[0x41] = cond("bge.un", 0x41, LongBranchTarget, GreaterOrEqual, true);
    t[0x42] = cond("bgt.un", 0x42, LongBranchTarget, GreaterThan, true);
    t[0x43] = cond("ble.un", 0x43, LongBranchTarget, LessOrEqual, true);
    t[0x44] = cond("blt.un", 0x44, LongBranchTarget, LessThan, true);
    t[0x45] = op("switch", 0x45, SwitchTable, Switch);

    t[0x46] = plain("ldind.i1", 0x46);
    t[0x47] = plain("ldind.u1", 0x47);
    t[0x48] = plain("ldind.i2", 0x48);
    t[0x49] = plain("ldind.u2", 0x49);
    t[0x4A] = plain("ldind.i4", 0x4A);
    t[0x4B] = plain("ldind.u4", 0x4B);
    t[0x4C] = plain("ldind.i8", 0x4C);
    t[0x4D] = plain("ldind.i", 0x4D);
    t[0x4E] = plain("ldind.r4", 0x4E);
    t[0x4F] = plain("ldind.r8", 0x4F);
    t[0x50] = plain("ldind.ref", 0x50);
    t[0x51] = plain("stind.ref", 0x51);
    t[0x52] = plain("stind.i1", 0x52);
    t[0x53] = plain("stind.i2", 0x53);
    t[0x54] = plain("stind.i4", 0x54);
    t[0x55] = plain("stind.i8", 0x55);
    t[0x56] = plain("stind.r4", 0x56);
    t[0x57] = plain("stind.r8", 0x57);

    t[0x58] = plain("add", 0x58);
    t[0x59] = plain("sub", 0x59);
    t[0x5A] = plain("mul", 0x5A);
    t[0x5B] = plain("div", 0x5B);
    t[0x5C] = plain("div.un", 0x5C);
    t[0x5D] = plain("rem", 0x5D);
    t[0x5E] = plain("rem.un", 0x5E);
    t[0x5F] = plain("and", 0x5F);
    t[0x60] = plain("or", 0x60);
    t[0x61] = plain("xor", 0x61);
    t[0x62] = plain("shl", 0x62);
    t[0x63] = plain("shr", 0x63);
    t[0x64] = plain("shr.un", 0x64);
    t[0x65] = plain("neg", 0x65);
    t[0x66] = plain("not", 0x66);
    t[0x67] = plain("conv.i1", 0x67);
    t[0x68] = plain("conv.i2", 0x68);
    t[0x69] = plain("conv.i4", 0x69);
    t[0x6A] = plain("conv.i8", 0x6A);
    t[0x6B] = plain("conv.r4", 0x6B);
    t[0x6C] = plain("conv.r8", 0x6C);
    t[0x6D] = plain("conv.u4", 0x6D);
    t[0x6E] = plain("conv.u8", 0x6E);

    t[0x6F] = op("callvirt", 0x6F, MethodToken, Call);
    t[0x70] = with("cpobj", 0x70, TypeToken);
    t[0x71] = with("ldobj", 0x71, TypeToken);
    t[0x72] = with("ldstr", 0x72, StringToken);
    t[0x73] = op("newobj", 0x73, MethodToken, Call);
    t[0x74] = with("castclass", 0x74, TypeToken);
    t[0x75] = with("isinst", 0x75, TypeToken);
    t[0x76] = plain("conv.r.un", 0x76);
    t[0x79] = with("unbox", 0x79, TypeToken);
    t[0x7A] = op("throw", 0x7A, OperandKind::None, Throw);
    t[0x7B] = with("ldfld", 0x7B, FieldToken);
    t[0x7C] = with("ldflda", 0x7C, FieldToken);
    t[0x7D] = with("stfld", 0x7D, FieldToken);
    t[0x7E] = with("ldsfld", 0x7E, FieldToken);
    t[0x7F] = with("ldsflda", 0x7F, FieldToken);
    t[0x80] = with("stsfld", 0x80, FieldToken);
    t[0x81] = with("stobj", 0x81, TypeToken);

    t[0x82] = plain("conv.ovf.i1.un", 0x82);
    t[0x83] = plain("conv.ovf.i2.un", 0x83);
    t[0x84] = plain("conv.ovf.i4.un", 0x84);
    t[0x85] = plain("conv.ovf.i8.un", 0x85);
    t[0x86] = plain("conv.ovf.u1.un", 0x86);
    t[0x87] = plain("conv.ovf.u2.un", 0x87);
    t[0x88] = plain("conv.ovf.u4.un", 0x88);
    t[0x89] = plain("conv.ovf.u8.un", 0x89);
    t[0x8A] = plain("conv.ovf.i.un", 0x8A);
    t[0x8B] = plain("conv.ovf.u.un", 0x8B);
    t[0x8C] = with("box", 0x8C, TypeToken);
    t[0x8D] = with("newarr", 0x8D, TypeToken);
    t[0x8E] = plain("ldlen", 0x8E);
    t[0x8F] = with("ldelema", 0x8F, TypeToken);

    t[0x90] = plain("ldelem.i1", 0x90);
    t[0x91] = plain("ldelem.u1", 0x91);
    t[0x92] = plain("ldelem.i2", 0x92);
    t[0x93] = plain("ldelem.u2", 0x93);
    t[0x94] = plain("ldelem.i4", 0x94);
    t[0x95] = plain("ldelem.u4", 0x95);
    t[0x96] = plain("ldelem.i8", 0x96);
    t[0x97] = plain("ldelem.i", 0x97);
    t[0x98] = plain("ldelem.r4", 0x98);
    t[0x99] = plain("ldelem.r8", 0x99);
    t[0x9A] = plain("ldelem.ref", 0x9A);
    t[0x9B] = plain("stelem.i", 0x9B);
    t[0x9C] = plain("stelem.i1", 0x9C);
    t[0x9D] = plain("stelem.i2", 0x9D);
    t[0x9E] = plain("stelem.i4", 0x9E);
    t[0x9F] = plain("stelem.i8", 0x9F);
    t[0xA0] = plain("stelem.r4", 0xA0);
    t[0xA1] = plain("stelem.r8", 0xA1);
    t[0xA2] = plain("stelem.ref", 0xA2);
    t[0xA3] = with("ldelem", 0xA3, TypeToken);
    t[0xA4] = with("stelem", 0xA4, TypeToken);
    t[0xA5] = with("unbox.any", 0xA5, TypeToken);

    t[0xB3] = plain("conv.ovf.i1", 0xB3);
    t[0xB4] = plain("conv.ovf.u1", 0xB4);
    t[0xB5] = plain("conv.ovf.i2", 0xB5);
    t[0xB6] = plain("conv.ovf.u2", 0xB6);
    t[0xB7] = plain("conv.ovf.i4", 0xB7);
    t[0xB8] = plain("conv.ovf.u4", 0xB8);
    t[0xB9] = plain("conv.ovf.i8", 0xB9);
    t[0xBA] = plain("conv.ovf.u8", 0xBA);
    t[0xC2] = with("refanyval", 0xC2, TypeToken);
    t[0xC3] = plain("ckfinite", 0xC3);
    t[0xC6] = with("mkrefany", 0xC6, TypeToken);
    t[0xD0] = with("ldtoken", 0xD0, TypeToken);
    t[0xD1] = plain("conv.u2", 0xD1);
    t[0xD2] = plain("conv.u1", 0xD2);
    t[0xD3] = plain("conv.i", 0xD3);
    t[0xD4] = plain("conv.ovf.i", 0xD4);
    t[0xD5] = plain("conv.ovf.u", 0xD5);
    t[0xD6] = plain("add.ovf", 0xD6);
    t[0xD7] = plain("add.ovf.un", 0xD7);
    t[0xD8] = plain("mul.ovf", 0xD8);
    t[0xD9] = plain("mul.ovf.un", 0xD9);
    t[0xDA] = plain("sub.ovf", 0xDA);
    t[0xDB] = plain("sub.ovf.un", 0xDB);
    t[0xDC] = op("endfinally", 0xDC, OperandKind::None, EndFinally);
    t[0xDD] = op("leave", 0xDD, LongBranchTarget, Leave);
    t[0xDE] = op("leave.s", 0xDE, ShortBranchTarget, Leave);
    t[0xDF] = plain("stind.i", 0xDF);
    t[0xE0] = plain("conv.u", 0xE0);

    t
}

const fn extended_table() -> [OpcodeDescriptor; 32] {
    use FlowType::{EndFinally, Throw};

    let mut t = [UNDEFINED; 32];

    t[0x00] = plain("arglist", 0xFE00);
    t[0x01] = plain("ceq", 0xFE01);
    t[0x02] = plain("cgt", 0xFE02);
    t[0x03] = plain("cgt.un", 0xFE03);
    t[0x04] = plain("clt", 0xFE04);
    t[0x05] = plain("clt.un", 0xFE05);
    t[0x06] = with("ldftn", 0xFE06, MethodToken);
    t[0x07] = with("ldvirtftn", 0xFE07, MethodToken);
    t[0x09] = with("ldarg", 0xFE09, VariableIndexLong);
    t[0x0A] = with("ldarga", 0xFE0A, VariableIndexLong);
    t[0x0B] = with("starg", 0xFE0B, VariableIndexLong);
    t[0x0C] = with("ldloc", 0xFE0C, VariableIndexLong);
    t[0x0D] = with("ldloca", 0xFE0D, VariableIndexLong);
    t[0x0E] = with("stloc", 0xFE0E, VariableIndexLong);
    t[0x0F] = plain("localloc", 0xFE0F);
    t[0x11] = op("endfilter", 0xFE11, OperandKind::None, EndFinally);
    t[0x12] = with("unaligned.", 0xFE12, Int8);
    t[0x13] = plain("volatile.", 0xFE13);
    t[0x14] = plain("tail.", 0xFE14);
    t[0x15] = with("initobj", 0xFE15, TypeToken);
    t[0x16] = with("constrained.", 0xFE16, TypeToken);
    t[0x17] = plain("cpblk", 0xFE17);
    t[0x18] = plain("initblk", 0xFE18);
    t[0x19] = with("no.", 0xFE19, Int8);
    t[0x1A] = op("rethrow", 0xFE1A, OperandKind::None, Throw);
    t[0x1C] = with("sizeof", 0xFE1C, TypeToken);
    t[0x1D] = plain("refanytype", 0xFE1D);
    t[0x1E] = plain("readonly.", 0xFE1E);

    t
}
