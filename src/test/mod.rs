//! Builders for method bodies and module manifests used across unit tests.

use std::collections::HashMap;

use crate::metadata::{
    manifest::{MemberRefEntry, MethodEntry, ModuleManifest, TypeEntry},
    token::Token,
};

enum Fixup {
    /// Single displacement, relative to `base`
    Branch {
        at: usize,
        base: usize,
        label: String,
        short: bool,
    },
    /// Switch table entry, relative to the end of the table
    Switch {
        at: usize,
        base: usize,
        label: String,
    },
}

/// Assembles CIL bytes with symbolic branch labels.
#[derive(Default)]
pub struct IlBuilder {
    code: Vec<u8>,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
}

impl IlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn label(mut self, name: &str) -> Self {
        self.labels.insert(name.to_string(), self.code.len());
        self
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.code.push(opcode);
        self
    }

    pub fn op_fe(mut self, opcode: u8) -> Self {
        self.code.extend_from_slice(&[0xFE, opcode]);
        self
    }

    pub fn op_u8(mut self, opcode: u8, value: u8) -> Self {
        self.code.extend_from_slice(&[opcode, value]);
        self
    }

    pub fn op_i32(mut self, opcode: u8, value: i32) -> Self {
        self.code.push(opcode);
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn op_token(self, opcode: u8, token: u32) -> Self {
        self.op_i32(opcode, token as i32)
    }

    pub fn call(self, token: u32) -> Self {
        self.op_token(0x28, token)
    }

    pub fn callvirt(self, token: u32) -> Self {
        self.op_token(0x6F, token)
    }

    pub fn newobj(self, token: u32) -> Self {
        self.op_token(0x73, token)
    }

    pub fn calli(self, signature: u32) -> Self {
        self.op_token(0x29, signature)
    }

    pub fn ret(self) -> Self {
        self.op(0x2A)
    }

    /// Short-form branch (`br.s`, `brtrue.s`, ...) to `label`.
    pub fn branch_s(mut self, opcode: u8, label: &str) -> Self {
        self.code.extend_from_slice(&[opcode, 0]);
        self.fixups.push(Fixup::Branch {
            at: self.code.len() - 1,
            base: self.code.len(),
            label: label.to_string(),
            short: true,
        });
        self
    }

    /// Long-form branch (`br`, `brtrue`, ...) to `label`.
    pub fn branch(mut self, opcode: u8, label: &str) -> Self {
        self.code.push(opcode);
        self.code.extend_from_slice(&[0; 4]);
        self.fixups.push(Fixup::Branch {
            at: self.code.len() - 4,
            base: self.code.len(),
            label: label.to_string(),
            short: false,
        });
        self
    }

    pub fn br_s(self, label: &str) -> Self {
        self.branch_s(0x2B, label)
    }

    pub fn leave_s(self, label: &str) -> Self {
        self.branch_s(0xDE, label)
    }

    pub fn switch(mut self, labels: &[&str]) -> Self {
        self.code.push(0x45);
        self.code
            .extend_from_slice(&(labels.len() as u32).to_le_bytes());
        let table = self.code.len();
        let base = table + labels.len() * 4;
        for (index, label) in labels.iter().enumerate() {
            self.fixups.push(Fixup::Switch {
                at: table + index * 4,
                base,
                label: (*label).to_string(),
            });
        }
        self.code.resize(base, 0);
        self
    }

    /// Resolves all labels. Panics on unknown labels or short displacements out of range.
    pub fn build(mut self) -> Vec<u8> {
        for fixup in std::mem::take(&mut self.fixups) {
            match fixup {
                Fixup::Branch {
                    at,
                    base,
                    label,
                    short,
                } => {
                    let delta = self.delta(&label, base);
                    if short {
                        let delta = i8::try_from(delta).expect("short branch out of range");
                        self.code[at] = delta as u8;
                    } else {
                        self.code[at..at + 4].copy_from_slice(&delta.to_le_bytes());
                    }
                }
                Fixup::Switch { at, base, label } => {
                    let delta = self.delta(&label, base);
                    self.code[at..at + 4].copy_from_slice(&delta.to_le_bytes());
                }
            }
        }
        self.code
    }

    fn delta(&self, label: &str, base: usize) -> i32 {
        let target = *self
            .labels
            .get(label)
            .unwrap_or_else(|| panic!("unknown label {label}"));
        target as i32 - base as i32
    }
}

/// Builds module manifests method by method.
pub struct ModuleBuilder {
    manifest: ModuleManifest,
    next_row: u32,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        ModuleBuilder {
            manifest: ModuleManifest {
                name: name.to_string(),
                types: Vec::new(),
                member_refs: Vec::new(),
            },
            next_row: 1,
        }
    }

    /// Adds a method with a header-less body; returns its MethodDef token value.
    pub fn method(&mut self, type_name: &str, name: &str, code: Vec<u8>) -> u32 {
        let token = Token::new(0x0600_0000 | self.next_row);
        self.next_row += 1;
        self.add(type_name, MethodEntry::new(name, token, code));
        token.value()
    }

    /// Adds a method without body.
    pub fn bodiless(&mut self, type_name: &str, name: &str) -> u32 {
        let token = Token::new(0x0600_0000 | self.next_row);
        self.next_row += 1;
        self.add(type_name, MethodEntry::bodiless(name, token));
        token.value()
    }

    /// Adds a fully specified method entry.
    pub fn add(&mut self, type_name: &str, method: MethodEntry) {
        match self
            .manifest
            .types
            .iter_mut()
            .find(|ty| ty.name == type_name)
        {
            Some(ty) => ty.methods.push(method),
            None => self.manifest.types.push(TypeEntry {
                name: type_name.to_string(),
                methods: vec![method],
            }),
        }
    }

    /// Adds a member reference to a method in `module`; returns the token value.
    pub fn member_ref(&mut self, module: &str, type_name: &str, name: &str) -> u32 {
        let token = Token::new(0x0A00_0001 + self.manifest.member_refs.len() as u32);
        self.manifest.member_refs.push(MemberRefEntry {
            token,
            module: Some(module.to_string()),
            declaring_type: type_name.to_string(),
            name: name.to_string(),
            signature: None,
        });
        token.value()
    }

    pub fn build(self) -> ModuleManifest {
        self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_resolve() {
        let code = IlBuilder::new()
            .label("top")
            .op(0x00)
            .br_s("top")
            .branch(0x38, "end")
            .label("end")
            .ret()
            .build();

        assert_eq!(code, vec![0x00, 0x2B, 0xFD, 0x38, 0, 0, 0, 0, 0x2A]);
    }

    #[test]
    fn switch_entries() {
        let code = IlBuilder::new()
            .switch(&["a", "b"])
            .label("a")
            .op(0x00)
            .label("b")
            .ret()
            .build();

        assert_eq!(&code[1..5], &2u32.to_le_bytes());
        assert_eq!(&code[5..9], &0i32.to_le_bytes());
        assert_eq!(&code[9..13], &1i32.to_le_bytes());
    }

    #[test]
    fn module_tokens() {
        let mut module = ModuleBuilder::new("M");
        assert_eq!(module.method("M.A", "X", vec![0x2A]), 0x0600_0001);
        assert_eq!(module.bodiless("M.A", "Y"), 0x0600_0002);
        assert_eq!(module.member_ref("N", "N.B", "Z"), 0x0A00_0001);

        let manifest = module.build();
        assert_eq!(manifest.types.len(), 1);
        assert_eq!(manifest.types[0].methods.len(), 2);
    }
}
