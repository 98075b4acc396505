/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! A miniature two phase MC6809 assembler.

This is not a general purpose assembler: machine code is written as
[token][Token] sequences of raw opcode bytes interspersed with label
definitions and references. The first phase ([Assembler::emit]) appends
bytes, records label addresses and keeps unresolved references as
relocations; the second phase ([Assembler::link]) patches every
relocation once all labels are known, so forward references cost nothing.

Label addresses survive [Assembler::org], which lets several independently
placed code blobs share one label namespace.

```
use dragoncas_formats::mc6809::{Assembler, Token::*};

let mut asm = Assembler::new(0x0100);
asm.emit(&[Byte(0x8E), Abs16("msg"),        // ldx #msg
           Label("msg"), Byte(0x2A)]);
let code = asm.link().unwrap();
assert_eq!(&[0x8E, 0x01, 0x03, 0x2A], code);
```
*/
use std::collections::HashMap;
use std::io::{Error, ErrorKind, Result};

/// One element of an assembly sequence.
#[derive(Clone, Copy, Debug)]
pub enum Token<'a> {
    /// A literal code or data byte.
    Byte(u8),
    /// Defines a label at the current assembly address.
    Label(&'a str),
    /// A one byte placeholder for the low byte of a label address.
    Abs8(&'a str),
    /// A two byte placeholder for a label address, MSB first.
    Abs16(&'a str),
    /// A one byte placeholder for a PC relative branch offset.
    Rel8(&'a str),
    /// A two byte placeholder for a PC relative offset, MSB first.
    Rel16(&'a str)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RelocKind {
    Abs8,
    Abs16,
    Rel8,
    Rel16
}

impl RelocKind {
    fn size(self) -> u16 {
        match self {
            RelocKind::Abs8|RelocKind::Rel8 => 1,
            RelocKind::Abs16|RelocKind::Rel16 => 2
        }
    }
    fn is_relative(self) -> bool {
        matches!(self, RelocKind::Rel8|RelocKind::Rel16)
    }
}

#[derive(Clone, Debug)]
struct Reloc {
    kind: RelocKind,
    symbol: String,
    /// The assembly address just past the placeholder bytes.
    pc_after: u16
}

/// The two phase assembler state.
///
/// See the [module][self] documentation.
#[derive(Clone, Debug, Default)]
pub struct Assembler {
    org: u16,
    pc: u16,
    labels: HashMap<String, u16>,
    relocs: Vec<Reloc>,
    data: Vec<u8>
}

impl Assembler {
    /// Creates an assembler placing code at `org`.
    pub fn new(org: u16) -> Self {
        Assembler { org, pc: org, ..Default::default() }
    }
    /// Starts a new code blob at `org`.
    ///
    /// The accumulated code and unresolved relocations are discarded;
    /// label definitions are kept.
    pub fn org(&mut self, org: u16) {
        self.org = org;
        self.pc = org;
        self.data.clear();
        self.relocs.clear();
    }
    /// Returns the current assembly address.
    #[inline]
    pub fn pc(&self) -> u16 {
        self.pc
    }
    /// Returns the origin of the current code blob.
    #[inline]
    pub fn origin(&self) -> u16 {
        self.org
    }
    /// Defines or redefines a label outside the code stream.
    pub fn define(&mut self, name: &str, value: u16) {
        self.labels.insert(name.to_string(), value);
    }
    /// Returns the address of a defined label.
    pub fn label(&self, name: &str) -> Option<u16> {
        self.labels.get(name).copied()
    }
    /// Appends a token sequence to the current code blob.
    pub fn emit(&mut self, tokens: &[Token]) {
        for token in tokens {
            match *token {
                Token::Byte(byte) => {
                    self.data.push(byte);
                    self.pc = self.pc.wrapping_add(1);
                }
                Token::Label(name) => {
                    self.labels.insert(name.to_string(), self.pc);
                }
                Token::Abs8(sym)  => self.placeholder(RelocKind::Abs8, sym),
                Token::Abs16(sym) => self.placeholder(RelocKind::Abs16, sym),
                Token::Rel8(sym)  => self.placeholder(RelocKind::Rel8, sym),
                Token::Rel16(sym) => self.placeholder(RelocKind::Rel16, sym)
            }
        }
    }
    fn placeholder(&mut self, kind: RelocKind, symbol: &str) {
        let size = kind.size();
        self.data.extend(core::iter::repeat(0).take(size as usize));
        self.pc = self.pc.wrapping_add(size);
        self.relocs.push(Reloc { kind, symbol: symbol.to_string(), pc_after: self.pc });
    }
    /// Resolves all relocations and returns the patched code.
    ///
    /// Every referenced label must be defined by now. Linking is
    /// idempotent: it may be invoked again after more code or label
    /// definitions were added.
    pub fn link(&mut self) -> Result<&[u8]> {
        for reloc in self.relocs.iter() {
            let addr = *self.labels.get(&reloc.symbol).ok_or_else(||
                Error::new(ErrorKind::InvalidData,
                    format!("undefined label: {}", reloc.symbol)))?;
            let value = if reloc.kind.is_relative() {
                addr.wrapping_sub(reloc.pc_after)
            }
            else {
                addr
            };
            let size = reloc.kind.size();
            let offset = (reloc.pc_after.wrapping_sub(size)
                                        .wrapping_sub(self.org)) as usize;
            match size {
                1 => self.data[offset] = value as u8,
                _ => self.data[offset..offset + 2].copy_from_slice(&value.to_be_bytes())
            }
        }
        Ok(&self.data)
    }
    /// Returns the current code blob without linking.
    pub fn code(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::Token::*;

    #[test]
    fn absolute_relocations() {
        let mut asm = Assembler::new(0x1000);
        asm.emit(&[Byte(0x7E), Abs16("target"),      // jmp >target
                   Label("target"),
                   Byte(0x96), Abs8("target")]);     // lda <target
        let code = asm.link().unwrap().to_vec();
        assert_eq!(vec![0x7E, 0x10, 0x03, 0x96, 0x03], code);
    }

    #[test]
    fn relative_relocations() {
        let mut asm = Assembler::new(0x0200);
        asm.emit(&[Label("loop"),
                   Byte(0x8D), Rel8("sub"),          // bsr sub (forward)
                   Byte(0x20), Rel8("loop"),         // bra loop (backward)
                   Label("sub"),
                   Byte(0x17), Rel16("loop"),        // lbsr loop
                   Byte(0x39)]);
        let code = asm.link().unwrap();
        // bsr: target 0x0204 - pc_after 0x0202 = 2
        assert_eq!(0x02, code[1]);
        // bra: target 0x0200 - pc_after 0x0204 = -4
        assert_eq!(0xFC, code[3]);
        // lbsr: target 0x0200 - pc_after 0x0207 = -7
        assert_eq!(&[0xFF, 0xF9], &code[5..7]);
    }

    #[test]
    fn linking_is_idempotent() {
        let mut asm = Assembler::new(0x0100);
        asm.emit(&[Byte(0x8E), Abs16("end"), Label("end")]);
        let first = asm.link().unwrap().to_vec();
        let second = asm.link().unwrap().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn undefined_label_fails() {
        let mut asm = Assembler::new(0);
        asm.emit(&[Byte(0x7E), Abs16("nowhere")]);
        assert!(asm.link().is_err());
    }

    #[test]
    fn labels_survive_org() {
        let mut asm = Assembler::new(0x01DA);
        asm.emit(&[Label("entry"), Byte(0x39)]);
        asm.link().unwrap();
        asm.org(0x00A6);
        asm.emit(&[Abs16("entry"), Byte(0x7E), Abs16("entry")]);
        let code = asm.link().unwrap();
        assert_eq!(&[0x01, 0xDA, 0x7E, 0x01, 0xDA], code);
        assert_eq!(0x00A6, asm.origin());
    }

    #[test]
    fn define_overrides_and_relinks() {
        let mut asm = Assembler::new(0);
        asm.define("exec", 0x4000);
        asm.emit(&[Byte(0x7E), Abs16("exec")]);
        assert_eq!(&[0x7E, 0x40, 0x00], asm.link().unwrap());
        asm.define("exec", 0x5000);
        assert_eq!(&[0x7E, 0x50, 0x00], asm.link().unwrap());
    }
}
