//! Structured instructions.

use super::opcodes::{self, ImmediateKind};
use crate::binary::Writer;
use crate::module::ValType;
use std::fmt;
use std::ops::Range;

/// An opcode byte, plus the sub-opcode for `0xfc`-prefixed instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode {
    pub byte: u8,
    pub sub: Option<u32>,
}

impl Opcode {
    pub const fn plain(byte: u8) -> Self {
        Self { byte, sub: None }
    }

    pub const fn prefixed(byte: u8, sub: u32) -> Self {
        Self {
            byte,
            sub: Some(sub),
        }
    }

    pub(crate) fn info(self) -> Option<(&'static str, ImmediateKind)> {
        match (self.byte, self.sub) {
            (opcodes::PREFIX_FC, Some(sub)) => opcodes::lookup_fc(sub),
            (byte, None) if byte != opcodes::PREFIX_FC => opcodes::lookup(byte),
            _ => None,
        }
    }

    /// Mnemonic, e.g. `i32.add`.
    pub fn name(self) -> &'static str {
        self.info().map(|(name, _)| name).unwrap_or("<unknown>")
    }

    pub fn is(self, byte: u8) -> bool {
        self.byte == byte && self.sub.is_none()
    }
}

/// Result type of a `block`, `loop` or `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
    /// Multi-value block typed by a type section entry.
    TypeIndex(u32),
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Empty => Ok(()),
            BlockType::Value(ty) => write!(f, " (result {ty})"),
            BlockType::TypeIndex(idx) => write!(f, " (type {idx})"),
        }
    }
}

/// Decoded immediates of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Immediate {
    None,
    Block(BlockType),
    /// Single index: label, function, local, global, table, memory, data or element.
    Index(u32),
    BrTable {
        targets: Vec<u32>,
        default: u32,
    },
    CallIndirect {
        type_index: u32,
        table: u32,
    },
    /// `align` is the raw alignment field; bit 6 set means `memory` is encoded.
    MemArg {
        align: u32,
        memory: Option<u32>,
        offset: u64,
    },
    I32(i32),
    I64(i64),
    /// Raw IEEE-754 bits.
    F32(u32),
    /// Raw IEEE-754 bits.
    F64(u64),
    ValTypes(Vec<ValType>),
    HeapType(ValType),
    IndexPair(u32, u32),
}

/// Role an instruction plays in the block structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Block,
    Loop,
    If,
    Else,
    End,
}

/// Block-structure metadata attached to `block`, `loop`, `if`, `else` and `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub kind: BlockKind,
    /// Nesting depth of the construct; the function body itself is depth 0.
    pub depth: usize,
    pub block_type: BlockType,
    /// Position of the opening `block`/`loop`/`if` in the sequence. `None` for
    /// openers themselves and for the `end` that closes the function body.
    pub opener: Option<usize>,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    immediate: Immediate,
    block: Option<BlockInfo>,
    /// Where this instruction's original bytes sit inside the disassembled
    /// code, if it came from disassembly and has not been modified since.
    span: Option<Range<usize>>,
}

impl Instruction {
    pub fn new(opcode: Opcode, immediate: Immediate) -> Self {
        Self {
            opcode,
            immediate,
            block: None,
            span: None,
        }
    }

    pub fn call(function_index: u32) -> Self {
        Self::new(Opcode::plain(opcodes::CALL), Immediate::Index(function_index))
    }

    pub fn i32_const(value: i32) -> Self {
        Self::new(Opcode::plain(opcodes::I32_CONST), Immediate::I32(value))
    }

    pub(super) fn decoded(
        opcode: Opcode,
        immediate: Immediate,
        block: Option<BlockInfo>,
        span: Range<usize>,
    ) -> Self {
        Self {
            opcode,
            immediate,
            block,
            span: Some(span),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn immediate(&self) -> &Immediate {
        &self.immediate
    }

    pub fn block(&self) -> Option<&BlockInfo> {
        self.block.as_ref()
    }

    pub(super) fn block_mut(&mut self) -> Option<&mut BlockInfo> {
        self.block.as_mut()
    }

    pub(super) fn span(&self) -> Option<&Range<usize>> {
        self.span.as_ref()
    }

    /// Replaces the immediates; the instruction is re-encoded canonically
    /// from then on.
    pub fn set_immediate(&mut self, immediate: Immediate) {
        if self.immediate != immediate {
            self.immediate = immediate;
            self.span = None;
        }
    }

    /// Function-space index referenced by `call`, `return_call` or `ref.func`.
    pub fn function_index(&self) -> Option<u32> {
        let refers_to_function = self.opcode.is(opcodes::CALL)
            || self.opcode.is(opcodes::RETURN_CALL)
            || self.opcode.is(opcodes::REF_FUNC);
        match (&self.immediate, refers_to_function) {
            (Immediate::Index(idx), true) => Some(*idx),
            _ => None,
        }
    }

    /// Writes the canonical encoding.
    pub(super) fn encode(&self, w: &mut Writer) {
        w.write_u8(self.opcode.byte);
        if let Some(sub) = self.opcode.sub {
            w.write_var_u32(sub);
        }
        match &self.immediate {
            Immediate::None => {}
            Immediate::Block(BlockType::Empty) => w.write_u8(0x40),
            Immediate::Block(BlockType::Value(ty)) => w.write_u8(ty.to_byte()),
            Immediate::Block(BlockType::TypeIndex(idx)) => w.write_var_i64(i64::from(*idx)),
            Immediate::Index(idx) => w.write_var_u32(*idx),
            Immediate::BrTable { targets, default } => {
                w.write_var_u32(targets.len() as u32);
                for target in targets {
                    w.write_var_u32(*target);
                }
                w.write_var_u32(*default);
            }
            Immediate::CallIndirect { type_index, table } => {
                w.write_var_u32(*type_index);
                w.write_var_u32(*table);
            }
            Immediate::MemArg {
                align,
                memory,
                offset,
            } => {
                w.write_var_u32(*align);
                if let Some(memory) = memory {
                    w.write_var_u32(*memory);
                }
                w.write_var_u64(*offset);
            }
            Immediate::I32(value) => w.write_var_i32(*value),
            Immediate::I64(value) => w.write_var_i64(*value),
            Immediate::F32(bits) => w.write(&bits.to_le_bytes()),
            Immediate::F64(bits) => w.write(&bits.to_le_bytes()),
            Immediate::ValTypes(types) => {
                w.write_var_u32(types.len() as u32);
                for ty in types {
                    w.write_u8(ty.to_byte());
                }
            }
            Immediate::HeapType(ty) => w.write_u8(ty.to_byte()),
            Immediate::IndexPair(a, b) => {
                w.write_var_u32(*a);
                w.write_var_u32(*b);
            }
        }
    }

    /// Size of the canonical encoding in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.len()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        match &self.immediate {
            Immediate::None => Ok(()),
            Immediate::Block(bt) => write!(f, "{bt}"),
            Immediate::Index(idx) => write!(f, " {idx}"),
            Immediate::BrTable { targets, default } => {
                for target in targets {
                    write!(f, " {target}")?;
                }
                write!(f, " {default}")
            }
            Immediate::CallIndirect { type_index, table } => {
                write!(f, " {table} (type {type_index})")
            }
            Immediate::MemArg { align, offset, .. } => {
                write!(f, " offset={offset} align={}", 1u64 << (align & 0x3f))
            }
            Immediate::I32(v) => write!(f, " {v}"),
            Immediate::I64(v) => write!(f, " {v}"),
            Immediate::F32(bits) => write!(f, " {}", f32::from_bits(*bits)),
            Immediate::F64(bits) => write!(f, " {}", f64::from_bits(*bits)),
            Immediate::ValTypes(types) => {
                for ty in types {
                    write!(f, " (result {ty})")?;
                }
                Ok(())
            }
            Immediate::HeapType(ty) => write!(f, " {ty}"),
            Immediate::IndexPair(a, b) => write!(f, " {a} {b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_encodings() {
        assert_eq!(Instruction::call(0).encoded_len(), 2);
        assert_eq!(Instruction::call(300).encoded_len(), 3);
        assert_eq!(Instruction::i32_const(-1).encoded_len(), 2);

        let mut w = Writer::new();
        Instruction::new(Opcode::prefixed(0xfc, 10), Immediate::IndexPair(0, 0)).encode(&mut w);
        assert_eq!(w.into_inner(), vec![0xfc, 0x0a, 0x00, 0x00]);
    }

    #[test]
    fn set_immediate_drops_original_span() {
        let mut call = Instruction::decoded(
            Opcode::plain(opcodes::CALL),
            Immediate::Index(1),
            None,
            0..2,
        );
        call.set_immediate(Immediate::Index(1));
        assert!(call.span().is_some(), "unchanged immediate keeps the span");
        call.set_immediate(Immediate::Index(2));
        assert!(call.span().is_none());
        assert_eq!(call.function_index(), Some(2));
    }

    #[test]
    fn only_function_references_expose_an_index() {
        let local_get = Instruction::new(Opcode::plain(0x20), Immediate::Index(4));
        assert_eq!(local_get.function_index(), None);
        let ref_func = Instruction::new(Opcode::plain(opcodes::REF_FUNC), Immediate::Index(4));
        assert_eq!(ref_func.function_index(), Some(4));
    }

    #[test]
    fn display_uses_mnemonics() {
        assert_eq!(Instruction::call(3).to_string(), "call 3");
        assert_eq!(Instruction::i32_const(-7).to_string(), "i32.const -7");
        let block = Instruction::new(
            Opcode::plain(opcodes::BLOCK),
            Immediate::Block(BlockType::Value(ValType::I32)),
        );
        assert_eq!(block.to_string(), "block (result i32)");
    }
}
