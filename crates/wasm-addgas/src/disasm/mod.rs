//! Instruction codec.
//!
//! [`disassemble`] turns the instruction bytes of a function body into a flat
//! sequence of [`Instruction`]s annotated with their block structure, and
//! [`Disassembly::assemble`] turns that sequence back into bytes.
//!
//! Nesting is tracked with an explicit stack of open blocks, so arbitrarily
//! deep input never recurses. Every decoded instruction remembers where its
//! bytes came from; unmodified instructions are copied verbatim on assembly,
//! which keeps the round trip byte-exact even for non-canonical LEB128
//! immediates. Modified or inserted instructions are encoded canonically.

mod instruction;
pub mod opcodes;

pub use instruction::{BlockInfo, BlockKind, BlockType, Immediate, Instruction, Opcode};

use crate::binary::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::module::ValType;
use opcodes::ImmediateKind;

/// Disassembled instruction sequence, borrowing the bytes it was decoded from.
#[derive(Debug, Clone)]
pub struct Disassembly<'a> {
    code: &'a [u8],
    instructions: Vec<Instruction>,
}

impl<'a> Disassembly<'a> {
    /// The bytes this sequence was decoded from.
    pub fn code(&self) -> &'a [u8] {
        self.code
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.instructions.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Inserts `prologue` before the first instruction.
    ///
    /// Prologue instructions sit at depth 0 and must not open or close blocks.
    pub fn prepend(&mut self, prologue: Vec<Instruction>) {
        debug_assert!(prologue.iter().all(|i| i.block().is_none()));
        let shift = prologue.len();
        for instr in &mut self.instructions {
            if let Some(block) = instr.block_mut() {
                if let Some(opener) = block.opener.as_mut() {
                    *opener += shift;
                }
            }
        }
        self.instructions.splice(0..0, prologue);
    }

    /// Encodes the sequence back into bytes.
    pub fn assemble(self) -> Vec<u8> {
        let mut w = Writer::new();
        for instr in &self.instructions {
            match instr.span() {
                Some(span) => w.write(&self.code[span.clone()]),
                None => instr.encode(&mut w),
            }
        }
        w.into_inner()
    }
}

/// Disassembles the instruction bytes of a function body.
///
/// `code` must hold exactly one instruction sequence terminated by the `end`
/// that closes the body.
pub fn disassemble(code: &[u8]) -> Result<Disassembly<'_>> {
    disassemble_at(code, 0)
}

/// Like [`disassemble`], reporting error offsets relative to `base`.
pub fn disassemble_at(code: &[u8], base: usize) -> Result<Disassembly<'_>> {
    let mut cursor = Cursor::with_base(code, base);
    let instructions = decode_sequence(&mut cursor, base)?;
    if let Some(byte) = cursor.peek_u8() {
        let offset = cursor.position();
        return Err(match byte {
            opcodes::END | opcodes::ELSE => Error::UnmatchedBlockEnd { offset },
            _ => Error::TrailingCode { offset },
        });
    }
    Ok(Disassembly { code, instructions })
}

/// Disassembles a constant expression in place, leaving `cursor` just past
/// its final `end`.
pub(crate) fn disassemble_expr<'a>(cursor: &mut Cursor<'a>) -> Result<Disassembly<'a>> {
    let base = cursor.position();
    let rest = cursor.rest();
    let instructions = decode_sequence(cursor, base)?;
    Ok(Disassembly {
        code: &rest[..cursor.position() - base],
        instructions,
    })
}

/// Convenience for `disassembly.assemble()`.
pub fn assemble(disassembly: Disassembly<'_>) -> Vec<u8> {
    disassembly.assemble()
}

struct OpenBlock {
    kind: BlockKind,
    opener: usize,
    block_type: BlockType,
}

/// Decodes instructions until the implicit outermost block is closed.
fn decode_sequence(cursor: &mut Cursor<'_>, base: usize) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut open: Vec<OpenBlock> = Vec::new();
    loop {
        let start = cursor.position();
        if cursor.is_empty() {
            return Err(Error::TruncatedBody { offset: start });
        }
        let (opcode, immediate) = decode_instruction(cursor)
            .map_err(|e| e.map_unexpected_end(|offset| Error::TruncatedBody { offset }))?;
        let position = instructions.len();
        let span = start - base..cursor.position() - base;

        let block = match (opcode.sub, opcode.byte) {
            (None, opcodes::BLOCK | opcodes::LOOP | opcodes::IF) => {
                let block_type = match &immediate {
                    Immediate::Block(bt) => *bt,
                    _ => BlockType::Empty,
                };
                let kind = match opcode.byte {
                    opcodes::BLOCK => BlockKind::Block,
                    opcodes::LOOP => BlockKind::Loop,
                    _ => BlockKind::If,
                };
                open.push(OpenBlock {
                    kind,
                    opener: position,
                    block_type,
                });
                Some(BlockInfo {
                    kind,
                    depth: open.len(),
                    block_type,
                    opener: None,
                })
            }
            (None, opcodes::ELSE) => {
                let depth = open.len();
                match open.last_mut() {
                    Some(top) if top.kind == BlockKind::If => {
                        top.kind = BlockKind::Else;
                        Some(BlockInfo {
                            kind: BlockKind::Else,
                            depth,
                            block_type: top.block_type,
                            opener: Some(top.opener),
                        })
                    }
                    _ => return Err(Error::UnmatchedBlockEnd { offset: start }),
                }
            }
            (None, opcodes::END) => match open.pop() {
                Some(top) => Some(BlockInfo {
                    kind: BlockKind::End,
                    depth: open.len() + 1,
                    block_type: top.block_type,
                    opener: Some(top.opener),
                }),
                None => {
                    let end = BlockInfo {
                        kind: BlockKind::End,
                        depth: 0,
                        block_type: BlockType::Empty,
                        opener: None,
                    };
                    instructions.push(Instruction::decoded(opcode, immediate, Some(end), span));
                    return Ok(instructions);
                }
            },
            _ => None,
        };
        instructions.push(Instruction::decoded(opcode, immediate, block, span));
    }
}

fn decode_instruction(cursor: &mut Cursor<'_>) -> Result<(Opcode, Immediate)> {
    let offset = cursor.position();
    let byte = cursor.read_u8()?;
    let opcode = if byte == opcodes::PREFIX_FC {
        Opcode::prefixed(byte, cursor.read_var_u32()?)
    } else {
        Opcode::plain(byte)
    };
    let (_, kind) = opcode.info().ok_or(Error::UnknownOpcode {
        opcode: byte,
        sub: opcode.sub,
        offset,
    })?;
    let immediate = decode_immediate(cursor, kind)?;
    Ok((opcode, immediate))
}

fn decode_immediate(cursor: &mut Cursor<'_>, kind: ImmediateKind) -> Result<Immediate> {
    Ok(match kind {
        ImmediateKind::None => Immediate::None,
        ImmediateKind::BlockType => Immediate::Block(decode_block_type(cursor)?),
        ImmediateKind::Index => Immediate::Index(cursor.read_var_u32()?),
        ImmediateKind::BrTable => {
            let count = cursor.read_var_u32()? as usize;
            let mut targets = Vec::with_capacity(count.min(cursor.remaining()));
            for _ in 0..count {
                targets.push(cursor.read_var_u32()?);
            }
            let default = cursor.read_var_u32()?;
            Immediate::BrTable { targets, default }
        }
        ImmediateKind::CallIndirect => {
            let type_index = cursor.read_var_u32()?;
            let table = cursor.read_var_u32()?;
            Immediate::CallIndirect { type_index, table }
        }
        ImmediateKind::MemArg => {
            let align = cursor.read_var_u32()?;
            let memory = if align & 0x40 != 0 {
                Some(cursor.read_var_u32()?)
            } else {
                None
            };
            let offset = cursor.read_var_u64()?;
            Immediate::MemArg {
                align,
                memory,
                offset,
            }
        }
        ImmediateKind::I32 => Immediate::I32(cursor.read_var_i32()?),
        ImmediateKind::I64 => Immediate::I64(cursor.read_var_i64()?),
        ImmediateKind::F32 => {
            let b = cursor.read(4)?;
            Immediate::F32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        ImmediateKind::F64 => {
            let b = cursor.read(8)?;
            let mut bits = [0u8; 8];
            bits.copy_from_slice(b);
            Immediate::F64(u64::from_le_bytes(bits))
        }
        ImmediateKind::ValTypes => {
            let count = cursor.read_var_u32()? as usize;
            let mut types = Vec::with_capacity(count.min(cursor.remaining()));
            for _ in 0..count {
                types.push(decode_val_type(cursor)?);
            }
            Immediate::ValTypes(types)
        }
        ImmediateKind::HeapType => Immediate::HeapType(decode_val_type(cursor)?),
        ImmediateKind::IndexPair => {
            let a = cursor.read_var_u32()?;
            let b = cursor.read_var_u32()?;
            Immediate::IndexPair(a, b)
        }
    })
}

fn decode_block_type(cursor: &mut Cursor<'_>) -> Result<BlockType> {
    let offset = cursor.position();
    if cursor.peek_u8() == Some(0x40) {
        cursor.read_u8()?;
        return Ok(BlockType::Empty);
    }
    if let Some(ty) = cursor.peek_u8().and_then(ValType::from_byte) {
        cursor.read_u8()?;
        return Ok(BlockType::Value(ty));
    }
    let idx = cursor.read_var_s33()?;
    u32::try_from(idx)
        .map(BlockType::TypeIndex)
        .map_err(|_| Error::InvalidImmediate {
            offset,
            reason: "invalid block type",
        })
}

fn decode_val_type(cursor: &mut Cursor<'_>) -> Result<ValType> {
    let offset = cursor.position();
    let byte = cursor.read_u8()?;
    ValType::from_byte(byte).ok_or(Error::InvalidImmediate {
        offset,
        reason: "invalid value type",
    })
}
