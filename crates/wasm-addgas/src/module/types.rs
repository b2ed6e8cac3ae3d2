//! Decoded section contents.
//!
//! These types mirror the binary layout closely: anything the encoder needs to
//! reproduce the original bytes (flag fields, explicit-vs-implicit indices,
//! raw constant expressions) is kept, even when it carries no extra meaning.

use std::fmt;

/// WebAssembly value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

impl ValType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x7f => ValType::I32,
            0x7e => ValType::I64,
            0x7d => ValType::F32,
            0x7c => ValType::F64,
            0x7b => ValType::V128,
            0x70 => ValType::FuncRef,
            0x6f => ValType::ExternRef,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ValType::I32 => 0x7f,
            ValType::I64 => 0x7e,
            ValType::F32 => 0x7d,
            ValType::F64 => 0x7c,
            ValType::V128 => 0x7b,
            ValType::FuncRef => 0x70,
            ValType::ExternRef => 0x6f,
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::V128 => "v128",
            ValType::FuncRef => "funcref",
            ValType::ExternRef => "externref",
        };
        f.write_str(name)
    }
}

/// Form byte of a function type entry.
pub const FUNC_FORM: u8 = 0x60;

/// A type section entry.
///
/// Two signatures are equal iff form, parameters and results all match in
/// order, which is exactly the derived `PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    pub form: u8,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: Vec<ValType>, results: Vec<ValType>) -> Self {
        Self {
            form: FUNC_FORM,
            params,
            results,
        }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |types: &[ValType]| {
            types
                .iter()
                .map(ValType::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({}) -> ({})", join(&self.params), join(&self.results))
    }
}

/// Limits of a table or memory.
///
/// `flags` is the raw flag byte: bit 0 = has maximum, bit 1 = shared,
/// bit 2 = 64-bit index type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub flags: u8,
    pub min: u64,
    pub max: Option<u64>,
}

impl Limits {
    pub const HAS_MAX: u8 = 0x01;
    pub const SHARED: u8 = 0x02;
    pub const INDEX64: u8 = 0x04;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub elem_type: ValType,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub content: ValType,
    pub mutable: bool,
}

/// Kind of an import or export, with the external-kind byte as discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalKind {
    Function = 0,
    Table = 1,
    Memory = 2,
    Global = 3,
}

impl ExternalKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => ExternalKind::Function,
            1 => ExternalKind::Table,
            2 => ExternalKind::Memory,
            3 => ExternalKind::Global,
            _ => return None,
        })
    }
}

/// What an import brings into the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// Imported function (index into the type section).
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

impl ImportKind {
    pub fn external_kind(&self) -> ExternalKind {
        match self {
            ImportKind::Function(_) => ExternalKind::Function,
            ImportKind::Table(_) => ExternalKind::Table,
            ImportKind::Memory(_) => ExternalKind::Memory,
            ImportKind::Global(_) => ExternalKind::Global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub module: String,
    pub field: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub name: String,
    pub kind: ExternalKind,
    /// Index into the index space selected by `kind`.
    pub index: u32,
}

/// A constant expression, kept as its raw bytes including the final `end`.
///
/// Use [`crate::disasm::disassemble`] on [`ConstExpr::bytes`] to inspect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstExpr {
    bytes: Vec<u8>,
}

impl ConstExpr {
    /// Wraps already validated expression bytes.
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementItems {
    /// Plain function indices (flags 0-3).
    Functions(Vec<u32>),
    /// One constant expression per slot (flags 4-7).
    Expressions(Vec<ConstExpr>),
}

/// An element segment in any of its eight binary encodings.
///
/// The flag bits decide which of the optional parts are present:
/// bit 0 = passive or declarative, bit 1 = explicit table index (active) or
/// declarative (non-active), bit 2 = expression items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub flags: u32,
    /// Target table; only encoded when `flags` is 2 or 6.
    pub table: u32,
    /// Present for active segments.
    pub offset: Option<ConstExpr>,
    /// Element kind byte (flags 1-3) or reference type byte (flags 5-7).
    pub elem_type: Option<u8>,
    pub items: ElementItems,
}

impl ElementSegment {
    pub fn is_active(&self) -> bool {
        self.flags & 0b001 == 0
    }

    pub fn has_explicit_table(&self) -> bool {
        self.flags & 0b011 == 0b010
    }

    pub fn has_elem_type(&self) -> bool {
        self.flags & 0b011 != 0
    }

    pub fn uses_expressions(&self) -> bool {
        self.flags & 0b100 != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    /// 0 = active on memory 0, 1 = passive, 2 = active with explicit memory.
    pub flags: u32,
    pub memory: u32,
    pub offset: Option<ConstExpr>,
    pub data: Vec<u8>,
}

/// One entry of the code section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBody {
    /// Local declarations as written: (count, type) runs.
    pub locals: Vec<(u32, ValType)>,
    /// Instruction bytes following the locals, up to and including the final `end`.
    pub code: Vec<u8>,
    /// Absolute input offset of `code[0]`; zero for bodies built in memory.
    pub code_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    pub name: String,
    /// Content after the name.
    pub data: Vec<u8>,
}
