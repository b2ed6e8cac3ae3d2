//! Structural model of a WebAssembly module.
//!
//! A [`Module`] is the ordered list of its sections. Each [`Section`] keeps the
//! exact bytes it was decoded from next to its decoded [`Payload`]; sections
//! that are never touched are re-emitted from those bytes, so decoding and
//! re-encoding an unmodified module is the identity.
//!
//! Typed access goes through a [`SectionIndex`] of positions into the section
//! list. The index is rebuilt by every operation that inserts a section.

mod decode;
mod encode;
mod types;

pub use decode::decode_module;
pub use encode::encode_module;
pub use types::*;

use std::ops::Range;

/// `\0asm`
pub const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
pub const VERSION: u32 = 1;

/// Known section ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
}

impl SectionId {
    pub fn from_u8(id: u8) -> Option<Self> {
        use SectionId::*;
        Some(match id {
            0 => Custom,
            1 => Type,
            2 => Import,
            3 => Function,
            4 => Table,
            5 => Memory,
            6 => Global,
            7 => Export,
            8 => Start,
            9 => Element,
            10 => Code,
            11 => Data,
            12 => DataCount,
            _ => return None,
        })
    }

    /// Position in the mandatory section order (the data count section sits
    /// between element and code). Customs have no rank.
    pub(crate) fn rank(self) -> Option<u8> {
        match self {
            SectionId::Custom => None,
            SectionId::DataCount => Some(10),
            SectionId::Code => Some(11),
            SectionId::Data => Some(12),
            other => Some(other as u8),
        }
    }
}

/// Decoded contents of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Custom(CustomSection),
    Type(Vec<FuncType>),
    Import(Vec<ImportEntry>),
    Function(Vec<u32>),
    Table(Vec<TableType>),
    Memory(Vec<MemoryType>),
    Global(Vec<GlobalEntry>),
    Export(Vec<ExportEntry>),
    Start(u32),
    Element(Vec<ElementSegment>),
    Code(Vec<FunctionBody>),
    Data(Vec<DataSegment>),
    DataCount(u32),
}

impl Payload {
    pub fn id(&self) -> SectionId {
        match self {
            Payload::Custom(_) => SectionId::Custom,
            Payload::Type(_) => SectionId::Type,
            Payload::Import(_) => SectionId::Import,
            Payload::Function(_) => SectionId::Function,
            Payload::Table(_) => SectionId::Table,
            Payload::Memory(_) => SectionId::Memory,
            Payload::Global(_) => SectionId::Global,
            Payload::Export(_) => SectionId::Export,
            Payload::Start(_) => SectionId::Start,
            Payload::Element(_) => SectionId::Element,
            Payload::Code(_) => SectionId::Code,
            Payload::Data(_) => SectionId::Data,
            Payload::DataCount(_) => SectionId::DataCount,
        }
    }
}

/// One section of a module.
#[derive(Debug, Clone)]
pub struct Section {
    payload: Payload,
    /// Payload bounds in the decoded input; `None` for synthesized sections.
    bounds: Option<Range<usize>>,
    /// The whole section as it appeared in the input: id, size, payload.
    raw: Vec<u8>,
    modified: bool,
}

impl Section {
    pub(crate) fn decoded(payload: Payload, bounds: Range<usize>, raw: Vec<u8>) -> Self {
        Self {
            payload,
            bounds: Some(bounds),
            raw,
            modified: false,
        }
    }

    /// A section that did not exist in the input; it is always encoded from
    /// its payload.
    pub fn synthesized(payload: Payload) -> Self {
        Self {
            payload,
            bounds: None,
            raw: Vec::new(),
            modified: true,
        }
    }

    pub fn id(&self) -> SectionId {
        self.payload.id()
    }

    pub fn bounds(&self) -> Option<Range<usize>> {
        self.bounds.clone()
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Mutable access to the payload. Marks the section as modified, so its
    /// bytes are recomputed on encoding.
    pub fn payload_mut(&mut self) -> &mut Payload {
        self.modified = true;
        &mut self.payload
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

/// Positions of the known sections in [`Module::sections`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionIndex {
    pub types: Option<usize>,
    pub imports: Option<usize>,
    pub functions: Option<usize>,
    pub tables: Option<usize>,
    pub memories: Option<usize>,
    pub globals: Option<usize>,
    pub exports: Option<usize>,
    pub start: Option<usize>,
    pub elements: Option<usize>,
    pub data_count: Option<usize>,
    pub code: Option<usize>,
    pub data: Option<usize>,
    pub customs: Vec<usize>,
}

impl SectionIndex {
    fn build(sections: &[Section]) -> Self {
        let mut index = SectionIndex::default();
        for (pos, section) in sections.iter().enumerate() {
            let slot = match section.id() {
                SectionId::Custom => {
                    index.customs.push(pos);
                    continue;
                }
                SectionId::Type => &mut index.types,
                SectionId::Import => &mut index.imports,
                SectionId::Function => &mut index.functions,
                SectionId::Table => &mut index.tables,
                SectionId::Memory => &mut index.memories,
                SectionId::Global => &mut index.globals,
                SectionId::Export => &mut index.exports,
                SectionId::Start => &mut index.start,
                SectionId::Element => &mut index.elements,
                SectionId::DataCount => &mut index.data_count,
                SectionId::Code => &mut index.code,
                SectionId::Data => &mut index.data,
            };
            *slot = Some(pos);
        }
        index
    }
}

/// An entry of the function index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionRef {
    /// The `import`-th entry of the import section.
    Imported { import: usize, type_index: u32 },
    /// The `defined`-th entry of the function and code sections.
    Defined { defined: usize, type_index: u32 },
}

impl FunctionRef {
    pub fn type_index(&self) -> u32 {
        match self {
            FunctionRef::Imported { type_index, .. } | FunctionRef::Defined { type_index, .. } => {
                *type_index
            }
        }
    }
}

/// A decoded module.
#[derive(Debug, Clone)]
pub struct Module {
    version: u32,
    sections: Vec<Section>,
    index: SectionIndex,
}

macro_rules! section_accessors {
    ($($get:ident, $get_mut:ident, $slot:ident, $variant:ident => $ty:ty;)*) => {
        $(
            pub fn $get(&self) -> Option<&$ty> {
                match self.sections[self.index.$slot?].payload() {
                    Payload::$variant(contents) => Some(contents),
                    _ => None,
                }
            }

            pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                match self.sections[self.index.$slot?].payload_mut() {
                    Payload::$variant(contents) => Some(contents),
                    _ => None,
                }
            }
        )*
    };
}

impl Module {
    pub fn new(sections: Vec<Section>) -> Self {
        let index = SectionIndex::build(&sections);
        Self {
            version: VERSION,
            sections,
            index,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_index(&self) -> &SectionIndex {
        &self.index
    }

    /// Inserts `section` at position `pos` of the section list.
    pub fn insert_section(&mut self, pos: usize, section: Section) {
        self.sections.insert(pos, section);
        self.index = SectionIndex::build(&self.sections);
    }

    section_accessors! {
        types, types_mut, types, Type => Vec<FuncType>;
        imports, imports_mut, imports, Import => Vec<ImportEntry>;
        functions, functions_mut, functions, Function => Vec<u32>;
        tables, tables_mut, tables, Table => Vec<TableType>;
        memories, memories_mut, memories, Memory => Vec<MemoryType>;
        globals, globals_mut, globals, Global => Vec<GlobalEntry>;
        exports, exports_mut, exports, Export => Vec<ExportEntry>;
        start, start_mut, start, Start => u32;
        elements, elements_mut, elements, Element => Vec<ElementSegment>;
        code, code_mut, code, Code => Vec<FunctionBody>;
        data, data_mut, data, Data => Vec<DataSegment>;
        data_count, data_count_mut, data_count, DataCount => u32;
    }

    pub fn customs(&self) -> impl Iterator<Item = &CustomSection> {
        self.index
            .customs
            .iter()
            .filter_map(|&pos| match self.sections[pos].payload() {
                Payload::Custom(custom) => Some(custom),
                _ => None,
            })
    }

    /// First custom section called `name`.
    pub fn custom(&self, name: &str) -> Option<&CustomSection> {
        self.customs().find(|custom| custom.name == name)
    }

    /// First export called `name`.
    pub fn export(&self, name: &str) -> Option<&ExportEntry> {
        self.exports()?.iter().find(|export| export.name == name)
    }

    /// Number of imports of the given kind.
    pub fn num_imported(&self, kind: ExternalKind) -> u32 {
        self.imports()
            .map(|imports| {
                imports
                    .iter()
                    .filter(|import| import.kind.external_kind() == kind)
                    .count() as u32
            })
            .unwrap_or(0)
    }

    pub fn num_imported_functions(&self) -> u32 {
        self.num_imported(ExternalKind::Function)
    }

    /// The function index space: imported functions, then defined ones.
    pub fn function_index_space(&self) -> Vec<FunctionRef> {
        let imported = self.imports().into_iter().flatten().enumerate().filter_map(
            |(import, entry)| match entry.kind {
                ImportKind::Function(type_index) => Some(FunctionRef::Imported { import, type_index }),
                _ => None,
            },
        );
        let defined = self
            .functions()
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(defined, &type_index)| FunctionRef::Defined {
                defined,
                type_index,
            });
        imported.chain(defined).collect()
    }

    /// Signature of the function at `func_index` in the function index space.
    pub fn function_type(&self, func_index: u32) -> Option<&FuncType> {
        let function = *self.function_index_space().get(func_index as usize)?;
        self.types()?.get(function.type_index() as usize)
    }
}
