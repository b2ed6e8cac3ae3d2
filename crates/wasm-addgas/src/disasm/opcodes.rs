//! Opcode table: mnemonic and immediate layout for every supported opcode.

pub const BLOCK: u8 = 0x02;
pub const LOOP: u8 = 0x03;
pub const IF: u8 = 0x04;
pub const ELSE: u8 = 0x05;
pub const END: u8 = 0x0b;
pub const CALL: u8 = 0x10;
pub const RETURN_CALL: u8 = 0x12;
pub const I32_CONST: u8 = 0x41;
pub const REF_FUNC: u8 = 0xd2;

/// Prefix byte of the saturating-truncation, bulk-memory and table opcodes.
pub const PREFIX_FC: u8 = 0xfc;

/// Shape of the immediates that follow an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateKind {
    None,
    BlockType,
    Index,
    BrTable,
    CallIndirect,
    MemArg,
    I32,
    I64,
    F32,
    F64,
    ValTypes,
    HeapType,
    IndexPair,
}

const MEMORY_OPS: [&str; 23] = [
    "i32.load",
    "i64.load",
    "f32.load",
    "f64.load",
    "i32.load8_s",
    "i32.load8_u",
    "i32.load16_s",
    "i32.load16_u",
    "i64.load8_s",
    "i64.load8_u",
    "i64.load16_s",
    "i64.load16_u",
    "i64.load32_s",
    "i64.load32_u",
    "i32.store",
    "i64.store",
    "f32.store",
    "f64.store",
    "i32.store8",
    "i32.store16",
    "i64.store8",
    "i64.store16",
    "i64.store32",
];

// 0x45 ..= 0xc4, none of which take immediates.
const NUMERIC_OPS: [&str; 128] = [
    "i32.eqz", "i32.eq", "i32.ne", "i32.lt_s", "i32.lt_u", "i32.gt_s", "i32.gt_u", "i32.le_s",
    "i32.le_u", "i32.ge_s", "i32.ge_u", "i64.eqz", "i64.eq", "i64.ne", "i64.lt_s", "i64.lt_u",
    "i64.gt_s", "i64.gt_u", "i64.le_s", "i64.le_u", "i64.ge_s", "i64.ge_u", "f32.eq", "f32.ne",
    "f32.lt", "f32.gt", "f32.le", "f32.ge", "f64.eq", "f64.ne", "f64.lt", "f64.gt", "f64.le",
    "f64.ge", "i32.clz", "i32.ctz", "i32.popcnt", "i32.add", "i32.sub", "i32.mul", "i32.div_s",
    "i32.div_u", "i32.rem_s", "i32.rem_u", "i32.and", "i32.or", "i32.xor", "i32.shl",
    "i32.shr_s", "i32.shr_u", "i32.rotl", "i32.rotr", "i64.clz", "i64.ctz", "i64.popcnt",
    "i64.add", "i64.sub", "i64.mul", "i64.div_s", "i64.div_u", "i64.rem_s", "i64.rem_u",
    "i64.and", "i64.or", "i64.xor", "i64.shl", "i64.shr_s", "i64.shr_u", "i64.rotl", "i64.rotr",
    "f32.abs", "f32.neg", "f32.ceil", "f32.floor", "f32.trunc", "f32.nearest", "f32.sqrt",
    "f32.add", "f32.sub", "f32.mul", "f32.div", "f32.min", "f32.max", "f32.copysign", "f64.abs",
    "f64.neg", "f64.ceil", "f64.floor", "f64.trunc", "f64.nearest", "f64.sqrt", "f64.add",
    "f64.sub", "f64.mul", "f64.div", "f64.min", "f64.max", "f64.copysign", "i32.wrap_i64",
    "i32.trunc_f32_s", "i32.trunc_f32_u", "i32.trunc_f64_s", "i32.trunc_f64_u",
    "i64.extend_i32_s", "i64.extend_i32_u", "i64.trunc_f32_s", "i64.trunc_f32_u",
    "i64.trunc_f64_s", "i64.trunc_f64_u", "f32.convert_i32_s", "f32.convert_i32_u",
    "f32.convert_i64_s", "f32.convert_i64_u", "f32.demote_f64", "f64.convert_i32_s",
    "f64.convert_i32_u", "f64.convert_i64_s", "f64.convert_i64_u", "f64.promote_f32",
    "i32.reinterpret_f32", "i64.reinterpret_f64", "f32.reinterpret_i32", "f64.reinterpret_i64",
    "i32.extend8_s", "i32.extend16_s", "i64.extend8_s", "i64.extend16_s", "i64.extend32_s",
];

/// Looks up a single-byte opcode.
pub fn lookup(byte: u8) -> Option<(&'static str, ImmediateKind)> {
    use ImmediateKind::*;
    let entry = match byte {
        0x00 => ("unreachable", None),
        0x01 => ("nop", None),
        0x02 => ("block", BlockType),
        0x03 => ("loop", BlockType),
        0x04 => ("if", BlockType),
        0x05 => ("else", None),
        0x0b => ("end", None),
        0x0c => ("br", Index),
        0x0d => ("br_if", Index),
        0x0e => ("br_table", BrTable),
        0x0f => ("return", None),
        0x10 => ("call", Index),
        0x11 => ("call_indirect", CallIndirect),
        0x12 => ("return_call", Index),
        0x13 => ("return_call_indirect", CallIndirect),
        0x1a => ("drop", None),
        0x1b => ("select", None),
        0x1c => ("select", ValTypes),
        0x20 => ("local.get", Index),
        0x21 => ("local.set", Index),
        0x22 => ("local.tee", Index),
        0x23 => ("global.get", Index),
        0x24 => ("global.set", Index),
        0x25 => ("table.get", Index),
        0x26 => ("table.set", Index),
        0x28..=0x3e => (MEMORY_OPS[usize::from(byte - 0x28)], MemArg),
        0x3f => ("memory.size", Index),
        0x40 => ("memory.grow", Index),
        0x41 => ("i32.const", I32),
        0x42 => ("i64.const", I64),
        0x43 => ("f32.const", F32),
        0x44 => ("f64.const", F64),
        0x45..=0xc4 => (NUMERIC_OPS[usize::from(byte - 0x45)], None),
        0xd0 => ("ref.null", HeapType),
        0xd1 => ("ref.is_null", None),
        0xd2 => ("ref.func", Index),
        _ => return Option::None,
    };
    Some(entry)
}

/// Looks up a `0xfc`-prefixed opcode by its sub-opcode.
pub fn lookup_fc(sub: u32) -> Option<(&'static str, ImmediateKind)> {
    use ImmediateKind::*;
    let entry = match sub {
        0 => ("i32.trunc_sat_f32_s", None),
        1 => ("i32.trunc_sat_f32_u", None),
        2 => ("i32.trunc_sat_f64_s", None),
        3 => ("i32.trunc_sat_f64_u", None),
        4 => ("i64.trunc_sat_f32_s", None),
        5 => ("i64.trunc_sat_f32_u", None),
        6 => ("i64.trunc_sat_f64_s", None),
        7 => ("i64.trunc_sat_f64_u", None),
        8 => ("memory.init", IndexPair),
        9 => ("data.drop", Index),
        10 => ("memory.copy", IndexPair),
        11 => ("memory.fill", Index),
        12 => ("table.init", IndexPair),
        13 => ("elem.drop", Index),
        14 => ("table.copy", IndexPair),
        15 => ("table.grow", Index),
        16 => ("table.size", Index),
        17 => ("table.fill", Index),
        _ => return Option::None,
    };
    Some(entry)
}
