//! Section encoder.

use super::*;
use crate::binary::Writer;

/// Encodes `module` back into its binary form.
///
/// Unmodified sections are copied from their original bytes; modified and
/// synthesized sections are re-encoded with a recomputed size.
pub fn encode_module(module: &Module) -> Vec<u8> {
    let mut w = Writer::new();
    w.write(&MAGIC);
    w.write_u32_le(module.version());
    for section in module.sections() {
        if section.is_modified() {
            let mut payload = Writer::new();
            encode_payload(section.payload(), &mut payload);
            let payload = payload.into_inner();
            tracing::trace!(id = ?section.id(), size = payload.len(), "re-encoded section");
            w.write_u8(section.id() as u8);
            w.write_bytes_vec(&payload);
        } else {
            w.write(section.raw());
        }
    }
    w.into_inner()
}

fn write_vec<T>(w: &mut Writer, items: &[T], mut item: impl FnMut(&mut Writer, &T)) {
    w.write_var_u32(items.len() as u32);
    for entry in items {
        item(w, entry);
    }
}

fn encode_payload(payload: &Payload, w: &mut Writer) {
    match payload {
        Payload::Custom(custom) => {
            w.write_name(&custom.name);
            w.write(&custom.data);
        }
        Payload::Type(types) => write_vec(w, types, write_func_type),
        Payload::Import(imports) => write_vec(w, imports, write_import),
        Payload::Function(functions) => write_vec(w, functions, |w, idx| w.write_var_u32(*idx)),
        Payload::Table(tables) => write_vec(w, tables, write_table_type),
        Payload::Memory(memories) => write_vec(w, memories, |w, mem| write_limits(w, &mem.limits)),
        Payload::Global(globals) => write_vec(w, globals, |w, global| {
            write_global_type(w, &global.ty);
            w.write(global.init.bytes());
        }),
        Payload::Export(exports) => write_vec(w, exports, |w, export| {
            w.write_name(&export.name);
            w.write_u8(export.kind as u8);
            w.write_var_u32(export.index);
        }),
        Payload::Start(idx) | Payload::DataCount(idx) => w.write_var_u32(*idx),
        Payload::Element(segments) => write_vec(w, segments, write_element),
        Payload::Code(bodies) => write_vec(w, bodies, write_function_body),
        Payload::Data(segments) => write_vec(w, segments, write_data),
    }
}

fn write_func_type(w: &mut Writer, ty: &FuncType) {
    w.write_u8(ty.form);
    write_vec(w, &ty.params, |w, v| w.write_u8(v.to_byte()));
    write_vec(w, &ty.results, |w, v| w.write_u8(v.to_byte()));
}

fn write_limits(w: &mut Writer, limits: &Limits) {
    w.write_u8(limits.flags);
    let index64 = limits.flags & Limits::INDEX64 != 0;
    let bound = |w: &mut Writer, value: u64| {
        if index64 {
            w.write_var_u64(value);
        } else {
            w.write_var_u32(value as u32);
        }
    };
    bound(w, limits.min);
    if let Some(max) = limits.max {
        bound(w, max);
    }
}

fn write_table_type(w: &mut Writer, table: &TableType) {
    w.write_u8(table.elem_type.to_byte());
    write_limits(w, &table.limits);
}

fn write_global_type(w: &mut Writer, global: &GlobalType) {
    w.write_u8(global.content.to_byte());
    w.write_u8(u8::from(global.mutable));
}

fn write_import(w: &mut Writer, import: &ImportEntry) {
    w.write_name(&import.module);
    w.write_name(&import.field);
    w.write_u8(import.kind.external_kind() as u8);
    match &import.kind {
        ImportKind::Function(type_index) => w.write_var_u32(*type_index),
        ImportKind::Table(table) => write_table_type(w, table),
        ImportKind::Memory(memory) => write_limits(w, &memory.limits),
        ImportKind::Global(global) => write_global_type(w, global),
    }
}

fn write_element(w: &mut Writer, segment: &ElementSegment) {
    w.write_var_u32(segment.flags);
    if segment.has_explicit_table() {
        w.write_var_u32(segment.table);
    }
    if let Some(offset) = &segment.offset {
        w.write(offset.bytes());
    }
    if let Some(elem_type) = segment.elem_type {
        w.write_u8(elem_type);
    }
    match &segment.items {
        ElementItems::Functions(indices) => write_vec(w, indices, |w, idx| w.write_var_u32(*idx)),
        ElementItems::Expressions(exprs) => write_vec(w, exprs, |w, expr| w.write(expr.bytes())),
    }
}

fn write_data(w: &mut Writer, segment: &DataSegment) {
    w.write_var_u32(segment.flags);
    if segment.flags == 2 {
        w.write_var_u32(segment.memory);
    }
    if let Some(offset) = &segment.offset {
        w.write(offset.bytes());
    }
    w.write_bytes_vec(&segment.data);
}

fn write_function_body(w: &mut Writer, body: &FunctionBody) {
    let mut inner = Writer::new();
    write_vec(&mut inner, &body.locals, |w, (count, ty)| {
        w.write_var_u32(*count);
        w.write_u8(ty.to_byte());
    });
    inner.write(&body.code);
    w.write_bytes_vec(&inner.into_inner());
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    #[test]
    fn untouched_sections_keep_their_bytes() {
        let mut bytes = HEADER.to_vec();
        // function section with a padded count: 0x80 0x00 encodes 0
        bytes.extend_from_slice(&[0x03, 0x02, 0x80, 0x00]);
        // custom section "x"
        bytes.extend_from_slice(&[0x00, 0x04, 0x01, b'x', 0xde, 0xad]);
        let module = decode_module(&bytes).unwrap();
        assert_eq!(encode_module(&module), bytes);
    }

    #[test]
    fn modified_sections_are_re_encoded_canonically() {
        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(&[0x03, 0x02, 0x80, 0x00]);
        let mut module = decode_module(&bytes).unwrap();
        module.functions_mut().unwrap().push(0);
        let mut expected = HEADER.to_vec();
        expected.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        assert_eq!(encode_module(&module), expected);
    }

    #[test]
    fn synthesized_sections_encode_every_payload_kind() {
        let i32_const_0 = ConstExpr::from_bytes(vec![0x41, 0x00, 0x0b]);
        let module = Module::new(vec![
            Section::synthesized(Payload::Type(vec![FuncType::new(
                vec![ValType::I32],
                vec![],
            )])),
            Section::synthesized(Payload::Import(vec![ImportEntry {
                module: "env".into(),
                field: "t".into(),
                kind: ImportKind::Table(TableType {
                    elem_type: ValType::FuncRef,
                    limits: Limits {
                        flags: Limits::HAS_MAX,
                        min: 1,
                        max: Some(2),
                    },
                }),
            }])),
            Section::synthesized(Payload::Function(vec![0])),
            Section::synthesized(Payload::Global(vec![GlobalEntry {
                ty: GlobalType {
                    content: ValType::I32,
                    mutable: true,
                },
                init: i32_const_0.clone(),
            }])),
            Section::synthesized(Payload::Export(vec![ExportEntry {
                name: "f".into(),
                kind: ExternalKind::Function,
                index: 0,
            }])),
            Section::synthesized(Payload::Start(0)),
            Section::synthesized(Payload::Element(vec![ElementSegment {
                flags: 2,
                table: 0,
                offset: Some(i32_const_0.clone()),
                elem_type: Some(0x00),
                items: ElementItems::Functions(vec![0]),
            }])),
            Section::synthesized(Payload::DataCount(1)),
            Section::synthesized(Payload::Code(vec![FunctionBody {
                locals: vec![(2, ValType::I64)],
                code: vec![0x0b],
                code_offset: 0,
            }])),
            Section::synthesized(Payload::Data(vec![DataSegment {
                flags: 1,
                memory: 0,
                offset: None,
                data: b"hi".to_vec(),
            }])),
        ]);
        let bytes = encode_module(&module);
        let decoded = decode_module(&bytes).unwrap();
        assert_eq!(decoded.sections().len(), module.sections().len());
        for (a, b) in module.sections().iter().zip(decoded.sections()) {
            if a.id() != SectionId::Code {
                assert_eq!(a.payload(), b.payload());
            }
        }
        let body = &decoded.code().unwrap()[0];
        assert_eq!(body.locals, vec![(2, ValType::I64)]);
        assert_eq!(body.code, vec![0x0b]);
        // decoded sections are unmodified, so re-encoding is the identity
        assert_eq!(encode_module(&decoded), bytes);
    }

    #[test]
    fn memory64_limits_use_wide_bounds() {
        let mut w = Writer::new();
        write_limits(
            &mut w,
            &Limits {
                flags: Limits::INDEX64,
                min: 1 << 33,
                max: None,
            },
        );
        let bytes = w.into_inner();
        assert_eq!(bytes[0], Limits::INDEX64);
        assert_eq!(bytes.len(), 1 + 5);
    }
}
