//! Section decoder.

use super::*;
use crate::binary::Cursor;
use crate::disasm;
use crate::error::{Error, Result};

/// Decodes a binary module without modifying anything.
///
/// Every section keeps its raw bytes, so [`encode_module`] reproduces the
/// input exactly as long as nothing is mutated in between.
pub fn decode_module(bytes: &[u8]) -> Result<Module> {
    let mut cursor = Cursor::new(bytes);
    let magic = cursor.read(4)?;
    if magic != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(Error::BadMagic { found });
    }
    let version = cursor.read_u32_le()?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let mut sections = Vec::new();
    let mut last_rank = None;
    while !cursor.is_empty() {
        let start = cursor.position();
        let id_byte = cursor.read_u8()?;
        let id = SectionId::from_u8(id_byte).ok_or_else(|| Error::MalformedSection {
            id: id_byte,
            offset: start,
            reason: "unknown section id".into(),
        })?;
        if let Some(rank) = id.rank() {
            if last_rank.is_some_and(|last| last >= rank) {
                return Err(malformed(id, start, "section out of order or duplicated"));
            }
            last_rank = Some(rank);
        }

        let size = cursor
            .read_var_u32()
            .map_err(|e| {
                e.map_unexpected_end(|offset| malformed(id, offset, "missing section size"))
            })? as usize;
        let payload_start = cursor.position();
        let mut payload_cursor = cursor.sub(size).map_err(|e| {
            e.map_unexpected_end(|_| {
                malformed(
                    id,
                    payload_start,
                    &format!("declared size {size} exceeds the remaining input"),
                )
            })
        })?;
        let payload = decode_payload(id, &mut payload_cursor).map_err(|e| {
            e.map_unexpected_end(|offset| malformed(id, offset, "payload ends before its contents"))
        })?;
        if !payload_cursor.is_empty() {
            return Err(malformed(
                id,
                payload_cursor.position(),
                &format!("{} unread payload bytes", payload_cursor.remaining()),
            ));
        }

        let end = cursor.position();
        tracing::trace!(?id, offset = start, size, "decoded section");
        sections.push(Section::decoded(
            payload,
            payload_start..end,
            bytes[start..end].to_vec(),
        ));
    }

    tracing::debug!(sections = sections.len(), "decoded module");
    Ok(Module::new(sections))
}

fn malformed(id: SectionId, offset: usize, reason: &str) -> Error {
    Error::MalformedSection {
        id: id as u8,
        offset,
        reason: reason.to_string(),
    }
}

fn decode_payload(id: SectionId, c: &mut Cursor<'_>) -> Result<Payload> {
    Ok(match id {
        SectionId::Custom => {
            let name = read_name(id, c)?;
            let data = c.read(c.remaining())?.to_vec();
            Payload::Custom(CustomSection { name, data })
        }
        SectionId::Type => Payload::Type(read_vec(c, |c| read_func_type(id, c))?),
        SectionId::Import => Payload::Import(read_vec(c, |c| read_import(id, c))?),
        SectionId::Function => Payload::Function(read_vec(c, |c| c.read_var_u32())?),
        SectionId::Table => Payload::Table(read_vec(c, |c| read_table_type(id, c))?),
        SectionId::Memory => Payload::Memory(read_vec(c, |c| {
            Ok(MemoryType {
                limits: read_limits(id, c)?,
            })
        })?),
        SectionId::Global => Payload::Global(read_vec(c, |c| {
            let ty = read_global_type(id, c)?;
            let init = read_const_expr(id, c)?;
            Ok(GlobalEntry { ty, init })
        })?),
        SectionId::Export => Payload::Export(read_vec(c, |c| read_export(id, c))?),
        SectionId::Start => Payload::Start(c.read_var_u32()?),
        SectionId::Element => Payload::Element(read_vec(c, |c| read_element(id, c))?),
        SectionId::Code => Payload::Code(read_vec(c, read_function_body)?),
        SectionId::Data => Payload::Data(read_vec(c, |c| read_data(id, c))?),
        SectionId::DataCount => Payload::DataCount(c.read_var_u32()?),
    })
}

fn read_vec<'a, T>(
    c: &mut Cursor<'a>,
    mut item: impl FnMut(&mut Cursor<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    let count = c.read_var_u32()? as usize;
    let mut items = Vec::with_capacity(count.min(c.remaining()));
    for _ in 0..count {
        items.push(item(c)?);
    }
    Ok(items)
}

fn read_name(id: SectionId, c: &mut Cursor<'_>) -> Result<String> {
    let offset = c.position();
    let bytes = c.read_bytes_vec()?;
    String::from_utf8(bytes.to_vec()).map_err(|_| malformed(id, offset, "name is not valid UTF-8"))
}

fn read_val_type(id: SectionId, c: &mut Cursor<'_>) -> Result<ValType> {
    let offset = c.position();
    let byte = c.read_u8()?;
    ValType::from_byte(byte).ok_or_else(|| malformed(id, offset, "invalid value type"))
}

fn read_func_type(id: SectionId, c: &mut Cursor<'_>) -> Result<FuncType> {
    let offset = c.position();
    let form = c.read_u8()?;
    if form != FUNC_FORM {
        return Err(malformed(id, offset, "unsupported type form"));
    }
    let params = read_vec(c, |c| read_val_type(id, c))?;
    let results = read_vec(c, |c| read_val_type(id, c))?;
    Ok(FuncType {
        form,
        params,
        results,
    })
}

fn read_limits(id: SectionId, c: &mut Cursor<'_>) -> Result<Limits> {
    let offset = c.position();
    let flags = c.read_u8()?;
    if flags & !(Limits::HAS_MAX | Limits::SHARED | Limits::INDEX64) != 0 {
        return Err(malformed(id, offset, "invalid limits flags"));
    }
    let read = |c: &mut Cursor<'_>| -> Result<u64> {
        if flags & Limits::INDEX64 != 0 {
            c.read_var_u64()
        } else {
            c.read_var_u32().map(u64::from)
        }
    };
    let min = read(c)?;
    let max = if flags & Limits::HAS_MAX != 0 {
        Some(read(c)?)
    } else {
        None
    };
    Ok(Limits { flags, min, max })
}

fn read_table_type(id: SectionId, c: &mut Cursor<'_>) -> Result<TableType> {
    let elem_type = read_val_type(id, c)?;
    let limits = read_limits(id, c)?;
    Ok(TableType { elem_type, limits })
}

fn read_global_type(id: SectionId, c: &mut Cursor<'_>) -> Result<GlobalType> {
    let content = read_val_type(id, c)?;
    let offset = c.position();
    let mutable = match c.read_u8()? {
        0 => false,
        1 => true,
        _ => return Err(malformed(id, offset, "invalid global mutability")),
    };
    Ok(GlobalType { content, mutable })
}

fn read_import(id: SectionId, c: &mut Cursor<'_>) -> Result<ImportEntry> {
    let module = read_name(id, c)?;
    let field = read_name(id, c)?;
    let offset = c.position();
    let kind = match ExternalKind::from_byte(c.read_u8()?) {
        Some(ExternalKind::Function) => ImportKind::Function(c.read_var_u32()?),
        Some(ExternalKind::Table) => ImportKind::Table(read_table_type(id, c)?),
        Some(ExternalKind::Memory) => ImportKind::Memory(MemoryType {
            limits: read_limits(id, c)?,
        }),
        Some(ExternalKind::Global) => ImportKind::Global(read_global_type(id, c)?),
        None => return Err(malformed(id, offset, "invalid import kind")),
    };
    Ok(ImportEntry {
        module,
        field,
        kind,
    })
}

fn read_export(id: SectionId, c: &mut Cursor<'_>) -> Result<ExportEntry> {
    let name = read_name(id, c)?;
    let offset = c.position();
    let kind = ExternalKind::from_byte(c.read_u8()?)
        .ok_or_else(|| malformed(id, offset, "invalid export kind"))?;
    let index = c.read_var_u32()?;
    Ok(ExportEntry { name, kind, index })
}

/// Reads a constant expression through the instruction codec, keeping its
/// raw bytes.
fn read_const_expr(id: SectionId, c: &mut Cursor<'_>) -> Result<ConstExpr> {
    let expr = disasm::disassemble_expr(c).map_err(|e| match e {
        Error::TruncatedBody { offset } => malformed(id, offset, "truncated constant expression"),
        other => other,
    })?;
    Ok(ConstExpr::from_bytes(expr.code().to_vec()))
}

fn read_element(id: SectionId, c: &mut Cursor<'_>) -> Result<ElementSegment> {
    let offset = c.position();
    let flags = c.read_var_u32()?;
    if flags > 7 {
        return Err(malformed(id, offset, "invalid element segment flags"));
    }
    let mut segment = ElementSegment {
        flags,
        table: 0,
        offset: None,
        elem_type: None,
        items: ElementItems::Functions(Vec::new()),
    };
    if segment.has_explicit_table() {
        segment.table = c.read_var_u32()?;
    }
    if segment.is_active() {
        segment.offset = Some(read_const_expr(id, c)?);
    }
    if segment.has_elem_type() {
        segment.elem_type = Some(c.read_u8()?);
    }
    segment.items = if segment.uses_expressions() {
        ElementItems::Expressions(read_vec(c, |c| read_const_expr(id, c))?)
    } else {
        ElementItems::Functions(read_vec(c, |c| c.read_var_u32())?)
    };
    Ok(segment)
}

fn read_data(id: SectionId, c: &mut Cursor<'_>) -> Result<DataSegment> {
    let offset = c.position();
    let flags = c.read_var_u32()?;
    let (memory, offset_expr) = match flags {
        0 => (0, Some(read_const_expr(id, c)?)),
        1 => (0, None),
        2 => {
            let memory = c.read_var_u32()?;
            (memory, Some(read_const_expr(id, c)?))
        }
        _ => return Err(malformed(id, offset, "invalid data segment flags")),
    };
    let data = c.read_bytes_vec()?.to_vec();
    Ok(DataSegment {
        flags,
        memory,
        offset: offset_expr,
        data,
    })
}

fn read_function_body(c: &mut Cursor<'_>) -> Result<FunctionBody> {
    let id = SectionId::Code;
    let size = c.read_var_u32()? as usize;
    let size_offset = c.position();
    let mut body = c.sub(size).map_err(|e| {
        e.map_unexpected_end(|_| malformed(id, size_offset, "function body exceeds the section"))
    })?;
    let locals = read_vec(&mut body, |c| {
        let count = c.read_var_u32()?;
        let ty = read_val_type(id, c)?;
        Ok((count, ty))
    })?;
    let code_offset = body.position();
    let code = body.read(body.remaining())?.to_vec();
    Ok(FunctionBody {
        locals,
        code,
        code_offset,
    })
}
