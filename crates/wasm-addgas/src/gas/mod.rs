//! Gas instrumentation pass.
//!
//! Adds a host import `(i32) -> ()` to the module and makes every function
//! body call it on entry. The new import takes function index `p`, the number
//! of function imports the module had before, so every function-space index
//! at or above `p` moves up by one. [`shift`] implements that rule and is the
//! only place it is written down.

mod cost;

pub use cost::{ConstantCost, CostModel, PerInstructionCost};

use crate::disasm::{self, Disassembly, Immediate, Instruction};
use crate::error::{Error, Result};
use crate::module::{
    ConstExpr, ElementItems, ElementSegment, ExternalKind, FuncType, ImportEntry, ImportKind,
    Module, Payload, Section, ValType,
};

/// Configuration of the gas import and the default cost policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasConfig {
    /// Module name of the gas import.
    pub module: String,
    /// Field name of the gas import.
    pub field: String,
    /// Gas charged per body, or per instruction when `per_instruction` is set.
    pub cost: i32,
    pub per_instruction: bool,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            module: "env".to_string(),
            field: "addgas".to_string(),
            cost: 1,
            per_instruction: false,
        }
    }
}

impl GasConfig {
    /// The cost policy described by this configuration.
    pub fn cost_model(&self) -> Box<dyn CostModel> {
        if self.per_instruction {
            Box::new(PerInstructionCost { unit: self.cost })
        } else {
            Box::new(ConstantCost(self.cost))
        }
    }
}

/// An instrumented module.
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub module: Module,
    /// Function index of the inserted gas import.
    pub gas_function: u32,
}

/// Moves `index` by `delta` if it lies at or above `insertion_point`.
pub fn shift(index: u32, insertion_point: u32, delta: u32) -> u32 {
    if index >= insertion_point {
        index.saturating_add(delta)
    } else {
        index
    }
}

/// Runs the pass over `module`.
///
/// The module is consumed; on error nothing of it is returned, so a failed
/// pass never leaves a half-rewritten module behind.
pub fn instrument(
    mut module: Module,
    config: &GasConfig,
    costs: &dyn CostModel,
) -> Result<Instrumented> {
    let bodies = module.code().ok_or(Error::NoCodeSection)?.len();
    let declared = module.functions().map_or(0, Vec::len);
    if declared != bodies {
        return Err(Error::FunctionCountMismatch { declared, bodies });
    }

    ensure_anchor_sections(&mut module);
    let type_index = reserve_gas_type(&mut module);
    let gas_function = module.num_imported_functions();
    if let Some(imports) = module.imports_mut() {
        imports.push(ImportEntry {
            module: config.module.clone(),
            field: config.field.clone(),
            kind: ImportKind::Function(type_index),
        });
    }
    tracing::debug!(
        module = %config.module,
        field = %config.field,
        gas_function,
        type_index,
        "inserted gas import"
    );

    shift_module_references(&mut module, gas_function)?;
    inject_prologues(&mut module, gas_function, costs)?;
    check_indices(&module)?;

    Ok(Instrumented {
        module,
        gas_function,
    })
}

/// Synthesizes a Types section at position 0 and an Import section right
/// after it, when missing.
fn ensure_anchor_sections(module: &mut Module) {
    if module.section_index().types.is_none() {
        tracing::debug!("synthesizing type section");
        module.insert_section(0, Section::synthesized(Payload::Type(Vec::new())));
    }
    if module.section_index().imports.is_none() {
        let pos = module.section_index().types.map_or(0, |pos| pos + 1);
        tracing::debug!(pos, "synthesizing import section");
        module.insert_section(pos, Section::synthesized(Payload::Import(Vec::new())));
    }
}

/// Index of the first `(i32) -> ()` signature, appending one if needed.
fn reserve_gas_type(module: &mut Module) -> u32 {
    let gas_type = FuncType::new(vec![ValType::I32], vec![]);
    let existing = module
        .types()
        .and_then(|types| types.iter().position(|ty| *ty == gas_type));
    if let Some(index) = existing {
        tracing::debug!(index, "reusing gas signature");
        return index as u32;
    }
    match module.types_mut() {
        Some(types) => {
            types.push(gas_type);
            let index = types.len() - 1;
            tracing::debug!(index, "appended gas signature");
            index as u32
        }
        None => 0,
    }
}

/// Shifts function references outside the code section. Sections are only
/// touched when something in them actually moves.
fn shift_module_references(module: &mut Module, p: u32) -> Result<()> {
    if let Some(exports) = module.exports() {
        let moves = exports
            .iter()
            .any(|e| e.kind == ExternalKind::Function && e.index >= p);
        if moves {
            for export in module.exports_mut().into_iter().flatten() {
                if export.kind == ExternalKind::Function {
                    export.index = shift(export.index, p, 1);
                }
            }
        }
    }

    if let Some(&start) = module.start() {
        if start >= p {
            if let Some(start) = module.start_mut() {
                *start = shift(*start, p, 1);
            }
        }
    }

    if let Some(segments) = module.elements() {
        let shifted = segments
            .iter()
            .map(|segment| shift_segment(segment, p))
            .collect::<Result<Vec<_>>>()?;
        if shifted != *segments {
            if let Some(segments) = module.elements_mut() {
                *segments = shifted;
            }
        }
    }

    if let Some(globals) = module.globals() {
        let shifted = globals
            .iter()
            .map(|global| shift_const_expr(&global.init, p))
            .collect::<Result<Vec<_>>>()?;
        let moves = shifted.iter().zip(globals).any(|(init, g)| *init != g.init);
        if moves {
            for (global, init) in module.globals_mut().into_iter().flatten().zip(shifted) {
                global.init = init;
            }
        }
    }
    Ok(())
}

fn shift_segment(segment: &ElementSegment, p: u32) -> Result<ElementSegment> {
    let items = match &segment.items {
        ElementItems::Functions(indices) => {
            ElementItems::Functions(indices.iter().map(|&idx| shift(idx, p, 1)).collect())
        }
        ElementItems::Expressions(exprs) => ElementItems::Expressions(
            exprs
                .iter()
                .map(|expr| shift_const_expr(expr, p))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(ElementSegment {
        items,
        ..segment.clone()
    })
}

fn shift_const_expr(expr: &ConstExpr, p: u32) -> Result<ConstExpr> {
    let mut instructions = disasm::disassemble(expr.bytes())?;
    shift_function_references(&mut instructions, p);
    Ok(ConstExpr::from_bytes(instructions.assemble()))
}

fn shift_function_references(instructions: &mut Disassembly<'_>, p: u32) {
    for instr in instructions.iter_mut() {
        if let Some(idx) = instr.function_index() {
            instr.set_immediate(Immediate::Index(shift(idx, p, 1)));
        }
    }
}

/// Rewrites every body: shift call targets, then prepend the gas call.
fn inject_prologues(module: &mut Module, gas_function: u32, costs: &dyn CostModel) -> Result<()> {
    let total = function_count(module);
    let Some(bodies) = module.code_mut() else {
        return Err(Error::NoCodeSection);
    };
    for (defined, body) in bodies.iter_mut().enumerate() {
        let mut instructions = disasm::disassemble_at(&body.code, body.code_offset)?;
        let cost = costs.body_cost(instructions.instructions());
        shift_function_references(&mut instructions, gas_function);
        for instr in instructions.instructions() {
            if let Some(idx) = instr.function_index() {
                check_function_index(idx, total, || format!("body of defined function {defined}"))?;
            }
        }
        instructions.prepend(vec![Instruction::i32_const(cost), Instruction::call(gas_function)]);
        let code = instructions.assemble();
        tracing::trace!(defined, cost, size = code.len(), "rewrote body");
        body.code = code;
    }
    tracing::debug!(bodies = bodies.len(), "instrumented function bodies");
    Ok(())
}

fn function_count(module: &Module) -> u32 {
    module.num_imported_functions() + module.functions().map_or(0, |f| f.len() as u32)
}

fn check_function_index(index: u32, len: u32, context: impl FnOnce() -> String) -> Result<()> {
    check_index("function", index, len, context)
}

fn check_index(
    space: &'static str,
    index: u32,
    len: u32,
    context: impl FnOnce() -> String,
) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::IndexOutOfRange {
            space,
            index,
            len,
            context: context(),
        })
    }
}

/// Function references found in a constant expression.
fn const_expr_functions(expr: &ConstExpr) -> Result<Vec<u32>> {
    let instructions = disasm::disassemble(expr.bytes())?;
    Ok(instructions
        .instructions()
        .iter()
        .filter_map(Instruction::function_index)
        .collect())
}

/// Verifies that every reference outside the code section resolves.
fn check_indices(module: &Module) -> Result<()> {
    let types = module.types().map_or(0, |t| t.len() as u32);
    let functions = function_count(module);

    for import in module.imports().into_iter().flatten() {
        if let ImportKind::Function(type_index) = import.kind {
            check_index("type", type_index, types, || {
                format!("import {}.{}", import.module, import.field)
            })?;
        }
    }
    for (defined, &type_index) in module.functions().into_iter().flatten().enumerate() {
        check_index("type", type_index, types, || {
            format!("declaration of defined function {defined}")
        })?;
    }
    for export in module.exports().into_iter().flatten() {
        if export.kind == ExternalKind::Function {
            check_function_index(export.index, functions, || format!("export {:?}", export.name))?;
        }
    }
    if let Some(&start) = module.start() {
        check_function_index(start, functions, || "start function".to_string())?;
    }
    for (n, segment) in module.elements().into_iter().flatten().enumerate() {
        let indices = match &segment.items {
            ElementItems::Functions(indices) => indices.clone(),
            ElementItems::Expressions(exprs) => {
                let mut indices = Vec::new();
                for expr in exprs {
                    indices.extend(const_expr_functions(expr)?);
                }
                indices
            }
        };
        for index in indices {
            check_function_index(index, functions, || format!("element segment {n}"))?;
        }
    }
    for (n, global) in module.globals().into_iter().flatten().enumerate() {
        for index in const_expr_functions(&global.init)? {
            check_function_index(index, functions, || format!("initializer of global {n}"))?;
        }
    }
    Ok(())
}
