//! End-to-end integration tests for wasm-addgas.
//!
//! These tests verify the complete pipeline: WAT → Wasm → instrumented Wasm,
//! checked with wasmparser.

use anyhow::{Context, Result};
use wasm_addgas::{add_gas, decode, encode, instrument, ConstantCost, Error, GasConfig};
use wasmparser::{ExternalKind, Operator, Parser, Payload, TypeRef};

/// The operators the assertions care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    I32Const(i32),
    Call(u32),
    ReturnCall(u32),
    RefFunc(u32),
    Other,
}

#[derive(Debug, Default)]
struct Summary {
    /// (module, field, type index) of function imports.
    func_imports: Vec<(String, String, u32)>,
    /// (name, index) of function exports, in declaration order.
    func_exports: Vec<(String, u32)>,
    start: Option<u32>,
    bodies: Vec<Vec<Op>>,
}

fn summarize(wasm: &[u8]) -> Result<Summary> {
    let mut summary = Summary::default();
    for payload in Parser::new(0).parse_all(wasm) {
        match payload? {
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    if let TypeRef::Func(ty) = import.ty {
                        summary
                            .func_imports
                            .push((import.module.to_string(), import.name.to_string(), ty));
                    }
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    if export.kind == ExternalKind::Func {
                        summary
                            .func_exports
                            .push((export.name.to_string(), export.index));
                    }
                }
            }
            Payload::StartSection { func, .. } => summary.start = Some(func),
            Payload::CodeSectionEntry(body) => {
                let mut ops = body.get_operators_reader()?;
                let mut body_ops = Vec::new();
                while !ops.eof() {
                    body_ops.push(match ops.read()? {
                        Operator::I32Const { value } => Op::I32Const(value),
                        Operator::Call { function_index } => Op::Call(function_index),
                        Operator::ReturnCall { function_index } => Op::ReturnCall(function_index),
                        Operator::RefFunc { function_index } => Op::RefFunc(function_index),
                        _ => Op::Other,
                    });
                }
                summary.bodies.push(body_ops);
            }
            _ => {}
        }
    }
    Ok(summary)
}

/// Helper to instrument WAT source with the default configuration.
fn add_gas_wat(wat_source: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let wasm_bytes = wat::parse_str(wat_source).context("failed to parse WAT")?;
    let output = add_gas(&wasm_bytes, &GasConfig::default()).context("instrumentation failed")?;
    wasmparser::validate(&output).context("instrumented module is invalid")?;
    Ok((wasm_bytes, output))
}

#[test]
fn test_round_trip_is_byte_exact() -> Result<()> {
    let sources = [
        "(module)",
        r#"(module (func (export "main")))"#,
        r#"
        (module
            (import "env" "log" (func $log (param i32)))
            (import "env" "mem" (memory 1))
            (table 4 funcref)
            (global $g (mut i32) (i32.const 7))
            (func $f (param i32 i32) (result i32)
                (local i64 f32)
                local.get 0
                local.get 1
                i32.add
                (block (result i32)
                    (if (result i32) (global.get $g)
                        (then (i32.const 1))
                        (else (i32.const 2))))
                drop)
            (func $loop
                (loop $l
                    (br_if $l (i32.const 0))))
            (export "f" (func $f))
            (elem (i32.const 0) $f $loop)
            (data (i32.const 16) "hello")
            (data "passive"))
        "#,
    ];
    for source in sources {
        let bytes = wat::parse_str(source)?;
        let module = decode(&bytes)?;
        assert_eq!(encode(&module), bytes, "round trip of {source}");
    }
    Ok(())
}

#[test]
fn test_non_canonical_module_round_trips() -> Result<()> {
    let bytes = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x84, 0x00, 0x01, 0x60, 0x00, 0x00, // type section with a padded size
        0x03, 0x02, 0x01, 0x00, // function: [0]
        // code: i32.const 0 padded to 5 bytes, drop, end
        0x0a, 0x0b, 0x01, 0x09, 0x00, 0x41, 0x80, 0x80, 0x80, 0x80, 0x00, 0x1a, 0x0b,
    ];
    let module = decode(&bytes)?;
    assert_eq!(encode(&module), bytes);
    Ok(())
}

#[test]
fn test_module_without_imports() -> Result<()> {
    let (_, output) = add_gas_wat(r#"(module (func (export "main")))"#)?;
    let summary = summarize(&output)?;

    assert_eq!(
        summary.func_imports,
        vec![("env".to_string(), "addgas".to_string(), 1)]
    );
    assert_eq!(summary.func_exports, vec![("main".to_string(), 1)]);
    assert_eq!(
        summary.bodies,
        vec![vec![Op::I32Const(1), Op::Call(0), Op::Other]]
    );
    Ok(())
}

#[test]
fn test_existing_import_keeps_its_index() -> Result<()> {
    let (_, output) = add_gas_wat(
        r#"
        (module
            (import "host" "f" (func $f))
            (func $run (export "run")
                call $f
                call $run))
        "#,
    )?;
    let summary = summarize(&output)?;

    assert_eq!(summary.func_imports[0].0, "host");
    assert_eq!(summary.func_imports[1].1, "addgas");
    assert_eq!(summary.func_exports, vec![("run".to_string(), 2)]);
    assert_eq!(
        summary.bodies[0],
        vec![
            Op::I32Const(1),
            Op::Call(1),
            Op::Call(0),
            Op::Call(2),
            Op::Other
        ]
    );
    Ok(())
}

#[test]
fn test_exported_import_keeps_its_index() -> Result<()> {
    let (_, output) = add_gas_wat(
        r#"
        (module
            (import "h" "f" (func $f))
            (export "f" (func $f))
            (func (export "g")))
        "#,
    )?;
    let summary = summarize(&output)?;

    assert_eq!(
        summary.func_exports,
        vec![("f".to_string(), 0), ("g".to_string(), 2)]
    );
    Ok(())
}

#[test]
fn test_every_body_grows_by_the_prologue() -> Result<()> {
    let wat = r#"
        (module
            (import "host" "a" (func $a (param i32) (result i32)))
            (func $one (result i32) (call $a (i32.const 1)))
            (func $two (param i32) (result i32) (call $one) (local.get 0) i32.add)
            (func $three))
    "#;
    let (input, output) = add_gas_wat(wat)?;
    let before = decode(&input)?;
    let after = decode(&output)?;

    let before_bodies = before.code().context("no code section")?;
    let after_bodies = after.code().context("no code section")?;
    assert_eq!(before.functions(), after.functions());
    assert_eq!(
        after.imports().map(Vec::len),
        before.imports().map(|i| i.len() + 1)
    );
    // i32.const 1 (2 bytes) + call 1 (2 bytes)
    for (b, a) in before_bodies.iter().zip(after_bodies) {
        assert_eq!(a.code.len(), b.code.len() + 4);
        assert_eq!(a.locals, b.locals);
    }
    Ok(())
}

#[test]
fn test_start_and_elements_are_shifted() -> Result<()> {
    let (_, output) = add_gas_wat(
        r#"
        (module
            (import "host" "f" (func $f))
            (table 3 funcref)
            (func $init)
            (func $g (result funcref) (ref.func $g))
            (start $init)
            (elem (i32.const 0) $f $init $g)
            (elem declare func $g))
        "#,
    )?;
    let summary = summarize(&output)?;
    assert_eq!(summary.start, Some(2));
    assert_eq!(summary.bodies[1][2], Op::RefFunc(3));

    let module = decode(&output)?;
    let elements = module.elements().context("no element section")?;
    assert_eq!(
        elements[0].items,
        wasm_addgas::module::ElementItems::Functions(vec![0, 2, 3])
    );
    Ok(())
}

#[test]
fn test_instrumenting_twice() -> Result<()> {
    let (_, once) = add_gas_wat(
        r#"
        (module
            (func $a (export "a") (call $b))
            (func $b))
        "#,
    )?;
    let twice = add_gas(&once, &GasConfig::default())?;
    wasmparser::validate(&twice)?;
    let summary = summarize(&twice)?;

    assert_eq!(summary.func_imports.len(), 2);
    assert_eq!(summary.func_exports, vec![("a".to_string(), 2)]);
    assert_eq!(
        summary.bodies[0],
        vec![
            Op::I32Const(1),
            Op::Call(1),
            Op::I32Const(1),
            Op::Call(0),
            Op::Call(3),
            Op::Other
        ]
    );
    Ok(())
}

#[test]
fn test_custom_config_and_cost() -> Result<()> {
    let wasm_bytes = wat::parse_str(r#"(module (func (export "main") nop))"#)?;
    let config = GasConfig {
        module: "meter".to_string(),
        field: "charge".to_string(),
        cost: 42,
        ..GasConfig::default()
    };
    let output = add_gas(&wasm_bytes, &config)?;
    let summary = summarize(&output)?;
    assert_eq!(summary.func_imports[0].0, "meter");
    assert_eq!(summary.func_imports[0].1, "charge");
    assert_eq!(summary.bodies[0][0], Op::I32Const(42));
    Ok(())
}

#[test]
fn test_duplicate_export_names_are_preserved() -> Result<()> {
    let bytes = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type: [() -> ()]
        0x03, 0x02, 0x01, 0x00, // function: [0]
        // export "x" (func 0), "x" (func 0)
        0x07, 0x09, 0x02, 0x01, b'x', 0x00, 0x00, 0x01, b'x', 0x00, 0x00,
        0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b, // code: one empty body
    ];
    let instrumented = instrument(decode(&bytes)?, &GasConfig::default(), &ConstantCost(1))?;
    let exports = instrumented
        .module
        .exports()
        .context("no export section")?;
    assert_eq!(exports.len(), 2);
    assert!(exports.iter().all(|e| e.name == "x" && e.index == 1));
    Ok(())
}

#[test]
fn test_tail_calls_are_shifted() -> Result<()> {
    let bytes = wat::parse_str(
        r#"
        (module
            (import "host" "f" (func $f))
            (func $g (return_call $g)))
        "#,
    )?;
    let instrumented = instrument(decode(&bytes)?, &GasConfig::default(), &ConstantCost(1))?;
    let summary = summarize(&encode(&instrumented.module))?;
    assert_eq!(
        summary.bodies[0],
        vec![Op::I32Const(1), Op::Call(1), Op::ReturnCall(2), Op::Other]
    );
    Ok(())
}

#[test]
fn test_custom_sections_survive_instrumentation() -> Result<()> {
    let mut bytes = wat::parse_str("(module (func))")?;
    // custom section "meta" with one payload byte
    bytes.extend_from_slice(&[0x00, 0x06, 0x04, b'm', b'e', b't', b'a', 0x2a]);
    let output = add_gas(&bytes, &GasConfig::default())?;
    let module = decode(&output)?;
    assert_eq!(module.custom("meta").context("custom dropped")?.data, vec![0x2a]);
    assert!(output.ends_with(&[0x00, 0x06, 0x04, b'm', b'e', b't', b'a', 0x2a]));
    Ok(())
}

#[test]
fn test_errors() -> Result<()> {
    assert!(matches!(
        add_gas(b"\0asn\x01\0\0\0", &GasConfig::default()),
        Err(Error::BadMagic { .. })
    ));
    assert_eq!(
        add_gas(&wat::parse_str("(module)")?, &GasConfig::default()).unwrap_err(),
        Error::NoCodeSection
    );

    // a SIMD instruction inside the only body
    let simd = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type: [() -> ()]
        0x03, 0x02, 0x01, 0x00, // function: [0]
        0x0a, 0x06, 0x01, 0x04, 0x00, 0xfd, 0x00, 0x0b, // code
    ];
    let err = add_gas(&simd, &GasConfig::default()).unwrap_err();
    assert_eq!(
        err,
        Error::UnknownOpcode {
            opcode: 0xfd,
            sub: None,
            offset: 23
        }
    );
    assert_eq!(err.offset(), Some(23));

    // body is missing its final end
    let truncated = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type: [() -> ()]
        0x03, 0x02, 0x01, 0x00, // function: [0]
        0x0a, 0x05, 0x01, 0x03, 0x00, 0x02, 0x40, // code: block with no ends
    ];
    assert_eq!(
        add_gas(&truncated, &GasConfig::default()).unwrap_err(),
        Error::TruncatedBody { offset: 25 }
    );
    Ok(())
}
