//! wasm-addgas — gas-metering instrumentation for WebAssembly modules.
//!
//! This crate decodes a binary module into a structural model that can be
//! re-encoded byte-for-byte, and rewrites it so that every function body calls
//! a host-provided gas import on entry.

pub mod binary;
pub mod disasm;
pub mod error;
pub mod gas;
pub mod module;

// Re-export key types for convenience
pub use error::{Error, Result};
pub use gas::{shift, ConstantCost, CostModel, GasConfig, Instrumented, PerInstructionCost};
pub use module::Module;

/// Decodes a binary module. Nothing is synthesized or modified.
pub fn decode(bytes: &[u8]) -> Result<Module> {
    module::decode_module(bytes)
}

/// Encodes a module; unmodified sections come out exactly as they went in.
pub fn encode(module: &Module) -> Vec<u8> {
    module::encode_module(module)
}

/// Runs the gas instrumentation pass over a decoded module.
pub fn instrument(
    module: Module,
    config: &GasConfig,
    costs: &dyn CostModel,
) -> Result<Instrumented> {
    gas::instrument(module, config, costs)
}

/// Instruments a binary module.
///
/// This is the main entry point. It decodes `wasm_bytes`, runs the pass with
/// the cost policy described by `config`, encodes the result and decodes that
/// once more to make sure the output is well-formed.
///
/// # Example
/// ```no_run
/// use wasm_addgas::{add_gas, GasConfig};
///
/// let wasm_bytes = std::fs::read("input.wasm").unwrap();
/// let instrumented = add_gas(&wasm_bytes, &GasConfig::default()).unwrap();
/// std::fs::write("output.wasm", instrumented).unwrap();
/// ```
pub fn add_gas(wasm_bytes: &[u8], config: &GasConfig) -> Result<Vec<u8>> {
    let module = decode(wasm_bytes)?;
    let costs = config.cost_model();
    let instrumented = instrument(module, config, costs.as_ref())?;
    let output = encode(&instrumented.module);

    // Make sure the output decodes again
    decode(&output)?;

    tracing::debug!(
        input = wasm_bytes.len(),
        output = output.len(),
        gas_function = instrumented.gas_function,
        "instrumented module"
    );
    Ok(output)
}
