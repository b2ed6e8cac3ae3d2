use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wasm_addgas::{add_gas, GasConfig};

/// wasm-addgas — inject a gas-accounting host call into every WebAssembly function.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input WebAssembly binary (.wasm)
    input: PathBuf,

    /// Output WebAssembly binary
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Module name of the gas import
    #[arg(long, default_value = "env")]
    module: String,

    /// Field name of the gas import
    #[arg(long, default_value = "addgas")]
    field: String,

    /// Gas charged on entry to every function
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    cost: i32,

    /// Charge `cost` per instruction instead of per function
    #[arg(long)]
    per_instruction: bool,

    /// Validate the output with wasmparser before writing it
    #[arg(long)]
    validate: bool,
}

impl Cli {
    fn config(&self) -> GasConfig {
        GasConfig {
            module: self.module.clone(),
            field: self.field.clone(),
            cost: self.cost,
            per_instruction: self.per_instruction,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("instrumenting {}", cli.input.display());

    // Read WASM file
    let wasm_bytes =
        fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;

    let config = cli.config();
    let output = add_gas(&wasm_bytes, &config).context("instrumentation failed")?;

    if cli.validate {
        wasmparser::validate(&output).context("instrumented module failed validation")?;
        info!("output validated");
    }

    // Write output
    if let Some(output_path) = &cli.output {
        fs::write(output_path, &output)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        info!("wrote {}", output_path.display());
    } else {
        // Print to stdout if no output file specified
        std::io::stdout()
            .write_all(&output)
            .context("failed to write to stdout")?;
    }

    info!(
        "instrumentation complete ({} -> {} bytes)",
        wasm_bytes.len(),
        output.len()
    );
    Ok(())
}
