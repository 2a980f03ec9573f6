//! Headless compute samples
//!
//! Runs compute shaders without a window: doubling a buffer of integers and
//! filtering an image, both verified against the CPU.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p smv-compute -- [double|filter|all] [OPTIONS]
//! ```
//!
//! ## Filter options
//!
//! - `-i, --input <PATH>`: Image to filter (default: generated checkerboard)
//! - `-o, --output <PATH>`: Where to write the result (default: filtered.png)
//! - `--filter <NAME>`: grayscale, invert or sepia (default: grayscale)
//! - `--shader <PATH>`: SPIR-V file replacing the built-in filter shader
//!
//! ## Other
//!
//! - `--validation`, `--no-validation`: Toggle validation layers
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod args;
mod double;
mod filter;
mod kernel;

use ash::vk;
use smv_gpu::{CommandPool, GpuContext, GpuContextBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args::{Command, ComputeArgs};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let args = ComputeArgs::parse(&args)?;
    if args.help {
        print_help();
        return Ok(());
    }

    let gpu = GpuContextBuilder::new()
        .app_name("smv-compute")
        .validation(args.validation)
        .require_graphics(false)
        .build()?;

    // SAFETY: the family comes from the context
    let pool = unsafe {
        CommandPool::new(
            gpu.device(),
            gpu.compute_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?
    };

    let result = run(&gpu, &pool, &args.command);

    // SAFETY: every submission was waited on
    unsafe {
        let _ = gpu.wait_idle();
        pool.destroy(gpu.device());
    }

    result?;
    info!("All compute samples passed");
    Ok(())
}

fn run(gpu: &GpuContext, pool: &CommandPool, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Double => double::run(gpu, pool),
        Command::Filter(options) => filter::run(gpu, pool, options),
        Command::All(options) => {
            double::run(gpu, pool)?;
            filter::run(gpu, pool, options)
        }
    }
}

fn print_help() {
    eprintln!(
        "Headless compute samples

USAGE:
    cargo run -p smv-compute -- [COMMAND] [OPTIONS]

COMMANDS:
    double                  Double 65536 integers in a storage buffer
    filter                  Filter an image with a compute shader
    all                     Run both (default)

FILTER OPTIONS:
    -i, --input <PATH>      Image to filter (default: generated checkerboard)
    -o, --output <PATH>     Output PNG (default: filtered.png)
    --filter <NAME>         grayscale, invert or sepia (default: grayscale)
    --shader <PATH>         SPIR-V file replacing the built-in filter shader

OTHER:
    --validation            Enable validation layers
    --no-validation         Disable validation layers
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
