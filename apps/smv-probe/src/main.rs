//! Vulkan adapter probe
//!
//! Creates an instance, lists every physical device with its queue families
//! and reports which one the engine would select for headless work.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p smv-probe -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--no-validation`: Create the instance without validation layers
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use anyhow::Context as _;
use ash::vk;
use smv_gpu::capabilities::device_type_name;
use smv_gpu::debug::DebugMessenger;
use smv_gpu::instance::{create_instance, enumerate_adapters, select_adapter};
use smv_gpu::queue::{find_queue_families, QueueRequirements};
use smv_gpu::AdapterInfo;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command line options.
#[derive(Debug, PartialEq, Eq)]
struct ProbeArgs {
    validation: bool,
    help: bool,
}

impl ProbeArgs {
    fn parse(args: &[String]) -> Self {
        let mut parsed = Self {
            validation: true,
            help: false,
        };
        for arg in args.iter().skip(1) {
            match arg.as_str() {
                "--no-validation" => parsed.validation = false,
                "-h" | "--help" => parsed.help = true,
                other => warn!("Ignoring unknown argument {other}"),
            }
        }
        parsed
    }
}

const HEADLESS: QueueRequirements = QueueRequirements {
    graphics: true,
    present: false,
};

/// Whether the engine could run on this adapter without a window.
fn is_usable(adapter: &AdapterInfo) -> bool {
    adapter.capabilities.meets_requirements()
        && find_queue_families(&adapter.queue_families, |_| false).is_complete(HEADLESS)
}

/// Short `GRAPHICS | COMPUTE | TRANSFER` style description.
fn queue_flag_names(flags: vk::QueueFlags) -> String {
    let names: Vec<&str> = [
        (vk::QueueFlags::GRAPHICS, "GRAPHICS"),
        (vk::QueueFlags::COMPUTE, "COMPUTE"),
        (vk::QueueFlags::TRANSFER, "TRANSFER"),
        (vk::QueueFlags::SPARSE_BINDING, "SPARSE"),
    ]
    .into_iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, name)| name)
    .collect();

    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" | ")
    }
}

fn log_adapter(index: usize, adapter: &AdapterInfo) {
    let caps = &adapter.capabilities;
    info!("Adapter {index}: {}", caps.device_name);
    info!("  Type: {}", device_type_name(caps.device_type));
    info!("  Vendor: {:?}", caps.vendor);
    info!("  Vulkan: {}", caps.api_version_string());
    info!("  VRAM: {} MB", caps.device_local_memory_mb);
    info!(
        "  Dynamic rendering: {}, synchronization2: {}",
        caps.supports_dynamic_rendering, caps.supports_synchronization2
    );
    for (family, props) in adapter.queue_families.iter().enumerate() {
        info!(
            "  Queue family {family}: {} queue(s), {}",
            props.queue_count,
            queue_flag_names(props.queue_flags)
        );
    }
    info!("  Meets requirements: {}", is_usable(adapter));
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let args = ProbeArgs::parse(&args);
    if args.help {
        print_help();
        return Ok(());
    }

    // SAFETY: loading the system Vulkan library
    let entry = unsafe { ash::Entry::load() }.context("Failed to load Vulkan")?;
    // SAFETY: no window extensions are passed
    let created = unsafe { create_instance(&entry, "smv-probe", &[], args.validation)? };
    let instance = created.instance;

    let messenger = if created.validation_enabled {
        // SAFETY: the instance was created with debug utils
        Some(unsafe { DebugMessenger::new(&entry, &instance)? })
    } else {
        None
    };

    let result = probe(&instance);

    // SAFETY: nothing created from the instance outlives this point
    unsafe {
        if let Some(messenger) = &messenger {
            messenger.destroy();
        }
        instance.destroy_instance(None);
    }

    result
}

fn probe(instance: &ash::Instance) -> anyhow::Result<()> {
    // SAFETY: the instance is valid
    let adapters = unsafe { enumerate_adapters(instance)? };
    info!("Found {} adapter(s)", adapters.len());

    for (index, adapter) in adapters.iter().enumerate() {
        log_adapter(index, adapter);
    }

    match select_adapter(adapters, is_usable) {
        Ok(adapter) => info!("Selected: {}", adapter.capabilities.summary()),
        Err(e) => warn!("No adapter would be selected: {e}"),
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        "Vulkan adapter probe

USAGE:
    cargo run -p smv-probe -- [OPTIONS]

OPTIONS:
    --no-validation         Create the instance without validation layers
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("smv-probe")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn validation_is_on_by_default() {
        let parsed = ProbeArgs::parse(&args(&[]));
        assert!(parsed.validation);
        assert!(!parsed.help);
    }

    #[test]
    fn flags() {
        let parsed = ProbeArgs::parse(&args(&["--no-validation", "-h"]));
        assert_eq!(
            parsed,
            ProbeArgs {
                validation: false,
                help: true
            }
        );
    }

    #[test]
    fn queue_flags_are_named() {
        assert_eq!(
            queue_flag_names(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            "GRAPHICS | COMPUTE"
        );
        assert_eq!(queue_flag_names(vk::QueueFlags::empty()), "none");
    }
}
