//! Windowed application framework for the Simple Vulkan Engine.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and management
//! - GPU context initialization
//! - Swapchain creation and recreation
//! - Frames in flight and per-image synchronization
//! - Event loop handling and screenshot capture
//!
//! # Example
//!
//! ```no_run
//! use smv_app::{run_app, AppConfig, AppContext, FrameContext, SmvApp};
//!
//! struct Clear;
//!
//! impl SmvApp for Clear {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(Clear)
//!     }
//!
//!     fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
//!         unsafe {
//!             frame.begin_color_pass(ctx.device(), [0.1, 0.1, 0.1, 1.0], None)?;
//!             frame.end_color_pass(ctx.device())?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<Clear>(AppConfig::new("clear"))
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;
pub mod screenshot;

pub use app::SmvApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{init_logging, run_app, AppConfig};
pub use screenshot::ScreenshotConfig;

// Re-export commonly used types for convenience
pub use smv_gpu::{GpuContext, GpuContextBuilder};
pub use winit::event::WindowEvent;
