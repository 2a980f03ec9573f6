//! Hello triangle
//!
//! Draws one triangle whose vertices are generated in the vertex shader.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p smv-triangle -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--vsync`: Present with FIFO
//! - `--validation`, `--no-validation`: Toggle validation layers
//! - `--frames-in-flight <N>`: Frames recorded ahead of the GPU (default: 2)
//! - `--exit-after-frames <N>`: Exit after N frames
//! - `-S`, `-o <PATTERN>`, `-f <FRAMES>`, `--exit-after`: Screenshot capture
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use ash::vk;
use smv_app::{run_app, AppConfig, AppContext, FrameContext, SmvApp};
use smv_gpu::{GraphicsPipeline, GraphicsPipelineConfig};
use tracing::info;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

struct Triangle {
    pipeline: GraphicsPipeline,
}

impl SmvApp for Triangle {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let config = GraphicsPipelineConfig {
            vertex_shader: smv_shaders::triangle_vert().to_vec(),
            fragment_shader: smv_shaders::triangle_frag().to_vec(),
            cull_mode: vk::CullModeFlags::NONE,
            color_formats: vec![ctx.color_format()],
            ..Default::default()
        };

        // SAFETY: embedded shaders are valid SPIR-V without descriptors
        let pipeline = unsafe { GraphicsPipeline::new(ctx.device(), &config, &[], &[])? };
        info!("Triangle pipeline ready");

        Ok(Self { pipeline })
    }

    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let device = ctx.device();
        let cmd = frame.command_buffer;

        // SAFETY: the frame's command buffer is recording
        unsafe {
            frame.begin_color_pass(device, CLEAR_COLOR, None)?;
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_draw(cmd, 3, 1, 0, 0);
            frame.end_color_pass(device)?;
        }

        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        // SAFETY: the device is idle
        unsafe { self.pipeline.destroy(ctx.device()) };
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let config = AppConfig::new("Hello Triangle")
        .with_args(&args)?
        .with_resizable(false);

    run_app::<Triangle>(config)
}

fn print_help() {
    eprintln!(
        "Hello triangle

USAGE:
    cargo run -p smv-triangle -- [OPTIONS]

OPTIONS:
    --width <N>               Window width (default: 800)
    --height <N>              Window height (default: 600)
    --vsync                   Present with FIFO
    --validation              Enable validation layers
    --no-validation           Disable validation layers
    --frames-in-flight <N>    Frames recorded ahead of the GPU (default: 2)
    --exit-after-frames <N>   Exit after N frames

SCREENSHOT OPTIONS:
    -S, --screenshot        Enable screenshot capture mode
    -o, --output <PATTERN>  Output path pattern (use {{}} for frame number)
                            Default: screenshot_{{}}.png
    -f, --frames <FRAMES>   Frame indices to capture (e.g. \"0,10,20\" or \"0-5\")
    --exit-after            Exit after capturing all specified frames

OTHER:
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
