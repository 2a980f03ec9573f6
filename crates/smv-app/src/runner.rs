//! Window creation, the winit event loop and the per-frame presentation loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use ash::vk;
use smv_core::constants::{MAX_FRAMES_IN_FLIGHT, WINDOW_HEIGHT, WINDOW_WIDTH};
use smv_gpu::command::{begin_command_buffer, end_command_buffer, submit_command_buffers};
use smv_gpu::sync::{reset_fence, wait_for_fence};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::app::SmvApp;
use crate::context::AppContext;
use crate::frame::FrameContext;
use crate::screenshot::{PendingScreenshot, ScreenshotConfig};

/// Window, presentation and capture settings for [`run_app`].
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Sleep-based pacing target; `None` runs unthrottled.
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Defaults to on in debug builds.
    pub validation: bool,
    pub resizable: bool,
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Exit after this many frames have been presented.
    pub exit_after_frames: Option<u64>,
    pub screenshot: ScreenshotConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: smv_core::constants::ENGINE_NAME.to_string(),
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            resizable: true,
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            exit_after_frames: None,
            screenshot: ScreenshotConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Set the number of frames in flight. Values below 1 become 1.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }

    pub fn with_exit_after_frames(mut self, frames: u64) -> Self {
        self.exit_after_frames = Some(frames);
        self
    }

    pub fn with_screenshot(mut self, screenshot: ScreenshotConfig) -> Self {
        self.screenshot = screenshot;
        self
    }

    /// Apply the common command line flags to this config.
    ///
    /// Recognized flags:
    /// - `--width <N>` / `--height <N>`: initial window size
    /// - `--vsync`: present with FIFO
    /// - `--validation` / `--no-validation`: toggle validation layers
    /// - `--frames-in-flight <N>`: CPU lead over the GPU (at least 1)
    /// - `--fps <N>`: frame pacing target
    /// - `--exit-after-frames <N>`: stop after N frames
    /// - the screenshot flags of [`ScreenshotConfig::parse_args`]
    ///
    /// Unknown flags are left for the caller.
    pub fn with_args(mut self, args: &[String]) -> anyhow::Result<Self> {
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--width" => self.width = parse_value(args, &mut i)?,
                "--height" => self.height = parse_value(args, &mut i)?,
                "--vsync" => self.vsync = true,
                "--validation" => self.validation = true,
                "--no-validation" => self.validation = false,
                "--frames-in-flight" => {
                    self.frames_in_flight = parse_value::<usize>(args, &mut i)?.max(1);
                }
                "--fps" => self.target_fps = Some(parse_value(args, &mut i)?),
                "--exit-after-frames" => self.exit_after_frames = Some(parse_value(args, &mut i)?),
                _ => {}
            }
            i += 1;
        }

        if self.width == 0 || self.height == 0 {
            anyhow::bail!("window size must be non-zero, got {}x{}", self.width, self.height);
        }

        let screenshot = ScreenshotConfig::parse_args(args);
        if screenshot.enabled {
            self.screenshot = screenshot;
        }

        Ok(self)
    }
}

fn parse_value<T>(args: &[String], i: &mut usize) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let flag = &args[*i];
    let value = args
        .get(*i + 1)
        .with_context(|| format!("{flag} requires a value"))?;
    *i += 1;
    value
        .parse()
        .with_context(|| format!("invalid value for {flag}: {value}"))
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the `info` default. Calling this more than once is
/// harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Run an [`SmvApp`] with the given configuration.
///
/// Opens the window and drives frames until the app exits. The first
/// initialization or render error ends the loop and is returned.
pub fn run_app<A: SmvApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();

    info!("Starting {}", config.title);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        error: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: SmvApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    error: Option<anyhow::Error>,
}

/// Everything that exists while the window is open.
struct AppState<A: SmvApp> {
    /// Must be cleaned up through [`AppState::cleanup`] before the context
    /// drops; it holds raw handles from the context's device.
    app: A,
    ctx: AppContext,
    target_frame_time: Option<Duration>,
    exit_after_frames: Option<u64>,
    screenshot: ScreenshotConfig,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

/// How a frame proceeds once the swapchain image has been requested.
#[derive(Debug, PartialEq, Eq)]
enum AcquireAction {
    /// Record and present to `image_index`, then recreate if asked.
    Render { image_index: u32, recreate: bool },
    /// The swapchain is out of date. Nothing was submitted, so the fence
    /// stays signaled and the frame slot does not advance.
    Skip,
}

impl AcquireAction {
    fn image_index(&self) -> Option<u32> {
        match *self {
            Self::Render { image_index, .. } => Some(image_index),
            Self::Skip => None,
        }
    }
}

/// Map the result of `vkAcquireNextImageKHR` to the frame's next step.
fn acquire_action(acquired: smv_gpu::Result<(u32, bool)>) -> smv_gpu::Result<AcquireAction> {
    match acquired {
        Ok((image_index, suboptimal)) => Ok(AcquireAction::Render {
            image_index,
            recreate: suboptimal,
        }),
        Err(e) if e.is_out_of_date() => Ok(AcquireAction::Skip),
        Err(e) => Err(e),
    }
}

/// A zero-sized window cannot own a swapchain.
pub(crate) fn is_minimized(width: u32, height: u32) -> bool {
    width == 0 || height == 0
}

/// What the runner should do after a frame.
#[derive(Debug, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    Exit,
}

impl<A: SmvApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating window and GPU context");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Entering frame loop");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Events the app consumes never reach the runner.
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                info!("Escape pressed");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render_frame() {
                    Ok(FrameOutcome::Continue) => state.ctx.window.request_redraw(),
                    Ok(FrameOutcome::Exit) => self.shutdown(event_loop),
                    Err(e) => {
                        error!("Render error: {e:#}");
                        self.error = Some(e);
                        self.shutdown(event_loop);
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    info!("Window resized to {}x{}", size.width, size.height);
                    state.ctx.request_recreate();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }

    /// Covers exits the window events never see, such as the platform
    /// quitting the application.
    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
    }
}

impl<A: SmvApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let mut ctx = AppContext::new(window, &self.config)?;

        let app = A::init(&mut ctx)?;

        let target_frame_time = self
            .config
            .target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)));

        Ok(AppState {
            app,
            ctx,
            target_frame_time,
            exit_after_frames: self.config.exit_after_frames,
            screenshot: self.config.screenshot.clone(),
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: SmvApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<FrameOutcome> {
        if self.ctx.needs_recreate && !self.recreate()? {
            // Minimized; try again on the next redraw.
            return Ok(FrameOutcome::Continue);
        }

        let frame_start = Instant::now();

        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;
        if dt > 0.0 {
            let fps = 1.0 / f64::from(dt);
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
        }

        self.app.update(&self.ctx, dt);

        let frame_index = self.ctx.tracker.current_frame();
        let frame_data = self.ctx.frames[frame_index];
        let device = self.ctx.gpu.device();

        // SAFETY: every handle below is owned by the context
        let image_index = unsafe {
            wait_for_fence(device, frame_data.in_flight_fence, u64::MAX)?;

            let acquired = self.ctx.swapchain.acquire_next_image(
                &self.ctx.gpu.surface()?.swapchain_loader,
                frame_data.image_available,
                u64::MAX,
            );
            let action = acquire_action(acquired)?;
            let Some(image_index) = action.image_index() else {
                self.ctx.needs_recreate = true;
                return Ok(FrameOutcome::Continue);
            };
            if let AcquireAction::Render { recreate: true, .. } = action {
                warn!("Swapchain is suboptimal, recreating after this frame");
                self.ctx.needs_recreate = true;
            }

            // The image may still be owned by another frame slot.
            if let Some(previous) = self
                .ctx
                .tracker
                .claim_image(image_index, frame_data.in_flight_fence)?
            {
                wait_for_fence(device, previous, u64::MAX)?;
            }

            reset_fence(device, frame_data.in_flight_fence)?;
            image_index
        };

        let image = image_index as usize;
        let cmd = frame_data.command_buffer;
        let mut frame_ctx = FrameContext {
            command_buffer: cmd,
            frame_index,
            image_index,
            swapchain_image: self.ctx.swapchain.images[image],
            swapchain_view: self.ctx.swapchain.image_views[image],
            extent: self.ctx.swapchain.extent,
            format: self.ctx.swapchain.format,
            dt,
            frame_number: self.ctx.frame_count,
        };

        // SAFETY: the fence wait above guarantees the buffer is not pending
        let pending = unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            self.app.render(&self.ctx, &mut frame_ctx)?;

            let pending = if self.screenshot.should_capture(self.ctx.frame_count) {
                self.record_screenshot(&frame_ctx)?
            } else {
                None
            };

            end_command_buffer(device, cmd)?;
            pending
        };

        let render_finished = self.ctx.render_finished_semaphores[image];

        // SAFETY: command buffer is fully recorded, semaphores and fence are valid
        let present_wants_recreate = unsafe {
            submit_command_buffers(
                device,
                self.ctx.gpu.graphics_queue()?,
                &[cmd],
                &[(
                    frame_data.image_available,
                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                )],
                &[render_finished],
                frame_data.in_flight_fence,
            )?;

            self.ctx.swapchain.present(
                &self.ctx.gpu.surface()?.swapchain_loader,
                self.ctx.gpu.present_queue()?,
                image_index,
                &[render_finished],
            )?
        };
        if present_wants_recreate {
            self.ctx.needs_recreate = true;
        }

        self.ctx.tracker.advance();
        self.ctx.frame_count += 1;

        if let Some(pending) = pending {
            // SAFETY: fence belongs to this frame
            unsafe { wait_for_fence(device, frame_data.in_flight_fence, u64::MAX)? };
            pending.save(&self.ctx.gpu)?;
        }

        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(self.outcome())
    }

    /// Record a copy of the presented image, when the swapchain allows it.
    unsafe fn record_screenshot(
        &self,
        frame: &FrameContext,
    ) -> anyhow::Result<Option<PendingScreenshot>> {
        if !self.ctx.swapchain.supports_readback {
            warn!(
                "Swapchain images cannot be copied, skipping screenshot of frame {}",
                frame.frame_number
            );
            return Ok(None);
        }

        let path = self.screenshot.output_path(frame.frame_number);
        let pending = unsafe {
            PendingScreenshot::record(
                &self.ctx.gpu,
                frame.command_buffer,
                frame.swapchain_image,
                frame.extent,
                frame.format,
                path,
            )?
        };
        Ok(Some(pending))
    }

    fn outcome(&self) -> FrameOutcome {
        let frames = self.ctx.frame_count;
        if self.exit_after_frames.is_some_and(|limit| frames >= limit) {
            info!("Rendered {frames} frames, exiting");
            return FrameOutcome::Exit;
        }
        if self.screenshot.exit_after_capture && self.screenshot.all_captured(frames) {
            info!("All screenshots captured, exiting");
            return FrameOutcome::Exit;
        }
        FrameOutcome::Continue
    }

    /// Recreate the swapchain and notify the application.
    ///
    /// Returns `false` while the window has zero size.
    fn recreate(&mut self) -> anyhow::Result<bool> {
        if !self.ctx.recreate_swapchain()? {
            return Ok(false);
        }

        let extent = self.ctx.extent();
        self.app.on_resize(&mut self.ctx, extent.width, extent.height)?;
        Ok(true)
    }

    fn cleanup(&mut self) {
        let frames = self.ctx.frame_count;
        if frames > 0 && self.fps_sum > 0.0 {
            info!(
                "{frames} frames, fps min {:.1} / avg {:.1} / max {:.1}",
                self.min_fps,
                self.fps_sum / frames as f64,
                self.max_fps
            );
        }

        info!("Shutting down");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        // Let the app cleanup first; the context follows when dropped.
        self.app.cleanup(&mut self.ctx);

        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("prog")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.frames_in_flight, 2);
        assert!(!config.vsync);
        assert!(config.resizable);
        assert!(config.exit_after_frames.is_none());
        assert!(!config.screenshot.enabled);
    }

    #[test]
    fn common_flags() {
        let config = AppConfig::new("test")
            .with_args(&args(&[
                "--width",
                "320",
                "--height",
                "240",
                "--vsync",
                "--no-validation",
                "--exit-after-frames",
                "10",
                "--unknown",
            ]))
            .unwrap();

        assert_eq!(config.title, "test");
        assert_eq!((config.width, config.height), (320, 240));
        assert!(config.vsync);
        assert!(!config.validation);
        assert_eq!(config.exit_after_frames, Some(10));
    }

    #[test]
    fn frames_in_flight_is_at_least_one() {
        let config = AppConfig::default()
            .with_args(&args(&["--frames-in-flight", "0"]))
            .unwrap();
        assert_eq!(config.frames_in_flight, 1);
        assert_eq!(AppConfig::default().with_frames_in_flight(0).frames_in_flight, 1);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(AppConfig::default().with_args(&args(&["--width"])).is_err());
        assert!(AppConfig::default()
            .with_args(&args(&["--height", "tall"]))
            .is_err());
        assert!(AppConfig::default().with_args(&args(&["--width", "0"])).is_err());
    }

    #[test]
    fn screenshot_flags_are_forwarded() {
        let config = AppConfig::default()
            .with_args(&args(&["-S", "-f", "3", "--exit-after"]))
            .unwrap();
        assert!(config.screenshot.should_capture(3));
        assert!(config.screenshot.exit_after_capture);
    }

    #[test]
    fn acquired_image_is_rendered() {
        assert_eq!(
            acquire_action(Ok((2, false))).unwrap(),
            AcquireAction::Render {
                image_index: 2,
                recreate: false,
            }
        );
    }

    #[test]
    fn suboptimal_image_is_rendered_then_recreated() {
        let action = acquire_action(Ok((0, true))).unwrap();
        assert_eq!(action.image_index(), Some(0));
        assert!(matches!(action, AcquireAction::Render { recreate: true, .. }));
    }

    #[test]
    fn out_of_date_skips_without_claiming_a_frame() {
        let action = acquire_action(Err(vk::Result::ERROR_OUT_OF_DATE_KHR.into())).unwrap();
        assert_eq!(action, AcquireAction::Skip);
        // No image means no fence reset, no submit and no tracker advance.
        assert_eq!(action.image_index(), None);
    }

    #[test]
    fn other_acquire_errors_propagate() {
        let result = acquire_action(Err(vk::Result::ERROR_DEVICE_LOST.into()));
        assert!(matches!(
            result,
            Err(smv_gpu::GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn zero_sized_windows_are_minimized() {
        assert!(is_minimized(0, 600));
        assert!(is_minimized(800, 0));
        assert!(!is_minimized(1, 1));
    }
}
