//! `SmvApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::WindowEvent;

/// Trait for windowed tutorial programs.
///
/// The framework owns the window, GPU context, swapchain and frame
/// synchronization. Implementors only record their drawing commands.
pub trait SmvApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the GPU context, swapchain and window exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before the frame fence is waited on.
    ///
    /// # Arguments
    /// * `ctx` - Application context with GPU and window access
    /// * `dt` - Delta time in seconds since last frame
    #[allow(unused_variables)]
    fn update(&mut self, ctx: &AppContext, dt: f32) {}

    /// Render a frame.
    ///
    /// The command buffer in `frame` is already recording. The swapchain
    /// image arrives in `UNDEFINED` layout and must be left in
    /// `PRESENT_SRC_KHR`; [`crate::begin_color_pass`] and
    /// [`crate::end_color_pass`] handle both transitions.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// Handle window resize.
    ///
    /// Called after the swapchain was recreated with a non-zero size.
    /// Recreate size-dependent resources such as depth buffers here.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was consumed.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown.
    ///
    /// The GPU is idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
