//! Screenshot capture of presented frames.

use std::collections::HashSet;
use std::path::PathBuf;

use ash::vk;
use smv_core::ImageData;
use smv_gpu::barrier::{cmd_host_read_barrier, transition_image_layout};
use smv_gpu::upload::cmd_copy_image_to_buffer;
use smv_gpu::{GpuBuffer, GpuContext, MemoryLocation};
use tracing::info;

const DEFAULT_PATTERN: &str = "screenshot_{}.png";

/// Which frames to write to disk, and under what names.
#[derive(Clone, Debug, Default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    /// File name pattern; `{}` becomes the frame number.
    pub output_pattern: String,
    pub frames: HashSet<u64>,
    /// Stop the app once the last requested frame is saved.
    pub exit_after_capture: bool,
}

impl ScreenshotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, pattern: impl Into<String>) -> Self {
        self.enabled = true;
        self.output_pattern = pattern.into();
        self
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.enabled = true;
        self.frames.extend(frames);
        self
    }

    pub fn with_exit_after(mut self, exit: bool) -> Self {
        self.exit_after_capture = exit;
        self
    }

    pub fn output_path(&self, frame: u64) -> PathBuf {
        self.output_pattern.replace("{}", &frame.to_string()).into()
    }

    pub fn should_capture(&self, frame: u64) -> bool {
        self.enabled && self.frames.contains(&frame)
    }

    /// True once `frames_rendered` is past the last requested frame.
    pub fn all_captured(&self, frames_rendered: u64) -> bool {
        self.enabled
            && self
                .frames
                .iter()
                .max()
                .is_some_and(|&last| frames_rendered > last)
    }

    /// Pick the capture flags out of a full argument list (program name
    /// first). Other arguments are ignored.
    ///
    /// `-S`/`--screenshot` turns capture on; `-o`/`--output PATTERN`,
    /// `-f`/`--frames LIST` and `--exit-after` refine it. With capture on,
    /// the pattern defaults to `screenshot_{}.png` and the frames to `0`.
    pub fn parse_args(args: &[String]) -> Self {
        let mut config = Self::default();
        let mut rest = args.iter().skip(1);

        while let Some(arg) = rest.next() {
            match arg.as_str() {
                "-S" | "--screenshot" => config.enabled = true,
                "--exit-after" => config.exit_after_capture = true,
                "-o" | "--output" => {
                    if let Some(pattern) = rest.next() {
                        config.output_pattern.clone_from(pattern);
                    }
                }
                "-f" | "--frames" => {
                    if let Some(list) = rest.next() {
                        config.frames = parse_frame_indices(list);
                    }
                }
                _ => {}
            }
        }

        if config.enabled {
            if config.output_pattern.is_empty() {
                config.output_pattern = DEFAULT_PATTERN.to_string();
            }
            if config.frames.is_empty() {
                config.frames.insert(0);
            }
        }
        config
    }
}

/// Frame numbers from a list such as `0,5-7`. Ranges are inclusive and
/// parts that do not parse are dropped.
pub fn parse_frame_indices(list: &str) -> HashSet<u64> {
    let number = |text: &str| text.trim().parse::<u64>().ok();

    list.split(',')
        .flat_map(|part| match part.split_once('-') {
            Some((first, last)) => match (number(first), number(last)) {
                (Some(first), Some(last)) => first..=last,
                _ => 1..=0,
            },
            None => match number(part) {
                Some(frame) => frame..=frame,
                None => 1..=0,
            },
        })
        .collect()
}

/// Whether pixels of `format` are stored blue first.
pub fn is_bgra(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::B8G8R8A8_SRGB | vk::Format::B8G8R8A8_UNORM
    )
}

/// Swap the red and blue channel of every pixel in place.
pub fn swizzle_bgra_to_rgba(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

/// A swapchain image copy recorded into the frame's command buffer,
/// waiting for the frame's fence before it can be saved.
pub(crate) struct PendingScreenshot {
    buffer: GpuBuffer,
    extent: vk::Extent2D,
    format: vk::Format,
    path: PathBuf,
}

impl PendingScreenshot {
    /// Record a copy of `image`, which must be in `PRESENT_SRC_KHR` layout.
    /// The image is returned to that layout afterwards.
    ///
    /// # Safety
    /// `cmd` must be recording and `image` must support `TRANSFER_SRC`.
    pub(crate) unsafe fn record(
        gpu: &GpuContext,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        extent: vk::Extent2D,
        format: vk::Format,
        path: PathBuf,
    ) -> anyhow::Result<Self> {
        let size = u64::from(extent.width) * u64::from(extent.height) * 4;
        let mut buffer = gpu.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "screenshot readback",
        )?;

        let device = gpu.device();
        let recorded = unsafe {
            transition_image_layout(
                device,
                cmd,
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::PRESENT_SRC_KHR,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )
            .and_then(|()| {
                cmd_copy_image_to_buffer(device, cmd, image, extent, buffer.buffer);
                cmd_host_read_barrier(
                    device,
                    cmd,
                    vk::PipelineStageFlags2::TRANSFER,
                    vk::AccessFlags2::TRANSFER_WRITE,
                );
                transition_image_layout(
                    device,
                    cmd,
                    image,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                )
            })
        };

        if let Err(e) = recorded {
            gpu.allocator().lock().free_buffer(&mut buffer)?;
            return Err(e.into());
        }

        Ok(Self {
            buffer,
            extent,
            format,
            path,
        })
    }

    /// Read the pixels back and write the PNG.
    ///
    /// The submission that recorded the copy must have completed.
    pub(crate) fn save(mut self, gpu: &GpuContext) -> anyhow::Result<()> {
        let len = (self.extent.width as usize) * (self.extent.height as usize) * 4;
        let read = self.buffer.read::<u8>(len);
        gpu.allocator().lock().free_buffer(&mut self.buffer)?;

        let mut pixels = read?;
        if is_bgra(self.format) {
            swizzle_bgra_to_rgba(&mut pixels);
        }

        ImageData::new(self.extent.width, self.extent.height, pixels)?.save_png(&self.path)?;
        info!("Screenshot saved: {}", self.path.display());
        Ok(())
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
    fn frame_lists() {
        assert_eq!(parse_frame_indices("5"), HashSet::from([5]));
        assert_eq!(parse_frame_indices("1,3-4,9"), HashSet::from([1, 3, 4, 9]));
        assert_eq!(parse_frame_indices("2, y, 8-, 6 - 7"), HashSet::from([2, 6, 7]));
        assert!(parse_frame_indices("").is_empty());
    }

    #[test]
    fn pattern_takes_frame_number() {
        let config = ScreenshotConfig::new().with_output("shots/t_{}.png");
        assert!(config.enabled);
        assert_eq!(config.output_path(7), PathBuf::from("shots/t_7.png"));
    }

    #[test]
    fn capture_window() {
        let config = ScreenshotConfig::new().with_frames([1, 4]);
        assert!(config.should_capture(1));
        assert!(!config.should_capture(2));
        assert!(!config.all_captured(4));
        assert!(config.all_captured(5));
    }

    #[test]
    fn screenshot_flag_alone_uses_defaults() {
        let config = ScreenshotConfig::parse_args(&args(&["-S"]));
        assert_eq!(config.output_pattern, DEFAULT_PATTERN);
        assert_eq!(config.frames, HashSet::from([0]));
        assert!(!config.exit_after_capture);
    }

    #[test]
    fn all_capture_flags() {
        let config = ScreenshotConfig::parse_args(&args(&[
            "--screenshot",
            "--output",
            "out/{}.png",
            "--frames",
            "2-3",
            "--exit-after",
        ]));
        assert_eq!(config.output_path(3), PathBuf::from("out/3.png"));
        assert_eq!(config.frames, HashSet::from([2, 3]));
        assert!(config.exit_after_capture);
    }

    #[test]
    fn off_unless_requested() {
        let config = ScreenshotConfig::parse_args(&args(&["--width", "10", "-f", "1"]));
        assert!(!config.enabled);
        assert!(!config.should_capture(1));
        assert!(!config.all_captured(100));
    }

    #[test]
    fn bgra_is_swizzled() {
        let mut pixels = vec![1, 2, 3, 4, 10, 20, 30, 40];
        swizzle_bgra_to_rgba(&mut pixels);
        assert_eq!(pixels, vec![3, 2, 1, 4, 30, 20, 10, 40]);

        assert!(is_bgra(vk::Format::B8G8R8A8_SRGB));
        assert!(!is_bgra(vk::Format::R8G8B8A8_SRGB));
    }
}
