//! Per-frame context for recording.

use ash::vk;

/// Recording surface for the current frame.
///
/// Borrows a frame slot's command buffer and the acquired swapchain image
/// for the duration of one frame; invalid after the frame is submitted.
pub struct FrameCanvas {
    /// Command buffer in the recording state.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// The acquired swapchain image.
    pub image: vk::Image,
    /// View over the acquired image.
    pub view: vk::ImageView,
    /// Current swapchain extent.
    pub extent: vk::Extent2D,
    /// Monotonic frame counter.
    pub frame_number: u64,
}
