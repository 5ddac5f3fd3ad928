//! The demo application: clears the screen with a slowly cycling colour.

use ash::vk;
use vulkandemo_app::{FrameCanvas, RenderContext, VulkanApp};

/// Clears each acquired swapchain image to an animated colour.
pub struct ClearDemo;

/// Colour for a given frame: a slow sweep through the RGB channels.
pub fn clear_colour(frame_number: u64) -> [f32; 4] {
    const PERIOD: u64 = 600;
    let t = (frame_number % PERIOD) as f32 / PERIOD as f32;
    let angle = t * std::f32::consts::TAU;
    [
        0.5 + 0.5 * angle.sin(),
        0.5 + 0.5 * (angle + std::f32::consts::FRAC_PI_3 * 2.0).sin(),
        0.5 + 0.5 * (angle + std::f32::consts::FRAC_PI_3 * 4.0).sin(),
        1.0,
    ]
}

impl VulkanApp for ClearDemo {
    fn init(_ctx: &mut RenderContext) -> anyhow::Result<Self> {
        Ok(Self)
    }

    fn record(&mut self, ctx: &RenderContext, frame: &mut FrameCanvas) -> anyhow::Result<()> {
        let device = ctx.gpu().device();
        let cmd = frame.command_buffer;

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        // Acquired image -> transfer destination for the clear
        let to_transfer = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .image(frame.image)
            .subresource_range(subresource_range);

        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&to_transfer));

        // SAFETY: The command buffer is in the recording state.
        unsafe {
            device.cmd_pipeline_barrier2(cmd, &dependency_info);

            let colour = vk::ClearColorValue {
                float32: clear_colour(frame.frame_number),
            };
            device.cmd_clear_color_image(
                cmd,
                frame.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &colour,
                std::slice::from_ref(&subresource_range),
            );

            // Cleared image -> presentable
            let to_present = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
                .dst_access_mask(vk::AccessFlags2::NONE)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .image(frame.image)
                .subresource_range(subresource_range);

            let dependency_info = vk::DependencyInfo::default()
                .image_memory_barriers(std::slice::from_ref(&to_present));
            device.cmd_pipeline_barrier2(cmd, &dependency_info);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_colour_stays_in_range() {
        for frame in [0, 1, 99, 599, 600, 10_000] {
            let [r, g, b, a] = clear_colour(frame);
            for channel in [r, g, b] {
                assert!((0.0..=1.0).contains(&channel), "channel out of range");
            }
            assert_eq!(a, 1.0);
        }
    }

    #[test]
    fn clear_colour_is_periodic() {
        assert_eq!(clear_colour(7), clear_colour(607));
    }
}
