//! Per-frame resources for frames in flight.
//!
//! The pool holds one [`FrameSlot`] per in-flight frame. A slot is never
//! reused until its fence confirms the GPU has retired the slot's
//! previous submission; that fence wait is the loop's sole backpressure
//! point.

use std::time::Duration;

use ash::vk;

use crate::command::{begin_command_buffer, CommandPool};
use crate::context::DeviceContext;
use crate::descriptors::DescriptorPool;
use crate::error::{GpuError, Result};
use crate::sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};

/// Descriptor capacity of each slot's pool.
const SLOT_DESCRIPTOR_SETS: u32 = 16;

/// Resources owned by one in-flight frame.
pub struct FrameSlot {
    /// Command buffer recorded anew each time the slot is used.
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the swapchain image acquired for this slot is ready.
    pub image_available: vk::Semaphore,
    /// Signaled when the GPU retires this slot's submission.
    pub in_flight: vk::Fence,
    /// Per-slot descriptor allocations, reset on recycle.
    pub descriptors: DescriptorPool,
}

/// Pool of per-in-flight-frame resources.
///
/// Also owns the per-swapchain-image `render_finished` semaphores, which
/// must be keyed by image (not by slot) because presentation consumes
/// them after the slot has moved on.
pub struct FramePool {
    command_pool: CommandPool,
    slots: Vec<FrameSlot>,
    render_finished: Vec<vk::Semaphore>,
}

impl FramePool {
    /// Allocate `frame_count` slots plus `image_count` presentation
    /// semaphores.
    ///
    /// Fences are created signaled so the first use of each slot does not
    /// block.
    ///
    /// # Safety
    /// The device context must be valid.
    pub unsafe fn new(
        gpu: &DeviceContext,
        frame_count: usize,
        image_count: usize,
    ) -> Result<Self> {
        let device = gpu.device();

        let command_pool = CommandPool::new(
            device,
            gpu.graphics_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let command_buffers = command_pool.allocate_command_buffers(device, frame_count as u32)?;

        let mut slots = Vec::with_capacity(frame_count);
        for command_buffer in command_buffers {
            let pool_sizes = [
                vk::DescriptorPoolSize::default()
                    .ty(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(SLOT_DESCRIPTOR_SETS),
                vk::DescriptorPoolSize::default()
                    .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(SLOT_DESCRIPTOR_SETS),
            ];

            slots.push(FrameSlot {
                command_buffer,
                image_available: create_semaphore(device)?,
                in_flight: create_fence(device, true)?,
                descriptors: DescriptorPool::new(device, SLOT_DESCRIPTOR_SETS, &pool_sizes)?,
            });
        }

        let render_finished = Self::create_image_semaphores(device, image_count)?;

        tracing::debug!(
            "Frame pool ready: {} slots, {} presentation semaphores",
            slots.len(),
            render_finished.len()
        );

        Ok(Self {
            command_pool,
            slots,
            render_finished,
        })
    }

    unsafe fn create_image_semaphores(
        device: &ash::Device,
        image_count: usize,
    ) -> Result<Vec<vk::Semaphore>> {
        let mut semaphores = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            semaphores.push(create_semaphore(device)?);
        }
        Ok(semaphores)
    }

    /// Number of frame slots.
    pub fn frame_count(&self) -> usize {
        self.slots.len()
    }

    /// Access a slot's resources.
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// The `render_finished` semaphore for a swapchain image.
    pub fn render_finished(&self, image_index: u32) -> vk::Semaphore {
        self.render_finished[image_index as usize]
    }

    /// Block until the GPU has retired the slot's previous submission.
    ///
    /// The wait is bounded; expiry surfaces as [`GpuError::FrameTimeout`],
    /// which almost always means device loss or a submission deadlock.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait_slot(
        &self,
        device: &ash::Device,
        index: usize,
        timeout: Duration,
    ) -> Result<()> {
        match wait_for_fence(device, self.slots[index].in_flight, timeout.as_nanos() as u64) {
            Ok(()) => Ok(()),
            Err(GpuError::Vulkan(vk::Result::TIMEOUT)) => {
                Err(GpuError::FrameTimeout { slot: index })
            }
            Err(e) => Err(e),
        }
    }

    /// Ready a slot for a new frame: reset its fence, descriptor pool and
    /// command buffer, then begin recording.
    ///
    /// Called only after a successful image acquire, so a tick skipped for
    /// staleness leaves the fence signaled and the slot immediately
    /// reusable.
    ///
    /// # Safety
    /// The slot's fence must have been waited on.
    pub unsafe fn begin_slot(&self, device: &ash::Device, index: usize) -> Result<vk::CommandBuffer> {
        let slot = &self.slots[index];

        reset_fence(device, slot.in_flight)?;
        slot.descriptors.reset(device)?;

        device.reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())?;
        begin_command_buffer(device, slot.command_buffer)?;

        Ok(slot.command_buffer)
    }

    /// Wait for every slot's fence: the shutdown barrier ensuring no
    /// in-flight submission references resources about to be destroyed.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait_all(&self, device: &ash::Device, timeout: Duration) -> Result<()> {
        for index in 0..self.slots.len() {
            self.wait_slot(device, index, timeout)?;
        }
        Ok(())
    }

    /// Replace the per-image semaphores after a swapchain rebuild changed
    /// the image count.
    ///
    /// # Safety
    /// The old semaphores must no longer be referenced by in-flight work.
    pub unsafe fn resize_image_semaphores(
        &mut self,
        device: &ash::Device,
        image_count: usize,
    ) -> Result<()> {
        if self.render_finished.len() == image_count {
            return Ok(());
        }
        for &semaphore in &self.render_finished {
            device.destroy_semaphore(semaphore, None);
        }
        self.render_finished = Self::create_image_semaphores(device, image_count)?;
        Ok(())
    }

    /// Destroy all pool resources.
    ///
    /// # Safety
    /// The device must be valid and no slot may be referenced by in-flight
    /// work (see [`FramePool::wait_all`]).
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for slot in &self.slots {
            device.destroy_semaphore(slot.image_available, None);
            device.destroy_fence(slot.in_flight, None);
            slot.descriptors.destroy(device);
        }
        self.slots.clear();

        for &semaphore in &self.render_finished {
            device.destroy_semaphore(semaphore, None);
        }
        self.render_finished.clear();

        self.command_pool.destroy(device);
    }
}
