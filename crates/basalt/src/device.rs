use ash::prelude::VkResult;
use ash::vk;

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The device capability consumed by layouts, pool groups and render passes.
///
/// Every object creating backend handles keeps an `Arc` to its backend and
/// destroys its handles through it on drop. Handles passed into the backend
/// must have been created by that same backend.
pub trait Backend: Send + Sync + 'static {
    /// Monotonically increasing identity for descriptor pools created against this backend.
    fn next_pool_id(&self) -> u64;

    unsafe fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VkResult<vk::DescriptorSetLayout>;
    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    unsafe fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    unsafe fn create_descriptor_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool>;
    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;
    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet>;
    /// Only valid for pools created with `FREE_DESCRIPTOR_SET`.
    unsafe fn free_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        set: vk::DescriptorSet,
    ) -> VkResult<()>;
    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    unsafe fn create_render_pass(&self, info: &vk::RenderPassCreateInfo)
        -> VkResult<vk::RenderPass>;
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);
}

pub trait HasDevice<B: Backend = Device> {
    fn device(&self) -> &Arc<B>;
}

/// An `ash::Device` together with the per-device pool identity counter.
pub struct Device {
    device: ash::Device,
    pool_ids: AtomicU64,
}

impl Device {
    /// Takes ownership of a device created elsewhere. The device is destroyed on drop.
    pub unsafe fn from_raw(device: ash::Device) -> Self {
        Self {
            device,
            pool_ids: AtomicU64::new(0),
        }
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        tracing::info!(device = ?self.device.handle(), "drop device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

impl Backend for Device {
    fn next_pool_id(&self) -> u64 {
        self.pool_ids.fetch_add(1, Ordering::Relaxed)
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.device.create_descriptor_set_layout(
            &vk::DescriptorSetLayoutCreateInfo {
                flags,
                binding_count: bindings.len() as u32,
                p_bindings: bindings.as_ptr(),
                ..Default::default()
            },
            None,
        )
    }
    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.device.destroy_descriptor_set_layout(layout, None);
    }

    unsafe fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VkResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo {
            set_layout_count: set_layouts.len() as u32,
            p_set_layouts: set_layouts.as_ptr(),
            push_constant_range_count: push_constant_ranges.len() as u32,
            p_push_constant_ranges: push_constant_ranges.as_ptr(),
            ..Default::default()
        };
        self.device.create_pipeline_layout(&info, None)
    }
    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.device.destroy_pipeline_layout(layout, None);
    }

    unsafe fn create_descriptor_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo {
            flags,
            max_sets,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        self.device.create_descriptor_pool(&info, None)
    }
    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        self.device
            .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
    }
    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.device.destroy_descriptor_pool(pool, None);
    }

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let info = vk::DescriptorSetAllocateInfo {
            descriptor_pool: pool,
            descriptor_set_count: 1,
            p_set_layouts: &layout,
            ..Default::default()
        };
        let sets = self.device.allocate_descriptor_sets(&info)?;
        Ok(sets[0])
    }
    unsafe fn free_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        set: vk::DescriptorSet,
    ) -> VkResult<()> {
        self.device.free_descriptor_sets(pool, &[set])
    }
    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        self.device.update_descriptor_sets(writes, &[]);
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo,
    ) -> VkResult<vk::RenderPass> {
        self.device.create_render_pass(info, None)
    }
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.device.destroy_render_pass(render_pass, None);
    }
}
