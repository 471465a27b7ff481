use crate::{Backend, Device, HasDevice};
use ash::{prelude::VkResult, vk};
use std::{collections::BTreeMap, sync::Arc};

/// A resource binding point of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingSlot {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    /// Always at least 1.
    pub count: u32,
    /// Union of every stage declaring this slot.
    pub stage_flags: vk::ShaderStageFlags,
}

impl BindingSlot {
    pub fn raw(&self) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding {
            binding: self.binding,
            descriptor_type: self.descriptor_type,
            descriptor_count: self.count,
            stage_flags: self.stage_flags,
            ..Default::default()
        }
    }
}

/// Descriptors of each type consumed by one set with the given bindings.
pub fn descriptor_counts(bindings: &[BindingSlot]) -> BTreeMap<vk::DescriptorType, u32> {
    let mut desc_types = BTreeMap::new();
    for binding in bindings.iter() {
        *desc_types.entry(binding.descriptor_type).or_insert(0) += binding.count;
    }
    desc_types
}

pub struct DescriptorSetLayout<B: Backend = Device> {
    device: Arc<B>,
    raw: vk::DescriptorSetLayout,
    bindings: Arc<[BindingSlot]>,
    desc_types: BTreeMap<vk::DescriptorType, u32>,
}

impl<B: Backend> Drop for DescriptorSetLayout<B> {
    fn drop(&mut self) {
        tracing::debug!(layout = ?self.raw, "drop descriptor set layout");
        unsafe {
            self.device.destroy_descriptor_set_layout(self.raw);
        }
    }
}

impl<B: Backend> HasDevice<B> for DescriptorSetLayout<B> {
    fn device(&self) -> &Arc<B> {
        &self.device
    }
}

impl<B: Backend> DescriptorSetLayout<B> {
    pub fn new(
        device: Arc<B>,
        bindings: &[BindingSlot],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VkResult<Self> {
        let binding_infos: Vec<_> = bindings.iter().map(BindingSlot::raw).collect();
        let raw = unsafe { device.create_descriptor_set_layout(&binding_infos, flags) }?;
        Ok(Self {
            device,
            raw,
            bindings: bindings.into(),
            desc_types: descriptor_counts(bindings),
        })
    }
    pub unsafe fn raw(&self) -> vk::DescriptorSetLayout {
        self.raw
    }
    pub fn bindings(&self) -> &Arc<[BindingSlot]> {
        &self.bindings
    }
    /// Descriptors of each type needed to allocate one set of this layout.
    pub fn desc_types(&self) -> &BTreeMap<vk::DescriptorType, u32> {
        &self.desc_types
    }
}
