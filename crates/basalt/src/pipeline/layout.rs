use crate::{
    descriptor::{descriptor_counts, BindingSlot, DescriptorSetLayout},
    shader::ReflectedInfo,
    Backend, Device, HasDevice,
};
use ash::{prelude::VkResult, vk};
use std::{collections::BTreeMap, sync::Arc};

/// Set layouts and push constant ranges of a pipeline, aggregated over all of its stages.
#[derive(Clone, Debug, Default)]
pub struct AggregatedLayout {
    /// Indexed by set number. Sets no stage uses are present and empty.
    pub sets: Vec<Vec<BindingSlot>>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl AggregatedLayout {
    /// Aggregate stages in the given order.
    pub fn from_stages<'a>(stages: impl IntoIterator<Item = &'a ReflectedInfo>) -> Self {
        let mut layout = Self::default();
        for stage in stages {
            layout.merge(stage);
        }
        layout
    }

    pub fn merge(&mut self, stage: &ReflectedInfo) {
        for binding in stage.sets.iter().flatten() {
            self.merge_binding(*binding);
        }
        if self.sets.len() < stage.sets.len() {
            self.sets.resize_with(stage.sets.len(), Vec::new);
        }
        self.push_constant_ranges
            .extend_from_slice(&stage.push_constant_ranges);
    }

    /// Slots merge when set, binding and descriptor type all match. The merged slot takes
    /// the larger count and the union of stages.
    pub fn merge_binding(&mut self, binding: BindingSlot) {
        if self.sets.len() <= binding.set as usize {
            self.sets.resize_with(binding.set as usize + 1, Vec::new);
        }
        let set = &mut self.sets[binding.set as usize];
        if let Some(existing) = set.iter_mut().find(|existing| {
            existing.binding == binding.binding
                && existing.descriptor_type == binding.descriptor_type
        }) {
            existing.count = existing.count.max(binding.count);
            existing.stage_flags |= binding.stage_flags;
            return;
        }
        if let Some(conflict) = set.iter().find(|existing| existing.binding == binding.binding) {
            tracing::warn!(
                set = binding.set,
                binding = binding.binding,
                existing = ?conflict.descriptor_type,
                incoming = ?binding.descriptor_type,
                stages = ?binding.stage_flags,
                "conflicting descriptor types declared for the same binding"
            );
        }
        set.push(binding);
    }

    pub fn num_sets(&self) -> u32 {
        self.sets.len() as u32
    }

    pub fn set(&self, set: u32) -> Option<&[BindingSlot]> {
        self.sets.get(set as usize).map(Vec::as_slice)
    }

    pub fn binding(&self, set: u32, binding: u32) -> Option<&BindingSlot> {
        self.set(set)?.iter().find(|slot| slot.binding == binding)
    }

    /// Descriptors of each type needed for one instance of every set in the layout.
    pub fn pool_sizes(&self) -> BTreeMap<vk::DescriptorType, u32> {
        let mut sizes = BTreeMap::new();
        for set in self.sets.iter() {
            for (ty, count) in descriptor_counts(set) {
                *sizes.entry(ty).or_insert(0) += count;
            }
        }
        sizes
    }
}

pub struct PipelineLayout<B: Backend = Device> {
    device: Arc<B>,
    inner: vk::PipelineLayout,

    desc_sets: Vec<Arc<DescriptorSetLayout<B>>>,
    layout: AggregatedLayout,
}

impl<B: Backend> PipelineLayout<B> {
    pub fn desc_sets(&self) -> &[Arc<DescriptorSetLayout<B>>] {
        &self.desc_sets
    }
    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.layout.push_constant_ranges
    }
    pub fn layout(&self) -> &AggregatedLayout {
        &self.layout
    }
    /// Creates one descriptor set layout per aggregated set, including the empty ones.
    pub fn new(device: Arc<B>, layout: AggregatedLayout) -> VkResult<Self> {
        let desc_sets = layout
            .sets
            .iter()
            .map(|bindings| {
                DescriptorSetLayout::new(
                    device.clone(),
                    bindings,
                    vk::DescriptorSetLayoutCreateFlags::empty(),
                )
                .map(Arc::new)
            })
            .collect::<VkResult<Vec<_>>>()?;
        let raw_set_layouts: Vec<_> = desc_sets.iter().map(|a| unsafe { a.raw() }).collect();
        let inner = unsafe {
            device.create_pipeline_layout(&raw_set_layouts, &layout.push_constant_ranges)?
        };
        Ok(Self {
            device,
            inner,
            desc_sets,
            layout,
        })
    }
    pub unsafe fn raw(&self) -> vk::PipelineLayout {
        self.inner
    }
}

impl<B: Backend> HasDevice<B> for PipelineLayout<B> {
    fn device(&self) -> &Arc<B> {
        &self.device
    }
}

impl<B: Backend> Drop for PipelineLayout<B> {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.inner);
        }
    }
}
