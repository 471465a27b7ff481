//! In-memory backend enforcing descriptor pool capacity, and a small SPIR-V assembler,
//! for tests.
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use rspirv::binary::Assemble;
use rspirv::dr::{Builder, Operand};
use rspirv::spirv::{self, Word};

use crate::Backend;

#[derive(Default)]
pub struct MockPool {
    pub flags: vk::DescriptorPoolCreateFlags,
    pub max_sets: u32,
    pub capacity: BTreeMap<vk::DescriptorType, u32>,
    pub used: BTreeMap<vk::DescriptorType, u32>,
    pub sets: Vec<vk::DescriptorSet>,
}

#[derive(Default)]
pub struct MockState {
    pub pools: HashMap<vk::DescriptorPool, MockPool>,
    /// (type, count) of every binding in each set layout.
    pub set_layouts: HashMap<vk::DescriptorSetLayout, Vec<(vk::DescriptorType, u32)>>,
    pub set_owner: HashMap<vk::DescriptorSet, (vk::DescriptorPool, vk::DescriptorSetLayout)>,
    pub pipeline_layouts: usize,
    pub render_passes: usize,
    pub pools_created: usize,
    pub pools_destroyed: usize,
    /// (set, binding, type, count) of every write submitted.
    pub writes: Vec<(vk::DescriptorSet, u32, vk::DescriptorType, u32)>,
    /// Failures returned by upcoming allocations, front first.
    pub injected: VecDeque<vk::Result>,
    /// Failures returned by upcoming pool resets, front first.
    pub reset_failures: VecDeque<vk::Result>,
}

#[derive(Default)]
pub struct MockBackend {
    handles: AtomicU64,
    pool_ids: AtomicU64,
    pub state: Mutex<MockState>,
}

impl MockBackend {
    fn handle(&self) -> u64 {
        self.handles.fetch_add(1, Ordering::Relaxed) + 1
    }
    pub fn inject(&self, result: vk::Result) {
        self.state.lock().unwrap().injected.push_back(result);
    }
    pub fn inject_reset_failure(&self, result: vk::Result) {
        self.state.lock().unwrap().reset_failures.push_back(result);
    }
    pub fn live_pools(&self) -> usize {
        self.state.lock().unwrap().pools.len()
    }
}

impl Backend for MockBackend {
    fn next_pool_id(&self) -> u64 {
        self.pool_ids.fetch_add(1, Ordering::Relaxed)
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        _flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let layout = vk::DescriptorSetLayout::from_raw(self.handle());
        let bindings = bindings
            .iter()
            .map(|b| (b.descriptor_type, b.descriptor_count))
            .collect();
        self.state.lock().unwrap().set_layouts.insert(layout, bindings);
        Ok(layout)
    }
    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state.lock().unwrap().set_layouts.remove(&layout);
    }

    unsafe fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
        _push_constant_ranges: &[vk::PushConstantRange],
    ) -> VkResult<vk::PipelineLayout> {
        self.state.lock().unwrap().pipeline_layouts += 1;
        Ok(vk::PipelineLayout::from_raw(self.handle()))
    }
    unsafe fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.state.lock().unwrap().pipeline_layouts -= 1;
    }

    unsafe fn create_descriptor_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool> {
        let pool = vk::DescriptorPool::from_raw(self.handle());
        let mut state = self.state.lock().unwrap();
        state.pools_created += 1;
        state.pools.insert(
            pool,
            MockPool {
                flags,
                max_sets,
                capacity: pool_sizes
                    .iter()
                    .map(|size| (size.ty, size.descriptor_count))
                    .collect(),
                ..Default::default()
            },
        );
        Ok(pool)
    }
    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(result) = state.reset_failures.pop_front() {
            return Err(result);
        }
        let pool = state.pools.get_mut(&pool).unwrap();
        pool.used.clear();
        let sets = std::mem::take(&mut pool.sets);
        for set in sets {
            state.set_owner.remove(&set);
        }
        Ok(())
    }
    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock().unwrap();
        state.pools_destroyed += 1;
        if let Some(pool) = state.pools.remove(&pool) {
            for set in pool.sets {
                state.set_owner.remove(&set);
            }
        }
    }

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let set = vk::DescriptorSet::from_raw(self.handle());
        let mut state = self.state.lock().unwrap();
        if let Some(result) = state.injected.pop_front() {
            return Err(result);
        }
        let bindings = state.set_layouts[&layout].clone();
        let mock_pool = state.pools.get_mut(&pool).unwrap();
        if mock_pool.sets.len() as u32 >= mock_pool.max_sets {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        for (ty, count) in bindings.iter() {
            let capacity = mock_pool.capacity.get(ty).copied().unwrap_or(0);
            let used = mock_pool.used.get(ty).copied().unwrap_or(0);
            if used + count > capacity {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
        }
        for (ty, count) in bindings.iter() {
            *mock_pool.used.entry(*ty).or_insert(0) += count;
        }
        mock_pool.sets.push(set);
        state.set_owner.insert(set, (pool, layout));
        Ok(set)
    }
    unsafe fn free_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        set: vk::DescriptorSet,
    ) -> VkResult<()> {
        let mut state = self.state.lock().unwrap();
        let (_, layout) = state.set_owner.remove(&set).unwrap();
        let bindings = state.set_layouts[&layout].clone();
        let mock_pool = state.pools.get_mut(&pool).unwrap();
        assert!(mock_pool
            .flags
            .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET));
        mock_pool.sets.retain(|s| *s != set);
        for (ty, count) in bindings.iter() {
            *mock_pool.used.get_mut(ty).unwrap() -= count;
        }
        Ok(())
    }
    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        let mut state = self.state.lock().unwrap();
        for write in writes {
            state.writes.push((
                write.dst_set,
                write.dst_binding,
                write.descriptor_type,
                write.descriptor_count,
            ));
        }
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo,
    ) -> VkResult<vk::RenderPass> {
        assert!(info.subpass_count > 0);
        self.state.lock().unwrap().render_passes += 1;
        Ok(vk::RenderPass::from_raw(self.handle()))
    }
    unsafe fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {
        self.state.lock().unwrap().render_passes -= 1;
    }
}

/// Assembles shader modules whose only function is an empty `main`.
pub struct ShaderAssembler {
    pub builder: Builder,
    interface: Vec<Word>,
}

impl ShaderAssembler {
    pub fn new() -> Self {
        let mut builder = Builder::new();
        builder.set_version(1, 5);
        builder.capability(spirv::Capability::Shader);
        builder.capability(spirv::Capability::RuntimeDescriptorArray);
        builder.memory_model(spirv::AddressingModel::Logical, spirv::MemoryModel::GLSL450);
        Self {
            builder,
            interface: Vec::new(),
        }
    }

    pub fn float(&mut self) -> Word {
        self.builder.type_float(32)
    }
    pub fn vec(&mut self, components: u32) -> Word {
        let float = self.float();
        self.builder.type_vector(float, components)
    }
    pub fn image(&mut self, dim: spirv::Dim, sampled: u32, format: spirv::ImageFormat) -> Word {
        let float = self.float();
        self.builder.type_image(float, dim, 0, 0, 0, sampled, format, None)
    }
    pub fn texture_2d(&mut self) -> Word {
        self.image(spirv::Dim::Dim2D, 1, spirv::ImageFormat::Unknown)
    }
    pub fn array(&mut self, element: Word, len: u32) -> Word {
        let uint = self.builder.type_int(32, 0);
        let len = self.builder.constant_bit32(uint, len);
        self.builder.type_array(element, len)
    }
    /// A `Block` struct with explicit member offsets.
    pub fn block(&mut self, members: &[(Word, u32)]) -> Word {
        let ty = self.builder.type_struct(members.iter().map(|(ty, _)| *ty));
        self.builder.decorate(ty, spirv::Decoration::Block, []);
        for (index, (_, offset)) in members.iter().enumerate() {
            self.builder.member_decorate(
                ty,
                index as u32,
                spirv::Decoration::Offset,
                [Operand::LiteralBit32(*offset)],
            );
        }
        ty
    }

    pub fn variable(&mut self, storage_class: spirv::StorageClass, ty: Word) -> Word {
        let pointer = self.builder.type_pointer(None, storage_class, ty);
        let var = self.builder.variable(pointer, None, storage_class, None);
        self.interface.push(var);
        var
    }
    pub fn descriptor(
        &mut self,
        storage_class: spirv::StorageClass,
        ty: Word,
        set: u32,
        binding: u32,
    ) -> Word {
        let var = self.variable(storage_class, ty);
        self.builder.decorate(var, spirv::Decoration::DescriptorSet, [Operand::LiteralBit32(set)]);
        self.builder.decorate(var, spirv::Decoration::Binding, [Operand::LiteralBit32(binding)]);
        var
    }
    pub fn input(&mut self, ty: Word, location: u32) -> Word {
        let var = self.variable(spirv::StorageClass::Input, ty);
        self.builder.decorate(var, spirv::Decoration::Location, [Operand::LiteralBit32(location)]);
        var
    }

    pub fn assemble(mut self, model: spirv::ExecutionModel, name: &str) -> Vec<u32> {
        let void = self.builder.type_void();
        let function_ty = self.builder.type_function(void, []);
        let main = self
            .builder
            .begin_function(void, None, spirv::FunctionControl::NONE, function_ty)
            .unwrap();
        self.builder.begin_block(None).unwrap();
        self.builder.ret().unwrap();
        self.builder.end_function().unwrap();
        self.builder.entry_point(model, main, name, &self.interface);
        match model {
            spirv::ExecutionModel::Fragment => self.builder.execution_mode(
                main,
                spirv::ExecutionMode::OriginUpperLeft,
                &[] as &[u32],
            ),
            spirv::ExecutionModel::GLCompute => {
                self.builder.execution_mode(main, spirv::ExecutionMode::LocalSize, [1u32, 1, 1])
            }
            _ => (),
        }
        self.builder.module().assemble()
    }
}
