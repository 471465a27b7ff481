use ash::vk;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use super::{BindingSlot, DescriptorSetWrite};
use crate::{Backend, Device, Error, HasDevice, PipelineLayout, Result};

/// Each new pool generation requests this much more capacity than the previous one.
pub const GROWTH_FACTOR: f64 = 1.5;
/// Allocation attempts, including the first, before pool pressure is surfaced to the caller.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolGroupConfig {
    /// How many instances of every set the first pool generation holds.
    /// This would generally match the max number of frames in flight.
    pub max_sets_multiplier: u32,
    /// Create pools with `FREE_DESCRIPTOR_SET` so sets can be returned individually.
    pub freeable_sets: bool,
}

impl Default for PoolGroupConfig {
    fn default() -> Self {
        Self {
            max_sets_multiplier: 1,
            freeable_sets: false,
        }
    }
}

/// One backend descriptor pool owned by a [`DescriptorPoolGroup`].
pub struct IndividualPool {
    id: u64,
    raw: vk::DescriptorPool,
    capacity: BTreeMap<vk::DescriptorType, u32>,
    remaining: BTreeMap<vk::DescriptorType, u32>,
    max_sets: u32,
    remaining_sets: u32,
    freeable: bool,
    out_of_rotation: bool,
}

impl IndividualPool {
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn capacity(&self) -> &BTreeMap<vk::DescriptorType, u32> {
        &self.capacity
    }
    pub fn remaining(&self) -> &BTreeMap<vk::DescriptorType, u32> {
        &self.remaining
    }
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
    pub fn remaining_sets(&self) -> u32 {
        self.remaining_sets
    }
    pub fn is_freeable(&self) -> bool {
        self.freeable
    }
    /// Fragmented pools are never selected again until the group is reset.
    pub fn is_out_of_rotation(&self) -> bool {
        self.out_of_rotation
    }

    fn fits(&self, required: &BTreeMap<vk::DescriptorType, u32>) -> bool {
        !self.out_of_rotation
            && self.remaining_sets > 0
            && required
                .iter()
                .all(|(ty, count)| self.remaining.get(ty).copied().unwrap_or(0) >= *count)
    }

    fn consume(&mut self, required: &BTreeMap<vk::DescriptorType, u32>) {
        for (ty, count) in required.iter() {
            if let Some(remaining) = self.remaining.get_mut(ty) {
                *remaining = remaining.saturating_sub(*count);
            }
        }
        self.remaining_sets = self.remaining_sets.saturating_sub(1);
    }

    fn give_back(&mut self, required: &BTreeMap<vk::DescriptorType, u32>) {
        for (ty, count) in required.iter() {
            if let (Some(remaining), Some(capacity)) =
                (self.remaining.get_mut(ty), self.capacity.get(ty))
            {
                *remaining = remaining.saturating_add(*count).min(*capacity);
            }
        }
        self.remaining_sets = self.remaining_sets.saturating_add(1).min(self.max_sets);
    }

    fn mark_full(&mut self) {
        self.remaining.values_mut().for_each(|remaining| *remaining = 0);
        self.remaining_sets = 0;
    }

    fn restore(&mut self) {
        self.remaining = self.capacity.clone();
        self.remaining_sets = self.max_sets;
        self.out_of_rotation = false;
    }
}

/// A descriptor set allocated from a [`DescriptorPoolGroup`].
///
/// The handle is only meaningful together with the group that issued it, and is
/// invalidated when it is freed or when the group is reset.
#[derive(Debug)]
pub struct DescriptorSet {
    group: u64,
    generation: u64,
    id: u64,
    pool: u64,
    set: u32,
    freeable: bool,
    bindings: Arc<[BindingSlot]>,
}

impl DescriptorSet {
    /// Index of this set within the pipeline layout.
    pub fn set_index(&self) -> u32 {
        self.set
    }
    pub fn pool_id(&self) -> u64 {
        self.pool
    }
    pub fn is_freeable(&self) -> bool {
        self.freeable
    }
    pub fn bindings(&self) -> &[BindingSlot] {
        &self.bindings
    }
    pub fn binding(&self, binding: u32) -> Option<&BindingSlot> {
        self.bindings.iter().find(|slot| slot.binding == binding)
    }
}

struct LiveSet {
    raw: vk::DescriptorSet,
    pool: u64,
}

/// A self-growing source of descriptor sets for one pipeline layout.
///
/// All sets of the layout draw from the same pools. Pools are created lazily; each new
/// pool is [`GROWTH_FACTOR`] times larger than the last. The group is not internally
/// synchronized.
pub struct DescriptorPoolGroup<B: Backend = Device> {
    id: u64,
    layout: Arc<PipelineLayout<B>>,
    pools: Vec<IndividualPool>,
    pool_sizes: BTreeMap<vk::DescriptorType, u32>,
    max_sets: u32,
    growth: f64,
    freeable: bool,

    generation: u64,
    next_set: u64,
    live: HashMap<u64, LiveSet>,
}

impl<B: Backend> HasDevice<B> for DescriptorPoolGroup<B> {
    fn device(&self) -> &Arc<B> {
        self.layout.device()
    }
}

impl<B: Backend> DescriptorPoolGroup<B> {
    pub fn new(layout: Arc<PipelineLayout<B>>, config: &PoolGroupConfig) -> Result<Self> {
        let multiplier = config.max_sets_multiplier.max(1);
        let pool_sizes: BTreeMap<_, _> = layout
            .layout()
            .pool_sizes()
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(ty, count)| (ty, count.saturating_mul(multiplier)))
            .collect();
        if pool_sizes.is_empty() {
            return Err(Error::EmptyLayout);
        }
        let max_sets = layout.layout().num_sets().saturating_mul(multiplier);
        Ok(Self {
            id: layout.device().next_pool_id(),
            pool_sizes,
            max_sets,
            layout,
            pools: Vec::new(),
            growth: 1.0,
            freeable: config.freeable_sets,
            generation: 0,
            next_set: 0,
            live: HashMap::new(),
        })
    }

    pub fn layout(&self) -> &Arc<PipelineLayout<B>> {
        &self.layout
    }
    pub fn pools(&self) -> &[IndividualPool] {
        &self.pools
    }
    /// Multiplier applied to the default sizes of the next pool created.
    pub fn growth_multiplier(&self) -> f64 {
        self.growth
    }
    pub fn default_pool_sizes(&self) -> &BTreeMap<vk::DescriptorType, u32> {
        &self.pool_sizes
    }
    pub fn default_max_sets(&self) -> u32 {
        self.max_sets
    }
    pub fn live_sets(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, set: &DescriptorSet) -> bool {
        set.group == self.id
            && set.generation == self.generation
            && self.live.contains_key(&set.id)
    }

    pub fn raw(&self, set: &DescriptorSet) -> Result<vk::DescriptorSet> {
        self.live_set(set).map(|live| live.raw)
    }

    fn live_set(&self, set: &DescriptorSet) -> Result<&LiveSet> {
        if set.group != self.id || set.generation != self.generation {
            return Err(Error::StaleDescriptorSet);
        }
        self.live.get(&set.id).ok_or(Error::StaleDescriptorSet)
    }

    fn create_pool(&mut self) -> Result<usize> {
        let capacity: BTreeMap<_, _> = self
            .pool_sizes
            .iter()
            .map(|(ty, count)| (*ty, ((*count as f64 * self.growth).ceil() as u32).max(1)))
            .collect();
        let max_sets = ((self.max_sets as f64 * self.growth).ceil() as u32).max(1);
        let sizes: Vec<_> = capacity
            .iter()
            .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: *descriptor_count,
            })
            .collect();
        let flags = if self.freeable {
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET
        } else {
            vk::DescriptorPoolCreateFlags::empty()
        };
        let device = self.layout.device();
        let raw = unsafe { device.create_descriptor_pool(flags, max_sets, &sizes)? };
        let id = device.next_pool_id();
        tracing::debug!(pool = ?raw, id, max_sets, growth = self.growth, "create descriptor pool");
        self.growth *= GROWTH_FACTOR;
        self.pools.push(IndividualPool {
            id,
            raw,
            remaining: capacity.clone(),
            capacity,
            max_sets,
            remaining_sets: max_sets,
            freeable: self.freeable,
            out_of_rotation: false,
        });
        Ok(self.pools.len() - 1)
    }

    /// Allocate one instance of set `set` of the layout.
    ///
    /// Pool exhaustion and fragmentation are retried against a fresh pool generation, up to
    /// [`MAX_ALLOCATION_ATTEMPTS`] attempts in total.
    pub fn allocate(&mut self, set: u32) -> Result<DescriptorSet> {
        let set_layout = self
            .layout
            .desc_sets()
            .get(set as usize)
            .ok_or(Error::SetIndexOutOfRange {
                set,
                len: self.layout.desc_sets().len() as u32,
            })?
            .clone();
        let required = set_layout.desc_types();

        let mut force_new_pool = false;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let candidate = if force_new_pool {
                None
            } else {
                self.pools.iter().position(|pool| pool.fits(required))
            };
            let index = match candidate {
                Some(index) => index,
                None => self.create_pool()?,
            };
            let pool = &mut self.pools[index];
            let result = unsafe {
                self.layout
                    .device()
                    .allocate_descriptor_set(pool.raw, set_layout.raw())
            };
            match result {
                Ok(raw) => {
                    pool.consume(required);
                    let id = self.next_set;
                    self.next_set += 1;
                    self.live.insert(id, LiveSet { raw, pool: pool.id });
                    return Ok(DescriptorSet {
                        group: self.id,
                        generation: self.generation,
                        id,
                        pool: pool.id,
                        set,
                        freeable: pool.freeable,
                        bindings: set_layout.bindings().clone(),
                    });
                }
                Err(
                    result @ (vk::Result::ERROR_OUT_OF_POOL_MEMORY
                    | vk::Result::ERROR_FRAGMENTED_POOL),
                ) => {
                    if result == vk::Result::ERROR_FRAGMENTED_POOL {
                        tracing::debug!(
                            pool = pool.id,
                            "descriptor pool fragmented, taking it out of rotation"
                        );
                        pool.out_of_rotation = true;
                    } else {
                        tracing::debug!(pool = pool.id, "descriptor pool exhausted");
                        pool.mark_full();
                    }
                    if attempts >= MAX_ALLOCATION_ATTEMPTS {
                        tracing::warn!(set, attempts, ?result, "descriptor set allocation failed");
                        return Err(Error::AllocationFailed { attempts, result });
                    }
                    force_new_pool = true;
                }
                Err(result) => return Err(result.into()),
            }
        }
    }

    /// Retire a set. Its backend resources are returned immediately only if its pool is
    /// freeable; otherwise they are reclaimed on [`reset`](Self::reset).
    pub fn free(&mut self, set: DescriptorSet) -> Result<()> {
        self.live_set(&set)?;
        let Some(live) = self.live.remove(&set.id) else {
            return Err(Error::StaleDescriptorSet);
        };
        if !set.freeable {
            return Ok(());
        }
        let Some(pool) = self.pools.iter_mut().find(|pool| pool.id == live.pool) else {
            return Ok(());
        };
        unsafe {
            self.layout
                .device()
                .free_descriptor_set(pool.raw, live.raw)?;
        }
        if let Some(set_layout) = self.layout.desc_sets().get(set.set as usize) {
            pool.give_back(set_layout.desc_types());
        }
        Ok(())
    }

    /// Recycle every pool in place. All outstanding sets become stale. Growth history is kept.
    ///
    /// Outstanding sets are invalidated even when a pool fails to reset. Pools that were not
    /// reset stay out of rotation until a later reset succeeds on them.
    pub fn reset(&mut self) -> Result<()> {
        self.live.clear();
        self.generation += 1;
        for pool in self.pools.iter_mut() {
            pool.out_of_rotation = true;
        }
        for pool in self.pools.iter_mut() {
            unsafe {
                self.layout.device().reset_descriptor_pool(pool.raw)?;
            }
            pool.restore();
        }
        Ok(())
    }

    /// Release every pool. Equivalent to dropping the group.
    pub fn destroy(self) {}

    /// Submit writes to `set`. Writes naming a binding the set does not have, or with a
    /// descriptor type or array range that does not match the binding, are skipped.
    pub fn write(&self, set: &DescriptorSet, writes: &[DescriptorSetWrite]) -> Result<()> {
        let dst_set = self.live_set(set)?.raw;
        let valid: Vec<&DescriptorSetWrite> = writes
            .iter()
            .filter(|write| {
                let Some(slot) = set.binding(write.binding) else {
                    tracing::warn!(
                        set = set.set,
                        binding = write.binding,
                        "write to a binding the layout does not declare"
                    );
                    return false;
                };
                if slot.descriptor_type != write.descriptor_type() {
                    tracing::warn!(
                        set = set.set,
                        binding = write.binding,
                        expected = ?slot.descriptor_type,
                        actual = ?write.descriptor_type(),
                        "descriptor type mismatch"
                    );
                    return false;
                }
                let end = write.array_element.checked_add(write.descriptor_count());
                if end.map_or(true, |end| end > slot.count) {
                    tracing::warn!(
                        set = set.set,
                        binding = write.binding,
                        count = slot.count,
                        first = write.array_element,
                        len = write.descriptor_count(),
                        "write exceeds the binding's array"
                    );
                    return false;
                }
                true
            })
            .collect();
        if valid.is_empty() {
            return Ok(());
        }

        let mut accel_infos =
            vec![vk::WriteDescriptorSetAccelerationStructureKHR::default(); valid.len()];
        let raw_writes: Vec<_> = valid
            .iter()
            .zip(accel_infos.iter_mut())
            .map(|(write, accel_info)| write.raw(dst_set, accel_info))
            .collect();
        unsafe {
            self.layout.device().update_descriptor_sets(&raw_writes);
        }
        drop(accel_infos);
        Ok(())
    }
}

impl<B: Backend> Drop for DescriptorPoolGroup<B> {
    fn drop(&mut self) {
        for pool in self.pools.drain(..) {
            tracing::debug!(pool = ?pool.raw, id = pool.id, "drop descriptor pool");
            unsafe {
                self.layout.device().destroy_descriptor_pool(pool.raw);
            }
        }
    }
}
