use ash::vk;

/// A pending update of one binding of a descriptor set. The destination set is
/// supplied when the write is submitted through its pool group.
pub struct DescriptorSetWrite<'a> {
    pub binding: u32,
    pub array_element: u32,
    ty: DescriptorSetWriteType<'a>,
}

impl<'a> DescriptorSetWrite<'a> {
    pub fn input_attachments(
        binding: u32,
        array_element: u32,
        images: &'a [vk::DescriptorImageInfo],
    ) -> Self {
        Self::new(binding, array_element, DescriptorSetWriteType::InputAttachment(images))
    }
    pub fn combined_image_samplers(
        binding: u32,
        array_element: u32,
        images: &'a [vk::DescriptorImageInfo],
    ) -> Self {
        Self::new(
            binding,
            array_element,
            DescriptorSetWriteType::CombinedImageSampler(images),
        )
    }
    pub fn storage_images(
        binding: u32,
        array_element: u32,
        images: &'a [vk::DescriptorImageInfo],
    ) -> Self {
        Self::new(binding, array_element, DescriptorSetWriteType::StorageImage(images))
    }
    pub fn sampled_images(
        binding: u32,
        array_element: u32,
        images: &'a [vk::DescriptorImageInfo],
    ) -> Self {
        Self::new(binding, array_element, DescriptorSetWriteType::SampledImage(images))
    }
    pub fn samplers(
        binding: u32,
        array_element: u32,
        samplers: &'a [vk::DescriptorImageInfo],
    ) -> Self {
        Self::new(binding, array_element, DescriptorSetWriteType::Sampler(samplers))
    }
    pub fn uniform_buffers(
        binding: u32,
        array_element: u32,
        buffers: &'a [vk::DescriptorBufferInfo],
    ) -> Self {
        Self::new(binding, array_element, DescriptorSetWriteType::UniformBuffer(buffers))
    }
    pub fn storage_buffers(
        binding: u32,
        array_element: u32,
        buffers: &'a [vk::DescriptorBufferInfo],
    ) -> Self {
        Self::new(binding, array_element, DescriptorSetWriteType::StorageBuffer(buffers))
    }
    pub fn uniform_texel_buffers(
        binding: u32,
        array_element: u32,
        views: &'a [vk::BufferView],
    ) -> Self {
        Self::new(
            binding,
            array_element,
            DescriptorSetWriteType::UniformTexelBuffer(views),
        )
    }
    pub fn storage_texel_buffers(
        binding: u32,
        array_element: u32,
        views: &'a [vk::BufferView],
    ) -> Self {
        Self::new(
            binding,
            array_element,
            DescriptorSetWriteType::StorageTexelBuffer(views),
        )
    }
    pub fn accel_structs(
        binding: u32,
        array_element: u32,
        accel_structs: &'a [vk::AccelerationStructureKHR],
    ) -> Self {
        Self::new(
            binding,
            array_element,
            DescriptorSetWriteType::AccelerationStructure(accel_structs),
        )
    }

    fn new(binding: u32, array_element: u32, ty: DescriptorSetWriteType<'a>) -> Self {
        Self {
            binding,
            array_element,
            ty,
        }
    }

    pub fn ty(&self) -> &DescriptorSetWriteType<'a> {
        &self.ty
    }

    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match &self.ty {
            DescriptorSetWriteType::Sampler(_) => vk::DescriptorType::SAMPLER,
            DescriptorSetWriteType::CombinedImageSampler(_) => {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            }
            DescriptorSetWriteType::SampledImage(_) => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorSetWriteType::StorageImage(_) => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorSetWriteType::UniformTexelBuffer(_) => {
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER
            }
            DescriptorSetWriteType::StorageTexelBuffer(_) => {
                vk::DescriptorType::STORAGE_TEXEL_BUFFER
            }
            DescriptorSetWriteType::UniformBuffer(_) => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorSetWriteType::StorageBuffer(_) => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorSetWriteType::InputAttachment(_) => vk::DescriptorType::INPUT_ATTACHMENT,
            DescriptorSetWriteType::AccelerationStructure(_) => {
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
            }
        }
    }

    pub fn descriptor_count(&self) -> u32 {
        match &self.ty {
            DescriptorSetWriteType::StorageImage(images)
            | DescriptorSetWriteType::SampledImage(images)
            | DescriptorSetWriteType::CombinedImageSampler(images)
            | DescriptorSetWriteType::InputAttachment(images)
            | DescriptorSetWriteType::Sampler(images) => images.len() as u32,
            DescriptorSetWriteType::StorageBuffer(buffers)
            | DescriptorSetWriteType::UniformBuffer(buffers) => buffers.len() as u32,
            DescriptorSetWriteType::StorageTexelBuffer(views)
            | DescriptorSetWriteType::UniformTexelBuffer(views) => views.len() as u32,
            DescriptorSetWriteType::AccelerationStructure(accel_structs) => {
                accel_structs.len() as u32
            }
        }
    }

    /// The raw write. `accel_info` must outlive the returned struct when this is an
    /// acceleration structure write, since it is chained through `p_next`.
    pub(crate) fn raw(
        &self,
        dst_set: vk::DescriptorSet,
        accel_info: &mut vk::WriteDescriptorSetAccelerationStructureKHR,
    ) -> vk::WriteDescriptorSet {
        let mut write = vk::WriteDescriptorSet {
            dst_set,
            dst_binding: self.binding,
            dst_array_element: self.array_element,
            descriptor_type: self.descriptor_type(),
            descriptor_count: self.descriptor_count(),
            ..Default::default()
        };
        match &self.ty {
            DescriptorSetWriteType::StorageImage(images)
            | DescriptorSetWriteType::SampledImage(images)
            | DescriptorSetWriteType::CombinedImageSampler(images)
            | DescriptorSetWriteType::InputAttachment(images)
            | DescriptorSetWriteType::Sampler(images) => {
                write.p_image_info = images.as_ptr();
            }
            DescriptorSetWriteType::StorageBuffer(buffers)
            | DescriptorSetWriteType::UniformBuffer(buffers) => {
                write.p_buffer_info = buffers.as_ptr();
            }
            DescriptorSetWriteType::StorageTexelBuffer(views)
            | DescriptorSetWriteType::UniformTexelBuffer(views) => {
                write.p_texel_buffer_view = views.as_ptr();
            }
            DescriptorSetWriteType::AccelerationStructure(accel_structs) => {
                accel_info.p_acceleration_structures = accel_structs.as_ptr();
                accel_info.acceleration_structure_count = accel_structs.len() as u32;
                write.p_next = accel_info as *const _ as *const _;
            }
        }
        write
    }
}

pub enum DescriptorSetWriteType<'a> {
    Sampler(&'a [vk::DescriptorImageInfo]),
    CombinedImageSampler(&'a [vk::DescriptorImageInfo]),
    SampledImage(&'a [vk::DescriptorImageInfo]),
    StorageImage(&'a [vk::DescriptorImageInfo]),

    UniformTexelBuffer(&'a [vk::BufferView]),
    StorageTexelBuffer(&'a [vk::BufferView]),

    UniformBuffer(&'a [vk::DescriptorBufferInfo]),
    StorageBuffer(&'a [vk::DescriptorBufferInfo]),

    InputAttachment(&'a [vk::DescriptorImageInfo]),

    AccelerationStructure(&'a [vk::AccelerationStructureKHR]),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_accel_struct_write_chains_info() {
        let accel_structs = [
            vk::AccelerationStructureKHR::from_raw(1),
            vk::AccelerationStructureKHR::from_raw(2),
        ];
        let write = DescriptorSetWrite::accel_structs(3, 0, &accel_structs);
        assert_eq!(
            write.descriptor_type(),
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
        );
        let mut accel_info = vk::WriteDescriptorSetAccelerationStructureKHR::default();
        let raw = write.raw(vk::DescriptorSet::from_raw(7), &mut accel_info);
        assert_eq!(raw.dst_binding, 3);
        assert_eq!(raw.descriptor_count, 2);
        assert_eq!(accel_info.acceleration_structure_count, 2);
        assert!(!raw.p_next.is_null());
        assert!(raw.p_buffer_info.is_null());
    }

    #[test]
    fn test_texel_buffer_write() {
        let views = [vk::BufferView::null(); 3];
        let write = DescriptorSetWrite::storage_texel_buffers(0, 1, &views);
        assert_eq!(write.descriptor_count(), 3);
        let mut accel_info = vk::WriteDescriptorSetAccelerationStructureKHR::default();
        let raw = write.raw(vk::DescriptorSet::null(), &mut accel_info);
        assert_eq!(raw.descriptor_type, vk::DescriptorType::STORAGE_TEXEL_BUFFER);
        assert_eq!(raw.dst_array_element, 1);
        assert_eq!(raw.p_texel_buffer_view, views.as_ptr());
        assert!(raw.p_next.is_null());
    }
}
