use std::ops::Range;

use ash::vk;
use serde::{Deserialize, Serialize};
use spirq::inspect::Inspector;
use spirq::parse::Instr;
use spirq::reflect::ReflectIntermediate;
use spirq::ty::{StorageClass, Type};

use crate::descriptor::BindingSlot;
use crate::{Error, Result};

/// Descriptor count substituted for runtime-sized descriptor arrays.
pub const RUNTIME_ARRAY_COUNT: u32 = 64;

const SPIRV_MAGIC: u32 = 0x0723_0203;
const SPIRV_HEADER_LEN: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectOptions {
    /// Descriptor count used for unsized arrays, since set layouts need a static count.
    pub runtime_array_count: u32,
    /// Map buffer-dimensioned images to `UNIFORM_TEXEL_BUFFER` / `STORAGE_TEXEL_BUFFER`.
    /// When disabled they keep the type of their category with a 2D image.
    pub texel_buffers: bool,
}

impl Default for ReflectOptions {
    fn default() -> Self {
        Self {
            runtime_array_count: RUNTIME_ARRAY_COUNT,
            texel_buffers: true,
        }
    }
}

/// The resource categories a shader interface can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    /// Image and sampler in one (`sampler2D`). `buffer` is set for `samplerBuffer`.
    CombinedImageSampler { buffer: bool },
    SeparateSampler,
    /// Image without a sampler (`texture2D`). `buffer` is set for `textureBuffer`.
    SampledImage { buffer: bool },
    /// `buffer` is set for buffer-dimensioned storage images (`imageBuffer`).
    StorageImage { buffer: bool },
    UniformBuffer,
    StorageBuffer,
    SubpassInput,
    AccelerationStructure,
}

impl ResourceCategory {
    pub fn descriptor_type(self, texel_buffers: bool) -> vk::DescriptorType {
        match self {
            Self::CombinedImageSampler { buffer: true } | Self::SampledImage { buffer: true }
                if texel_buffers =>
            {
                vk::DescriptorType::UNIFORM_TEXEL_BUFFER
            }
            Self::CombinedImageSampler { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::SeparateSampler => vk::DescriptorType::SAMPLER,
            Self::SampledImage { .. } => vk::DescriptorType::SAMPLED_IMAGE,
            Self::StorageImage { buffer: true } if texel_buffers => {
                vk::DescriptorType::STORAGE_TEXEL_BUFFER
            }
            Self::StorageImage { .. } => vk::DescriptorType::STORAGE_IMAGE,
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::SubpassInput => vk::DescriptorType::INPUT_ATTACHMENT,
            Self::AccelerationStructure => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayCount {
    /// Product of all declared array dimensions. 1 for non-arrayed resources.
    Sized(u32),
    Runtime,
}

/// One descriptor declared by a shader stage, before it is folded into a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReflectedResource {
    pub category: ResourceCategory,
    pub set: u32,
    pub binding: u32,
    pub count: ArrayCount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexInput {
    pub location: u32,
    pub format: vk::Format,
}

/// The resource interface of a single shader stage.
#[derive(Clone, Debug, Default)]
pub struct ReflectedInfo {
    pub stage: vk::ShaderStageFlags,
    /// Indexed by set number. Sets the stage does not use are empty.
    pub sets: Vec<Vec<BindingSlot>>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    /// Only populated for vertex stages.
    pub vertex_inputs: Vec<VertexInput>,
}

impl ReflectedInfo {
    /// Reflect the resource interface of `entry_point` in a compiled SPIR-V binary.
    ///
    /// Every descriptor the module declares is reported, whether or not the entry point
    /// statically uses it.
    pub fn reflect(
        spirv: &[u32],
        stage: vk::ShaderStageFlags,
        entry_point: &str,
        options: &ReflectOptions,
    ) -> Result<Self> {
        use spirq::var::Variable;

        let execution_model = execution_model(stage)?;
        if spirv.len() < SPIRV_HEADER_LEN || spirv[0] != SPIRV_MAGIC {
            return Err(Error::Reflection("not a SPIR-V module".to_string()));
        }
        let mut collector = DescriptorCollector::default();
        let entry_points = spirq::ReflectConfig::new()
            .spv(spirv)
            .ref_all_rscs(true)
            .reflect_inspect(&mut collector)
            .map_err(|err| Error::Reflection(err.to_string()))?;
        let entry = entry_points
            .into_iter()
            .find(|entry| {
                entry.name == entry_point && entry.exec_model as u32 == execution_model
            })
            .ok_or_else(|| Error::EntryPointNotFound {
                name: entry_point.to_string(),
                stage,
            })?;

        let mut push_constants = Vec::new();
        let mut vertex_inputs = Vec::new();
        for var in entry.vars.iter() {
            match var {
                Variable::PushConstant { ty, .. } => {
                    if let Some(range) = push_constant_range(ty) {
                        push_constants.push(range);
                    }
                }
                Variable::Input { location, ty, .. } if stage == vk::ShaderStageFlags::VERTEX => {
                    match vertex_input_format(ty) {
                        Some(format) => vertex_inputs.push(VertexInput {
                            location: location.loc(),
                            format,
                        }),
                        None => {
                            tracing::warn!(
                                location = location.loc(),
                                ty = ?ty,
                                "vertex input has no attribute format"
                            )
                        }
                    }
                }
                _ => (),
            }
        }

        let resources = collector.resources.unwrap_or_default();
        let mut info = Self::from_resources(stage, resources, push_constants, options);
        vertex_inputs.sort_by_key(|input| input.location);
        info.vertex_inputs = vertex_inputs;
        Ok(info)
    }

    /// Fold a stage's resources into per-set binding lists.
    pub fn from_resources(
        stage: vk::ShaderStageFlags,
        resources: impl IntoIterator<Item = ReflectedResource>,
        push_constants: impl IntoIterator<Item = Range<u32>>,
        options: &ReflectOptions,
    ) -> Self {
        let mut sets: Vec<Vec<BindingSlot>> = Vec::new();
        for resource in resources {
            if sets.len() <= resource.set as usize {
                sets.resize_with(resource.set as usize + 1, Vec::new);
            }
            let count = match resource.count {
                ArrayCount::Sized(count) => count.max(1),
                ArrayCount::Runtime => options.runtime_array_count.max(1),
            };
            sets[resource.set as usize].push(BindingSlot {
                set: resource.set,
                binding: resource.binding,
                descriptor_type: resource.category.descriptor_type(options.texel_buffers),
                count,
                stage_flags: stage,
            });
        }
        let push_constant_ranges = push_constants
            .into_iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: stage,
                offset: range.start,
                size: range.end - range.start,
            })
            .collect();
        Self {
            stage,
            sets,
            push_constant_ranges,
            vertex_inputs: Vec::new(),
        }
    }
}

/// The SPIR-V `ExecutionModel` operand for a single shader stage.
pub fn execution_model(stage: vk::ShaderStageFlags) -> Result<u32> {
    Ok(match stage {
        vk::ShaderStageFlags::VERTEX => 0,
        vk::ShaderStageFlags::TESSELLATION_CONTROL => 1,
        vk::ShaderStageFlags::TESSELLATION_EVALUATION => 2,
        vk::ShaderStageFlags::GEOMETRY => 3,
        vk::ShaderStageFlags::FRAGMENT => 4,
        vk::ShaderStageFlags::COMPUTE => 5,
        vk::ShaderStageFlags::RAYGEN_KHR => 5313,
        vk::ShaderStageFlags::INTERSECTION_KHR => 5314,
        vk::ShaderStageFlags::ANY_HIT_KHR => 5315,
        vk::ShaderStageFlags::CLOSEST_HIT_KHR => 5316,
        vk::ShaderStageFlags::MISS_KHR => 5317,
        vk::ShaderStageFlags::CALLABLE_KHR => 5318,
        vk::ShaderStageFlags::TASK_EXT => 5364,
        vk::ShaderStageFlags::MESH_EXT => 5365,
        _ => return Err(Error::UnsupportedStage(stage)),
    })
}

/// Collects descriptor variables from the module's global declarations.
///
/// Works on the variable registry rather than spirq's descriptor variables, which only
/// unwrap one array level and drop `texture2D t[2][3]`.
#[derive(Default)]
struct DescriptorCollector {
    resources: Option<Vec<ReflectedResource>>,
}

impl Inspector for DescriptorCollector {
    fn inspect<'a>(
        &mut self,
        itm: &mut ReflectIntermediate<'a>,
        _instr: &Instr,
    ) -> spirq::error::Result<()> {
        // Globals are fully parsed before the first function instruction.
        if self.resources.is_some() {
            return Ok(());
        }
        let mut resources = Vec::new();
        for (var_id, var) in itm.var_reg.iter() {
            let store_cls = var.ptr_ty.store_cls;
            if !matches!(
                store_cls,
                StorageClass::Uniform | StorageClass::StorageBuffer | StorageClass::UniformConstant
            ) {
                continue;
            }
            let desc_bind = itm.deco_reg.get_var_desc_bind_or_default(*var_id);
            let (ty, count) = array_count(&var.ptr_ty.pointee_ty);
            let Some(category) = resource_category(ty, store_cls) else {
                tracing::warn!(
                    set = desc_bind.set(),
                    binding = desc_bind.bind(),
                    ty = ?ty,
                    "skipping unsupported descriptor"
                );
                continue;
            };
            resources.push(ReflectedResource {
                category,
                set: desc_bind.set(),
                binding: desc_bind.bind(),
                count,
            });
        }
        resources.sort_by_key(|resource| (resource.set, resource.binding));
        self.resources = Some(resources);
        Ok(())
    }
}

/// Peel every array level off a descriptor type. The count is the product of all
/// dimensions, or [`ArrayCount::Runtime`] if any of them is unsized.
fn array_count(mut ty: &Type) -> (&Type, ArrayCount) {
    let mut count = Some(1u32);
    while let Type::Array(array) = ty {
        count = match (count, array.nelement) {
            (Some(count), Some(nelement)) => Some(count.saturating_mul(nelement)),
            _ => None,
        };
        ty = &array.element_ty;
    }
    (ty, count.map_or(ArrayCount::Runtime, ArrayCount::Sized))
}

fn resource_category(ty: &Type, store_cls: StorageClass) -> Option<ResourceCategory> {
    use spirq::spirv::Dim;
    Some(match ty {
        Type::Struct(_) if store_cls == StorageClass::StorageBuffer => {
            ResourceCategory::StorageBuffer
        }
        Type::Struct(_) => ResourceCategory::UniformBuffer,
        Type::Image(image) if image.is_sampled == Some(false) => ResourceCategory::StorageImage {
            buffer: image.dim == Dim::DimBuffer,
        },
        Type::Image(image) => ResourceCategory::SampledImage {
            buffer: image.dim == Dim::DimBuffer,
        },
        Type::SampledImage(image) => ResourceCategory::SampledImage {
            buffer: image.dim == Dim::DimBuffer,
        },
        Type::StorageImage(image) => ResourceCategory::StorageImage {
            buffer: image.dim == Dim::DimBuffer,
        },
        Type::CombinedImageSampler(combined) => ResourceCategory::CombinedImageSampler {
            buffer: combined.sampled_image_ty.dim == Dim::DimBuffer,
        },
        Type::Sampler(_) => ResourceCategory::SeparateSampler,
        Type::SubpassData(_) => ResourceCategory::SubpassInput,
        Type::AccelStruct(_) => ResourceCategory::AccelerationStructure,
        _ => return None,
    })
}

/// Byte range covered by the sized members of a push constant block.
fn push_constant_range(ty: &Type) -> Option<Range<u32>> {
    fn visit(ty: &Type, offset: u32, range: &mut Range<u32>) {
        match ty {
            Type::Struct(ty) => {
                for member in ty.members.iter() {
                    visit(
                        &member.ty,
                        offset + member.offset.unwrap_or(0) as u32,
                        range,
                    );
                }
            }
            _ => {
                if let Some(nbyte) = ty.nbyte() {
                    range.start = range.start.min(offset);
                    range.end = range.end.max(offset + nbyte as u32);
                }
            }
        }
    }

    let mut range = u32::MAX..0;
    visit(ty, 0, &mut range);
    (range.start < range.end).then_some(range)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    SInt,
    UInt,
}

fn vertex_input_format(ty: &Type) -> Option<vk::Format> {
    use spirq::ty::ScalarType;
    let (scalar, components) = match ty {
        Type::Scalar(scalar) => (scalar, 1),
        Type::Vector(vector) => (&vector.scalar_ty, vector.nscalar as u32),
        _ => return None,
    };
    let (kind, bits) = match scalar {
        ScalarType::Float { bits, .. } => (ScalarKind::Float, *bits),
        ScalarType::Integer {
            bits,
            is_signed: true,
            ..
        } => (ScalarKind::SInt, *bits),
        ScalarType::Integer {
            bits,
            is_signed: false,
            ..
        } => (ScalarKind::UInt, *bits),
        _ => return None,
    };
    attribute_format(kind, bits, components)
}

/// Vertex attribute format for a scalar or vector of `components` elements.
pub fn attribute_format(kind: ScalarKind, bits: u32, components: u32) -> Option<vk::Format> {
    use vk::Format as F;
    #[rustfmt::skip]
    let formats: [F; 4] = match (kind, bits) {
        (ScalarKind::Float, 16) => [F::R16_SFLOAT, F::R16G16_SFLOAT, F::R16G16B16_SFLOAT, F::R16G16B16A16_SFLOAT],
        (ScalarKind::Float, 32) => [F::R32_SFLOAT, F::R32G32_SFLOAT, F::R32G32B32_SFLOAT, F::R32G32B32A32_SFLOAT],
        (ScalarKind::Float, 64) => [F::R64_SFLOAT, F::R64G64_SFLOAT, F::R64G64B64_SFLOAT, F::R64G64B64A64_SFLOAT],
        (ScalarKind::SInt, 32) => [F::R32_SINT, F::R32G32_SINT, F::R32G32B32_SINT, F::R32G32B32A32_SINT],
        (ScalarKind::UInt, 32) => [F::R32_UINT, F::R32G32_UINT, F::R32G32B32_UINT, F::R32G32B32A32_UINT],
        (ScalarKind::SInt, 16) => [F::R16_SINT, F::R16G16_SINT, F::R16G16B16_SINT, F::R16G16B16A16_SINT],
        (ScalarKind::UInt, 16) => [F::R16_UINT, F::R16G16_UINT, F::R16G16B16_UINT, F::R16G16B16A16_UINT],
        _ => return None,
    };
    formats.get(components.checked_sub(1)? as usize).copied()
}
