use ash::vk;

use crate::shader::VertexInput;
use crate::utils::byte_width;

/// Vertex inputs packed in location order into a single interleaved binding.
#[derive(Clone, Debug, Default)]
pub struct VertexInputLayout {
    pub binding: vk::VertexInputBindingDescription,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputLayout {
    /// Inputs whose format has no fixed byte width are skipped with a warning.
    pub fn interleaved(binding: u32, inputs: &[VertexInput]) -> Self {
        let mut inputs = inputs.to_vec();
        inputs.sort_by_key(|input| input.location);

        let mut offset = 0;
        let mut attributes = Vec::with_capacity(inputs.len());
        for input in inputs {
            let Some(width) = byte_width(input.format) else {
                tracing::warn!(
                    location = input.location,
                    format = ?input.format,
                    "vertex input format has no byte width"
                );
                continue;
            };
            attributes.push(vk::VertexInputAttributeDescription {
                location: input.location,
                binding,
                format: input.format,
                offset,
            });
            offset += width;
        }
        Self {
            binding: vk::VertexInputBindingDescription {
                binding,
                stride: offset,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            attributes,
        }
    }
}
