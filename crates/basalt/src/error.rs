use ash::vk;
use thiserror::Error;

use crate::render_pass::AttachmentRoles;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("shader stage {0:?} has no execution model mapping")]
    UnsupportedStage(vk::ShaderStageFlags),
    #[error("entry point `{name}` with stage {stage:?} not found in shader binary")]
    EntryPointNotFound {
        name: String,
        stage: vk::ShaderStageFlags,
    },
    #[error("spirv reflection failed: {0}")]
    Reflection(String),

    #[error("layout declares no descriptors")]
    EmptyLayout,
    #[error("set index {set} out of range, layout has {len} sets")]
    SetIndexOutOfRange { set: u32, len: u32 },

    #[error("render pass declares no subpasses")]
    NoSubpasses,
    #[error("attachment {attachment} references subpass {subpass}, but only {count} subpasses exist")]
    SubpassOutOfRange {
        attachment: u32,
        subpass: u32,
        count: u32,
    },
    #[error("attachment {attachment} resolves into attachment {target}, which does not exist")]
    AttachmentOutOfRange { attachment: u32, target: u32 },
    #[error("subpass {subpass}: slot {slot} of {role:?} claimed by attachments {first} and {second}")]
    DuplicateSlot {
        subpass: u32,
        role: AttachmentRoles,
        slot: u32,
        first: u32,
        second: u32,
    },
    #[error("subpass {0} references more than one depth/stencil attachment")]
    MultipleDepthAttachments(u32),
    #[error("subpass {0} has neither color nor depth attachments")]
    EmptySubpass(u32),

    #[error("descriptor set handle is stale or belongs to another pool group")]
    StaleDescriptorSet,
    #[error("descriptor set allocation failed after {attempts} attempts: {result}")]
    AllocationFailed { attempts: u32, result: vk::Result },
    #[error(transparent)]
    Vk(#[from] vk::Result),
}
