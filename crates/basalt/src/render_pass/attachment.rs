use std::collections::BTreeMap;

use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// The ways a subpass can use an attachment.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AttachmentRoles: u32 {
        const COLOR = 1 << 0;
        const DEPTH_STENCIL = 1 << 1;
        const INPUT = 1 << 2;
        const RESOLVE = 1 << 3;
        const PRESERVE = 1 << 4;
    }
}

/// Position of an attachment within a role's reference array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotIndex {
    /// The attachment's position among the attachments taking the same role, in declaration order.
    #[default]
    Auto,
    /// A fixed position, e.g. the `location` the shader binds the attachment to.
    Explicit(u32),
    /// Excluded from the subpass altogether.
    Ignored,
}

/// How one subpass uses an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubpassRole {
    pub roles: AttachmentRoles,
    pub index: SlotIndex,
    pub layout: vk::ImageLayout,
    /// For resolve roles: the multisampled color attachment resolved into this one.
    pub resolve_target: Option<u32>,
}

impl SubpassRole {
    pub fn new(roles: AttachmentRoles, layout: vk::ImageLayout) -> Self {
        Self {
            roles,
            index: SlotIndex::Auto,
            layout,
            resolve_target: None,
        }
    }
    pub fn color() -> Self {
        Self::new(
            AttachmentRoles::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )
    }
    pub fn depth_stencil() -> Self {
        Self::new(
            AttachmentRoles::DEPTH_STENCIL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
    }
    pub fn input() -> Self {
        Self::new(
            AttachmentRoles::INPUT,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }
    /// Receives the resolved contents of color attachment `target`.
    pub fn resolve(target: u32) -> Self {
        Self {
            resolve_target: Some(target),
            ..Self::new(
                AttachmentRoles::RESOLVE,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )
        }
    }
    pub fn preserve() -> Self {
        Self::new(AttachmentRoles::PRESERVE, vk::ImageLayout::UNDEFINED)
    }
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = SlotIndex::Explicit(index);
        self
    }
    pub fn ignored(mut self) -> Self {
        self.index = SlotIndex::Ignored;
        self
    }
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }
    pub fn with_roles(mut self, roles: AttachmentRoles) -> Self {
        self.roles |= roles;
        self
    }
}

/// An attachment of a render pass and its role in each subpass.
#[derive(Clone, Debug)]
pub struct AttachmentDescriptionEntry {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    /// Keyed by subpass index. Subpasses not listed do not use the attachment.
    pub subpasses: BTreeMap<u32, SubpassRole>,
}

impl AttachmentDescriptionEntry {
    pub fn new(format: vk::Format) -> Self {
        Self {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::GENERAL,
            subpasses: BTreeMap::new(),
        }
    }
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }
    pub fn ops(mut self, load_op: vk::AttachmentLoadOp, store_op: vk::AttachmentStoreOp) -> Self {
        self.load_op = load_op;
        self.store_op = store_op;
        self
    }
    pub fn stencil_ops(
        mut self,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> Self {
        self.stencil_load_op = load_op;
        self.stencil_store_op = store_op;
        self
    }
    pub fn layouts(
        mut self,
        initial_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
    ) -> Self {
        self.initial_layout = initial_layout;
        self.final_layout = final_layout;
        self
    }
    pub fn role(mut self, subpass: u32, role: SubpassRole) -> Self {
        self.subpasses.insert(subpass, role);
        self
    }

    pub fn raw(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: self.format,
            samples: self.samples,
            load_op: self.load_op,
            store_op: self.store_op,
            stencil_load_op: self.stencil_load_op,
            stencil_store_op: self.stencil_store_op,
            initial_layout: self.initial_layout,
            final_layout: self.final_layout,
        }
    }
}
