mod attachment;
mod resolve;

pub use attachment::*;
pub use resolve::*;

use std::sync::Arc;

use ash::{prelude::VkResult, vk};

use crate::{Backend, Device, HasDevice};

pub struct RenderPass<B: Backend = Device> {
    device: Arc<B>,
    raw: vk::RenderPass,
    color_counts: Vec<u32>,
}

impl<B: Backend> RenderPass<B> {
    /// Create a render pass from attachments and the plan resolved from them.
    pub fn new(
        device: Arc<B>,
        attachments: &[AttachmentDescriptionEntry],
        plan: &RenderPassPlan,
    ) -> VkResult<Self> {
        let raw_attachments: Vec<_> = attachments
            .iter()
            .map(AttachmentDescriptionEntry::raw)
            .collect();
        let subpasses: Vec<_> = plan.subpasses.iter().map(SubpassPlan::raw).collect();
        let info = vk::RenderPassCreateInfo {
            attachment_count: raw_attachments.len() as u32,
            p_attachments: raw_attachments.as_ptr(),
            subpass_count: subpasses.len() as u32,
            p_subpasses: subpasses.as_ptr(),
            dependency_count: plan.dependencies.len() as u32,
            p_dependencies: plan.dependencies.as_ptr(),
            ..Default::default()
        };
        let raw = unsafe { device.create_render_pass(&info)? };
        tracing::debug!(render_pass = ?raw, subpasses = subpasses.len(), "created render pass");
        Ok(Self {
            device,
            raw,
            color_counts: plan.color_counts(),
        })
    }
    pub unsafe fn raw(&self) -> vk::RenderPass {
        self.raw
    }
    /// Color attachment count of `subpass`, which its pipelines' blend states must match.
    pub fn color_count(&self, subpass: u32) -> Option<u32> {
        self.color_counts.get(subpass as usize).copied()
    }
    pub fn color_counts(&self) -> &[u32] {
        &self.color_counts
    }
}

impl<B: Backend> HasDevice<B> for RenderPass<B> {
    fn device(&self) -> &Arc<B> {
        &self.device
    }
}

impl<B: Backend> Drop for RenderPass<B> {
    fn drop(&mut self) {
        tracing::debug!(render_pass = ?self.raw, "drop render pass");
        unsafe {
            self.device.destroy_render_pass(self.raw);
        }
    }
}
