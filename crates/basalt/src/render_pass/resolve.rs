use std::collections::BTreeMap;

use ash::vk;

use super::{AttachmentDescriptionEntry, AttachmentRoles, SlotIndex, SubpassRole};
use crate::utils::is_depth_stencil;
use crate::{Error, Result};

const UNUSED: vk::AttachmentReference = vk::AttachmentReference {
    attachment: vk::ATTACHMENT_UNUSED,
    layout: vk::ImageLayout::UNDEFINED,
};

/// The attachment references of one subpass.
#[derive(Clone, Debug, Default)]
pub struct SubpassPlan {
    /// Indexed by slot. Gaps hold `ATTACHMENT_UNUSED`.
    pub color: Vec<vk::AttachmentReference>,
    pub depth_stencil: Option<vk::AttachmentReference>,
    pub input: Vec<vk::AttachmentReference>,
    /// Parallel to `color`.
    pub resolve: Vec<vk::AttachmentReference>,
    pub preserve: Vec<u32>,
}

fn is_used(reference: &vk::AttachmentReference) -> bool {
    reference.attachment != vk::ATTACHMENT_UNUSED
}

impl SubpassPlan {
    /// Length of the color reference array, which the color blend state must match.
    pub fn color_count(&self) -> u32 {
        self.color.len() as u32
    }
    pub fn live_color_count(&self) -> u32 {
        self.color.iter().filter(|r| is_used(r)).count() as u32
    }
    pub fn live_resolve_count(&self) -> u32 {
        self.resolve.iter().filter(|r| is_used(r)).count() as u32
    }

    /// The raw description points into `self`, which must outlive it.
    pub fn raw(&self) -> vk::SubpassDescription {
        fn ptr<T>(items: &[T]) -> *const T {
            if items.is_empty() {
                std::ptr::null()
            } else {
                items.as_ptr()
            }
        }
        vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            input_attachment_count: self.input.len() as u32,
            p_input_attachments: ptr(&self.input),
            color_attachment_count: self.color.len() as u32,
            p_color_attachments: ptr(&self.color),
            p_resolve_attachments: if self.live_resolve_count() > 0 {
                self.resolve.as_ptr()
            } else {
                std::ptr::null()
            },
            p_depth_stencil_attachment: self
                .depth_stencil
                .as_ref()
                .map_or(std::ptr::null(), |r| r as *const _),
            preserve_attachment_count: self.preserve.len() as u32,
            p_preserve_attachments: ptr(&self.preserve),
            ..Default::default()
        }
    }
}

fn same_references(a: &[vk::AttachmentReference], b: &[vk::AttachmentReference]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(a, b)| a.attachment == b.attachment && a.layout == b.layout)
}

impl PartialEq for SubpassPlan {
    fn eq(&self, other: &Self) -> bool {
        same_references(&self.color, &other.color)
            && same_references(
                self.depth_stencil.as_slice(),
                other.depth_stencil.as_slice(),
            )
            && same_references(&self.input, &other.input)
            && same_references(&self.resolve, &other.resolve)
            && self.preserve == other.preserve
    }
}

#[derive(Clone, Debug)]
pub struct RenderPassPlan {
    pub subpasses: Vec<SubpassPlan>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassPlan {
    /// Per-subpass color reference array lengths, for sizing color blend states.
    pub fn color_counts(&self) -> Vec<u32> {
        self.subpasses.iter().map(SubpassPlan::color_count).collect()
    }
}

/// Conservative dependencies: external to the first subpass, between every consecutive
/// pair, and from the last subpass to external. Empty when there are no subpasses.
pub fn default_dependencies(subpass_count: u32) -> Vec<vk::SubpassDependency> {
    if subpass_count == 0 {
        return Vec::new();
    }
    let dependency = |src_subpass, dst_subpass| vk::SubpassDependency {
        src_subpass,
        dst_subpass,
        src_stage_mask: vk::PipelineStageFlags::ALL_COMMANDS,
        dst_stage_mask: vk::PipelineStageFlags::ALL_COMMANDS,
        src_access_mask: vk::AccessFlags::MEMORY_WRITE,
        dst_access_mask: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        dependency_flags: vk::DependencyFlags::empty(),
    };
    let mut dependencies = Vec::with_capacity(subpass_count as usize + 1);
    dependencies.push(dependency(vk::SUBPASS_EXTERNAL, 0));
    for subpass in 1..subpass_count {
        dependencies.push(dependency(subpass - 1, subpass));
    }
    dependencies.push(dependency(subpass_count - 1, vk::SUBPASS_EXTERNAL));
    dependencies
}

/// Compute the attachment references of every subpass.
///
/// `dependencies` replaces the synthesized [`default_dependencies`] when given.
pub fn resolve_render_pass(
    attachments: &[AttachmentDescriptionEntry],
    subpass_count: u32,
    dependencies: Option<Vec<vk::SubpassDependency>>,
) -> Result<RenderPassPlan> {
    if subpass_count == 0 {
        return Err(Error::NoSubpasses);
    }
    for (index, attachment) in attachments.iter().enumerate() {
        for (&subpass, role) in attachment.subpasses.iter() {
            if subpass >= subpass_count {
                return Err(Error::SubpassOutOfRange {
                    attachment: index as u32,
                    subpass,
                    count: subpass_count,
                });
            }
            if let Some(target) = role.resolve_target {
                if target as usize >= attachments.len() {
                    return Err(Error::AttachmentOutOfRange {
                        attachment: index as u32,
                        target,
                    });
                }
            }
            let depth_format = is_depth_stencil(attachment.format);
            if role.roles.contains(AttachmentRoles::COLOR) && depth_format {
                tracing::warn!(
                    attachment = index,
                    subpass,
                    format = ?attachment.format,
                    "depth/stencil format used as a color attachment"
                );
            }
            if role.roles.contains(AttachmentRoles::DEPTH_STENCIL) && !depth_format {
                tracing::warn!(
                    attachment = index,
                    subpass,
                    format = ?attachment.format,
                    "color format used as a depth/stencil attachment"
                );
            }
        }
    }

    let subpasses = (0..subpass_count)
        .map(|subpass| resolve_subpass(attachments, subpass))
        .collect::<Result<Vec<_>>>()?;
    Ok(RenderPassPlan {
        subpasses,
        dependencies: dependencies.unwrap_or_else(|| default_dependencies(subpass_count)),
    })
}

/// Attachments taking `role` in `subpass`, in declaration order, skipping ignored ones.
fn tagged<'a>(
    attachments: &'a [AttachmentDescriptionEntry],
    subpass: u32,
    role: AttachmentRoles,
) -> impl Iterator<Item = (u32, &'a SubpassRole)> + 'a {
    attachments
        .iter()
        .enumerate()
        .filter_map(move |(index, attachment)| {
            let entry = attachment.subpasses.get(&subpass)?;
            (entry.roles.contains(role) && entry.index != SlotIndex::Ignored)
                .then_some((index as u32, entry))
        })
}

fn slot_array(
    attachments: &[AttachmentDescriptionEntry],
    subpass: u32,
    role: AttachmentRoles,
) -> Result<Vec<vk::AttachmentReference>> {
    let mut slots: BTreeMap<u32, vk::AttachmentReference> = BTreeMap::new();
    for (position, (attachment, entry)) in tagged(attachments, subpass, role).enumerate() {
        let slot = match entry.index {
            SlotIndex::Explicit(slot) => slot,
            _ => position as u32,
        };
        let reference = vk::AttachmentReference {
            attachment,
            layout: entry.layout,
        };
        if let Some(previous) = slots.insert(slot, reference) {
            return Err(Error::DuplicateSlot {
                subpass,
                role,
                slot,
                first: previous.attachment,
                second: attachment,
            });
        }
    }
    let len = slots.keys().next_back().map_or(0, |max| max + 1);
    let mut references = vec![UNUSED; len as usize];
    for (slot, reference) in slots {
        references[slot as usize] = reference;
    }
    Ok(references)
}

fn resolve_subpass(
    attachments: &[AttachmentDescriptionEntry],
    subpass: u32,
) -> Result<SubpassPlan> {
    let color = slot_array(attachments, subpass, AttachmentRoles::COLOR)?;
    let input = slot_array(attachments, subpass, AttachmentRoles::INPUT)?;

    let mut depth_stencil = None;
    for (attachment, entry) in tagged(attachments, subpass, AttachmentRoles::DEPTH_STENCIL) {
        if depth_stencil.is_some() {
            return Err(Error::MultipleDepthAttachments(subpass));
        }
        depth_stencil = Some(vk::AttachmentReference {
            attachment,
            layout: entry.layout,
        });
    }
    if color.is_empty() && depth_stencil.is_none() {
        return Err(Error::EmptySubpass(subpass));
    }

    let resolve_sources: Vec<_> =
        tagged(attachments, subpass, AttachmentRoles::RESOLVE).collect();
    let resolve: Vec<_> = color
        .iter()
        .map(|color| {
            if !is_used(color) {
                return UNUSED;
            }
            resolve_sources
                .iter()
                .find(|(_, entry)| entry.resolve_target == Some(color.attachment))
                .map_or(UNUSED, |(attachment, entry)| vk::AttachmentReference {
                    attachment: *attachment,
                    layout: entry.layout,
                })
        })
        .collect();
    for (attachment, entry) in resolve_sources.iter() {
        let paired = color
            .iter()
            .any(|color| is_used(color) && Some(color.attachment) == entry.resolve_target);
        if !paired {
            tracing::warn!(
                subpass,
                attachment,
                target = ?entry.resolve_target,
                "resolve attachment has no matching color attachment"
            );
        }
    }

    let referenced = AttachmentRoles::COLOR
        | AttachmentRoles::DEPTH_STENCIL
        | AttachmentRoles::INPUT
        | AttachmentRoles::RESOLVE;
    let preserve = tagged(attachments, subpass, AttachmentRoles::PRESERVE)
        .filter(|(_, entry)| !entry.roles.intersects(referenced))
        .map(|(attachment, _)| attachment)
        .collect();

    Ok(SubpassPlan {
        color,
        depth_stencil,
        input,
        resolve,
        preserve,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_target() -> AttachmentDescriptionEntry {
        AttachmentDescriptionEntry::new(vk::Format::B8G8R8A8_SRGB)
            .ops(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
            .layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR)
    }

    fn depth_target() -> AttachmentDescriptionEntry {
        AttachmentDescriptionEntry::new(vk::Format::D32_SFLOAT)
            .ops(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
    }

    fn attachments(references: &[vk::AttachmentReference]) -> Vec<u32> {
        references.iter().map(|r| r.attachment).collect()
    }

    #[test]
    fn test_single_subpass_color_depth() {
        let attachments_list = [
            color_target().role(0, SubpassRole::color()),
            depth_target().role(0, SubpassRole::depth_stencil()),
        ];
        let plan = resolve_render_pass(&attachments_list, 1, None).unwrap();
        let subpass = &plan.subpasses[0];
        assert_eq!(attachments(&subpass.color), [0]);
        assert_eq!(
            subpass.color[0].layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(subpass.depth_stencil.unwrap().attachment, 1);
        assert_eq!(subpass.live_resolve_count(), 0);
        assert_eq!(subpass.resolve.len(), subpass.color.len());
        assert_eq!(plan.dependencies.len(), 2);
        assert_eq!(plan.dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(plan.dependencies[0].dst_subpass, 0);
        assert_eq!(plan.dependencies[1].src_subpass, 0);
        assert_eq!(plan.dependencies[1].dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(plan.color_counts(), [1]);
    }

    #[test]
    fn test_explicit_slots_leave_gaps() {
        let attachments_list = [
            color_target().role(0, SubpassRole::color().with_index(2)),
            color_target().role(0, SubpassRole::color()),
        ];
        let plan = resolve_render_pass(&attachments_list, 1, None).unwrap();
        let subpass = &plan.subpasses[0];
        // The auto-slotted attachment takes its position among the color attachments.
        assert_eq!(
            attachments(&subpass.color),
            [vk::ATTACHMENT_UNUSED, 1, 0]
        );
        assert_eq!(subpass.color_count(), 3);
        assert_eq!(subpass.live_color_count(), 2);
    }

    #[test]
    fn test_duplicate_slot() {
        let attachments_list = [
            color_target().role(0, SubpassRole::color()),
            color_target().role(0, SubpassRole::color().with_index(0)),
        ];
        assert!(matches!(
            resolve_render_pass(&attachments_list, 1, None),
            Err(Error::DuplicateSlot {
                subpass: 0,
                slot: 0,
                first: 0,
                second: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_ignored_attachments_are_excluded() {
        let attachments_list = [
            color_target().role(0, SubpassRole::color().ignored()),
            color_target().role(0, SubpassRole::color()),
        ];
        let plan = resolve_render_pass(&attachments_list, 1, None).unwrap();
        assert_eq!(attachments(&plan.subpasses[0].color), [1]);
    }

    #[test]
    fn test_resolve_pairs_with_color_position() {
        let msaa = || {
            AttachmentDescriptionEntry::new(vk::Format::R16G16B16A16_SFLOAT)
                .samples(vk::SampleCountFlags::TYPE_4)
        };
        // Resolve declared after its color attachment.
        let after = [
            color_target().role(0, SubpassRole::color()),
            msaa().role(0, SubpassRole::color()),
            color_target().role(0, SubpassRole::resolve(1)),
        ];
        let plan = resolve_render_pass(&after, 1, None).unwrap();
        let subpass = &plan.subpasses[0];
        assert_eq!(attachments(&subpass.color), [0, 1]);
        assert_eq!(attachments(&subpass.resolve), [vk::ATTACHMENT_UNUSED, 2]);

        // And before it.
        let before = [
            color_target().role(0, SubpassRole::resolve(2)),
            color_target().role(0, SubpassRole::color()),
            msaa().role(0, SubpassRole::color()),
        ];
        let plan = resolve_render_pass(&before, 1, None).unwrap();
        let subpass = &plan.subpasses[0];
        assert_eq!(attachments(&subpass.color), [1, 2]);
        assert_eq!(attachments(&subpass.resolve), [vk::ATTACHMENT_UNUSED, 0]);
        assert_eq!(subpass.resolve.len(), subpass.color.len());
    }

    #[test]
    fn test_depth_rules() {
        let two_depths = [
            depth_target().role(0, SubpassRole::depth_stencil()),
            depth_target().role(0, SubpassRole::depth_stencil()),
        ];
        assert!(matches!(
            resolve_render_pass(&two_depths, 1, None),
            Err(Error::MultipleDepthAttachments(0))
        ));

        let depth_only = [depth_target().role(0, SubpassRole::depth_stencil())];
        let plan = resolve_render_pass(&depth_only, 1, None).unwrap();
        assert!(plan.subpasses[0].color.is_empty());
        assert_eq!(plan.color_counts(), [0]);
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(
            resolve_render_pass(&[], 0, None),
            Err(Error::NoSubpasses)
        ));
        let inputs_only = [color_target().role(0, SubpassRole::input())];
        assert!(matches!(
            resolve_render_pass(&inputs_only, 1, None),
            Err(Error::EmptySubpass(0))
        ));
        let out_of_range = [color_target().role(3, SubpassRole::color())];
        assert!(matches!(
            resolve_render_pass(&out_of_range, 2, None),
            Err(Error::SubpassOutOfRange { subpass: 3, .. })
        ));
        let bad_resolve = [
            color_target().role(0, SubpassRole::color()),
            color_target().role(0, SubpassRole::resolve(7)),
        ];
        assert!(matches!(
            resolve_render_pass(&bad_resolve, 1, None),
            Err(Error::AttachmentOutOfRange { attachment: 1, target: 7 })
        ));
    }

    #[test]
    fn test_deferred_subpasses() {
        let gbuffer = || {
            color_target()
                .role(0, SubpassRole::color())
                .role(1, SubpassRole::input())
        };
        let attachments_list = [
            color_target()
                .role(1, SubpassRole::color())
                .role(0, SubpassRole::preserve()),
            gbuffer(),
            gbuffer(),
            depth_target()
                .role(0, SubpassRole::depth_stencil())
                .role(1, SubpassRole::preserve().with_roles(AttachmentRoles::INPUT)),
        ];
        let plan = resolve_render_pass(&attachments_list, 2, None).unwrap();
        assert_eq!(attachments(&plan.subpasses[0].color), [1, 2]);
        assert_eq!(plan.subpasses[0].preserve, [0]);
        assert_eq!(attachments(&plan.subpasses[1].color), [0]);
        assert_eq!(attachments(&plan.subpasses[1].input), [1, 2, 3]);
        assert!(plan.subpasses[1].preserve.is_empty());
        assert!(plan.subpasses[1].depth_stencil.is_none());

        let edges: Vec<_> = plan
            .dependencies
            .iter()
            .map(|d| (d.src_subpass, d.dst_subpass))
            .collect();
        assert_eq!(
            edges,
            [
                (vk::SUBPASS_EXTERNAL, 0),
                (0, 1),
                (1, vk::SUBPASS_EXTERNAL)
            ]
        );
        assert_eq!(plan.color_counts(), [2, 1]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let attachments_list = [
            color_target().role(0, SubpassRole::color().with_index(1)),
            color_target().role(0, SubpassRole::resolve(0)),
            depth_target().role(0, SubpassRole::depth_stencil()),
        ];
        let first = resolve_render_pass(&attachments_list, 1, None).unwrap();
        let second = resolve_render_pass(&attachments_list, 1, None).unwrap();
        assert_eq!(first.subpasses, second.subpasses);
        assert_eq!(first.dependencies.len(), second.dependencies.len());
    }

    #[test]
    fn test_explicit_dependencies_replace_defaults() {
        let attachments_list = [color_target().role(0, SubpassRole::color())];
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let plan = resolve_render_pass(&attachments_list, 1, Some(vec![dependency])).unwrap();
        assert_eq!(plan.dependencies.len(), 1);
        assert_eq!(
            plan.dependencies[0].src_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }
}
