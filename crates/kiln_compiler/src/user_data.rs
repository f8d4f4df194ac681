//! Resource mapping nodes and their per-pipeline merge.
//!
//! Each stage describes the user data it reads as a list of nodes at dword
//! offsets. Lowering assigns registers from the merged layout, so the
//! per-stage lists are folded into one before any stage is lowered.

use std::collections::BTreeMap;

use kiln_common::{ShaderStage, StageMask, StreamHasher};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// Kind of a resource mapping node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ResourceNodeType {
    /// Image or texel buffer descriptor.
    DescriptorResource,
    /// Sampler descriptor.
    DescriptorSampler,
    /// Combined image and sampler descriptor.
    DescriptorCombinedTexture,
    /// Buffer descriptor.
    DescriptorBuffer,
    /// Pointer to a table of inner nodes.
    DescriptorTableVaPtr,
    /// Push constants stored inline.
    PushConst,
    /// Pointer to vertex buffer table.
    IndirectUserDataVaPtr,
    /// Pointer to stream-out buffer table.
    StreamOutTableVaPtr,
}

/// One resource mapping node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Node kind.
    pub node_type: ResourceNodeType,
    /// Size in dwords.
    pub size_in_dwords: u32,
    /// Offset in dwords.
    pub offset_in_dwords: u32,
    /// Descriptor set (descriptor nodes only).
    pub set: u32,
    /// Binding (descriptor nodes only).
    pub binding: u32,
    /// Inner nodes of a descriptor table.
    pub inner: Vec<ResourceNode>,
    /// Stages that read this node. Filled in by the merge.
    pub visibility: StageMask,
}

impl ResourceNode {
    /// A descriptor node.
    pub fn descriptor(node_type: ResourceNodeType, offset: u32, size: u32, set: u32, binding: u32) -> Self {
        Self {
            node_type,
            size_in_dwords: size,
            offset_in_dwords: offset,
            set,
            binding,
            inner: Vec::new(),
            visibility: StageMask::EMPTY,
        }
    }

    /// A descriptor table pointer with inner nodes.
    pub fn table(offset: u32, inner: Vec<ResourceNode>) -> Self {
        Self {
            node_type: ResourceNodeType::DescriptorTableVaPtr,
            size_in_dwords: 1,
            offset_in_dwords: offset,
            set: 0,
            binding: 0,
            inner,
            visibility: StageMask::EMPTY,
        }
    }

    /// An inline push constant range.
    pub fn push_const(offset: u32, size: u32) -> Self {
        Self::descriptor(ResourceNodeType::PushConst, offset, size, 0, 0)
    }

    /// One past the last dword this node covers.
    pub fn end(&self) -> u32 {
        self.offset_in_dwords + self.size_in_dwords
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.node_type == other.node_type
            && self.size_in_dwords == other.size_in_dwords
            && self.set == other.set
            && self.binding == other.binding
    }

    /// Feeds the node, without its visibility, into `hasher`.
    pub fn hash_into(&self, hasher: &mut StreamHasher) {
        hasher
            .update_u32(self.node_type as u32)
            .update_u32(self.size_in_dwords)
            .update_u32(self.offset_in_dwords)
            .update_u32(self.set)
            .update_u32(self.binding)
            .update_u32(self.inner.len() as u32);
        for node in &self.inner {
            node.hash_into(hasher);
        }
    }
}

/// Merges the node lists of several stages into one layout.
///
/// Nodes at the same offset must have the same kind, size, set, and binding;
/// descriptor tables at the same offset merge their inner nodes the same way.
/// The visibility of a merged node is the union of the stages that listed it.
/// Nodes that partially overlap are rejected.
pub fn merge_user_data_nodes<'n>(
    stages: impl IntoIterator<Item = (ShaderStage, &'n [ResourceNode])>,
) -> Result<Vec<ResourceNode>, CompileError> {
    let mut merged = BTreeMap::new();
    for (stage, nodes) in stages {
        for node in nodes {
            let mut node = node.clone();
            mark_visible(&mut node, stage.mask());
            insert_node(&mut merged, node)?;
        }
    }
    finish_level(merged)
}

/// Size of the user data area a layout needs, in dwords.
pub fn user_data_limit(nodes: &[ResourceNode]) -> u32 {
    nodes.iter().map(ResourceNode::end).max().unwrap_or(0)
}

fn mark_visible(node: &mut ResourceNode, mask: StageMask) {
    node.visibility |= mask;
    for inner in &mut node.inner {
        mark_visible(inner, mask);
    }
}

fn insert_node(level: &mut BTreeMap<u32, ResourceNode>, node: ResourceNode) -> Result<(), CompileError> {
    let offset = node.offset_in_dwords;
    let Some(existing) = level.get_mut(&offset) else {
        level.insert(offset, node);
        return Ok(());
    };
    if !existing.same_shape(&node) {
        return Err(CompileError::InvalidValue {
            reason: format!(
                "user data node at offset {offset} is {:?} in one stage and {:?} in another",
                existing.node_type, node.node_type
            ),
        });
    }
    existing.visibility |= node.visibility;
    if node.node_type == ResourceNodeType::DescriptorTableVaPtr {
        let mut inner: BTreeMap<_, _> = std::mem::take(&mut existing.inner)
            .into_iter()
            .map(|n| (n.offset_in_dwords, n))
            .collect();
        for child in node.inner {
            insert_node(&mut inner, child)?;
        }
        existing.inner = finish_level(inner)?;
    }
    Ok(())
}

fn finish_level(level: BTreeMap<u32, ResourceNode>) -> Result<Vec<ResourceNode>, CompileError> {
    let nodes: Vec<_> = level.into_values().collect();
    for pair in nodes.windows(2) {
        if pair[0].end() > pair[1].offset_in_dwords {
            return Err(CompileError::InvalidValue {
                reason: format!(
                    "user data nodes at offsets {} and {} overlap",
                    pair[0].offset_in_dwords, pair[1].offset_in_dwords
                ),
            });
        }
    }
    Ok(nodes)
}
