//! The content block model: the ordered atomic/divisible units a document
//! is paginated by.

use serde::Deserialize;

use crate::layout::JsonNode;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    Heading,
    Paragraph,
    Record,
    BadgeGroup,
}

impl BlockKind {
    /// Whether blocks of this kind stay whole unless annotated otherwise.
    pub fn atomic_by_default(self) -> bool {
        !matches!(self, BlockKind::Paragraph)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub id: String,
    /// Position in the document. Blocks are never reordered.
    pub order: usize,
    pub kind: BlockKind,
    pub atomic: bool,
    pub estimated_height_px: Option<f32>,
    /// The renderable for this block, as supplied by the template.
    pub node: JsonNode,
}

/// Ordered blocks plus the frame (root styling) they are rendered inside.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlockModel {
    frame: JsonNode,
    blocks: Vec<ContentBlock>,
}

impl ContentBlockModel {
    /// Extract the block model from an annotated tree.
    ///
    /// Returns `None` when the tree has no annotations, or when it has
    /// content outside any annotated node (that content would be lost).
    pub fn extract(root: &JsonNode) -> Option<ContentBlockModel> {
        let mut nodes = Vec::new();
        if !collect(root, &mut nodes) || nodes.is_empty() {
            return None;
        }

        let blocks = nodes
            .into_iter()
            .enumerate()
            .filter_map(|(order, node)| {
                let kind = node.block?;
                Some(ContentBlock {
                    id: format!("{}-{order}", kind_slug(kind)),
                    order,
                    kind,
                    atomic: node.atomic.unwrap_or_else(|| kind.atomic_by_default()),
                    estimated_height_px: node.estimated_height,
                    node: node.clone(),
                })
            })
            .collect();

        Some(ContentBlockModel {
            frame: root.shell(),
            blocks,
        })
    }

    /// Treat an opaque tree as one divisible block.
    pub fn single(root: &JsonNode) -> ContentBlockModel {
        // The frame paints the background; the block keeps the padding.
        let mut node = root.clone();
        node.style.background_color = None;
        let mut frame = root.shell();
        frame.style.padding = None;
        frame.style.padding_top = None;
        frame.style.padding_right = None;
        frame.style.padding_bottom = None;
        frame.style.padding_left = None;
        ContentBlockModel {
            frame,
            blocks: vec![ContentBlock {
                id: "document-0".to_string(),
                order: 0,
                kind: BlockKind::Paragraph,
                atomic: false,
                estimated_height_px: root.estimated_height,
                node,
            }],
        }
    }

    /// A model from explicit parts. Orders are reassigned to positions.
    pub fn from_blocks(frame: JsonNode, blocks: Vec<ContentBlock>) -> ContentBlockModel {
        let blocks = blocks
            .into_iter()
            .enumerate()
            .map(|(order, block)| ContentBlock { order, ..block })
            .collect();
        ContentBlockModel {
            frame: frame.shell(),
            blocks,
        }
    }

    pub fn frame(&self) -> &JsonNode {
        &self.frame
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Vertical padding the frame adds on every page.
    pub fn frame_inset_px(&self) -> f32 {
        let (top, _, bottom, _) = self.frame.style.padding_trbl();
        top + bottom
    }

    /// The frame with the given blocks as its children.
    pub fn compose<'a>(&self, blocks: impl IntoIterator<Item = &'a ContentBlock>) -> JsonNode {
        let mut root = self.frame.clone();
        root.children = blocks.into_iter().map(|b| b.node.clone()).collect();
        root
    }
}

/// Returns false if content is found outside any annotated node.
fn collect<'a>(node: &'a JsonNode, out: &mut Vec<&'a JsonNode>) -> bool {
    if node.block.is_some() {
        out.push(node);
        return true;
    }
    if node.is_content() {
        return false;
    }
    node.children.iter().all(|child| collect(child, out))
}

fn kind_slug(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Heading => "heading",
        BlockKind::Paragraph => "paragraph",
        BlockKind::Record => "record",
        BlockKind::BadgeGroup => "badges",
    }
}
