//! Greedy first-fit page assignment over measured blocks.

use crate::measure::MeasuredBlock;

#[derive(Debug, Clone, PartialEq)]
pub struct PageAssignment {
    pub page_index: usize,
    pub blocks: Vec<MeasuredBlock>,
    pub used_height_px: f32,
}

impl PageAssignment {
    fn new(page_index: usize) -> Self {
        PageAssignment {
            page_index,
            blocks: Vec::new(),
            used_height_px: 0.0,
        }
    }

    /// True only for a lone block taller than the whole budget.
    pub fn overflows(&self, budget_px: f32) -> bool {
        self.used_height_px > budget_px
    }
}

/// Assign blocks to pages in order, never splitting or reordering them.
///
/// A block that does not fit the remaining space starts a new page, unless
/// the current page is empty: a block taller than the whole budget sits
/// alone on its own page and overflows it. A block exactly filling the
/// remaining space stays. Zero blocks still produce one (empty) page.
pub fn assign_pages(blocks: &[MeasuredBlock], budget_px: f32) -> Vec<PageAssignment> {
    let mut pages = Vec::new();
    let mut current = PageAssignment::new(0);

    for block in blocks {
        if current.used_height_px + block.height_px > budget_px && !current.blocks.is_empty() {
            let next = PageAssignment::new(current.page_index + 1);
            pages.push(std::mem::replace(&mut current, next));
        }
        current.used_height_px += block.height_px;
        current.blocks.push(block.clone());
    }

    if !current.blocks.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, ContentBlock};
    use crate::layout::{JsonNode, Style};

    fn block(order: usize, height: f32, atomic: bool) -> MeasuredBlock {
        MeasuredBlock::new(
            ContentBlock {
                id: format!("b{order}"),
                order,
                kind: if atomic {
                    BlockKind::Record
                } else {
                    BlockKind::Paragraph
                },
                atomic,
                estimated_height_px: None,
                node: JsonNode::view(Style::default(), vec![]),
            },
            height,
        )
    }

    fn heights(pages: &[PageAssignment]) -> Vec<Vec<f32>> {
        pages
            .iter()
            .map(|p| p.blocks.iter().map(|b| b.height_px).collect())
            .collect()
    }

    #[test]
    fn splits_when_the_next_block_overflows() {
        let blocks = vec![block(0, 300.0, false), block(1, 400.0, false), block(2, 500.0, false)];
        let pages = assign_pages(&blocks, 1000.0);
        assert_eq!(heights(&pages), vec![vec![300.0, 400.0], vec![500.0]]);
        assert_eq!(pages[0].used_height_px, 700.0);
        assert_eq!(pages[1].page_index, 1);
    }

    #[test]
    fn oversized_atomic_block_sits_alone() {
        let pages = assign_pages(&[block(0, 1500.0, true)], 1000.0);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].used_height_px, 1500.0);
        assert!(pages[0].overflows(1000.0));
    }

    #[test]
    fn zero_blocks_yield_one_empty_page() {
        let pages = assign_pages(&[], 1000.0);
        assert_eq!(pages.len(), 1);
        assert!(pages[0].blocks.is_empty());
        assert_eq!(pages[0].page_index, 0);
    }

    #[test]
    fn exact_fit_stays_on_the_current_page() {
        let blocks = vec![block(0, 600.0, true), block(1, 400.0, true), block(2, 1.0, true)];
        let pages = assign_pages(&blocks, 1000.0);
        assert_eq!(heights(&pages), vec![vec![600.0, 400.0], vec![1.0]]);
    }

    #[test]
    fn oversized_block_mid_document_gets_its_own_page() {
        let blocks = vec![block(0, 200.0, true), block(1, 1200.0, true), block(2, 100.0, true)];
        let pages = assign_pages(&blocks, 1000.0);
        assert_eq!(heights(&pages), vec![vec![200.0], vec![1200.0], vec![100.0]]);
    }
}
