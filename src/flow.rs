//! Vector flow: paginate blocks as display lists, keeping text as text.
//!
//! Atomic blocks move to the next page whole; divisible blocks break between
//! lines. The PDF writer paints the resulting pages with real fonts.

use log::debug;

use crate::blocks::ContentBlockModel;
use crate::budget::PageBudget;
use crate::display::{DisplayList, PaintOp};
use crate::layout::{Color, Direction};
use crate::layout_box::layout_tree;
use crate::resources::ReadyResources;

/// One block, laid out standalone at content width.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub order: usize,
    pub keep_together: bool,
    pub list: DisplayList,
    /// Frame gap between this block and the next one.
    pub gap_after: f32,
}

impl FlowNode {
    /// Vertical pitch to the next block, the same quantity the measurer
    /// reports.
    pub fn height(&self) -> f32 {
        self.list.height + self.gap_after
    }
}

/// A finished page: content-area sized, top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPage {
    pub index: usize,
    pub list: DisplayList,
    /// Orders of the blocks with content on this page.
    pub orders: Vec<usize>,
    pub used_height_px: f32,
}

/// Map every block to a flow node, carrying its atomic tag.
pub fn map_blocks(
    model: &ContentBlockModel,
    budget: &PageBudget,
    resources: &ReadyResources,
) -> Vec<FlowNode> {
    let style = &model.frame().style;
    let (_, pad_r, _, pad_l) = style.padding_trbl();
    let width = (budget.content_width_px() - pad_l - pad_r).max(0.0);
    let gap = match style.direction.unwrap_or_default() {
        Direction::Column => style.gap.unwrap_or(0.0),
        Direction::Row => 0.0,
    };
    let last = model.len().saturating_sub(1);

    model
        .blocks()
        .iter()
        .enumerate()
        .map(|(i, block)| FlowNode {
            order: block.order,
            keep_together: block.atomic,
            list: DisplayList::from_layout(&layout_tree(&block.node, width, resources)),
            gap_after: if i < last { gap } else { 0.0 },
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FlowEngine {
    width_px: f32,
    height_px: f32,
    background: Option<Color>,
    inset_top: f32,
    inset_left: f32,
    inset_bottom: f32,
}

impl FlowEngine {
    pub fn new(model: &ContentBlockModel, budget: &PageBudget) -> Self {
        let style = &model.frame().style;
        let (top, _, bottom, left) = style.padding_trbl();
        FlowEngine {
            width_px: budget.content_width_px(),
            height_px: budget.content_height_px(),
            background: style.background_color,
            inset_top: top,
            inset_left: left,
            inset_bottom: bottom,
        }
    }

    /// Height available to blocks on each page.
    pub fn budget_px(&self) -> f32 {
        (self.height_px - self.inset_top - self.inset_bottom).max(0.0)
    }

    pub fn paginate(&self, nodes: &[FlowNode]) -> Vec<FlowPage> {
        let budget = self.budget_px();
        let mut pages = Vec::new();
        let mut page = self.open_page(0);

        for node in nodes {
            if node.keep_together {
                if page.used_height_px + node.height() > budget && !page.orders.is_empty() {
                    self.turn_page(&mut pages, &mut page);
                }
                self.place(&mut page, node, 0.0, node.list.height);
                page.used_height_px += node.gap_after;
                continue;
            }

            // The trailing gap never forces a break; it only pushes the
            // next block down.
            let height = node.list.height;
            let mut from = 0.0;
            while from < height || height == 0.0 {
                let room = (budget - page.used_height_px).max(0.0);
                if height - from <= room {
                    self.place(&mut page, node, from, height);
                    page.used_height_px += node.gap_after;
                    break;
                }
                match node.list.last_break_within(from, from + room) {
                    Some(cut) => {
                        self.place(&mut page, node, from, cut);
                        from = cut;
                        self.turn_page(&mut pages, &mut page);
                    }
                    None if !page.orders.is_empty() => self.turn_page(&mut pages, &mut page),
                    None => {
                        // Nothing fits even on a fresh page; overflow by one line.
                        let cut = node.list.first_break_after(from).unwrap_or(height);
                        self.place(&mut page, node, from, cut);
                        from = cut;
                        if from >= height {
                            page.used_height_px += node.gap_after;
                            break;
                        }
                        self.turn_page(&mut pages, &mut page);
                    }
                }
            }
        }

        if !page.orders.is_empty() || pages.is_empty() {
            pages.push(page);
        }
        debug!("flow engine produced {} page(s) from {} node(s)", pages.len(), nodes.len());
        pages
    }

    fn open_page(&self, index: usize) -> FlowPage {
        let mut list = DisplayList::new(self.width_px, self.height_px);
        if let Some(fill) = self.background {
            list.push(PaintOp::Rect {
                x: 0.0,
                y: 0.0,
                width: self.width_px,
                height: self.height_px,
                fill: Some(fill),
                stroke: None,
                radius: 0.0,
            });
        }
        FlowPage {
            index,
            list,
            orders: Vec::new(),
            used_height_px: 0.0,
        }
    }

    fn turn_page(&self, pages: &mut Vec<FlowPage>, page: &mut FlowPage) {
        let next = self.open_page(page.index + 1);
        pages.push(std::mem::replace(page, next));
    }

    fn place(&self, page: &mut FlowPage, node: &FlowNode, from: f32, to: f32) {
        let fragment = node.list.slice(from, to);
        page.list
            .append(&fragment, self.inset_left, self.inset_top + page.used_height_px);
        page.used_height_px += to - from;
        if page.orders.last() != Some(&node.order) {
            page.orders.push(node.order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, ContentBlock};
    use crate::budget::PageFormat;
    use crate::layout::{JsonNode, Style};
    use crate::measure::MeasuredBlock;
    use crate::paginate::assign_pages;

    fn text_node(height: f32, lines: usize) -> DisplayList {
        // `lines` equal text lines filling `height`
        let line_h = height / lines as f32;
        let mut list = DisplayList::new(100.0, height);
        for i in 0..lines {
            list.push(PaintOp::Text {
                x: 0.0,
                baseline: line_h * (i + 1) as f32,
                text: format!("line {i}"),
                size: line_h,
                bold: false,
                italic: false,
                color: Color::black(),
            });
        }
        list
    }

    fn engine(height_px: f32) -> FlowEngine {
        FlowEngine {
            width_px: 100.0,
            height_px,
            background: None,
            inset_top: 0.0,
            inset_left: 0.0,
            inset_bottom: 0.0,
        }
    }

    fn node(order: usize, keep_together: bool, height: f32, lines: usize) -> FlowNode {
        FlowNode {
            order,
            keep_together,
            list: text_node(height, lines),
            gap_after: 0.0,
        }
    }

    #[test]
    fn atomic_nodes_move_whole() {
        let pages = engine(1000.0).paginate(&[
            node(0, true, 300.0, 3),
            node(1, true, 400.0, 4),
            node(2, true, 500.0, 5),
        ]);
        let orders: Vec<_> = pages.iter().map(|p| p.orders.clone()).collect();
        assert_eq!(orders, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn divisible_nodes_split_between_lines() {
        let pages = engine(1000.0).paginate(&[node(0, true, 700.0, 7), node(1, false, 500.0, 5)]);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].orders, vec![0, 1]);
        assert_eq!(pages[1].orders, vec![1]);
        // 3 of 5 lines fit after the 700px block
        assert_eq!(pages[0].used_height_px, 1000.0);
        assert_eq!(pages[1].used_height_px, 200.0);
        assert_eq!(pages[1].list.text_runs().collect::<Vec<_>>(), vec!["line 3", "line 4"]);
    }

    #[test]
    fn oversized_atomic_node_sits_alone() {
        let pages = engine(1000.0).paginate(&[node(0, true, 1500.0, 1), node(1, true, 10.0, 1)]);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].used_height_px, 1500.0);
    }

    #[test]
    fn line_taller_than_a_page_still_progresses() {
        let pages = engine(100.0).paginate(&[node(0, false, 300.0, 2)]);
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|p| p.used_height_px == 150.0));
    }

    #[test]
    fn zero_nodes_give_one_empty_page() {
        let pages = engine(1000.0).paginate(&[]);
        assert_eq!(pages.len(), 1);
        assert!(pages[0].orders.is_empty());
    }

    #[test]
    fn all_atomic_membership_matches_page_assigner() {
        let heights = [120.0, 340.0, 90.0, 410.0, 600.0, 1200.0, 30.0, 250.0];
        let nodes: Vec<_> = heights
            .iter()
            .enumerate()
            .map(|(i, h)| node(i, true, *h, 1))
            .collect();
        let blocks: Vec<_> = heights
            .iter()
            .enumerate()
            .map(|(order, h)| {
                MeasuredBlock::new(
                    ContentBlock {
                        id: format!("record-{order}"),
                        order,
                        kind: BlockKind::Record,
                        atomic: true,
                        estimated_height_px: None,
                        node: JsonNode::view(Style::default(), vec![]),
                    },
                    *h,
                )
            })
            .collect();

        let flow: Vec<Vec<usize>> = engine(1000.0)
            .paginate(&nodes)
            .into_iter()
            .map(|p| p.orders)
            .collect();
        let assigned: Vec<Vec<usize>> = assign_pages(&blocks, 1000.0)
            .into_iter()
            .map(|p| p.blocks.iter().map(|b| b.order()).collect())
            .collect();
        assert_eq!(flow, assigned);
    }

    #[test]
    fn frame_gap_breaks_pages_where_the_measurer_does() {
        use crate::layout::Dimension;
        use crate::measure::{LayoutMeasurer, Measurer};

        let record = || {
            JsonNode::view(
                Style {
                    height: Some(Dimension::Px(100.0)),
                    ..Style::default()
                },
                vec![],
            )
            .with_block(BlockKind::Record)
        };
        let root = JsonNode::page(
            Style {
                gap: Some(40.0),
                ..Style::default()
            },
            (0..10).map(|_| record()).collect(),
        );
        let model = ContentBlockModel::extract(&root).unwrap();
        let budget = PageBudget::new(PageFormat::A4, 10.0).unwrap();
        let resources = ReadyResources::none();

        let measured = LayoutMeasurer.measure(&model, &budget, &resources).unwrap();
        let assigned: Vec<Vec<usize>> =
            assign_pages(&measured, budget.content_height_px() - model.frame_inset_px())
                .into_iter()
                .map(|p| p.blocks.iter().map(|b| b.order()).collect())
                .collect();

        let nodes = map_blocks(&model, &budget, &resources);
        assert_eq!(nodes[0].gap_after, 40.0);
        assert_eq!(nodes[9].gap_after, 0.0);
        let flow: Vec<Vec<usize>> = FlowEngine::new(&model, &budget)
            .paginate(&nodes)
            .into_iter()
            .map(|p| p.orders)
            .collect();

        assert_eq!(flow, assigned);
        assert_eq!(flow, vec![(0..5).collect::<Vec<_>>(), (5..10).collect()]);
    }

    #[test]
    fn gap_is_left_between_blocks_but_not_at_page_top() {
        let mut first = node(0, true, 300.0, 1);
        first.gap_after = 50.0;
        let mut second = node(1, true, 600.0, 1);
        second.gap_after = 50.0;
        let pages = engine(1000.0).paginate(&[first, second, node(2, true, 100.0, 1)]);

        let tops: Vec<f32> = pages[0].list.items.iter().map(|i| i.top).collect();
        assert_eq!(tops, vec![0.0, 350.0]);
        assert_eq!(pages[1].orders, vec![2]);
        assert_eq!(pages[1].list.items[0].top, 0.0);
    }

    #[test]
    fn map_blocks_keeps_atomic_tags() {
        let root = JsonNode::page(
            Style::default(),
            vec![
                JsonNode::text("Heading", Style::default()).with_block(BlockKind::Heading),
                JsonNode::text("Body", Style::default()).with_block(BlockKind::Paragraph),
            ],
        );
        let model = ContentBlockModel::extract(&root).unwrap();
        let budget = PageBudget::new(PageFormat::A4, 10.0).unwrap();
        let nodes = map_blocks(&model, &budget, &ReadyResources::none());
        assert_eq!(
            nodes.iter().map(|n| n.keep_together).collect::<Vec<_>>(),
            vec![true, false]
        );
        assert!(nodes.iter().all(|n| n.height() > 0.0));
    }
}
