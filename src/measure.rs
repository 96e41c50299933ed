//! Block measurement in the probe viewport.

use log::debug;

use crate::blocks::{ContentBlock, ContentBlockModel};
use crate::budget::PageBudget;
use crate::error::MeasureError;
use crate::layout_box::layout_tree;
use crate::resources::ReadyResources;

/// A block with its rendered height resolved. Heights include margins and
/// any gap before the next block, so consecutive heights add up to the
/// true rendered distance.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredBlock {
    pub block: ContentBlock,
    pub height_px: f32,
    pub margin_top_px: f32,
    pub margin_bottom_px: f32,
}

impl MeasuredBlock {
    pub fn new(block: ContentBlock, height_px: f32) -> Self {
        MeasuredBlock {
            block,
            height_px,
            margin_top_px: 0.0,
            margin_bottom_px: 0.0,
        }
    }

    pub fn order(&self) -> usize {
        self.block.order
    }

    pub fn atomic(&self) -> bool {
        self.block.atomic
    }
}

/// Anything that can report block heights for a content width.
///
/// Takes [`ReadyResources`] so it can only run after the resource gate.
pub trait Measurer: Send + Sync {
    fn measure(
        &self,
        model: &ContentBlockModel,
        budget: &PageBudget,
        resources: &ReadyResources,
    ) -> Result<Vec<MeasuredBlock>, MeasureError>;
}

/// Lays the whole document out once at content width with unbounded height
/// and reads each block's extent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutMeasurer;

impl Measurer for LayoutMeasurer {
    fn measure(
        &self,
        model: &ContentBlockModel,
        budget: &PageBudget,
        resources: &ReadyResources,
    ) -> Result<Vec<MeasuredBlock>, MeasureError> {
        if model.is_empty() {
            return Ok(Vec::new());
        }

        let probe = layout_tree(
            &model.compose(model.blocks()),
            budget.content_width_px(),
            resources,
        );
        if probe.children.len() != model.len() {
            return Err(MeasureError::CountMismatch {
                expected: model.len(),
                got: probe.children.len(),
            });
        }

        // Top of each block's margin box; the last block ends at its own
        // outer bottom.
        let tops: Vec<f32> = probe
            .children
            .iter()
            .map(|child| child.y - child.margin_top)
            .collect();

        let mut measured = Vec::with_capacity(model.len());
        for (i, (block, child)) in model.blocks().iter().zip(&probe.children).enumerate() {
            let height = match tops.get(i + 1) {
                Some(next_top) => next_top - tops[i],
                None => child.outer_height(),
            };
            if !height.is_finite() || height < 0.0 {
                return Err(MeasureError::NonFinite {
                    order: block.order,
                    height,
                });
            }
            measured.push(MeasuredBlock {
                block: block.clone(),
                height_px: height,
                margin_top_px: child.margin_top,
                margin_bottom_px: child.margin_bottom,
            });
        }

        debug!(
            "measured {} blocks, total {:.1}px at width {:.1}px",
            measured.len(),
            measured.iter().map(|m| m.height_px).sum::<f32>(),
            budget.content_width_px()
        );
        Ok(measured)
    }
}

/// Uses template-supplied height estimates instead of layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateMeasurer;

impl Measurer for EstimateMeasurer {
    fn measure(
        &self,
        model: &ContentBlockModel,
        _budget: &PageBudget,
        _resources: &ReadyResources,
    ) -> Result<Vec<MeasuredBlock>, MeasureError> {
        model
            .blocks()
            .iter()
            .map(|block| {
                let height = block
                    .estimated_height_px
                    .ok_or(MeasureError::MissingEstimate { order: block.order })?;
                if !height.is_finite() || height < 0.0 {
                    return Err(MeasureError::NonFinite {
                        order: block.order,
                        height,
                    });
                }
                Ok(MeasuredBlock::new(block.clone(), height))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockKind;
    use crate::budget::PageFormat;
    use crate::layout::{JsonNode, Style};
    use crate::layout_box::NoImages;

    fn budget() -> PageBudget {
        PageBudget::new(PageFormat::A4, 10.0).unwrap()
    }

    fn record(lines: usize, margin_bottom: f32) -> JsonNode {
        let text = vec!["line"; lines].join("\n");
        JsonNode::view(
            Style {
                margin_bottom: Some(margin_bottom),
                ..Style::default()
            },
            vec![JsonNode::text(
                text,
                Style {
                    font_size: Some(10.0),
                    line_height: Some(2.0),
                    ..Style::default()
                },
            )],
        )
        .with_block(BlockKind::Record)
    }

    #[test]
    fn heights_include_margins_and_gaps() {
        let root = JsonNode::page(
            Style {
                gap: Some(5.0),
                ..Style::default()
            },
            vec![record(1, 4.0), record(3, 0.0), record(2, 6.0)],
        );
        let model = ContentBlockModel::extract(&root).unwrap();
        let measured = LayoutMeasurer
            .measure(&model, &budget(), &ReadyResources::none())
            .unwrap();

        let heights: Vec<f32> = measured.iter().map(|m| m.height_px).collect();
        assert_eq!(heights, vec![29.0, 65.0, 46.0]);
        assert_eq!(measured[0].margin_bottom_px, 4.0);

        let total: f32 = heights.iter().sum();
        let probe = layout_tree(&model.compose(model.blocks()), budget().content_width_px(), &NoImages);
        assert_eq!(total, probe.height);
    }

    #[test]
    fn empty_models_measure_to_nothing() {
        let model = ContentBlockModel::from_blocks(JsonNode::page(Style::default(), vec![]), vec![]);
        let measured = LayoutMeasurer
            .measure(&model, &budget(), &ReadyResources::none())
            .unwrap();
        assert!(measured.is_empty());
    }

    #[test]
    fn estimates_require_every_block() {
        let mut with = record(1, 0.0);
        with.estimated_height = Some(120.0);
        let without = record(1, 0.0);

        let model =
            ContentBlockModel::extract(&JsonNode::page(Style::default(), vec![with.clone()])).unwrap();
        let measured = EstimateMeasurer
            .measure(&model, &budget(), &ReadyResources::none())
            .unwrap();
        assert_eq!(measured[0].height_px, 120.0);

        let model =
            ContentBlockModel::extract(&JsonNode::page(Style::default(), vec![with, without])).unwrap();
        assert_eq!(
            EstimateMeasurer.measure(&model, &budget(), &ReadyResources::none()),
            Err(MeasureError::MissingEstimate { order: 1 })
        );
    }
}
