//! Blind slicing for documents without block boundaries.
//!
//! The whole document is rasterized once and cut into page-height slices.
//! Consecutive slices overlap slightly so a line cut at one page edge is
//! usually readable on the other, but nothing prevents cuts through text:
//! this path has strictly weaker guarantees than block pagination and is
//! only used when block extraction or measurement is not possible.

use std::sync::Arc;

use ::image::imageops;
use log::{error, info};

use crate::budget::PageBudget;
use crate::config::RenderConfig;
use crate::display::DisplayList;
use crate::layout::JsonNode;
use crate::layout_box::layout_tree;
use crate::pdf::RenderedPage;
use crate::progress::{ProgressReporter, PAGES_RENDERED, PAGINATED};
use crate::raster::{PageRasterizer, RasterImage, RenderTargets};
use crate::raster_backend::{device_px_per_mm, fit_raster_mm, rasterize_blocking};
use crate::resources::ReadyResources;

/// Rows `start..start + height` of the tall raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRange {
    pub start: u32,
    pub height: u32,
}

/// Cut `total_px` rows into slices of at most `slice_px`, each starting
/// `slice_px - overlap_px` after the previous one.
///
/// Never returns zero slices: an empty document yields one empty slice.
/// `overlap_px` must be smaller than `slice_px`.
pub fn plan_slices(total_px: u32, slice_px: u32, overlap_px: u32) -> Vec<SliceRange> {
    let slice_px = slice_px.max(1);
    let step = slice_px.saturating_sub(overlap_px).max(1);

    if total_px <= slice_px {
        return vec![SliceRange {
            start: 0,
            height: total_px,
        }];
    }

    let count = 1 + (total_px - slice_px).div_ceil(step);
    (0..count)
        .map(|i| {
            let start = i * step;
            SliceRange {
                start,
                height: slice_px.min(total_px - start),
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct BlindSlicer {
    rasterizer: Arc<dyn PageRasterizer>,
}

impl BlindSlicer {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>) -> Self {
        BlindSlicer { rasterizer }
    }

    pub async fn render(
        &self,
        root: &JsonNode,
        resources: Arc<ReadyResources>,
        config: &RenderConfig,
        budget: &PageBudget,
        targets: &RenderTargets,
        progress: &mut ProgressReporter,
    ) -> Vec<RenderedPage> {
        let list = DisplayList::from_layout(&layout_tree(root, budget.content_width_px(), &*resources));
        let tall = match rasterize_blocking(
            Arc::clone(&self.rasterizer),
            list,
            resources,
            config,
            targets,
        )
        .await
        {
            Ok(tall) => tall,
            Err(e) => {
                error!("full-document raster failed, emitting a blank page: {e}");
                progress.report(PAGES_RENDERED, "Rendering failed");
                return vec![RenderedPage::Placeholder {
                    reason: e.to_string(),
                }];
            }
        };

        let slice_px = (budget.content_height_mm() * device_px_per_mm(config.scale)).floor() as u32;
        let overlap_px = config.slice_overlap_device_px().round() as u32;
        let slices = plan_slices(tall.height(), slice_px, overlap_px.min(slice_px.saturating_sub(1)));
        info!(
            "blind slicing {}px into {} page(s) of {}px with {}px overlap",
            tall.height(),
            slices.len(),
            slice_px,
            overlap_px
        );

        let total = slices.len();
        let mut pages = Vec::with_capacity(total);
        for (i, slice) in slices.iter().enumerate() {
            let page = if slice.height == 0 {
                RenderedPage::Placeholder {
                    reason: "empty document".into(),
                }
            } else {
                let cut = imageops::crop_imm(&tall, 0, slice.start, tall.width(), slice.height).to_image();
                match RasterImage::encode(&cut, config.jpeg_quality()) {
                    Ok(image) => {
                        let (width_mm, height_mm) = fit_raster_mm(image.width_px, image.height_px, budget);
                        RenderedPage::Raster {
                            image,
                            width_mm,
                            height_mm,
                        }
                    }
                    Err(e) => {
                        error!("slice {} of {total} failed to encode: {e}", i + 1);
                        RenderedPage::Placeholder {
                            reason: e.to_string(),
                        }
                    }
                }
            };
            pages.push(page);
            progress.step(
                PAGINATED,
                PAGES_RENDERED,
                i + 1,
                total,
                format!("Rendered slice {} of {total}", i + 1),
            );
            tokio::task::yield_now().await;
        }
        pages
    }
}
