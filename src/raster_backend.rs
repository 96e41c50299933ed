//! Raster rendering of measured page assignments.
//!
//! Each page re-renders only its own blocks inside the document frame, so
//! it keeps the document's styling without carrying neighbouring content.

use std::sync::Arc;

use log::{debug, error};

use crate::blocks::ContentBlockModel;
use crate::budget::{PageBudget, PX_PER_MM};
use crate::config::RenderConfig;
use crate::display::DisplayList;
use crate::error::RasterError;
use crate::layout::JsonNode;
use crate::layout_box::layout_tree;
use crate::paginate::PageAssignment;
use crate::pdf::RenderedPage;
use crate::progress::{ProgressReporter, PAGES_RENDERED, PAGINATED};
use crate::raster::{PageRasterizer, RasterImage, RenderTargets};
use crate::resources::ReadyResources;

/// Physical size of a raster on the page: content width, height from the
/// aspect ratio, shrunk to fit when it would exceed the content height.
pub fn fit_raster_mm(width_px: u32, height_px: u32, budget: &PageBudget) -> (f32, f32) {
    if width_px == 0 || height_px == 0 {
        return (budget.content_width_mm(), 0.0);
    }
    let aspect = height_px as f32 / width_px as f32;
    let width_mm = budget.content_width_mm();
    let height_mm = width_mm * aspect;
    if height_mm > budget.content_height_mm() {
        (budget.content_height_mm() / aspect, budget.content_height_mm())
    } else {
        (width_mm, height_mm)
    }
}

/// Rasterize a display list and encode it, on the blocking pool.
pub(crate) async fn rasterize_blocking(
    rasterizer: Arc<dyn PageRasterizer>,
    list: DisplayList,
    resources: Arc<ReadyResources>,
    config: &RenderConfig,
    targets: &RenderTargets,
) -> Result<::image::RgbImage, RasterError> {
    let scale = config.scale;
    let targets = targets.clone();
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&list, &resources, scale, &targets))
        .await
        .map_err(|e| RasterError::Task(e.to_string()))?
}

#[derive(Clone)]
pub struct RasterBackend {
    rasterizer: Arc<dyn PageRasterizer>,
}

impl RasterBackend {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>) -> Self {
        RasterBackend { rasterizer }
    }

    /// One rendered page per assignment, in order. A page that fails to
    /// render becomes a placeholder; the rest continue.
    #[allow(clippy::too_many_arguments)]
    pub async fn render(
        &self,
        model: &ContentBlockModel,
        assignments: &[PageAssignment],
        resources: Arc<ReadyResources>,
        config: &RenderConfig,
        budget: &PageBudget,
        targets: &RenderTargets,
        progress: &mut ProgressReporter,
    ) -> Vec<RenderedPage> {
        let total = assignments.len();
        let mut pages = Vec::with_capacity(total);

        for assignment in assignments {
            let number = assignment.page_index + 1;
            let root = model.compose(assignment.blocks.iter().map(|m| &m.block));

            let page = match self
                .render_page(root, Arc::clone(&resources), config, budget, targets)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!("page {number} of {total} failed to render, substituting a blank page: {e}");
                    RenderedPage::Placeholder {
                        reason: e.to_string(),
                    }
                }
            };
            pages.push(page);

            progress.step(
                PAGINATED,
                PAGES_RENDERED,
                number,
                total,
                format!("Rendered page {number} of {total}"),
            );
            tokio::task::yield_now().await;
        }
        pages
    }

    async fn render_page(
        &self,
        root: JsonNode,
        resources: Arc<ReadyResources>,
        config: &RenderConfig,
        budget: &PageBudget,
        targets: &RenderTargets,
    ) -> Result<RenderedPage, RasterError> {
        let list = DisplayList::from_layout(&layout_tree(&root, budget.content_width_px(), &*resources));
        let pixels = rasterize_blocking(Arc::clone(&self.rasterizer), list, resources, config, targets).await?;
        let image = RasterImage::encode(&pixels, config.jpeg_quality())?;
        let (width_mm, height_mm) = fit_raster_mm(image.width_px, image.height_px, budget);

        debug!(
            "raster page {}x{}px ({} bytes) placed at {:.1}x{:.1}mm",
            image.width_px,
            image.height_px,
            image.byte_len(),
            width_mm,
            height_mm
        );
        Ok(RenderedPage::Raster {
            image,
            width_mm,
            height_mm,
        })
    }
}

/// Device pixels per millimetre at `scale`.
pub fn device_px_per_mm(scale: f32) -> f32 {
    PX_PER_MM * scale
}
