//! One pipeline invocation: resources, measurement, pagination, rendering
//! and assembly, in that order.
//!
//! Every invocation builds its own budget and render target tracker from
//! the [`RenderConfig`] it is given; nothing is shared between concurrent
//! calls except the immutable rasterizer and measurer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::blind_slice::BlindSlicer;
use crate::blocks::ContentBlockModel;
use crate::budget::PageBudget;
use crate::config::RenderConfig;
use crate::document::DocumentData;
use crate::error::{MeasureError, PipelineError};
use crate::flow::{map_blocks, FlowEngine};
use crate::layout::JsonNode;
use crate::measure::{LayoutMeasurer, Measurer};
use crate::paginate::assign_pages;
use crate::pdf::{PdfAssembler, RenderedPage};
use crate::progress::{
    ProgressReporter, ASSEMBLING, DONE, IMAGES_READY, LOADING_IMAGES, MEASURED, PAGES_RENDERED,
    PAGINATED, PREPARING,
};
use crate::raster::{PageRasterizer, RenderTargets};
use crate::raster_backend::RasterBackend;
use crate::resources::{ReadyResources, ResourceGate};
use crate::templates::Template;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Measure blocks, assign them to pages, rasterize each page.
    #[default]
    RasterMeasured,
    /// Rasterize the whole document and cut it at page height.
    RasterBlindSlice,
    /// Keep text as text; break pages with the flow engine.
    VectorFlow,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::RasterMeasured => "raster-measured",
            Strategy::RasterBlindSlice => "raster-blind-slice",
            Strategy::VectorFlow => "vector-flow",
        }
    }
}

/// What to render.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// CV data rendered through a template.
    Document { data: DocumentData, template: Template },
    /// A ready node tree, annotated or opaque.
    Layout(JsonNode),
}

impl DocumentSource {
    fn root(&self) -> JsonNode {
        match self {
            DocumentSource::Document { data, template } => template.render(data),
            DocumentSource::Layout(root) => root.clone(),
        }
    }
}

/// A finished document.
#[derive(Debug, Clone)]
pub struct GeneratedPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub file_name: String,
}

impl GeneratedPdf {
    /// Write the document into `dir` under its file name.
    pub async fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, PipelineError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        info!("saved {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

#[derive(Clone)]
pub struct Pipeline {
    raster: RasterBackend,
    slicer: BlindSlicer,
    measurer: Arc<dyn Measurer>,
}

impl Pipeline {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Pipeline::with_measurer(rasterizer, Arc::new(LayoutMeasurer))
    }

    pub fn with_measurer(rasterizer: Arc<dyn PageRasterizer>, measurer: Arc<dyn Measurer>) -> Self {
        Pipeline {
            raster: RasterBackend::new(Arc::clone(&rasterizer)),
            slicer: BlindSlicer::new(rasterizer),
            measurer,
        }
    }

    pub async fn generate(
        &self,
        source: &DocumentSource,
        strategy: Strategy,
        config: &RenderConfig,
        progress: &mut ProgressReporter,
    ) -> Result<GeneratedPdf, PipelineError> {
        let started = Instant::now();
        progress.report(PREPARING, "Preparing document");
        config.validate()?;
        let budget = config.budget()?;
        let targets = RenderTargets::new();
        let root = source.root();

        progress.report(LOADING_IMAGES, "Loading images");
        let gate = ResourceGate::new(config.resource_timeout).with_asset_dir(config.asset_dir.clone());
        let resources = Arc::new(gate.wait(&root).await);
        progress.report(
            IMAGES_READY,
            format!("{} of {} image(s) ready", resources.ready_count(), resources.len()),
        );

        let pages = match strategy {
            Strategy::RasterMeasured => {
                self.render_measured(&root, Arc::clone(&resources), config, &budget, &targets, progress)
                    .await?
            }
            Strategy::RasterBlindSlice => {
                self.render_blind(&root, Arc::clone(&resources), config, &budget, &targets, progress)
                    .await
            }
            Strategy::VectorFlow => render_flow(&root, &resources, &budget, progress),
        };
        debug!(
            "{} render target(s) used, {} still live",
            targets.acquired(),
            targets.live()
        );

        let page_count = pages.len();
        let placeholders = pages
            .iter()
            .filter(|p| matches!(p, RenderedPage::Placeholder { .. }))
            .count();
        progress.report(ASSEMBLING, format!("Assembling {page_count} page(s)"));
        let bytes = PdfAssembler::new(budget, config.title.clone())
            .assemble(pages, resources)
            .await?;
        progress.report(DONE, "Done");

        info!(
            "generated '{}' via {}: {} page(s), {} placeholder(s), {} bytes in {:?}",
            config.file_name,
            strategy.name(),
            page_count,
            placeholders,
            bytes.len(),
            started.elapsed()
        );
        Ok(GeneratedPdf {
            bytes,
            page_count,
            file_name: config.file_name.clone(),
        })
    }

    async fn render_measured(
        &self,
        root: &JsonNode,
        resources: Arc<ReadyResources>,
        config: &RenderConfig,
        budget: &PageBudget,
        targets: &RenderTargets,
        progress: &mut ProgressReporter,
    ) -> Result<Vec<RenderedPage>, PipelineError> {
        let measured = ContentBlockModel::extract(root)
            .ok_or(MeasureError::NoBlockBoundaries)
            .and_then(|model| {
                let blocks = self.measurer.measure(&model, budget, &resources)?;
                Ok((model, blocks))
            });

        let (model, blocks) = match measured {
            Ok(measured) => measured,
            Err(e) if config.fallback_to_blind_slice => {
                warn!("{e}; falling back to blind slicing, lines may be cut at page edges");
                return Ok(self.render_blind(root, resources, config, budget, targets, progress).await);
            }
            Err(e) => return Err(e.into()),
        };
        progress.report(MEASURED, format!("Measured {} block(s)", blocks.len()));

        // The frame repeats its vertical padding on every page.
        let page_budget_px = (budget.content_height_px() - model.frame_inset_px()).max(1.0);
        let assignments = assign_pages(&blocks, page_budget_px);
        for page in assignments.iter().filter(|p| p.overflows(page_budget_px)) {
            warn!(
                "page {} holds a block taller than the page ({:.0}px > {:.0}px)",
                page.page_index + 1,
                page.used_height_px,
                page_budget_px
            );
        }
        progress.report(PAGINATED, format!("Paginated into {} page(s)", assignments.len()));

        Ok(self
            .raster
            .render(&model, &assignments, resources, config, budget, targets, progress)
            .await)
    }

    async fn render_blind(
        &self,
        root: &JsonNode,
        resources: Arc<ReadyResources>,
        config: &RenderConfig,
        budget: &PageBudget,
        targets: &RenderTargets,
        progress: &mut ProgressReporter,
    ) -> Vec<RenderedPage> {
        progress.report(PAGINATED, "Slicing full document");
        self.slicer
            .render(root, resources, config, budget, targets, progress)
            .await
    }
}

fn render_flow(
    root: &JsonNode,
    resources: &ReadyResources,
    budget: &PageBudget,
    progress: &mut ProgressReporter,
) -> Vec<RenderedPage> {
    let model = ContentBlockModel::extract(root).unwrap_or_else(|| {
        debug!("no block annotations, flowing the document as one divisible block");
        ContentBlockModel::single(root)
    });
    let nodes = map_blocks(&model, budget, resources);
    progress.report(MEASURED, format!("Mapped {} block(s)", nodes.len()));

    let pages = FlowEngine::new(&model, budget).paginate(&nodes);
    progress.report(PAGINATED, format!("Flowed into {} page(s)", pages.len()));
    progress.report(PAGES_RENDERED, "Pages laid out");
    pages.into_iter().map(RenderedPage::Flow).collect()
}
