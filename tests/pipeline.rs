mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{config, long_cv, page_count, short_cv, BrokenRasterizer, TrackingRasterizer};
use cvpress::blocks::ContentBlockModel;
use cvpress::error::MeasureError;
use cvpress::layout::{JsonNode, Style};
use cvpress::measure::{LayoutMeasurer, Measurer};
use cvpress::paginate::assign_pages;
use cvpress::pdf::RenderedPage;
use cvpress::raster::RenderTargets;
use cvpress::raster_backend::RasterBackend;
use cvpress::resources::ReadyResources;
use cvpress::templates::Template;
use cvpress::{DocumentSource, Pipeline, PipelineError, ProgressEvent, ProgressReporter, Strategy};

const STRATEGIES: [Strategy; 3] = [
    Strategy::RasterMeasured,
    Strategy::RasterBlindSlice,
    Strategy::VectorFlow,
];

fn document(data: cvpress::document::DocumentData) -> DocumentSource {
    DocumentSource::Document {
        data,
        template: Template::Classic,
    }
}

fn opaque_layout(paragraphs: usize) -> JsonNode {
    let body = "Plain unannotated text that the pipeline cannot split into records. ".repeat(6);
    JsonNode::page(
        Style {
            padding: Some(12.0),
            ..Style::default()
        },
        (0..paragraphs)
            .map(|_| JsonNode::text(body.clone(), Style::default()))
            .collect(),
    )
}

#[tokio::test]
async fn short_document_is_one_page_with_every_strategy() {
    let pipeline = Pipeline::new(TrackingRasterizer::new());
    for strategy in STRATEGIES {
        let pdf = pipeline
            .generate(&document(short_cv()), strategy, &config(), &mut ProgressReporter::silent())
            .await
            .unwrap();
        assert_eq!(pdf.page_count, 1, "{}", strategy.name());
        assert_eq!(page_count(&pdf.bytes), 1, "{}", strategy.name());
        assert_eq!(pdf.file_name, "document.pdf");
    }
}

#[tokio::test]
async fn long_document_spans_several_pages() {
    let pipeline = Pipeline::new(TrackingRasterizer::new());
    for strategy in STRATEGIES {
        let pdf = pipeline
            .generate(&document(long_cv()), strategy, &config(), &mut ProgressReporter::silent())
            .await
            .unwrap();
        assert!(pdf.page_count >= 2, "{} gave {}", strategy.name(), pdf.page_count);
        assert_eq!(page_count(&pdf.bytes), pdf.page_count);
    }
}

#[tokio::test]
async fn render_targets_are_released_after_every_invocation() {
    let rasterizer = TrackingRasterizer::new();
    let pipeline = Pipeline::new(rasterizer.clone());
    for strategy in [Strategy::RasterMeasured, Strategy::RasterBlindSlice] {
        pipeline
            .generate(&document(long_cv()), strategy, &config(), &mut ProgressReporter::silent())
            .await
            .unwrap();
    }

    let seen = rasterizer.seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|targets| targets.live() == 0));
    assert!(seen.iter().all(|targets| targets.acquired() > 0));
}

#[tokio::test]
async fn raster_pages_match_page_assignments() {
    let root = Template::Classic.render(&long_cv());
    let model = ContentBlockModel::extract(&root).unwrap();
    let cfg = config();
    let budget = cfg.budget().unwrap();
    let resources = ReadyResources::none();

    let blocks = LayoutMeasurer.measure(&model, &budget, &resources).unwrap();
    let assignments = assign_pages(&blocks, budget.content_height_px() - model.frame_inset_px());
    assert!(assignments.len() >= 2);

    let pages = RasterBackend::new(TrackingRasterizer::new())
        .render(
            &model,
            &assignments,
            Arc::new(resources),
            &cfg,
            &budget,
            &RenderTargets::new(),
            &mut ProgressReporter::silent(),
        )
        .await;
    assert_eq!(pages.len(), assignments.len());
    assert!(pages.iter().all(|p| matches!(p, RenderedPage::Raster { .. })));
}

#[tokio::test]
async fn failing_pages_become_blank_pages() {
    let pipeline = Pipeline::new(Arc::new(BrokenRasterizer));
    let source = document(long_cv());

    let measured = pipeline
        .generate(&source, Strategy::RasterMeasured, &config(), &mut ProgressReporter::silent())
        .await
        .unwrap();
    assert!(measured.page_count >= 2);
    assert_eq!(page_count(&measured.bytes), measured.page_count);

    let sliced = pipeline
        .generate(&source, Strategy::RasterBlindSlice, &config(), &mut ProgressReporter::silent())
        .await
        .unwrap();
    assert_eq!(sliced.page_count, 1);
}

#[tokio::test]
async fn opaque_trees_fall_back_to_blind_slicing() {
    let pipeline = Pipeline::new(TrackingRasterizer::new());
    let source = DocumentSource::Layout(opaque_layout(30));

    let pdf = pipeline
        .generate(&source, Strategy::RasterMeasured, &config(), &mut ProgressReporter::silent())
        .await
        .unwrap();
    assert!(pdf.page_count >= 2);

    let strict = cvpress::RenderConfig {
        fallback_to_blind_slice: false,
        ..config()
    };
    let err = pipeline
        .generate(&source, Strategy::RasterMeasured, &strict, &mut ProgressReporter::silent())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Measurement(MeasureError::NoBlockBoundaries)
    ));
}

#[tokio::test]
async fn opaque_trees_flow_as_one_divisible_block() {
    let pipeline = Pipeline::new(TrackingRasterizer::new());
    let pdf = pipeline
        .generate(
            &DocumentSource::Layout(opaque_layout(30)),
            Strategy::VectorFlow,
            &config(),
            &mut ProgressReporter::silent(),
        )
        .await
        .unwrap();
    assert!(pdf.page_count >= 2);
    assert_eq!(page_count(&pdf.bytes), pdf.page_count);
}

#[tokio::test]
async fn progress_is_monotonic_and_complete() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut progress = ProgressReporter::new(move |e: &ProgressEvent| sink.lock().unwrap().push(e.percent));

    Pipeline::new(TrackingRasterizer::new())
        .generate(&document(long_cv()), Strategy::RasterMeasured, &config(), &mut progress)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    for checkpoint in [5, 20, 30, 40, 90, 92] {
        assert!(seen.contains(&checkpoint), "missing {checkpoint}% in {seen:?}");
    }
}

#[tokio::test]
async fn invalid_configuration_is_rejected_before_work_starts() {
    let bad = cvpress::RenderConfig {
        margin_mm: 200.0,
        ..config()
    };
    let err = Pipeline::new(Arc::new(BrokenRasterizer))
        .generate(&document(short_cv()), Strategy::VectorFlow, &bad, &mut ProgressReporter::silent())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[tokio::test]
async fn unresponsive_image_host_does_not_stall_the_pipeline() {
    // Accepts connections but never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut cv = short_cv();
    cv.personal_info.photo = Some(format!("http://{addr}/photo.png"));
    let cfg = cvpress::RenderConfig {
        resource_timeout: Duration::from_millis(200),
        ..config()
    };

    let started = Instant::now();
    let pdf = Pipeline::new(TrackingRasterizer::new())
        .generate(&document(cv), Strategy::RasterMeasured, &cfg, &mut ProgressReporter::silent())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pdf.page_count, 1);
    drop(listener);
}
