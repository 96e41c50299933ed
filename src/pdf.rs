use printpdf::path::{PaintMode, WindingOrder};
use printpdf::*;
use std::io::{BufWriter, Cursor};
use std::sync::Arc;

use log::{debug, warn};

use crate::budget::{PageBudget, PX_PER_MM};
use crate::display::{fit_image, DisplayList, PaintOp};
use crate::error::PipelineError;
use crate::flow::FlowPage;
use crate::font_metrics::winansi_code;
use crate::layout::{Color, ObjectFit};
use crate::raster::{RasterEncoding, RasterImage};
use crate::resources::ReadyResources;

const PT_TO_MM: f32 = 25.4 / 72.0;

// ============================================================================
// RENDERED PAGES
// ============================================================================

/// One backend output page, owned by the assembler until it is written.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedPage {
    /// An image placed at the top-left of the content area.
    Raster {
        image: RasterImage,
        width_mm: f32,
        height_mm: f32,
    },
    /// Paginated vector content.
    Flow(FlowPage),
    /// Stands in for a page that failed to render.
    Placeholder { reason: String },
}

impl RenderedPage {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderedPage::Raster { .. } => "raster",
            RenderedPage::Flow(_) => "flow",
            RenderedPage::Placeholder { .. } => "placeholder",
        }
    }
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Writes rendered pages into one PDF, one physical page each, in order.
#[derive(Debug, Clone)]
pub struct PdfAssembler {
    budget: PageBudget,
    title: String,
}

impl PdfAssembler {
    pub fn new(budget: PageBudget, title: impl Into<String>) -> Self {
        PdfAssembler {
            budget,
            title: title.into(),
        }
    }

    /// Assemble on the blocking pool; the document is not `Send`.
    pub async fn assemble(
        &self,
        pages: Vec<RenderedPage>,
        resources: Arc<ReadyResources>,
    ) -> Result<Vec<u8>, PipelineError> {
        let assembler = self.clone();
        tokio::task::spawn_blocking(move || assembler.write(&pages, &resources)).await?
    }

    pub fn write(
        &self,
        pages: &[RenderedPage],
        resources: &ReadyResources,
    ) -> Result<Vec<u8>, PipelineError> {
        if pages.is_empty() {
            return Err(PipelineError::Assembly("no pages to assemble".into()));
        }

        let width = Mm(self.budget.page_width_mm());
        let height = Mm(self.budget.page_height_mm());
        let (doc, first_page, first_layer) = PdfDocument::new(&self.title, width, height, "Layer 1");
        let fonts = Fonts::load(&doc)?;

        for (i, page) in pages.iter().enumerate() {
            let layer = if i == 0 {
                doc.get_page(first_page).get_layer(first_layer)
            } else {
                let (new_page, new_layer) = doc.add_page(width, height, "Layer 1");
                doc.get_page(new_page).get_layer(new_layer)
            };

            match page {
                RenderedPage::Raster {
                    image,
                    width_mm,
                    height_mm,
                } => self.place_raster(&layer, image, *width_mm, *height_mm),
                RenderedPage::Flow(flow) => {
                    let painter = VectorPainter {
                        layer: &layer,
                        fonts: &fonts,
                        resources,
                        origin_x: self.budget.margin_mm() / PT_TO_MM,
                        origin_y: (self.budget.page_height_mm() - self.budget.margin_mm()) / PT_TO_MM,
                    };
                    painter.paint(&flow.list);
                }
                RenderedPage::Placeholder { reason } => {
                    debug!("page {} left blank: {reason}", i + 1);
                }
            }
        }

        let mut buf = Vec::new();
        {
            let mut writer = BufWriter::new(Cursor::new(&mut buf));
            doc.save(&mut writer)
                .map_err(|e| PipelineError::Assembly(format!("{e:?}")))?;
        }
        debug!("assembled {} page(s), {} bytes", pages.len(), buf.len());
        Ok(buf)
    }

    fn place_raster(&self, layer: &PdfLayerReference, image: &RasterImage, width_mm: f32, height_mm: f32) {
        if image.width_px == 0 || image.height_px == 0 {
            return;
        }
        let (data, filter) = match &image.encoding {
            RasterEncoding::Jpeg(bytes) => (bytes.clone(), Some(ImageFilter::DCT)),
            RasterEncoding::Rgb(bytes) => (bytes.clone(), None),
        };

        let xobject = Image::from(ImageXObject {
            width: Px(image.width_px as usize),
            height: Px(image.height_px as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: data,
            image_filter: filter,
            clipping_bbox: None,
            smask: None,
        });

        // At 72 dpi one image pixel is one point; scale to the target size.
        let margin = self.budget.margin_mm();
        xobject.add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(margin)),
                translate_y: Some(Mm(self.budget.page_height_mm() - margin - height_mm)),
                scale_x: Some(width_mm * PX_PER_MM / image.width_px as f32),
                scale_y: Some(height_mm * PX_PER_MM / image.height_px as f32),
                dpi: Some(72.0),
                ..Default::default()
            },
        );
    }
}

// ============================================================================
// FONTS
// ============================================================================

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    bold_italic: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference) -> Result<Self, PipelineError> {
        let add = |font| {
            doc.add_builtin_font(font)
                .map_err(|e| PipelineError::Assembly(format!("font: {e:?}")))
        };
        Ok(Fonts {
            regular: add(BuiltinFont::Helvetica)?,
            bold: add(BuiltinFont::HelveticaBold)?,
            italic: add(BuiltinFont::HelveticaOblique)?,
            bold_italic: add(BuiltinFont::HelveticaBoldOblique)?,
        })
    }

    fn get(&self, bold: bool, italic: bool) -> &IndirectFontRef {
        match (bold, italic) {
            (true, true) => &self.bold_italic,
            (true, false) => &self.bold,
            (false, true) => &self.italic,
            (false, false) => &self.regular,
        }
    }
}

// ============================================================================
// VECTOR PAINTER
// ============================================================================

/// Paints a content-area display list. Display coordinates are top-down
/// points from the content origin; PDF space is bottom-up.
struct VectorPainter<'a> {
    layer: &'a PdfLayerReference,
    fonts: &'a Fonts,
    resources: &'a ReadyResources,
    origin_x: f32,
    origin_y: f32,
}

impl VectorPainter<'_> {
    fn paint(&self, list: &DisplayList) {
        for item in &list.items {
            match &item.op {
                PaintOp::Rect {
                    x,
                    y,
                    width,
                    height,
                    fill,
                    stroke,
                    radius,
                } => self.rect(*x, *y, *width, *height, *fill, *stroke, *radius),
                PaintOp::Text {
                    x,
                    baseline,
                    text,
                    size,
                    bold,
                    italic,
                    color,
                } => {
                    set_fill_color(self.layer, color);
                    self.layer.use_text(
                        winansi_text(text),
                        *size,
                        Mm((self.origin_x + x) * PT_TO_MM),
                        Mm((self.origin_y - baseline) * PT_TO_MM),
                        self.fonts.get(*bold, *italic),
                    );
                }
                PaintOp::Image {
                    x,
                    y,
                    width,
                    height,
                    src,
                    fit,
                } => self.image(*x, *y, *width, *height, src, *fit),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rect(
        &self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        fill: Option<Color>,
        stroke: Option<(Color, f32)>,
        radius: f32,
    ) {
        let left = self.origin_x + x;
        let bottom = self.origin_y - y - h;
        let points = if radius > 0.0 {
            rounded_rect_points(left, bottom, w, h, radius)
        } else {
            rect_points(left, bottom, w, h)
        };

        if let Some(fill) = fill {
            set_fill_color(self.layer, &fill);
            self.layer.add_polygon(Polygon {
                rings: vec![points.clone()],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            });
        }
        if let Some((color, width)) = stroke {
            set_stroke_color(self.layer, &color);
            self.layer.set_outline_thickness(width);
            self.layer.add_line(Line {
                points,
                is_closed: true,
            });
        }
    }

    fn image(&self, x: f32, y: f32, w: f32, h: f32, src: &str, fit: ObjectFit) {
        let Some(img) = self.resources.image(src) else {
            warn!("image missing at assembly: {src}");
            return;
        };

        // Cover overflows its box; crop the source instead of clipping.
        let img = if fit == ObjectFit::Cover {
            cover_crop(img, w, h)
        } else {
            img.as_ref().clone()
        };
        let (iw, ih) = (img.width() as f32, img.height() as f32);
        if iw <= 0.0 || ih <= 0.0 {
            return;
        }
        let (ox, oy, rw, rh) = match fit {
            ObjectFit::Cover => (0.0, 0.0, w, h),
            other => fit_image(other, w, h, iw, ih),
        };

        let rgb = img.to_rgb8();
        let xobject = Image::from(ImageXObject {
            width: Px(rgb.width() as usize),
            height: Px(rgb.height() as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: rgb.into_raw(),
            image_filter: None,
            clipping_bbox: None,
            smask: None,
        });
        xobject.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm((self.origin_x + x + ox) * PT_TO_MM)),
                translate_y: Some(Mm((self.origin_y - y - oy - rh) * PT_TO_MM)),
                scale_x: Some(rw / iw),
                scale_y: Some(rh / ih),
                dpi: Some(72.0),
                ..Default::default()
            },
        );
    }
}

fn cover_crop(img: &::image::DynamicImage, box_w: f32, box_h: f32) -> ::image::DynamicImage {
    let (iw, ih) = (img.width() as f32, img.height() as f32);
    if box_w <= 0.0 || box_h <= 0.0 || iw <= 0.0 || ih <= 0.0 {
        return img.clone();
    }
    let box_aspect = box_w / box_h;
    let (cw, ch) = if iw / ih > box_aspect {
        (ih * box_aspect, ih)
    } else {
        (iw, iw / box_aspect)
    };
    let left = ((iw - cw) / 2.0) as u32;
    let top = ((ih - ch) / 2.0) as u32;
    img.crop_imm(left, top, (cw as u32).max(1), (ch as u32).max(1))
}

fn point(x: f32, y: f32) -> (Point, bool) {
    (Point::new(Mm(x * PT_TO_MM), Mm(y * PT_TO_MM)), false)
}

fn rect_points(x: f32, y: f32, w: f32, h: f32) -> Vec<(Point, bool)> {
    vec![
        point(x, y),
        point(x + w, y),
        point(x + w, y + h),
        point(x, y + h),
    ]
}

/// Rounded corners approximated with line segments.
fn rounded_rect_points(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Vec<(Point, bool)> {
    let r = radius.min(w / 2.0).min(h / 2.0);
    const SEGMENTS: usize = 8;
    let pi = std::f32::consts::PI;

    // (center x, center y, start angle) per corner, counter-clockwise from bottom-right
    let corners = [
        (x + w - r, y + r, -pi / 2.0),
        (x + w - r, y + h - r, 0.0),
        (x + r, y + h - r, pi / 2.0),
        (x + r, y + r, pi),
    ];

    let mut points = Vec::with_capacity(corners.len() * (SEGMENTS + 1));
    for (cx, cy, start) in corners {
        for i in 0..=SEGMENTS {
            let angle = start + (i as f32 / SEGMENTS as f32) * (pi / 2.0);
            points.push(point(cx + r * angle.cos(), cy + r * angle.sin()));
        }
    }
    points
}

/// Builtin fonts are written with WinAnsiEncoding. Characters it lacks are
/// replaced before printpdf sees them.
fn winansi_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            _ if winansi_code(c).is_some() => c,
            '\u{2010}'..='\u{2012}' | '\u{2015}' | '\u{2212}' => '-',
            '\t' => ' ',
            _ => '?',
        })
        .collect()
}

/// Builtin-font text cannot be translucent; blend towards white instead.
fn opaque(color: &Color) -> (f32, f32, f32) {
    let a = color.a.clamp(0.0, 1.0);
    let blend = |c: u8| (c as f32 / 255.0) * a + (1.0 - a);
    (blend(color.r), blend(color.g), blend(color.b))
}

fn set_fill_color(layer: &PdfLayerReference, color: &Color) {
    let (r, g, b) = opaque(color);
    layer.set_fill_color(printpdf::Color::Rgb(Rgb::new(r, g, b, None)));
}

fn set_stroke_color(layer: &PdfLayerReference, color: &Color) {
    let (r, g, b) = opaque(color);
    layer.set_outline_color(printpdf::Color::Rgb(Rgb::new(r, g, b, None)));
}
