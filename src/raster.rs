//! Rasterizing display lists with tiny-skia.
//!
//! Every off-screen pixmap is a [`RenderTarget`]: a guard registered with the
//! invocation's [`RenderTargets`] tracker and released when dropped, on
//! every exit path.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use log::{debug, warn};
use tiny_skia::{
    FillRule, FilterQuality, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

use crate::display::{fit_image, DisplayList, PaintOp};
use crate::error::RasterError;
use crate::font_metrics;
use crate::layout::{Color, ObjectFit};
use crate::resources::ReadyResources;

// ============================================================================
// RENDER TARGETS
// ============================================================================

/// Tracks the off-screen targets of one pipeline invocation.
#[derive(Debug, Clone, Default)]
pub struct RenderTargets {
    live: Arc<AtomicUsize>,
    acquired: Arc<AtomicUsize>,
}

impl RenderTargets {
    pub fn new() -> Self {
        RenderTargets::default()
    }

    /// Targets currently attached.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Targets attached over the tracker's lifetime.
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

/// An off-screen pixmap. Released when dropped.
pub struct RenderTarget {
    pixmap: Pixmap,
    live: Arc<AtomicUsize>,
}

impl RenderTarget {
    pub fn acquire(targets: &RenderTargets, width: u32, height: u32) -> Result<Self, RasterError> {
        let pixmap = Pixmap::new(width, height).ok_or(RasterError::Surface { width, height })?;
        targets.live.fetch_add(1, Ordering::SeqCst);
        targets.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(RenderTarget {
            pixmap,
            live: Arc::clone(&targets.live),
        })
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// Copy out opaque RGB pixels. The target is white-filled before
    /// painting, so every pixel is opaque and premultiplication is a no-op.
    pub fn to_rgb(&self) -> RgbImage {
        let rgb: Vec<u8> = self
            .pixmap
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        RgbImage::from_raw(self.pixmap.width(), self.pixmap.height(), rgb)
            .unwrap_or_else(|| RgbImage::new(self.pixmap.width(), self.pixmap.height()))
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// ENCODED RASTER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RasterEncoding {
    /// Baseline JPEG, embedded with the DCT filter.
    Jpeg(Vec<u8>),
    /// 8-bit RGB samples, embedded as-is.
    Rgb(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width_px: u32,
    pub height_px: u32,
    pub encoding: RasterEncoding,
}

impl RasterImage {
    /// JPEG at `jpeg_quality` (1..=100), or raw RGB when `None`.
    pub fn encode(image: &RgbImage, jpeg_quality: Option<u8>) -> Result<Self, RasterError> {
        let encoding = match jpeg_quality {
            Some(quality) => {
                let mut bytes = Vec::new();
                JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality)
                    .encode_image(image)
                    .map_err(|e| RasterError::Encode(e.to_string()))?;
                RasterEncoding::Jpeg(bytes)
            }
            None => RasterEncoding::Rgb(image.as_raw().clone()),
        };
        Ok(RasterImage {
            width_px: image.width(),
            height_px: image.height(),
            encoding,
        })
    }

    pub fn byte_len(&self) -> usize {
        match &self.encoding {
            RasterEncoding::Jpeg(b) | RasterEncoding::Rgb(b) => b.len(),
        }
    }
}

// ============================================================================
// RASTERIZER
// ============================================================================

pub trait PageRasterizer: Send + Sync {
    /// Paint `list` at `scale` device pixels per layout pixel.
    fn rasterize(
        &self,
        list: &DisplayList,
        resources: &ReadyResources,
        scale: f32,
        targets: &RenderTargets,
    ) -> Result<RgbImage, RasterError>;
}

/// Font files for the four faces. Missing faces fall back to regular.
#[derive(Debug, Default)]
struct FontSet {
    regular: Option<Vec<u8>>,
    bold: Option<Vec<u8>>,
    italic: Option<Vec<u8>>,
    bold_italic: Option<Vec<u8>>,
}

impl FontSet {
    fn get(&self, bold: bool, italic: bool) -> Option<&[u8]> {
        let face = match (bold, italic) {
            (true, true) => self.bold_italic.as_ref().or(self.bold.as_ref()),
            (true, false) => self.bold.as_ref(),
            (false, true) => self.italic.as_ref(),
            (false, false) => None,
        };
        face.or(self.regular.as_ref()).map(Vec::as_slice)
    }
}

pub struct SkiaRasterizer {
    fonts: FontSet,
}

impl SkiaRasterizer {
    /// Find a Helvetica-metric sans-serif face, searching `font_dir` first.
    pub fn new(font_dir: Option<&FsPath>) -> Self {
        let mut dirs: Vec<PathBuf> = font_dir.map(FsPath::to_path_buf).into_iter().collect();
        dirs.extend(system_font_dirs());
        let files = index_font_files(&dirs);

        let fonts = FontSet {
            regular: pick_font(&files, REGULAR_CANDIDATES),
            bold: pick_font(&files, BOLD_CANDIDATES),
            italic: pick_font(&files, ITALIC_CANDIDATES),
            bold_italic: pick_font(&files, BOLD_ITALIC_CANDIDATES),
        };
        if fonts.regular.is_none() {
            warn!("no sans-serif font found; raster output will not contain text");
        }
        SkiaRasterizer { fonts }
    }

    pub fn has_text(&self) -> bool {
        self.fonts.regular.is_some()
    }
}

impl PageRasterizer for SkiaRasterizer {
    fn rasterize(
        &self,
        list: &DisplayList,
        resources: &ReadyResources,
        scale: f32,
        targets: &RenderTargets,
    ) -> Result<RgbImage, RasterError> {
        let width = (list.width * scale).ceil().max(1.0) as u32;
        let height = (list.height * scale).ceil().max(1.0) as u32;

        let mut target = RenderTarget::acquire(targets, width, height)?;
        let device = Transform::from_scale(scale, scale);
        let pixmap = target.pixmap_mut();
        pixmap.fill(tiny_skia::Color::WHITE);

        let mut images: HashMap<&str, Option<Pixmap>> = HashMap::new();
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
                } => {
                    let Some(path) = rect_path(*x, *y, *width, *height, *radius) else {
                        continue;
                    };
                    if let Some(fill) = fill {
                        pixmap.fill_path(&path, &paint(*fill), FillRule::Winding, device, None);
                    }
                    if let Some((color, line_width)) = stroke {
                        let stroke = Stroke {
                            width: *line_width,
                            ..Stroke::default()
                        };
                        pixmap.stroke_path(&path, &paint(*color), &stroke, device, None);
                    }
                }
                PaintOp::Text {
                    x,
                    baseline,
                    text,
                    size,
                    bold,
                    italic,
                    color,
                } => {
                    if let Some(font) = self.fonts.get(*bold, *italic) {
                        draw_text(pixmap, font, text, *x, *baseline, *size, *bold, *color, device);
                    }
                }
                PaintOp::Image {
                    x,
                    y,
                    width,
                    height,
                    src,
                    fit,
                } => {
                    let source = images
                        .entry(src.as_str())
                        .or_insert_with(|| resources.image(src).and_then(|img| to_pixmap(img)));
                    if let Some(source) = source.as_ref() {
                        draw_image(pixmap, source, *x, *y, *width, *height, *fit, device);
                    }
                }
            }
        }

        debug!("rasterized {}x{} device px", width, height);
        Ok(target.to_rgb())
    }
}

fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, (color.a.clamp(0.0, 1.0) * 255.0) as u8);
    paint.anti_alias = true;
    paint
}

fn rect_path(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Option<Path> {
    let r = radius.min(w / 2.0).min(h / 2.0);
    if r <= 0.0 {
        return Some(PathBuilder::from_rect(Rect::from_xywh(x, y, w, h)?));
    }
    // Cubic approximation of a quarter circle.
    let k = r * 0.552_284_8;
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.cubic_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.cubic_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.cubic_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Glyph outlines from the system face, advanced by the builtin metrics so
/// raster text lands exactly where layout measured it.
#[allow(clippy::too_many_arguments)]
fn draw_text(
    pixmap: &mut Pixmap,
    font: &[u8],
    text: &str,
    x: f32,
    baseline: f32,
    size: f32,
    bold: bool,
    color: Color,
    device: Transform,
) {
    let Ok(face) = ttf_parser::Face::parse(font, 0) else {
        return;
    };
    let scale = size / face.units_per_em().max(1) as f32;
    let metrics = font_metrics::get_metrics(bold, false);
    let paint = paint(color);

    let mut pen_x = x;
    for c in text.chars() {
        if let Some(gid) = face.glyph_index(c) {
            let mut builder = GlyphPathBuilder::new(scale);
            if face.outline_glyph(gid, &mut builder).is_some() {
                if let Some(path) = builder.finish() {
                    // Font units are y-up.
                    let local = Transform::from_row(1.0, 0.0, 0.0, -1.0, pen_x, baseline);
                    pixmap.fill_path(&path, &paint, FillRule::Winding, device.pre_concat(local), None);
                }
            }
        } else if c != ' ' {
            outline_missing(&face, pixmap, &paint, scale, pen_x, baseline, device);
        }
        pen_x += metrics.char_width(c) as f32 / metrics.units_per_em as f32 * size;
    }
}

/// Paint the font's .notdef box for characters it lacks.
fn outline_missing(
    face: &ttf_parser::Face<'_>,
    pixmap: &mut Pixmap,
    paint: &Paint<'_>,
    scale: f32,
    x: f32,
    baseline: f32,
    device: Transform,
) {
    let mut builder = GlyphPathBuilder::new(scale);
    if face.outline_glyph(GlyphId(0), &mut builder).is_some() {
        if let Some(path) = builder.finish() {
            let local = Transform::from_row(1.0, 0.0, 0.0, -1.0, x, baseline);
            pixmap.fill_path(&path, paint, FillRule::Winding, device.pre_concat(local), None);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_image(
    pixmap: &mut Pixmap,
    source: &Pixmap,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    fit: ObjectFit,
    device: Transform,
) {
    let (iw, ih) = (source.width() as f32, source.height() as f32);
    let (ox, oy, rw, rh) = fit_image(fit, w, h, iw, ih);
    let placement = Transform::from_row(rw / iw, 0.0, 0.0, rh / ih, x + ox, y + oy);

    // Cover overflows its box.
    let clip = if fit == ObjectFit::Cover {
        let mut mask = Mask::new(pixmap.width(), pixmap.height());
        if let (Some(mask), Some(rect)) = (mask.as_mut(), Rect::from_xywh(x, y, w, h)) {
            mask.fill_path(&PathBuilder::from_rect(rect), FillRule::Winding, true, device);
        }
        mask
    } else {
        None
    };

    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, device.pre_concat(placement), clip.as_ref());
}

fn to_pixmap(img: &image::DynamicImage) -> Option<Pixmap> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src, dst) in rgba.as_raw().chunks_exact(4).zip(pixmap.data_mut().chunks_exact_mut(4)) {
        let a = src[3];
        dst[0] = premultiply(src[0], a);
        dst[1] = premultiply(src[1], a);
        dst[2] = premultiply(src[2], a);
        dst[3] = a;
    }
    Some(pixmap)
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(scale: f32) -> Self {
        GlyphPathBuilder {
            builder: PathBuilder::new(),
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x * self.scale, y * self.scale);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x * self.scale, y * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let s = self.scale;
        self.builder.quad_to(x1 * s, y1 * s, x * s, y * s);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let s = self.scale;
        self.builder
            .cubic_to(x1 * s, y1 * s, x2 * s, y2 * s, x * s, y * s);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

// ============================================================================
// FONT DISCOVERY
// ============================================================================

const REGULAR_CANDIDATES: &[&str] = &[
    "LiberationSans-Regular.ttf",
    "Arial.ttf",
    "arial.ttf",
    "Helvetica.ttf",
    "DejaVuSans.ttf",
];
const BOLD_CANDIDATES: &[&str] = &[
    "LiberationSans-Bold.ttf",
    "Arial Bold.ttf",
    "arialbd.ttf",
    "DejaVuSans-Bold.ttf",
];
const ITALIC_CANDIDATES: &[&str] = &[
    "LiberationSans-Italic.ttf",
    "Arial Italic.ttf",
    "ariali.ttf",
    "DejaVuSans-Oblique.ttf",
];
const BOLD_ITALIC_CANDIDATES: &[&str] = &[
    "LiberationSans-BoldItalic.ttf",
    "Arial Bold Italic.ttf",
    "arialbi.ttf",
    "DejaVuSans-BoldOblique.ttf",
];

/// Font directories nest (e.g. truetype/liberation); look a few levels down.
const MAX_FONT_DIR_DEPTH: usize = 4;

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
    }

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
    }

    dirs
}

/// Lowercased file name to first path seen, in directory priority order.
fn index_font_files(dirs: &[PathBuf]) -> HashMap<String, PathBuf> {
    let mut files = HashMap::new();
    let mut pending: Vec<(PathBuf, usize)> = dirs.iter().rev().map(|d| (d.clone(), 0)).collect();

    while let Some((dir, depth)) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if depth < MAX_FONT_DIR_DEPTH {
                    pending.push((path, depth + 1));
                }
            } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.entry(name.to_lowercase()).or_insert(path);
            }
        }
    }
    files
}

fn pick_font(files: &HashMap<String, PathBuf>, candidates: &[&str]) -> Option<Vec<u8>> {
    candidates.iter().find_map(|name| {
        let path = files.get(&name.to_lowercase())?;
        let bytes = std::fs::read(path).ok()?;
        ttf_parser::Face::parse(&bytes, 0).ok()?;
        debug!("raster font: {}", path.display());
        Some(bytes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_fonts() -> SkiaRasterizer {
        SkiaRasterizer {
            fonts: FontSet::default(),
        }
    }

    fn card() -> DisplayList {
        let mut list = DisplayList::new(50.0, 20.0);
        list.push(PaintOp::Rect {
            x: 10.0,
            y: 5.0,
            width: 30.0,
            height: 10.0,
            fill: Some(Color::rgb(255, 0, 0)),
            stroke: None,
            radius: 2.0,
        });
        list
    }

    #[test]
    fn paints_at_device_scale() {
        let targets = RenderTargets::new();
        let img = no_fonts()
            .rasterize(&card(), &ReadyResources::none(), 2.0, &targets)
            .unwrap();
        assert_eq!(img.dimensions(), (100, 40));
        assert_eq!(img.get_pixel(50, 20).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(2, 2).0, [255, 255, 255]);
        assert_eq!(targets.live(), 0);
        assert_eq!(targets.acquired(), 1);
    }

    #[test]
    fn targets_are_released_when_a_task_panics() {
        let targets = RenderTargets::new();
        let inner = targets.clone();
        let result = std::panic::catch_unwind(move || {
            let _target = RenderTarget::acquire(&inner, 4, 4).unwrap();
            assert_eq!(inner.live(), 1);
            panic!("raster failure");
        });
        assert!(result.is_err());
        assert_eq!(targets.live(), 0);
    }

    #[test]
    fn oversized_targets_fail_cleanly() {
        let targets = RenderTargets::new();
        assert!(matches!(
            RenderTarget::acquire(&targets, 0, 10),
            Err(RasterError::Surface { .. })
        ));
        assert_eq!(targets.live(), 0);
    }

    #[test]
    fn encodes_jpeg_or_raw() {
        let img = RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30]));
        let jpeg = RasterImage::encode(&img, Some(80)).unwrap();
        assert!(matches!(&jpeg.encoding, RasterEncoding::Jpeg(b) if b.starts_with(&[0xFF, 0xD8])));

        let raw = RasterImage::encode(&img, None).unwrap();
        assert_eq!(raw.byte_len(), 8 * 4 * 3);
        assert_eq!((raw.width_px, raw.height_px), (8, 4));
    }

    #[test]
    fn premultiplies_alpha() {
        assert_eq!(premultiply(255, 128), 128);
        assert_eq!(premultiply(200, 255), 200);
        assert_eq!(premultiply(200, 0), 0);
    }
}
