//! Flattened paint operations for a placed layout tree.
//!
//! Both backends paint the same list: the rasterizer into a pixmap, the PDF
//! writer into vector operators. Every item carries its vertical extent so a
//! list can be cut into page fragments between text lines.

use crate::layout::{Color, NodeType, ObjectFit, TextAlign};
use crate::layout_box::LayoutBox;

const EPSILON: f32 = 0.01;

const PLACEHOLDER_FILL: Color = Color::rgb(230, 230, 230);
const PLACEHOLDER_STROKE: Color = Color::rgb(178, 178, 178);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintOp {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        fill: Option<Color>,
        stroke: Option<(Color, f32)>,
        radius: f32,
    },
    Text {
        x: f32,
        baseline: f32,
        text: String,
        size: f32,
        bold: bool,
        italic: bool,
        color: Color,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        src: String,
        fit: ObjectFit,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayItem {
    pub top: f32,
    pub bottom: f32,
    pub op: PaintOp,
}

impl DisplayItem {
    /// Backgrounds and borders may be cut; text lines and images may not.
    pub fn splittable(&self) -> bool {
        matches!(self.op, PaintOp::Rect { .. })
    }

    fn translated(&self, dx: f32, dy: f32) -> DisplayItem {
        let op = match self.op.clone() {
            PaintOp::Rect {
                x,
                y,
                width,
                height,
                fill,
                stroke,
                radius,
            } => PaintOp::Rect {
                x: x + dx,
                y: y + dy,
                width,
                height,
                fill,
                stroke,
                radius,
            },
            PaintOp::Text {
                x,
                baseline,
                text,
                size,
                bold,
                italic,
                color,
            } => PaintOp::Text {
                x: x + dx,
                baseline: baseline + dy,
                text,
                size,
                bold,
                italic,
                color,
            },
            PaintOp::Image {
                x,
                y,
                width,
                height,
                src,
                fit,
            } => PaintOp::Image {
                x: x + dx,
                y: y + dy,
                width,
                height,
                src,
                fit,
            },
        };
        DisplayItem {
            top: self.top + dy,
            bottom: self.bottom + dy,
            op,
        }
    }

    /// The part of a rectangle inside [from, to), if any.
    fn clipped(&self, from: f32, to: f32) -> Option<DisplayItem> {
        let PaintOp::Rect {
            x,
            width,
            fill,
            stroke,
            radius,
            ..
        } = self.op.clone()
        else {
            return None;
        };
        let top = self.top.max(from);
        let bottom = self.bottom.min(to);
        if bottom - top <= EPSILON {
            return None;
        }
        let whole = top == self.top && bottom == self.bottom;
        Some(DisplayItem {
            top,
            bottom,
            op: PaintOp::Rect {
                x,
                y: top,
                width,
                height: bottom - top,
                fill,
                stroke,
                radius: if whole { radius } else { 0.0 },
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayList {
    pub width: f32,
    pub height: f32,
    pub items: Vec<DisplayItem>,
}

impl DisplayList {
    pub fn new(width: f32, height: f32) -> Self {
        DisplayList {
            width,
            height,
            items: Vec::new(),
        }
    }

    /// Flatten a placed layout tree. The list spans the root's margin box.
    pub fn from_layout(root: &LayoutBox) -> Self {
        let mut list = DisplayList::new(
            root.x + root.width + root.margin_right,
            root.y + root.height + root.margin_bottom,
        );
        emit(root, &mut list.items);
        list
    }

    pub fn push(&mut self, op: PaintOp) {
        let (top, bottom) = match &op {
            PaintOp::Rect { y, height, .. } | PaintOp::Image { y, height, .. } => (*y, y + height),
            PaintOp::Text { baseline, size, .. } => (baseline - size, *baseline),
        };
        self.items.push(DisplayItem { top, bottom, op });
    }

    /// Paint `other` over everything else, offset by (`dx`, `dy`).
    pub fn append(&mut self, other: &DisplayList, dx: f32, dy: f32) {
        self.items
            .extend(other.items.iter().map(|item| item.translated(dx, dy)));
        self.width = self.width.max(dx + other.width);
        self.height = self.height.max(dy + other.height);
    }

    /// Offsets at which the list can be cut without splitting a text line
    /// or an image, ascending, always including 0 and the full height.
    pub fn break_opportunities(&self) -> Vec<f32> {
        let solid: Vec<&DisplayItem> = self.items.iter().filter(|i| !i.splittable()).collect();

        let mut candidates = vec![0.0, self.height];
        for item in &solid {
            candidates.push(item.top.max(0.0));
            candidates.push(item.bottom.min(self.height));
        }

        let mut breaks: Vec<f32> = candidates
            .into_iter()
            .filter(|&y| {
                !solid
                    .iter()
                    .any(|item| item.top + EPSILON < y && y < item.bottom - EPSILON)
            })
            .collect();
        breaks.sort_by(f32::total_cmp);
        breaks.dedup_by(|a, b| (*a - *b).abs() <= EPSILON);
        breaks
    }

    /// The furthest cut in (`from`, `to`].
    pub fn last_break_within(&self, from: f32, to: f32) -> Option<f32> {
        self.break_opportunities()
            .into_iter()
            .filter(|&b| b > from + EPSILON && b <= to + EPSILON)
            .last()
    }

    /// The nearest cut after `from`.
    pub fn first_break_after(&self, from: f32) -> Option<f32> {
        self.break_opportunities()
            .into_iter()
            .find(|&b| b > from + EPSILON)
    }

    /// The fragment between `from` and `to`, moved up to start at 0.
    /// Text lines and images belong to the fragment they start in.
    pub fn slice(&self, from: f32, to: f32) -> DisplayList {
        let mut fragment = DisplayList::new(self.width, (to - from).max(0.0));
        for item in &self.items {
            let kept = if item.splittable() {
                item.clipped(from, to)
            } else if item.top >= from - EPSILON && item.top < to - EPSILON {
                Some(item.clone())
            } else {
                None
            };
            if let Some(kept) = kept {
                fragment.items.push(kept.translated(0.0, -from));
            }
        }
        fragment
    }

    pub fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match &item.op {
            PaintOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Where an image of intrinsic size `iw` x `ih` lands inside its box.
/// Returns (x offset, y offset, width, height) relative to the box; `Cover`
/// may exceed the box and must be clipped by the painter.
pub fn fit_image(fit: ObjectFit, box_w: f32, box_h: f32, iw: f32, ih: f32) -> (f32, f32, f32, f32) {
    if iw <= 0.0 || ih <= 0.0 || box_w <= 0.0 || box_h <= 0.0 {
        return (0.0, 0.0, box_w, box_h);
    }
    let img_aspect = iw / ih;
    let box_aspect = box_w / box_h;
    let (w, h) = match fit {
        ObjectFit::Fill => (box_w, box_h),
        ObjectFit::Contain if img_aspect > box_aspect => (box_w, box_w / img_aspect),
        ObjectFit::Contain => (box_h * img_aspect, box_h),
        ObjectFit::Cover if img_aspect > box_aspect => (box_h * img_aspect, box_h),
        ObjectFit::Cover => (box_w, box_w / img_aspect),
    };
    ((box_w - w) / 2.0, (box_h - h) / 2.0, w, h)
}

// ============================================================================
// EMIT
// ============================================================================

fn emit(layout: &LayoutBox, out: &mut Vec<DisplayItem>) {
    emit_box(layout, out);

    match layout.node.node_type {
        NodeType::Text => emit_text(layout, out),
        NodeType::Image => emit_image(layout, out),
        NodeType::Page | NodeType::View => {
            for child in &layout.children {
                emit(child, out);
            }
        }
    }
}

fn emit_box(layout: &LayoutBox, out: &mut Vec<DisplayItem>) {
    let style = &layout.node.style;
    let opacity = style.opacity();

    let fill = style
        .background_color
        .filter(|bg| bg.a > 0.0 && opacity > 0.0)
        .map(|bg| Color {
            a: bg.a * opacity,
            ..bg
        });
    let border = style.border_width();
    let stroke = (border > 0.0).then(|| (style.border_color().unwrap_or_default(), border));

    if fill.is_none() && stroke.is_none() {
        return;
    }
    if layout.width <= 0.0 || layout.height <= 0.0 {
        return;
    }

    out.push(DisplayItem {
        top: layout.y,
        bottom: layout.y + layout.height,
        op: PaintOp::Rect {
            x: layout.x,
            y: layout.y,
            width: layout.width,
            height: layout.height,
            fill,
            stroke,
            radius: style.border_radius(),
        },
    });
}

fn emit_text(layout: &LayoutBox, out: &mut Vec<DisplayItem>) {
    let size = layout.font_size();
    let line_h = layout.line_height();
    let metrics = layout.font_metrics();
    let color = layout.node.style.color.unwrap_or_default();
    let align = layout.text_align();
    let (bold, italic) = (layout.is_bold(), layout.is_italic());

    // Center the em box inside the line box, then drop to the baseline.
    let baseline_offset = (line_h - size) / 2.0 + metrics.ascent(size);

    for (i, line) in layout.lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let top = layout.y + i as f32 * line_h;
        let baseline = top + baseline_offset;
        let line_w = metrics.string_width(line, size);
        let last = i == layout.lines.len() - 1;

        let mut push = |x: f32, text: &str| {
            out.push(DisplayItem {
                top,
                bottom: top + line_h,
                op: PaintOp::Text {
                    x,
                    baseline,
                    text: text.to_string(),
                    size,
                    bold,
                    italic,
                    color,
                },
            });
        };

        match align {
            TextAlign::Left => push(layout.x, line),
            TextAlign::Center => push(layout.x + (layout.width - line_w) / 2.0, line),
            TextAlign::Right => push(layout.x + layout.width - line_w, line),
            TextAlign::Justify => {
                let words: Vec<&str> = line.split_whitespace().collect();
                if last || words.len() <= 1 {
                    push(layout.x, line);
                    continue;
                }
                let words_w: f32 = words.iter().map(|w| metrics.string_width(w, size)).sum();
                let space = (layout.width - words_w) / (words.len() - 1) as f32;
                let mut cursor_x = layout.x;
                for word in words {
                    push(cursor_x, word);
                    cursor_x += metrics.string_width(word, size) + space;
                }
            }
        }
    }
}

fn emit_image(layout: &LayoutBox, out: &mut Vec<DisplayItem>) {
    if layout.width <= 0.0 || layout.height <= 0.0 {
        return;
    }
    let top = layout.y;
    let bottom = layout.y + layout.height;

    match layout.node.src.as_deref() {
        Some(src) if layout.image_ready => out.push(DisplayItem {
            top,
            bottom,
            op: PaintOp::Image {
                x: layout.x,
                y: layout.y,
                width: layout.width,
                height: layout.height,
                src: src.to_string(),
                fit: layout.node.style.object_fit.unwrap_or_default(),
            },
        }),
        _ => out.push(DisplayItem {
            top,
            bottom,
            op: PaintOp::Rect {
                x: layout.x,
                y: layout.y,
                width: layout.width,
                height: layout.height,
                fill: Some(PLACEHOLDER_FILL),
                stroke: Some((PLACEHOLDER_STROKE, 1.0)),
                radius: 0.0,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Dimension, JsonNode, Style};
    use crate::layout_box::{layout_tree, NoImages};

    fn paragraph(lines: usize) -> DisplayList {
        let text = (0..lines)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let node = JsonNode::view(
            Style {
                background_color: Some(Color::rgb(240, 240, 255)),
                padding: Some(5.0),
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
        );
        DisplayList::from_layout(&layout_tree(&node, 300.0, &NoImages))
    }

    #[test]
    fn text_lines_become_separate_items() {
        let list = paragraph(3);
        let runs: Vec<_> = list.text_runs().collect();
        assert_eq!(runs, vec!["line 0", "line 1", "line 2"]);
        // 3 lines of 20 + 10 padding
        assert_eq!(list.height, 70.0);
    }

    #[test]
    fn breaks_fall_between_lines() {
        let list = paragraph(3);
        let breaks = list.break_opportunities();
        assert_eq!(breaks, vec![0.0, 5.0, 25.0, 45.0, 65.0, 70.0]);
        assert_eq!(list.last_break_within(0.0, 50.0), Some(45.0));
        assert_eq!(list.first_break_after(45.0), Some(65.0));
    }

    #[test]
    fn slice_keeps_lines_that_start_inside_and_clips_backgrounds() {
        let list = paragraph(3);
        let head = list.slice(0.0, 45.0);
        let tail = list.slice(45.0, 70.0);

        assert_eq!(head.text_runs().collect::<Vec<_>>(), vec!["line 0", "line 1"]);
        assert_eq!(tail.text_runs().collect::<Vec<_>>(), vec!["line 2"]);
        assert_eq!(tail.height, 25.0);

        let background = tail
            .items
            .iter()
            .find(|i| i.splittable())
            .expect("background clipped into tail");
        assert_eq!((background.top, background.bottom), (0.0, 25.0));
    }

    #[test]
    fn unloaded_images_with_explicit_size_paint_a_placeholder() {
        let node = JsonNode::image(
            "missing.png",
            Style {
                width: Some(Dimension::Px(40.0)),
                height: Some(Dimension::Px(40.0)),
                ..Style::default()
            },
        );
        let list = DisplayList::from_layout(&layout_tree(&node, 300.0, &NoImages));
        assert_eq!(list.items.len(), 1);
        assert!(matches!(&list.items[0].op, PaintOp::Rect { fill, .. } if *fill == Some(PLACEHOLDER_FILL)));
    }

    #[test]
    fn contain_letterboxes_and_cover_overflows() {
        assert_eq!(fit_image(ObjectFit::Contain, 100.0, 100.0, 200.0, 100.0), (0.0, 25.0, 100.0, 50.0));
        assert_eq!(fit_image(ObjectFit::Cover, 100.0, 100.0, 200.0, 100.0), (-50.0, 0.0, 200.0, 100.0));
        assert_eq!(fit_image(ObjectFit::Fill, 100.0, 100.0, 200.0, 100.0), (0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn append_offsets_items() {
        let mut page = DisplayList::new(300.0, 0.0);
        page.append(&paragraph(1), 0.0, 100.0);
        assert_eq!(page.height, 130.0);
        assert!(page.items.iter().all(|i| i.top >= 100.0));
    }
}
