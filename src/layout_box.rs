use crate::font_metrics;
use crate::layout::{
    CrossAlign, Direction, FontStyle, FontWeight, JsonNode, MainAlign, NodeType, TextAlign,
};

// ============================================================================
// IMAGE SIZES
// ============================================================================

/// Intrinsic pixel sizes of loaded images, keyed by source.
pub trait ImageSizes {
    fn intrinsic_size(&self, src: &str) -> Option<(f32, f32)>;
}

/// No image has loaded (yet).
pub struct NoImages;

impl ImageSizes for NoImages {
    fn intrinsic_size(&self, _src: &str) -> Option<(f32, f32)> {
        None
    }
}

// ============================================================================
// LAYOUT BOX
// ============================================================================

#[derive(Debug, Clone)]
pub struct LayoutBox {
    // Final computed position (top-down: y grows towards the page bottom)
    pub x: f32,
    pub y: f32,

    // Final computed size (includes padding, excludes margin)
    pub width: f32,
    pub height: f32,

    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,

    pub children: Vec<LayoutBox>,

    // The node this box was built from (children are held above)
    pub node: JsonNode,

    // For Text nodes: pre-wrapped lines
    pub lines: Vec<String>,

    // For Image nodes: whether the image resolved
    pub image_ready: bool,
}

impl LayoutBox {
    pub fn new(node: JsonNode) -> Self {
        let (mt, mr, mb, ml) = node.style.margin_trbl();

        LayoutBox {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            margin_top: mt,
            margin_right: mr,
            margin_bottom: mb,
            margin_left: ml,
            children: Vec::new(),
            node,
            lines: Vec::new(),
            image_ready: false,
        }
    }

    // --- Style accessors ---

    pub fn resolve_width(&self, parent_width: f32) -> Option<f32> {
        self.node.style.width.as_ref().map(|d| d.resolve(parent_width))
    }

    pub fn resolve_height(&self, parent_height: f32) -> Option<f32> {
        self.node.style.height.as_ref().map(|d| d.resolve(parent_height))
    }

    pub fn flex(&self) -> f32 {
        self.node.style.flex.unwrap_or(0.0)
    }

    pub fn direction(&self) -> Direction {
        self.node.style.direction.unwrap_or_default()
    }

    pub fn gap(&self) -> f32 {
        self.node.style.gap.unwrap_or(0.0)
    }

    pub fn text_align(&self) -> TextAlign {
        self.node.style.text_align.unwrap_or_default()
    }

    pub fn font_size(&self) -> f32 {
        self.node.style.font_size.unwrap_or(12.0)
    }

    pub fn is_bold(&self) -> bool {
        self.node.style.font_weight == Some(FontWeight::Bold)
    }

    pub fn is_italic(&self) -> bool {
        self.node.style.font_style == Some(FontStyle::Italic)
    }

    pub fn line_height(&self) -> f32 {
        self.font_size() * self.node.style.line_height.unwrap_or(1.4)
    }

    pub fn font_metrics(&self) -> &'static font_metrics::FontMetrics {
        font_metrics::get_metrics(self.is_bold(), self.is_italic())
    }

    /// Total outer width including margins
    pub fn outer_width(&self) -> f32 {
        self.margin_left + self.width + self.margin_right
    }

    /// Total outer height including margins
    pub fn outer_height(&self) -> f32 {
        self.margin_top + self.height + self.margin_bottom
    }
}

// ============================================================================
// BUILD LAYOUT TREE
// ============================================================================

pub fn build_layout(node: &JsonNode) -> LayoutBox {
    let mut lb = LayoutBox::new(node.shell());
    lb.children = node.children.iter().map(build_layout).collect();
    lb
}

/// Build, measure and place `node` in a viewport `width` wide with
/// unbounded height, origin at (0, 0).
pub fn layout_tree(node: &JsonNode, width: f32, images: &dyn ImageSizes) -> LayoutBox {
    let mut root = build_layout(node);
    measure_layout(&mut root, width, images);
    place_layout(&mut root, 0.0, 0.0);
    root
}

// ============================================================================
// MEASURE PASS
// ============================================================================

/// Measure a subtree given the width available to it. Height is unbounded.
pub fn measure_layout(layout: &mut LayoutBox, available_width: f32, images: &dyn ImageSizes) {
    match layout.node.node_type {
        NodeType::Text => measure_text(layout, available_width),
        NodeType::Image => measure_image(layout, available_width, images),
        NodeType::Page | NodeType::View => measure_container(layout, available_width, images),
    }
}

fn measure_text(layout: &mut LayoutBox, available_width: f32) {
    let text = layout.node.text.clone().unwrap_or_default();
    let size = layout.font_size();
    let metrics = layout.font_metrics();
    let inner = layout.resolve_width(available_width).unwrap_or(available_width);

    let natural = metrics.string_width(&text, size);
    if inner.is_finite() && inner > 0.0 && (natural > inner || text.contains('\n')) {
        layout.lines = wrap_text(&text, size, inner, metrics);
        layout.width = inner;
    } else {
        layout.lines = vec![text];
        // Aligned text needs the full line box to align within.
        let line_box = match layout.text_align() {
            TextAlign::Left => natural,
            _ if inner.is_finite() => inner.max(natural),
            _ => natural,
        };
        layout.width = layout.resolve_width(available_width).unwrap_or(line_box);
    }
    layout.height = layout.line_height() * layout.lines.len() as f32;
}

/// Greedy word wrap against real glyph advances.
pub fn wrap_text(
    text: &str,
    size: f32,
    max_width: f32,
    metrics: &font_metrics::FontMetrics,
) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let tentative = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };

            if metrics.string_width(&tentative, size) > max_width && !current.is_empty() {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = tentative;
            }
        }
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Explicit sizes win. A missing dimension comes from the intrinsic aspect
/// ratio, which is only known once the image has loaded; until then it
/// collapses to zero.
fn measure_image(layout: &mut LayoutBox, available_width: f32, images: &dyn ImageSizes) {
    let intrinsic = layout
        .node
        .src
        .as_deref()
        .and_then(|src| images.intrinsic_size(src))
        .filter(|(w, h)| *w > 0.0 && *h > 0.0);
    layout.image_ready = intrinsic.is_some();

    let explicit_w = layout.resolve_width(available_width);
    let explicit_h = layout.resolve_height(0.0);

    let (width, height) = match (explicit_w, explicit_h, intrinsic) {
        (Some(w), Some(h), _) => (w, h),
        (Some(w), None, Some((iw, ih))) => (w, w * ih / iw),
        (None, Some(h), Some((iw, ih))) => (h * iw / ih, h),
        (None, None, Some((iw, ih))) => {
            let w = iw.min(available_width);
            (w, w * ih / iw)
        }
        (Some(w), None, None) => (w, 0.0),
        (None, Some(h), None) => (0.0, h),
        (None, None, None) => (0.0, 0.0),
    };

    layout.width = width;
    layout.height = height;
}

fn measure_container(layout: &mut LayoutBox, available_width: f32, images: &dyn ImageSizes) {
    let gap = layout.gap();
    let (pad_t, pad_r, pad_b, pad_l) = layout.node.style.padding_trbl();

    let explicit_width = layout.resolve_width(available_width);
    let mut width = explicit_width.unwrap_or(available_width);
    if let Some(ref max_w) = layout.node.style.max_width {
        width = width.min(max_w.resolve(available_width));
    }
    let inner_width = (width - pad_l - pad_r).max(0.0);

    let content_h = match layout.direction() {
        Direction::Column => {
            for child in &mut layout.children {
                let w = inner_width - child.margin_left - child.margin_right;
                measure_layout(child, w.max(0.0), images);
            }
            measure_column(&layout.children, gap)
        }
        Direction::Row => {
            measure_row_children(&mut layout.children, inner_width, gap, images);
            if layout.node.style.wrap.unwrap_or(false) {
                measure_wrapping_row(&layout.children, gap, inner_width)
            } else {
                measure_row(&layout.children)
            }
        }
    };

    let mut height = layout
        .resolve_height(0.0)
        .unwrap_or(content_h + pad_t + pad_b);
    if let Some(ref min_h) = layout.node.style.min_height {
        height = height.max(min_h.resolve(0.0));
    }

    layout.width = width;
    layout.height = height;
}

/// Fixed children take their natural width first; flex children share
/// what is left.
fn measure_row_children(
    children: &mut [LayoutBox],
    inner_width: f32,
    gap: f32,
    images: &dyn ImageSizes,
) {
    let mut used = gap * children.len().saturating_sub(1) as f32;
    let mut total_flex = 0.0;

    for child in children.iter_mut() {
        if child.flex() > 0.0 {
            total_flex += child.flex();
            continue;
        }
        let w = (inner_width - child.margin_left - child.margin_right).max(0.0);
        measure_layout(child, w, images);
        if child.node.style.width.is_none() {
            shrink_to_content(child);
        }
        used += child.outer_width();
    }

    if total_flex > 0.0 {
        let free = (inner_width - used).max(0.0);
        for child in children.iter_mut().filter(|c| c.flex() > 0.0) {
            let share = free * child.flex() / total_flex;
            let w = (share - child.margin_left - child.margin_right).max(0.0);
            measure_layout(child, w, images);
            child.width = child.width.max(w);
        }
    }
}

/// Containers in a row without an explicit width hug their content.
fn shrink_to_content(layout: &mut LayoutBox) {
    if !matches!(layout.node.node_type, NodeType::Page | NodeType::View) {
        return;
    }
    if layout.direction() == Direction::Row && layout.node.style.wrap.unwrap_or(false) {
        return;
    }
    let (_, pad_r, _, pad_l) = layout.node.style.padding_trbl();
    let content = match layout.direction() {
        Direction::Column => layout
            .children
            .iter()
            .map(LayoutBox::outer_width)
            .fold(0.0, f32::max),
        Direction::Row => {
            layout.children.iter().map(LayoutBox::outer_width).sum::<f32>()
                + layout.gap() * layout.children.len().saturating_sub(1) as f32
        }
    };
    layout.width = layout.width.min(content + pad_l + pad_r);
}

fn measure_column(children: &[LayoutBox], gap: f32) -> f32 {
    let total: f32 = children.iter().map(LayoutBox::outer_height).sum();
    total + gap * children.len().saturating_sub(1) as f32
}

fn measure_row(children: &[LayoutBox]) -> f32 {
    children
        .iter()
        .map(LayoutBox::outer_height)
        .fold(0.0, f32::max)
}

fn measure_wrapping_row(children: &[LayoutBox], gap: f32, max_width: f32) -> f32 {
    let lines = wrap_row_lines(children, gap, max_width);
    let total: f32 = lines.iter().map(|line| line_height(children, line)).sum();
    total + gap * lines.len().saturating_sub(1) as f32
}

/// Group row children into lines that fit `max_width`.
fn wrap_row_lines(children: &[LayoutBox], gap: f32, max_width: f32) -> Vec<Vec<usize>> {
    let mut lines: Vec<Vec<usize>> = Vec::new();
    let mut line_w = 0.0;

    for (i, child) in children.iter().enumerate() {
        let cw = child.outer_width();
        match lines.last_mut() {
            Some(line) if line_w + gap + cw <= max_width => {
                line.push(i);
                line_w += gap + cw;
            }
            _ => {
                lines.push(vec![i]);
                line_w = cw;
            }
        }
    }
    lines
}

fn line_height(children: &[LayoutBox], line: &[usize]) -> f32 {
    line.iter()
        .map(|&i| children[i].outer_height())
        .fold(0.0, f32::max)
}

// ============================================================================
// PLACE PASS
// ============================================================================

/// Position a measured subtree with its margin box at (`x`, `y`).
pub fn place_layout(layout: &mut LayoutBox, x: f32, y: f32) {
    layout.x = x + layout.margin_left;
    layout.y = y + layout.margin_top;

    if matches!(layout.node.node_type, NodeType::Page | NodeType::View) {
        place_container(layout);
    }
}

fn place_container(layout: &mut LayoutBox) {
    let gap = layout.gap();
    let (pad_t, pad_r, pad_b, pad_l) = layout.node.style.padding_trbl();
    let main_align = layout.node.style.main_align.unwrap_or_default();
    let cross_align = layout.node.style.cross_align.unwrap_or_default();

    let inner = Inner {
        x: layout.x + pad_l,
        y: layout.y + pad_t,
        w: layout.width - pad_l - pad_r,
        h: layout.height - pad_t - pad_b,
    };

    match layout.direction() {
        Direction::Column => place_column(&mut layout.children, inner, gap, main_align, cross_align),
        Direction::Row if layout.node.style.wrap.unwrap_or(false) => {
            place_wrapping_row(&mut layout.children, inner, gap, main_align, cross_align)
        }
        Direction::Row => place_row(&mut layout.children, inner, gap, main_align, cross_align),
    }
}

#[derive(Debug, Clone, Copy)]
struct Inner {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

/// Leading offset and spacing for the main axis.
fn main_axis_start(main_align: MainAlign, free: f32, n: usize, gap: f32) -> (f32, f32) {
    match main_align {
        MainAlign::Start => (0.0, gap),
        MainAlign::Center => (free / 2.0, gap),
        MainAlign::End => (free, gap),
        MainAlign::SpaceBetween if n > 1 => (0.0, gap + free / (n as f32 - 1.0)),
        MainAlign::SpaceBetween => (0.0, gap),
    }
}

fn place_column(
    children: &mut [LayoutBox],
    inner: Inner,
    gap: f32,
    main_align: MainAlign,
    cross_align: CrossAlign,
) {
    if children.is_empty() {
        return;
    }
    let n = children.len();
    let free = (inner.h - measure_column(children, gap)).max(0.0);
    let (offset, spacing) = main_axis_start(main_align, free, n, gap);

    let mut cursor_y = inner.y + offset;
    for child in children.iter_mut() {
        let child_x = match cross_align {
            CrossAlign::Start => inner.x,
            CrossAlign::Center => inner.x + (inner.w - child.outer_width()) / 2.0,
            CrossAlign::End => inner.x + inner.w - child.outer_width(),
            CrossAlign::Stretch => {
                child.width = inner.w - child.margin_left - child.margin_right;
                inner.x
            }
        };
        place_layout(child, child_x, cursor_y);
        cursor_y += child.outer_height() + spacing;
    }
}

fn place_row(
    children: &mut [LayoutBox],
    inner: Inner,
    gap: f32,
    main_align: MainAlign,
    cross_align: CrossAlign,
) {
    if children.is_empty() {
        return;
    }
    let n = children.len();
    let total_w: f32 = children.iter().map(LayoutBox::outer_width).sum::<f32>()
        + gap * n.saturating_sub(1) as f32;
    let free = (inner.w - total_w).max(0.0);
    let (offset, spacing) = main_axis_start(main_align, free, n, gap);
    let row_h = measure_row(children);

    let mut cursor_x = inner.x + offset;
    for child in children.iter_mut() {
        place_in_line(child, cursor_x, inner.y, row_h, cross_align);
        cursor_x += child.outer_width() + spacing;
    }
}

fn place_wrapping_row(
    children: &mut [LayoutBox],
    inner: Inner,
    gap: f32,
    main_align: MainAlign,
    cross_align: CrossAlign,
) {
    let lines = wrap_row_lines(children, gap, inner.w);
    let mut cursor_y = inner.y;

    for line in &lines {
        let n = line.len();
        let line_w: f32 = line.iter().map(|&i| children[i].outer_width()).sum::<f32>()
            + gap * n.saturating_sub(1) as f32;
        let line_h = line_height(children, line);
        let (offset, spacing) = main_axis_start(main_align, (inner.w - line_w).max(0.0), n, gap);

        let mut cursor_x = inner.x + offset;
        for &i in line {
            let child = &mut children[i];
            place_in_line(child, cursor_x, cursor_y, line_h, cross_align);
            cursor_x += child.outer_width() + spacing;
        }
        cursor_y += line_h + gap;
    }
}

fn place_in_line(child: &mut LayoutBox, x: f32, y: f32, line_h: f32, cross_align: CrossAlign) {
    let child_y = match cross_align {
        CrossAlign::Start => y,
        CrossAlign::Center => y + (line_h - child.outer_height()) / 2.0,
        CrossAlign::End => y + line_h - child.outer_height(),
        CrossAlign::Stretch => {
            child.height = line_h - child.margin_top - child.margin_bottom;
            y
        }
    };
    place_layout(child, x, child_y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Dimension, Style};

    struct Sizes(f32, f32);

    impl ImageSizes for Sizes {
        fn intrinsic_size(&self, _src: &str) -> Option<(f32, f32)> {
            Some((self.0, self.1))
        }
    }

    fn text(s: &str, size: f32) -> JsonNode {
        JsonNode::text(
            s,
            Style {
                font_size: Some(size),
                line_height: Some(1.5),
                ..Style::default()
            },
        )
    }

    #[test]
    fn long_text_wraps_to_available_width() {
        let words = "lorem ipsum dolor sit amet ".repeat(20);
        let root = layout_tree(&text(&words, 10.0), 200.0, &NoImages);
        assert!(root.lines.len() > 1);
        assert_eq!(root.width, 200.0);
        assert_eq!(root.height, 15.0 * root.lines.len() as f32);
        for line in &root.lines {
            assert!(root.font_metrics().string_width(line, 10.0) <= 200.0);
        }
    }

    #[test]
    fn column_height_includes_gaps_padding_and_margins() {
        let mut child = text("a", 10.0);
        child.style.margin_top = Some(4.0);
        child.style.margin_bottom = Some(6.0);
        let root = JsonNode::view(
            Style {
                padding: Some(5.0),
                gap: Some(2.0),
                ..Style::default()
            },
            vec![child.clone(), child],
        );
        let laid = layout_tree(&root, 300.0, &NoImages);
        // 2 * (4 + 15 + 6) + 2 + 10
        assert_eq!(laid.height, 62.0);
        assert_eq!(laid.children[0].y, 5.0 + 4.0);
        assert_eq!(laid.children[1].y, 5.0 + 25.0 + 2.0 + 4.0);
    }

    #[test]
    fn image_height_waits_for_intrinsic_size() {
        let photo = JsonNode::image(
            "photo.png",
            Style {
                width: Some(Dimension::Px(80.0)),
                ..Style::default()
            },
        );
        let before = layout_tree(&photo, 500.0, &NoImages);
        assert_eq!(before.height, 0.0);
        assert!(!before.image_ready);

        let after = layout_tree(&photo, 500.0, &Sizes(400.0, 500.0));
        assert_eq!(after.height, 100.0);
        assert!(after.image_ready);
    }

    #[test]
    fn flex_child_takes_remaining_row_width() {
        let mut title = text("Senior Engineer at a company with a long name", 10.0);
        title.style.flex = Some(1.0);
        let date = text("2020 - 2024", 10.0);
        let row = JsonNode::view(
            Style {
                direction: Some(Direction::Row),
                ..Style::default()
            },
            vec![title, date],
        );
        let laid = layout_tree(&row, 300.0, &NoImages);
        let date_box = &laid.children[1];
        assert!((laid.children[0].width + date_box.width - 300.0).abs() < 0.01);
        assert!((date_box.x + date_box.width - 300.0).abs() < 0.01);
    }

    #[test]
    fn wrapping_row_breaks_into_lines() {
        let badge = |s: &str| {
            JsonNode::view(
                Style {
                    padding: Some(4.0),
                    ..Style::default()
                },
                vec![text(s, 10.0)],
            )
        };
        let children: Vec<_> = (0..12).map(|i| badge(&format!("Skill number {i}"))).collect();
        let row = JsonNode::view(
            Style {
                direction: Some(Direction::Row),
                wrap: Some(true),
                gap: Some(4.0),
                ..Style::default()
            },
            children,
        );
        let laid = layout_tree(&row, 200.0, &NoImages);
        // badge height 15 + 8 padding
        assert!(laid.height > 23.0);
        assert!(laid.children[0].width < 100.0);
        assert_eq!(laid.children[1].y, laid.children[0].y);
        let last = laid.children.last().unwrap();
        assert!(last.y > laid.children[0].y);
        assert!(laid.children.iter().all(|c| c.x + c.width <= 200.0 + 0.01));
    }
}
