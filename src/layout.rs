use serde::Deserialize;

use crate::blocks::BlockKind;

// ============================================================================
// NODE TYPES
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Page,
    View,
    Text,
    Image,
}

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFit {
    /// Scale to fill the container, cropping the overflow
    Cover,
    /// Scale to fit entirely within the container
    #[default]
    Contain,
    /// Stretch to the container (distorts aspect ratio)
    Fill,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Row,
    #[default]
    Column,
}

/// Main-axis alignment (justify-content)
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MainAlign {
    #[default]
    Start,
    Center,
    End,
    SpaceBetween,
}

/// Cross-axis alignment (align-items)
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrossAlign {
    #[default]
    Start,
    Center,
    End,
    Stretch,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    Normal,
    Italic,
}

// ============================================================================
// DIMENSION
// ============================================================================

/// A length in layout pixels or a percentage of the parent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawDimension")]
pub enum Dimension {
    Px(f32),
    Percent(f32),
}

impl Dimension {
    pub fn resolve(&self, parent_size: f32) -> f32 {
        match self {
            Dimension::Px(v) => *v,
            Dimension::Percent(p) => parent_size * p / 100.0,
        }
    }
}

/// Wire form: `120`, `"120"` or `"50%"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDimension {
    Number(f32),
    Text(String),
}

impl TryFrom<RawDimension> for Dimension {
    type Error = String;

    fn try_from(raw: RawDimension) -> Result<Self, Self::Error> {
        match raw {
            RawDimension::Number(v) => Ok(Dimension::Px(v)),
            RawDimension::Text(s) => {
                let trimmed = s.trim();
                if let Some(pct) = trimmed.strip_suffix('%') {
                    pct.trim()
                        .parse()
                        .map(Dimension::Percent)
                        .map_err(|_| format!("invalid percentage: {s}"))
                } else {
                    trimmed
                        .trim_end_matches("px")
                        .parse()
                        .map(Dimension::Px)
                        .map_err(|_| format!("invalid dimension: {s}"))
                }
            }
        }
    }
}

// ============================================================================
// COLOR
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "default_alpha")]
    pub a: f32,
}

fn default_alpha() -> f32 {
    1.0
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 1.0 }
    }

    pub const fn black() -> Self {
        Color::rgb(0, 0, 0)
    }

    pub const fn white() -> Self {
        Color::rgb(255, 255, 255)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::black()
    }
}

// ============================================================================
// BORDER
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct Border {
    pub width: Option<f32>,
    pub color: Option<Color>,
    pub radius: Option<f32>,
}

// ============================================================================
// STYLE
// ============================================================================

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Style {
    // --- Dimensions (layout pixels or percentage like "50%") ---
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    #[serde(alias = "minHeight")]
    pub min_height: Option<Dimension>,
    #[serde(alias = "maxWidth")]
    pub max_width: Option<Dimension>,

    // --- Flex / Layout ---
    pub direction: Option<Direction>,
    pub wrap: Option<bool>,
    #[serde(alias = "mainAlign")]
    pub main_align: Option<MainAlign>,
    #[serde(alias = "crossAlign")]
    pub cross_align: Option<CrossAlign>,
    pub gap: Option<f32>,
    /// flex-grow along the main axis
    pub flex: Option<f32>,

    // --- Padding (inside) ---
    pub padding: Option<f32>,
    #[serde(alias = "paddingTop")]
    pub padding_top: Option<f32>,
    #[serde(alias = "paddingRight")]
    pub padding_right: Option<f32>,
    #[serde(alias = "paddingBottom")]
    pub padding_bottom: Option<f32>,
    #[serde(alias = "paddingLeft")]
    pub padding_left: Option<f32>,

    // --- Margin (outside) ---
    pub margin: Option<f32>,
    #[serde(alias = "marginTop")]
    pub margin_top: Option<f32>,
    #[serde(alias = "marginRight")]
    pub margin_right: Option<f32>,
    #[serde(alias = "marginBottom")]
    pub margin_bottom: Option<f32>,
    #[serde(alias = "marginLeft")]
    pub margin_left: Option<f32>,

    // --- Background / border ---
    #[serde(alias = "backgroundColor")]
    pub background_color: Option<Color>,
    pub opacity: Option<f32>,
    pub border: Option<Border>,
    #[serde(alias = "borderWidth")]
    pub border_width: Option<f32>,
    #[serde(alias = "borderColor")]
    pub border_color: Option<Color>,
    #[serde(alias = "borderRadius")]
    pub border_radius: Option<f32>,

    // --- Text ---
    #[serde(alias = "textAlign")]
    pub text_align: Option<TextAlign>,
    pub color: Option<Color>,
    #[serde(alias = "fontSize")]
    pub font_size: Option<f32>,
    #[serde(alias = "fontWeight")]
    pub font_weight: Option<FontWeight>,
    #[serde(alias = "fontStyle")]
    pub font_style: Option<FontStyle>,
    #[serde(alias = "lineHeight")]
    pub line_height: Option<f32>,

    // --- Image ---
    #[serde(alias = "objectFit")]
    pub object_fit: Option<ObjectFit>,
}

impl Style {
    /// Padding as (top, right, bottom, left)
    pub fn padding_trbl(&self) -> (f32, f32, f32, f32) {
        let base = self.padding.unwrap_or(0.0);
        (
            self.padding_top.unwrap_or(base),
            self.padding_right.unwrap_or(base),
            self.padding_bottom.unwrap_or(base),
            self.padding_left.unwrap_or(base),
        )
    }

    /// Margin as (top, right, bottom, left)
    pub fn margin_trbl(&self) -> (f32, f32, f32, f32) {
        let base = self.margin.unwrap_or(0.0);
        (
            self.margin_top.unwrap_or(base),
            self.margin_right.unwrap_or(base),
            self.margin_bottom.unwrap_or(base),
            self.margin_left.unwrap_or(base),
        )
    }

    pub fn border_width(&self) -> f32 {
        self.border_width
            .or_else(|| self.border.and_then(|b| b.width))
            .unwrap_or(0.0)
    }

    pub fn border_color(&self) -> Option<Color> {
        self.border_color.or_else(|| self.border.and_then(|b| b.color))
    }

    pub fn border_radius(&self) -> f32 {
        self.border_radius
            .or_else(|| self.border.and_then(|b| b.radius))
            .unwrap_or(0.0)
    }

    pub fn opacity(&self) -> f32 {
        self.opacity.unwrap_or(1.0).clamp(0.0, 1.0)
    }
}

// ============================================================================
// JSON NODE
// ============================================================================

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct JsonNode {
    #[serde(rename = "type")]
    pub node_type: NodeType,

    #[serde(default)]
    pub style: Style,

    #[serde(default)]
    pub children: Vec<JsonNode>,

    pub text: Option<String>,

    // Image source: data URL, http(s) URL, or a local path under the asset dir
    pub src: Option<String>,

    // Content block annotation; unannotated trees are opaque
    pub block: Option<BlockKind>,
    pub atomic: Option<bool>,
    #[serde(alias = "estimatedHeight")]
    pub estimated_height: Option<f32>,
}

impl JsonNode {
    fn new(node_type: NodeType, style: Style) -> Self {
        JsonNode {
            node_type,
            style,
            children: Vec::new(),
            text: None,
            src: None,
            block: None,
            atomic: None,
            estimated_height: None,
        }
    }

    pub fn page(style: Style, children: Vec<JsonNode>) -> Self {
        JsonNode {
            children,
            ..JsonNode::new(NodeType::Page, style)
        }
    }

    pub fn view(style: Style, children: Vec<JsonNode>) -> Self {
        JsonNode {
            children,
            ..JsonNode::new(NodeType::View, style)
        }
    }

    pub fn text(text: impl Into<String>, style: Style) -> Self {
        JsonNode {
            text: Some(text.into()),
            ..JsonNode::new(NodeType::Text, style)
        }
    }

    pub fn image(src: impl Into<String>, style: Style) -> Self {
        JsonNode {
            src: Some(src.into()),
            ..JsonNode::new(NodeType::Image, style)
        }
    }

    /// Mark this node as a content block.
    pub fn with_block(mut self, kind: BlockKind) -> Self {
        self.block = Some(kind);
        self
    }

    /// Same node without its children.
    pub fn shell(&self) -> JsonNode {
        JsonNode {
            children: Vec::new(),
            ..self.clone()
        }
    }

    pub fn is_content(&self) -> bool {
        matches!(self.node_type, NodeType::Text | NodeType::Image)
    }

    /// Visit every image source in document order.
    pub fn image_sources<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.node_type == NodeType::Image {
            if let Some(src) = self.src.as_deref().filter(|s| !s.is_empty()) {
                out.push(src);
            }
        }
        for child in &self.children {
            child.image_sources(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_accept_numbers_and_percentages() {
        let style: Style =
            serde_json::from_str(r#"{"width": "50%", "height": 20, "maxWidth": "120px"}"#).unwrap();
        assert_eq!(style.width, Some(Dimension::Percent(50.0)));
        assert_eq!(style.height, Some(Dimension::Px(20.0)));
        assert_eq!(style.max_width, Some(Dimension::Px(120.0)));
        assert_eq!(Dimension::Percent(50.0).resolve(300.0), 150.0);
    }

    #[test]
    fn rejects_garbage_dimensions() {
        assert!(serde_json::from_str::<Style>(r#"{"width": "wide"}"#).is_err());
    }

    #[test]
    fn nodes_parse_block_annotations() {
        let node: JsonNode = serde_json::from_str(
            r#"{"type": "view", "block": "badgeGroup", "estimatedHeight": 40,
                "children": [{"type": "text", "text": "Rust"}]}"#,
        )
        .unwrap();
        assert_eq!(node.block, Some(BlockKind::BadgeGroup));
        assert_eq!(node.estimated_height, Some(40.0));
        assert_eq!(node.children[0].text.as_deref(), Some("Rust"));
    }

    #[test]
    fn collects_image_sources_in_order() {
        let tree = JsonNode::view(
            Style::default(),
            vec![
                JsonNode::image("a.png", Style::default()),
                JsonNode::view(Style::default(), vec![JsonNode::image("b.png", Style::default())]),
                JsonNode::image("", Style::default()),
            ],
        );
        let mut sources = Vec::new();
        tree.image_sources(&mut sources);
        assert_eq!(sources, vec!["a.png", "b.png"]);
    }
}
