//! Visual templates: turn [`DocumentData`] into an annotated node tree.
//!
//! Every top-level unit carries a block annotation so the pipeline can
//! paginate on record boundaries. Spacing between units is expressed as a
//! bottom margin on each block, so measured heights add up to the true
//! rendered distance.

use serde::Deserialize;

use crate::blocks::BlockKind;
use crate::document::{DocumentData, EducationEntry, ExperienceEntry};
use crate::layout::{
    Color, CrossAlign, Dimension, Direction, FontStyle, FontWeight, JsonNode, MainAlign, Style,
    TextAlign,
};

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    #[default]
    Classic,
    Modern,
    Compact,
}

/// Colours and sizes that distinguish the templates.
#[derive(Debug, Clone, Copy)]
struct Theme {
    accent: Color,
    text: Color,
    muted: Color,
    name_size: f32,
    heading_size: f32,
    body_size: f32,
    /// Vertical space after every block.
    spacing: f32,
    /// Filled header band (modern) instead of a plain header.
    header_band: Option<Color>,
    heading_rule: bool,
    badge_fill: Color,
    photo_width: f32,
}

impl Template {
    fn theme(self) -> Theme {
        match self {
            Template::Classic => Theme {
                accent: Color::rgb(31, 41, 55),
                text: Color::rgb(17, 24, 39),
                muted: Color::rgb(107, 114, 128),
                name_size: 24.0,
                heading_size: 13.0,
                body_size: 10.0,
                spacing: 10.0,
                header_band: None,
                heading_rule: true,
                badge_fill: Color::rgb(243, 244, 246),
                photo_width: 72.0,
            },
            Template::Modern => Theme {
                accent: Color::rgb(37, 99, 235),
                text: Color::rgb(30, 41, 59),
                muted: Color::rgb(100, 116, 139),
                name_size: 26.0,
                heading_size: 14.0,
                body_size: 10.0,
                spacing: 12.0,
                header_band: Some(Color::rgb(37, 99, 235)),
                heading_rule: false,
                badge_fill: Color::rgb(219, 234, 254),
                photo_width: 80.0,
            },
            Template::Compact => Theme {
                accent: Color::rgb(15, 118, 110),
                text: Color::rgb(17, 24, 39),
                muted: Color::rgb(82, 82, 91),
                name_size: 18.0,
                heading_size: 11.0,
                body_size: 8.5,
                spacing: 6.0,
                header_band: None,
                heading_rule: true,
                badge_fill: Color::rgb(240, 253, 250),
                photo_width: 56.0,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Template::Classic => "classic",
            Template::Modern => "modern",
            Template::Compact => "compact",
        }
    }

    /// Render `doc` into an annotated page tree.
    pub fn render(self, doc: &DocumentData) -> JsonNode {
        let theme = self.theme();
        let mut blocks = vec![header(doc, &theme)];

        if let Some(summary) = doc.personal_info.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            blocks.push(heading("Profile", &theme));
            blocks.push(
                JsonNode::text(summary, body(&theme, theme.text))
                    .with_block(BlockKind::Paragraph)
                    .spaced(theme.spacing),
            );
        }

        if !doc.experience.is_empty() {
            blocks.push(heading("Experience", &theme));
            blocks.extend(doc.experience.iter().map(|e| experience(e, &theme)));
        }

        if !doc.education.is_empty() {
            blocks.push(heading("Education", &theme));
            blocks.extend(doc.education.iter().map(|e| education(e, &theme)));
        }

        if !doc.skills.is_empty() {
            blocks.push(heading("Skills", &theme));
            let labels = doc.skills.iter().map(|s| match s.level.as_deref() {
                Some(level) if !level.is_empty() => format!("{} ({level})", s.name),
                _ => s.name.clone(),
            });
            blocks.push(badges(labels, &theme));
        }

        if !doc.languages.is_empty() {
            blocks.push(heading("Languages", &theme));
            let labels = doc.languages.iter().map(|l| match l.proficiency.as_deref() {
                Some(p) if !p.is_empty() => format!("{} - {p}", l.name),
                _ => l.name.clone(),
            });
            blocks.push(badges(labels, &theme));
        }

        JsonNode::page(
            Style {
                background_color: Some(Color::white()),
                color: Some(theme.text),
                ..Style::default()
            },
            blocks,
        )
    }
}

trait Spaced {
    fn spaced(self, bottom: f32) -> Self;
}

impl Spaced for JsonNode {
    fn spaced(mut self, bottom: f32) -> Self {
        self.style.margin_bottom = Some(bottom);
        self
    }
}

fn body(theme: &Theme, color: Color) -> Style {
    Style {
        font_size: Some(theme.body_size),
        color: Some(color),
        line_height: Some(1.4),
        ..Style::default()
    }
}

fn bold(size: f32, color: Color) -> Style {
    Style {
        font_size: Some(size),
        font_weight: Some(FontWeight::Bold),
        color: Some(color),
        line_height: Some(1.25),
        ..Style::default()
    }
}

fn header(doc: &DocumentData, theme: &Theme) -> JsonNode {
    let info = &doc.personal_info;
    let on_band = theme.header_band.map(|_| Color::white());

    let mut lines = vec![JsonNode::text(
        info.full_name.as_str(),
        bold(theme.name_size, on_band.unwrap_or(theme.accent)),
    )];
    if let Some(title) = info.title.as_deref().filter(|t| !t.is_empty()) {
        lines.push(JsonNode::text(
            title,
            Style {
                font_size: Some(theme.body_size + 2.0),
                ..body(theme, on_band.unwrap_or(theme.muted))
            },
        ));
    }

    let contacts: Vec<&str> = [&info.email, &info.phone, &info.location, &info.website]
        .into_iter()
        .filter_map(|c| c.as_deref())
        .filter(|c| !c.is_empty())
        .collect();
    if !contacts.is_empty() {
        lines.push(JsonNode::text(
            contacts.join("  |  "),
            body(theme, on_band.unwrap_or(theme.muted)),
        ));
    }

    let mut details = JsonNode::view(
        Style {
            gap: Some(3.0),
            ..Style::default()
        },
        lines,
    );
    details.style.flex = Some(1.0);

    let mut columns = vec![details];
    if let Some(photo) = info.photo.as_deref().filter(|p| !p.is_empty()) {
        // Height follows the photo's aspect ratio once it has loaded.
        columns.push(JsonNode::image(
            photo,
            Style {
                width: Some(Dimension::Px(theme.photo_width)),
                margin_left: Some(12.0),
                ..Style::default()
            },
        ));
    }

    JsonNode::view(
        Style {
            direction: Some(Direction::Row),
            cross_align: Some(CrossAlign::Center),
            background_color: theme.header_band,
            padding: theme.header_band.map(|_| 16.0),
            border_radius: theme.header_band.map(|_| 4.0),
            ..Style::default()
        },
        columns,
    )
    .with_block(BlockKind::Record)
    .spaced(theme.spacing * 1.5)
}

fn heading(label: &str, theme: &Theme) -> JsonNode {
    let mut children = vec![JsonNode::text(
        label.to_uppercase(),
        bold(theme.heading_size, theme.accent),
    )];
    if theme.heading_rule {
        children.push(JsonNode::view(
            Style {
                height: Some(Dimension::Px(1.0)),
                background_color: Some(theme.accent),
                margin_top: Some(2.0),
                ..Style::default()
            },
            Vec::new(),
        ));
    }
    JsonNode::view(Style::default(), children)
        .with_block(BlockKind::Heading)
        .spaced(theme.spacing / 2.0)
}

/// A title row with the period pushed to the right edge.
fn title_row(title: &str, period: Option<String>, theme: &Theme) -> JsonNode {
    let mut title = JsonNode::text(title, bold(theme.body_size + 1.0, theme.text));
    title.style.flex = Some(1.0);

    let mut children = vec![title];
    if let Some(period) = period {
        children.push(JsonNode::text(
            period,
            Style {
                text_align: Some(TextAlign::Right),
                margin_left: Some(8.0),
                ..body(theme, theme.muted)
            },
        ));
    }
    JsonNode::view(
        Style {
            direction: Some(Direction::Row),
            main_align: Some(MainAlign::SpaceBetween),
            ..Style::default()
        },
        children,
    )
}

fn subtitle(parts: &[Option<&str>], theme: &Theme) -> Option<JsonNode> {
    let parts: Vec<&str> = parts.iter().flatten().copied().filter(|p| !p.is_empty()).collect();
    (!parts.is_empty()).then(|| {
        JsonNode::text(
            parts.join(" | "),
            Style {
                font_style: Some(FontStyle::Italic),
                ..body(theme, theme.muted)
            },
        )
    })
}

fn experience(entry: &ExperienceEntry, theme: &Theme) -> JsonNode {
    let mut children = vec![title_row(&entry.position, entry.period(), theme)];
    children.extend(subtitle(
        &[Some(entry.company.as_str()), entry.location.as_deref()],
        theme,
    ));
    if let Some(description) = entry.description.as_deref().filter(|d| !d.is_empty()) {
        children.push(JsonNode::text(description, body(theme, theme.text)));
    }
    for highlight in &entry.highlights {
        let mut item = JsonNode::text(format!("- {highlight}"), body(theme, theme.text));
        item.style.margin_left = Some(8.0);
        children.push(item);
    }

    JsonNode::view(
        Style {
            gap: Some(2.0),
            ..Style::default()
        },
        children,
    )
    .with_block(BlockKind::Record)
    .spaced(theme.spacing)
}

fn education(entry: &EducationEntry, theme: &Theme) -> JsonNode {
    let mut children = vec![title_row(&entry.degree, entry.period(), theme)];
    children.extend(subtitle(
        &[Some(entry.institution.as_str()), entry.field.as_deref()],
        theme,
    ));
    if let Some(description) = entry.description.as_deref().filter(|d| !d.is_empty()) {
        children.push(JsonNode::text(description, body(theme, theme.text)));
    }

    JsonNode::view(
        Style {
            gap: Some(2.0),
            ..Style::default()
        },
        children,
    )
    .with_block(BlockKind::Record)
    .spaced(theme.spacing)
}

fn badges(labels: impl Iterator<Item = String>, theme: &Theme) -> JsonNode {
    let chips = labels
        .map(|label| {
            JsonNode::view(
                Style {
                    background_color: Some(theme.badge_fill),
                    border_radius: Some(3.0),
                    padding_top: Some(2.0),
                    padding_bottom: Some(2.0),
                    padding_left: Some(6.0),
                    padding_right: Some(6.0),
                    ..Style::default()
                },
                vec![JsonNode::text(label, body(theme, theme.text))],
            )
        })
        .collect();

    JsonNode::view(
        Style {
            direction: Some(Direction::Row),
            wrap: Some(true),
            gap: Some(4.0),
            ..Style::default()
        },
        chips,
    )
    .with_block(BlockKind::BadgeGroup)
    .spaced(theme.spacing)
}
