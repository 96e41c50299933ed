//! Font metrics for text measurement.
//!
//! Advance widths of the builtin Helvetica faces, taken from the Adobe Font
//! Metrics files, for every character of the WinAnsi encoding the PDF
//! writer declares. Widths are in 1/1000 of the em square. The PDF writer uses
//! the same faces, so layout measured here matches the vector output; the
//! rasterizer uses a metric-compatible system face.

/// First code covered by the width tables (space).
const FIRST_CODE: u8 = 0x20;

// Indexed by WinAnsi code minus 0x20, through 0xFF. Codes WinAnsi leaves
// undefined carry the bullet width and are never looked up.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 224] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 350,
    556, 350, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 350, 611, 350,
    350, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 350, 500, 667,
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 224] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, 350,
    556, 350, 278, 556, 500, 1000, 556, 556, 333, 1000, 667, 333, 1000, 350, 611, 350,
    350, 278, 278, 500, 500, 350, 556, 1000, 333, 1000, 556, 333, 944, 350, 500, 667,
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278,
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556,
];

/// The WinAnsi code for `c`, if the builtin encoding has one.
pub fn winansi_code(c: char) -> Option<u8> {
    let code = match c {
        ' '..='~' | '\u{00A0}'..='\u{00FF}' => c as u32 as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(code)
}

/// Metrics for one face of the builtin family.
#[derive(Debug)]
pub struct FontMetrics {
    widths: &'static [u16; 224],
    /// Width used for anything the builtin encoding cannot show.
    default_width: u16,
    pub units_per_em: u16,
    pub ascender: i16,
}

impl FontMetrics {
    /// Advance width of `c` in em units.
    pub fn char_width(&self, c: char) -> u16 {
        match winansi_code(c) {
            Some(code) => self.widths[(code - FIRST_CODE) as usize],
            None => self.default_width,
        }
    }

    /// Width of `text` set at `font_size`, in layout pixels.
    pub fn string_width(&self, text: &str, font_size: f32) -> f32 {
        let units: u32 = text.chars().map(|c| self.char_width(c) as u32).sum();
        units as f32 / self.units_per_em as f32 * font_size
    }

    /// Distance from the top of the em box to the baseline at `font_size`.
    pub fn ascent(&self, font_size: f32) -> f32 {
        self.ascender as f32 / self.units_per_em as f32 * font_size
    }
}

static HELVETICA: FontMetrics = FontMetrics {
    widths: &HELVETICA_WIDTHS,
    default_width: 556,
    units_per_em: 1000,
    ascender: 718,
};

static HELVETICA_BOLD: FontMetrics = FontMetrics {
    widths: &HELVETICA_BOLD_WIDTHS,
    default_width: 556,
    units_per_em: 1000,
    ascender: 718,
};

/// Metrics for a face. Oblique faces share the upright widths.
pub fn get_metrics(bold: bool, _italic: bool) -> &'static FontMetrics {
    if bold {
        &HELVETICA_BOLD
    } else {
        &HELVETICA
    }
}
