//! Physical page geometry and the usable content budget of one page.

use serde::Deserialize;

use crate::error::PipelineError;

/// Layout pixels per millimetre in the probe viewport (72 px per inch, so
/// one layout pixel is one PDF point).
pub const PX_PER_MM: f32 = 72.0 / 25.4;

/// Physical page size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFormat {
    #[serde(alias = "width_mm")]
    pub width_mm: f32,
    #[serde(alias = "height_mm")]
    pub height_mm: f32,
}

impl PageFormat {
    pub const A4: PageFormat = PageFormat {
        width_mm: 210.0,
        height_mm: 297.0,
    };
}

impl Default for PageFormat {
    fn default() -> Self {
        PageFormat::A4
    }
}

/// Usable content area of one page, built fresh for every invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBudget {
    format: PageFormat,
    margin_mm: f32,
}

impl PageBudget {
    pub fn new(format: PageFormat, margin_mm: f32) -> Result<Self, PipelineError> {
        if !margin_mm.is_finite() || margin_mm < 0.0 {
            return Err(PipelineError::Config(format!(
                "margin must be a non-negative number of millimetres, got {margin_mm}"
            )));
        }
        if format.width_mm - 2.0 * margin_mm <= 0.0 || format.height_mm - 2.0 * margin_mm <= 0.0 {
            return Err(PipelineError::Config(format!(
                "margin {margin_mm}mm leaves no content area on a {}x{}mm page",
                format.width_mm, format.height_mm
            )));
        }
        Ok(PageBudget { format, margin_mm })
    }

    pub fn format(&self) -> PageFormat {
        self.format
    }

    pub fn margin_mm(&self) -> f32 {
        self.margin_mm
    }

    pub fn page_width_mm(&self) -> f32 {
        self.format.width_mm
    }

    pub fn page_height_mm(&self) -> f32 {
        self.format.height_mm
    }

    pub fn content_width_mm(&self) -> f32 {
        self.format.width_mm - 2.0 * self.margin_mm
    }

    pub fn content_height_mm(&self) -> f32 {
        self.format.height_mm - 2.0 * self.margin_mm
    }

    pub fn content_width_px(&self) -> f32 {
        self.content_width_mm() * PX_PER_MM
    }

    pub fn content_height_px(&self) -> f32 {
        self.content_height_mm() * PX_PER_MM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_with_ten_millimetre_margins() {
        let budget = PageBudget::new(PageFormat::A4, 10.0).unwrap();
        assert_eq!(budget.content_width_mm(), 190.0);
        assert_eq!(budget.content_height_mm(), 277.0);
        // 277mm at 72dpi
        assert!((budget.content_height_px() - 785.197).abs() < 0.01);
    }

    #[test]
    fn rejects_margins_that_consume_the_page() {
        assert!(PageBudget::new(PageFormat::A4, 105.0).is_err());
        assert!(PageBudget::new(PageFormat::A4, -1.0).is_err());
        assert!(PageBudget::new(PageFormat::A4, f32::NAN).is_err());
    }

    #[test]
    fn budget_follows_margin_changes() {
        let narrow = PageBudget::new(PageFormat::A4, 5.0).unwrap();
        let wide = PageBudget::new(PageFormat::A4, 20.0).unwrap();
        assert!(narrow.content_height_px() > wide.content_height_px());
    }
}
