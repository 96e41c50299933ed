//! Per-invocation render configuration and process-level server settings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::budget::{PageBudget, PageFormat, PX_PER_MM};
use crate::error::PipelineError;

// ============================================================================
// RENDER CONFIG
// ============================================================================

/// Every tunable of one pipeline invocation. Passed explicitly; never global.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Physical page size (A4 by default).
    pub page: PageFormat,
    /// Margin on all four sides, in millimetres. Default 10.
    pub margin_mm: f32,
    /// Device pixels per layout pixel when rasterizing. Default 2.0.
    pub scale: f32,
    /// JPEG quality in (0, 1]. 1.0 embeds raw lossless pixels. Default 0.92.
    pub quality: f32,
    /// Vertical overlap between consecutive blind slices, in millimetres. Default 5.
    pub slice_overlap_mm: f32,
    /// Upper bound for loading any single embedded image. Default 5s.
    pub resource_timeout: Duration,
    /// Root that local image paths must resolve inside. Local paths are
    /// refused when unset. Default unset.
    pub asset_dir: Option<PathBuf>,
    /// Fall back to blind slicing when block measurement fails. Default true.
    pub fallback_to_blind_slice: bool,
    /// Name offered for the download. Default "document.pdf".
    pub file_name: String,
    /// Return the PDF in memory instead of as a download. Default false.
    pub return_blob: bool,
    /// PDF document title.
    pub title: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            page: PageFormat::A4,
            margin_mm: 10.0,
            scale: 2.0,
            quality: 0.92,
            slice_overlap_mm: 5.0,
            resource_timeout: Duration::from_secs(5),
            asset_dir: None,
            fallback_to_blind_slice: true,
            file_name: "document.pdf".to_string(),
            return_blob: false,
            title: "Document".to_string(),
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.scale.is_finite() && self.scale > 0.0 && self.scale <= 8.0) {
            return Err(PipelineError::Config(format!(
                "scale must be in (0, 8], got {}",
                self.scale
            )));
        }
        if !(self.quality.is_finite() && self.quality > 0.0 && self.quality <= 1.0) {
            return Err(PipelineError::Config(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        if self.resource_timeout.is_zero() {
            return Err(PipelineError::Config("resource timeout must be positive".into()));
        }
        if self.file_name.trim().is_empty() {
            return Err(PipelineError::Config("file name must not be empty".into()));
        }

        let budget = self.budget()?;
        if !self.slice_overlap_mm.is_finite()
            || self.slice_overlap_mm < 0.0
            || self.slice_overlap_mm >= budget.content_height_mm()
        {
            return Err(PipelineError::Config(format!(
                "slice overlap must be in [0, {}) mm, got {}",
                budget.content_height_mm(),
                self.slice_overlap_mm
            )));
        }
        Ok(())
    }

    /// A fresh page budget for this configuration.
    pub fn budget(&self) -> Result<PageBudget, PipelineError> {
        PageBudget::new(self.page, self.margin_mm)
    }

    /// The blind-slice overlap expressed in raster (device) pixels.
    pub fn slice_overlap_device_px(&self) -> f32 {
        self.slice_overlap_mm * PX_PER_MM * self.scale
    }

    /// JPEG quality on the 1..=100 scale, or `None` for lossless output.
    pub fn jpeg_quality(&self) -> Option<u8> {
        if self.quality >= 1.0 {
            None
        } else {
            Some((self.quality * 100.0).round().clamp(1.0, 100.0) as u8)
        }
    }
}

// ============================================================================
// REQUEST OVERRIDES
// ============================================================================

/// Partial overrides supplied with a request. Support both snake_case and camelCase.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RenderOptions {
    pub page: Option<PageFormat>,
    #[serde(alias = "marginMm")]
    pub margin_mm: Option<f32>,
    pub scale: Option<f32>,
    pub quality: Option<f32>,
    #[serde(alias = "sliceOverlapMm")]
    pub slice_overlap_mm: Option<f32>,
    #[serde(alias = "resourceTimeoutMs")]
    pub resource_timeout_ms: Option<u64>,
    #[serde(alias = "fallbackToBlindSlice")]
    pub fallback_to_blind_slice: Option<bool>,
    #[serde(alias = "fileName")]
    pub file_name: Option<String>,
    #[serde(alias = "returnBlob")]
    pub return_blob: Option<bool>,
    pub title: Option<String>,
}

impl RenderOptions {
    /// Apply these overrides on top of `base`.
    pub fn apply(&self, base: &RenderConfig) -> RenderConfig {
        let mut config = base.clone();
        if let Some(page) = self.page {
            config.page = page;
        }
        if let Some(v) = self.margin_mm {
            config.margin_mm = v;
        }
        if let Some(v) = self.scale {
            config.scale = v;
        }
        if let Some(v) = self.quality {
            config.quality = v;
        }
        if let Some(v) = self.slice_overlap_mm {
            config.slice_overlap_mm = v;
        }
        if let Some(ms) = self.resource_timeout_ms {
            config.resource_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = self.fallback_to_blind_slice {
            config.fallback_to_blind_slice = v;
        }
        if let Some(ref v) = self.file_name {
            config.file_name = v.clone();
        }
        if let Some(v) = self.return_blob {
            config.return_blob = v;
        }
        if let Some(ref v) = self.title {
            config.title = v.clone();
        }
        config
    }
}

// ============================================================================
// SERVER CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Extra directory searched for raster fonts before the system ones.
    pub font_dir: Option<PathBuf>,
    /// Base render configuration every request starts from.
    pub render: RenderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            font_dir: None,
            render: RenderConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `CVPRESS_ADDR`, `CVPRESS_FONT_DIR`, `CVPRESS_ASSET_DIR` and
    /// `CVPRESS_RESOURCE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut config = ServerConfig::default();

        if let Some(addr) = lookup("CVPRESS_ADDR") {
            config.addr = addr
                .parse()
                .map_err(|e| PipelineError::Config(format!("CVPRESS_ADDR '{addr}': {e}")))?;
        }
        if let Some(dir) = lookup("CVPRESS_FONT_DIR") {
            config.font_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("CVPRESS_ASSET_DIR") {
            config.render.asset_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = lookup("CVPRESS_RESOURCE_TIMEOUT_MS") {
            let ms: u64 = ms.parse().map_err(|e| {
                PipelineError::Config(format!("CVPRESS_RESOURCE_TIMEOUT_MS '{ms}': {e}"))
            })?;
            config.render.resource_timeout = Duration::from_millis(ms);
        }

        config.render.validate()?;
        Ok(config)
    }
}
