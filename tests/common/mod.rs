#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cvpress::display::DisplayList;
use cvpress::document::{DocumentData, EducationEntry, ExperienceEntry, PersonalInfo, SkillEntry};
use cvpress::error::RasterError;
use cvpress::raster::{PageRasterizer, RenderTargets, SkiaRasterizer};
use cvpress::resources::ReadyResources;
use cvpress::RenderConfig;
use image::RgbImage;

pub fn page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
}

/// Small raster scale keeps the tests fast.
pub fn config() -> RenderConfig {
    RenderConfig {
        scale: 1.0,
        ..RenderConfig::default()
    }
}

pub fn short_cv() -> DocumentData {
    DocumentData {
        personal_info: PersonalInfo {
            full_name: "Ada Lovelace".into(),
            title: Some("Analyst".into()),
            email: Some("ada@example.com".into()),
            summary: Some("Wrote the first published algorithm for a machine.".into()),
            ..PersonalInfo::default()
        },
        experience: vec![ExperienceEntry {
            position: "Translator".into(),
            company: "Analytical Engine".into(),
            start_date: Some("1842".into()),
            end_date: Some("1843".into()),
            ..ExperienceEntry::default()
        }],
        education: vec![EducationEntry {
            institution: "Private tutoring".into(),
            degree: "Mathematics".into(),
            ..EducationEntry::default()
        }],
        skills: vec![SkillEntry {
            name: "Mathematics".into(),
            level: None,
        }],
        ..DocumentData::default()
    }
}

/// Enough records to need several pages.
pub fn long_cv() -> DocumentData {
    let description = "Led a team maintaining the billing platform, migrated the nightly batch \
        jobs to an event driven design and cut processing time from hours to minutes. \
        Worked closely with finance and support to ship reporting features every sprint.";
    let mut cv = short_cv();
    cv.experience = (0..16)
        .map(|i| ExperienceEntry {
            position: format!("Engineer {i}"),
            company: format!("Company {i}"),
            start_date: Some(format!("{}", 2000 + i)),
            end_date: Some(format!("{}", 2001 + i)),
            description: Some(description.into()),
            highlights: vec!["Shipped on time".into(), "Mentored two juniors".into()],
            ..ExperienceEntry::default()
        })
        .collect();
    cv
}

/// Real rasterizer that remembers every tracker it was handed.
pub struct TrackingRasterizer {
    inner: SkiaRasterizer,
    pub seen: Mutex<Vec<RenderTargets>>,
}

impl TrackingRasterizer {
    pub fn new() -> Arc<Self> {
        Arc::new(TrackingRasterizer {
            inner: SkiaRasterizer::new(None),
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl PageRasterizer for TrackingRasterizer {
    fn rasterize(
        &self,
        list: &DisplayList,
        resources: &ReadyResources,
        scale: f32,
        targets: &RenderTargets,
    ) -> Result<RgbImage, RasterError> {
        self.seen.lock().unwrap().push(targets.clone());
        self.inner.rasterize(list, resources, scale, targets)
    }
}

/// Fails every page.
pub struct BrokenRasterizer;

impl PageRasterizer for BrokenRasterizer {
    fn rasterize(
        &self,
        _list: &DisplayList,
        _resources: &ReadyResources,
        _scale: f32,
        _targets: &RenderTargets,
    ) -> Result<RgbImage, RasterError> {
        Err(RasterError::Surface {
            width: 0,
            height: 0,
        })
    }
}
