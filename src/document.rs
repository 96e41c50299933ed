//! The structured CV data a template renders. Read-only to the pipeline.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct DocumentData {
    #[serde(alias = "personalInfo")]
    pub personal_info: PersonalInfo,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
    pub skills: Vec<SkillEntry>,
    pub languages: Vec<LanguageEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct PersonalInfo {
    #[serde(alias = "fullName")]
    pub full_name: String,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub summary: Option<String>,
    /// Photo source: data URL, http(s) URL or local path.
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct ExperienceEntry {
    pub position: String,
    pub company: String,
    pub location: Option<String>,
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
    pub current: bool,
    pub description: Option<String>,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct EducationEntry {
    pub institution: String,
    pub degree: String,
    pub field: Option<String>,
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct SkillEntry {
    pub name: String,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct LanguageEntry {
    pub name: String,
    pub proficiency: Option<String>,
}

impl ExperienceEntry {
    /// "2019 - 2022", "2021 - Present", or whatever part is known.
    pub fn period(&self) -> Option<String> {
        let end = if self.current {
            Some("Present")
        } else {
            self.end_date.as_deref()
        };
        format_period(self.start_date.as_deref(), end)
    }
}

impl EducationEntry {
    pub fn period(&self) -> Option<String> {
        format_period(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

fn format_period(start: Option<&str>, end: Option<&str>) -> Option<String> {
    let start = start.filter(|s| !s.trim().is_empty());
    let end = end.filter(|s| !s.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => Some(format!("{s} - {e}")),
        (Some(s), None) => Some(s.to_string()),
        (None, Some(e)) => Some(e.to_string()),
        (None, None) => None,
    }
}
