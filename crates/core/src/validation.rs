//! Invariant checks shared by the data manager and the migration tool.
//!
//! Both write paths go through these functions so that a record accepted by
//! one is accepted by the other.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::models::{Category, Site};

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }

    fn prefixed(self, prefix: &str) -> Self {
        Self { field: format!("{prefix}.{}", self.field), message: format!("{prefix}: {}", self.message) }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Collected result of validating a whole dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() { Ok(()) } else { Err(Error::Validation(self.errors)) }
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }
}

/// Ids are slug-like: ASCII alphanumerics, `-` and `_`.
pub fn is_slug(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Canonical form used for URL uniqueness checks.
///
/// Falls back to the trimmed input when it does not parse.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    Url::parse(trimmed).map(|u| u.to_string()).unwrap_or_else(|_| trimmed.to_string())
}

/// Field checks for a single category, independent of the collection.
pub fn validate_category(category: &Category) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if category.id.trim().is_empty() {
        errors.push(FieldError::new("id", "Category ID is required"));
    } else if !is_slug(&category.id) {
        errors.push(FieldError::new("id", format!("Category ID '{}' must be slug-like", category.id)));
    }
    if category.name.trim().is_empty() {
        errors.push(FieldError::new("name", "Category name is required"));
    }
    errors
}

/// Field checks for a single site, independent of the collection.
pub fn validate_site(site: &Site) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if site.id.trim().is_empty() {
        errors.push(FieldError::new("id", "Site ID is required"));
    }
    if site.title.trim().is_empty() {
        errors.push(FieldError::new("title", "Site title is required"));
    }
    if let Err(message) = check_url(&site.url) {
        errors.push(FieldError::new("url", message));
    }
    if site.category.trim().is_empty() {
        errors.push(FieldError::new("category", "Site category is required"));
    }
    errors
}

fn check_url(raw: &str) -> std::result::Result<(), String> {
    if raw.trim().is_empty() {
        return Err("Site URL is required".to_string());
    }
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        Ok(url) => Err(format!("URL '{raw}' has unsupported scheme '{}'", url.scheme())),
        Err(e) => Err(format!("URL '{raw}' is invalid: {e}")),
    }
}

/// Validate both collections together.
///
/// Checks every record, duplicate ids in each collection, duplicate URLs and
/// dangling category references.
pub fn validate_dataset(categories: &[Category], sites: &[Site]) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut category_ids = HashSet::new();
    for (i, category) in categories.iter().enumerate() {
        let prefix = format!("categories[{i}]");
        report.errors.extend(validate_category(category).into_iter().map(|e| e.prefixed(&prefix)));
        if !category_ids.insert(category.id.as_str()) {
            report
                .errors
                .push(FieldError::new("id", format!("Duplicate category ID '{}'", category.id)).prefixed(&prefix));
        }
    }

    let mut site_ids = HashSet::new();
    let mut urls: HashMap<String, &str> = HashMap::new();
    for (i, site) in sites.iter().enumerate() {
        let prefix = format!("sites[{i}]");
        report.errors.extend(validate_site(site).into_iter().map(|e| e.prefixed(&prefix)));
        if !site_ids.insert(site.id.as_str()) {
            report.errors.push(FieldError::new("id", format!("Duplicate site ID '{}'", site.id)).prefixed(&prefix));
        }
        if let Some(first) = urls.insert(normalize_url(&site.url), site.id.as_str()) {
            report.errors.push(
                FieldError::new("url", format!("URL '{}' is also used by site '{first}'", site.url)).prefixed(&prefix),
            );
        }
        if !site.category.is_empty() && !category_ids.contains(site.category.as_str()) {
            report.errors.push(
                FieldError::new("category", format!("Category '{}' does not exist", site.category)).prefixed(&prefix),
            );
        }
    }

    report
}

/// Check that `category` can be appended to `existing`.
pub fn check_new_category(existing: &[Category], category: &Category) -> Result<()> {
    let mut errors = validate_category(category);
    if existing.iter().any(|c| c.id == category.id) {
        errors.push(FieldError::new("id", "Category ID already exists"));
    }
    ValidationReport { errors }.into_result()
}

/// Check that `site` can be appended to `sites`.
pub fn check_new_site(categories: &[Category], sites: &[Site], site: &Site) -> Result<()> {
    let mut errors = validate_site(site);
    if sites.iter().any(|s| s.id == site.id) {
        errors.push(FieldError::new("id", "Site ID already exists"));
    }
    errors.extend(check_url_unique(sites, site));
    errors.extend(check_category_exists(categories, &site.category));
    ValidationReport { errors }.into_result()
}

/// Check an updated site against the rest of the collection.
///
/// `sites` may contain the previous version of `site`; it is skipped by id.
pub fn check_updated_site(categories: &[Category], sites: &[Site], site: &Site) -> Result<()> {
    let mut errors = validate_site(site);
    errors.extend(check_url_unique(sites, site));
    errors.extend(check_category_exists(categories, &site.category));
    ValidationReport { errors }.into_result()
}

/// Reject deleting a category that sites still reference.
pub fn check_category_deletable(sites: &[Site], category_id: &str) -> Result<()> {
    let count = sites.iter().filter(|s| s.category == category_id).count();
    match count {
        0 => Ok(()),
        1 => Err(Error::validation("category", "Cannot delete category: 1 site uses this category")),
        n => Err(Error::validation("category", format!("Cannot delete category: {n} sites use this category"))),
    }
}

fn check_url_unique(sites: &[Site], site: &Site) -> Option<FieldError> {
    let normalized = normalize_url(&site.url);
    sites
        .iter()
        .any(|s| s.id != site.id && normalize_url(&s.url) == normalized)
        .then(|| FieldError::new("url", "URL already exists"))
}

fn check_category_exists(categories: &[Category], category_id: &str) -> Option<FieldError> {
    if category_id.is_empty() || categories.iter().any(|c| c.id == category_id) {
        return None;
    }
    Some(FieldError::new("category", format!("Category '{category_id}' does not exist")))
}
