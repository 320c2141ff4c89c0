//! Bundled-dataset source generation from an export snapshot.
//!
//! Output is deterministic for a given snapshot: both collections are sorted
//! by id and serialized with stable field order.

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::migration::ExportSnapshot;

/// Target format for [`generate_static_file_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaticFormat {
    /// JSON bundle loadable by `BundledDataset::from_json`.
    #[default]
    Json,
    /// ES module for the static site.
    JsModule,
}

impl FromStr for StaticFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "js" | "mjs" | "module" | "esm" => Ok(Self::JsModule),
            other => Err(Error::InvalidInput(format!("unknown static format '{other}', expected json or js"))),
        }
    }
}

impl StaticFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsModule => "js",
        }
    }
}

const JS_HELPERS: &str = r#"export function getSitesByCategory(categoryId) {
  return sites.filter((site) => site.category === categoryId);
}

export function searchSites(query) {
  const needle = String(query ?? "").trim().toLowerCase();
  if (!needle) {
    return sites;
  }
  return sites.filter((site) =>
    [site.title, site.description, site.shortDesc, site.category].some((field) =>
      String(field ?? "").toLowerCase().includes(needle),
    ),
  );
}
"#;

pub fn generate_static_file_code(snapshot: &ExportSnapshot, format: StaticFormat) -> Result<String> {
    let mut bundle = snapshot.to_bundle();
    bundle.categories.sort_by(|a, b| a.id.cmp(&b.id));
    bundle.sites.sort_by(|a, b| a.id.cmp(&b.id));

    match format {
        StaticFormat::Json => {
            let mut out = serde_json::to_string_pretty(&bundle)?;
            out.push('\n');
            Ok(out)
        }
        StaticFormat::JsModule => {
            let categories = serde_json::to_string_pretty(&bundle.categories)?;
            let sites = serde_json::to_string_pretty(&bundle.sites)?;
            Ok(format!(
                "// Generated by marknav from the remote store at {exported}.\n\
                 // Schema version {version}. Regenerate instead of editing by hand.\n\n\
                 export const categories = {categories};\n\n\
                 export const sites = {sites};\n\n\
                 {JS_HELPERS}",
                exported = snapshot.exported_at.to_rfc3339(),
                version = bundle.version.as_deref().unwrap_or_default(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundled::BundledDataset;
    use crate::models::{Category, Metadata, Site};
    use chrono::{TimeZone, Utc};

    fn snapshot() -> ExportSnapshot {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let mut zeta = Category::new("zeta", "Zeta", "🔚");
        let mut alpha = Category::new("alpha", "Alpha", "🔝");
        zeta.add_date = at;
        alpha.add_date = at;
        let mut site = Site::new("gh", "GitHub", "https://github.com", "alpha");
        site.add_date = at;
        ExportSnapshot {
            categories: vec![zeta, alpha],
            sites: vec![site],
            metadata: Metadata::for_counts(2, 1),
            version: None,
            exported_at: at,
        }
    }

    #[test]
    fn test_json_is_sorted_and_reloadable() {
        let json = generate_static_file_code(&snapshot(), StaticFormat::Json).unwrap();
        let bundle = BundledDataset::from_json(&json).unwrap();

        let ids: Vec<_> = bundle.categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["alpha", "zeta"]);
        assert_eq!(bundle.version.as_deref(), Some("1.0.0"));
        bundle.validate().unwrap();
    }

    #[test]
    fn test_output_is_deterministic() {
        let a = generate_static_file_code(&snapshot(), StaticFormat::JsModule).unwrap();
        let b = generate_static_file_code(&snapshot(), StaticFormat::JsModule).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_js_module_exports_helpers() {
        let js = generate_static_file_code(&snapshot(), StaticFormat::JsModule).unwrap();
        assert!(js.contains("export const categories = ["));
        assert!(js.contains("export const sites = ["));
        assert!(js.contains("export function searchSites(query)"));
        assert!(js.contains("export function getSitesByCategory(categoryId)"));
        assert!(js.contains("\"shortDesc\""));
        assert!(js.find("\"alpha\"") < js.find("\"zeta\""));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<StaticFormat>().unwrap(), StaticFormat::Json);
        assert_eq!("js".parse::<StaticFormat>().unwrap(), StaticFormat::JsModule);
        assert!("yaml".parse::<StaticFormat>().is_err());
        assert_eq!(StaticFormat::JsModule.extension(), "js");
    }
}
