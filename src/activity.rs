//! Activity resolution per Revit version.
//!
//! Each supported Revit version has its own published activity: an opaque
//! signature plus a fully-qualified alias (`nickname.ActivityName+alias`).
//! Both come from the `[automation.activities.<version>]` config table and
//! can be overridden per version by environment variables:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `TypeParametersActivity<version>` | activity signature |
//! | `ACTIVITY_FULL_ALIAS_TypeParameters<version>` | activity alias |
//!
//! A missing entry is a hard error. Only the version itself falls back to
//! the configured default when it cannot be detected from the manifest.

use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::AutomationConfig;
use crate::error::{Error, Result};
use crate::urn::derivative_urn;

/// A resolved activity for one Revit version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySignature {
    pub version: String,
    pub signature: String,
    pub activity_alias: String,
}

/// Signatures and aliases keyed by version.
#[derive(Debug, Clone, Default)]
pub struct ActivityTable {
    default_version: String,
    supported: Vec<String>,
    entries: BTreeMap<String, (Option<String>, Option<String>)>,
}

pub fn signature_env_var(version: &str) -> String {
    format!("TypeParametersActivity{}", version)
}

pub fn alias_env_var(version: &str) -> String {
    format!("ACTIVITY_FULL_ALIAS_TypeParameters{}", version)
}

impl ActivityTable {
    /// Builds the table from config, overlaying the process environment.
    pub fn from_config(config: &AutomationConfig) -> Self {
        Self::with_lookup(config, |name| std::env::var(name).ok())
    }

    /// Builds the table from config, overlaying values from `lookup`.
    pub fn with_lookup(config: &AutomationConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut entries = BTreeMap::new();
        for version in &config.supported_versions {
            let configured = config.activities.get(version).cloned().unwrap_or_default();
            let signature = lookup(&signature_env_var(version))
                .filter(|s| !s.is_empty())
                .or(configured.signature);
            let alias = lookup(&alias_env_var(version))
                .filter(|s| !s.is_empty())
                .or(configured.activity_alias);
            entries.insert(version.clone(), (signature, alias));
        }

        Self {
            default_version: config.default_version.clone(),
            supported: config.supported_versions.clone(),
            entries,
        }
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    pub fn supported_versions(&self) -> &[String] {
        &self.supported
    }

    /// Resolves `version`, or the default version when `None`.
    pub fn resolve(&self, version: Option<&str>) -> Result<ActivitySignature> {
        let version = version.unwrap_or(self.default_version.as_str());
        let unsupported = |reason: String| Error::UnsupportedVersion {
            version: version.to_string(),
            reason,
        };

        let (signature, alias) = self.entries.get(version).ok_or_else(|| {
            unsupported(format!("supported versions: {}", self.supported.join(", ")))
        })?;

        let signature = signature
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| unsupported(format!("missing {}", signature_env_var(version))))?;
        let activity_alias = alias
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| unsupported(format!("missing {}", alias_env_var(version))))?;

        Ok(ActivitySignature {
            version: version.to_string(),
            signature: signature.to_string(),
            activity_alias: activity_alias.to_string(),
        })
    }

    /// `(version, configured)` for every supported version.
    pub fn status(&self) -> Vec<(String, bool)> {
        self.supported
            .iter()
            .map(|v| (v.clone(), self.resolve(Some(v)).is_ok()))
            .collect()
    }
}

/// Reads the Revit version from a model-derivative manifest.
///
/// Looks at `derivatives[].properties["Document Information"].RVTVersion`
/// and returns the first value found.
pub fn detect_version(manifest: &Value) -> Option<String> {
    manifest
        .get("derivatives")?
        .as_array()?
        .iter()
        .filter_map(|d| d.get("properties")?.get("Document Information")?.get("RVTVersion"))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Resolves the activity for a manifest, defaulting the version when the
/// manifest is absent or does not carry one.
pub fn resolve_for_manifest(table: &ActivityTable, manifest: Option<&Value>) -> Result<ActivitySignature> {
    let detected = manifest.and_then(detect_version);
    if detected.is_none() {
        tracing::info!(
            default_version = table.default_version(),
            "Revit version not detected, using default"
        );
    }
    table.resolve(detected.as_deref())
}

/// Fetches the model-derivative manifest of the model at `urn`.
pub async fn fetch_manifest(base_url: &str, urn: &str, token: &str, timeout: Duration) -> Result<Value> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let url = format!(
        "{}/designdata/{}/manifest",
        base_url.trim_end_matches('/'),
        derivative_urn(urn)
    );
    let resp = client.get(&url).bearer_auth(token).send().await?;

    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(Error::http(status, &text));
    }
    Ok(serde_json::from_str(&text)?)
}

/// Resolves the activity for the model at `urn` from its manifest.
///
/// A manifest that cannot be fetched is treated like one without a
/// version: the default version is used.
pub async fn resolve_for_urn(
    table: &ActivityTable,
    base_url: &str,
    urn: &str,
    token: &str,
    timeout: Duration,
) -> Result<ActivitySignature> {
    let manifest = match fetch_manifest(base_url, urn, token, timeout).await {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::warn!(urn, error = %e, "manifest unavailable");
            None
        }
    };
    resolve_for_manifest(table, manifest.as_ref())
}

/// CLI: print each supported version and whether it is configured.
pub fn list_versions(config: &AutomationConfig) -> anyhow::Result<()> {
    let table = ActivityTable::from_config(config);
    println!("{:<10} {:<12} DEFAULT", "VERSION", "STATUS");
    for (version, ok) in table.status() {
        let status = if ok { "OK" } else { "MISSING" };
        let default = if version == table.default_version() { "*" } else { "" };
        println!("{:<10} {:<12} {}", version, status, default);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivityConfig;
    use serde_json::json;
    use std::collections::HashMap;

    fn config() -> AutomationConfig {
        let mut config = AutomationConfig::default();
        config.activities.insert(
            "2024".into(),
            ActivityConfig {
                signature: Some("sig-2024".into()),
                activity_alias: Some("nick.TypeParametersActivity2024+dev".into()),
            },
        );
        config.activities.insert(
            "2025".into(),
            ActivityConfig {
                signature: Some("sig-2025".into()),
                activity_alias: None,
            },
        );
        config
    }

    #[test]
    fn resolves_default_version() {
        let table = ActivityTable::with_lookup(&config(), |_| None);
        let activity = table.resolve(None).unwrap();
        assert_eq!(activity.version, "2024");
        assert_eq!(activity.signature, "sig-2024");
    }

    #[test]
    fn environment_overrides_config() {
        let env: HashMap<String, String> = [
            (signature_env_var("2025"), "env-sig".to_string()),
            (alias_env_var("2025"), "nick.TypeParametersActivity2025+prod".to_string()),
        ]
        .into_iter()
        .collect();
        let table = ActivityTable::with_lookup(&config(), |name| env.get(name).cloned());
        let activity = table.resolve(Some("2025")).unwrap();
        assert_eq!(activity.signature, "env-sig");
        assert_eq!(activity.activity_alias, "nick.TypeParametersActivity2025+prod");
    }

    #[test]
    fn unsupported_and_missing_are_errors() {
        let table = ActivityTable::with_lookup(&config(), |_| None);
        match table.resolve(Some("2019")).unwrap_err() {
            Error::UnsupportedVersion { version, reason } => {
                assert_eq!(version, "2019");
                assert!(reason.contains("2023, 2024, 2025, 2026"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match table.resolve(Some("2025")).unwrap_err() {
            Error::UnsupportedVersion { reason, .. } => {
                assert!(reason.contains("ACTIVITY_FULL_ALIAS_TypeParameters2025"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(table.resolve(Some("2026")).is_err());
    }

    #[test]
    fn status_lists_every_supported_version() {
        let table = ActivityTable::with_lookup(&config(), |_| None);
        assert_eq!(
            table.status(),
            vec![
                ("2023".to_string(), false),
                ("2024".to_string(), true),
                ("2025".to_string(), false),
                ("2026".to_string(), false),
            ]
        );
    }

    #[test]
    fn detects_version_from_manifest() {
        let manifest = json!({
            "derivatives": [
                { "outputType": "thumbnail" },
                { "outputType": "svf2", "properties": {
                    "Document Information": { "RVTVersion": "2025" }
                }},
            ]
        });
        assert_eq!(detect_version(&manifest).as_deref(), Some("2025"));
        assert_eq!(detect_version(&json!({"derivatives": []})), None);
        assert_eq!(
            detect_version(&json!({"derivatives": [{"properties": {"Document Information": {"RVTVersion": 2023}}}]}))
                .as_deref(),
            Some("2023")
        );
    }

    #[test]
    fn manifest_fallback_uses_default() {
        let table = ActivityTable::with_lookup(&config(), |_| None);
        assert_eq!(resolve_for_manifest(&table, None).unwrap().version, "2024");
        let manifest = json!({"derivatives": [{"properties": {"Document Information": {"RVTVersion": "2025"}}}]});
        assert!(resolve_for_manifest(&table, Some(&manifest)).is_err());
    }
}
