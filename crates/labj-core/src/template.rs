//! Entry templates.
//!
//! A template is a contract for a named entry shape: which substitution
//! fields the caller must provide, which are optional, and optional body
//! text with `{placeholder}` markers that render into the narrative fields.
//! Three built-in templates (`diagnostic`, `build`, `test`) are always
//! available unless the project configuration overrides them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::models::Narrative;

/// A named entry template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Template {
    /// Template name.
    #[serde(default)]
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Body text for `context`, with `{placeholder}` markers.
    #[serde(default)]
    pub context: Option<String>,
    /// Body text for `intent`.
    #[serde(default)]
    pub intent: Option<String>,
    /// Body text for `action`.
    #[serde(default)]
    pub action: Option<String>,
    /// Body text for `observation`.
    #[serde(default)]
    pub observation: Option<String>,
    /// Body text for `analysis`.
    #[serde(default)]
    pub analysis: Option<String>,
    /// Body text for `next_steps`.
    #[serde(default)]
    pub next_steps: Option<String>,
    /// Substitution fields the caller must provide.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Substitution fields the caller may provide.
    #[serde(default)]
    pub optional_fields: Vec<String>,
    /// Outcome applied when the entry does not set one.
    #[serde(default)]
    pub default_outcome: Option<String>,
}

impl Template {
    /// Checks that every required substitution field is present in `values`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::MissingTemplateField`] listing the absent
    /// fields.
    pub fn check_required(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let missing: Vec<String> = self
            .required_fields
            .iter()
            .filter(|f| !values.contains_key(*f))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(JournalError::MissingTemplateField {
                template: self.name.clone(),
                missing,
            })
        }
    }

    /// Renders the template bodies into a [`Narrative`].
    ///
    /// A body whose placeholders are all satisfied renders substituted; a
    /// body referencing a value that was not provided is left as-is rather
    /// than failing, so partially-filled templates still produce a readable
    /// entry.
    #[must_use]
    pub fn render(&self, values: &BTreeMap<String, String>) -> Narrative {
        Narrative {
            context: self.context.as_deref().map(|t| substitute(t, values)),
            intent: self.intent.as_deref().map(|t| substitute(t, values)),
            action: self.action.as_deref().map(|t| substitute(t, values)),
            observation: self.observation.as_deref().map(|t| substitute(t, values)),
            analysis: self.analysis.as_deref().map(|t| substitute(t, values)),
            next_steps: self.next_steps.as_deref().map(|t| substitute(t, values)),
        }
    }
}

/// Replaces `{name}` markers with values; unknown markers are kept verbatim.
fn substitute(text: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// The built-in templates every project starts with.
#[must_use]
pub fn default_templates() -> BTreeMap<String, Template> {
    let mut map = BTreeMap::new();
    map.insert(
        "diagnostic".to_string(),
        Template {
            name: "diagnostic".into(),
            description: "Tool call diagnostic entry for tracking command execution".into(),
            context: Some("Executing {tool} command".into()),
            action: Some("{command}".into()),
            observation: Some("Exit code: {exit_code}, Duration: {duration_ms}ms".into()),
            analysis: Some("{analysis}".into()),
            required_fields: vec!["tool".into(), "status".into()],
            optional_fields: vec![
                "command".into(),
                "duration_ms".into(),
                "exit_code".into(),
                "error_type".into(),
                "analysis".into(),
            ],
            ..Template::default()
        },
    );
    map.insert(
        "build".to_string(),
        Template {
            name: "build".into(),
            description: "Build operation entry".into(),
            context: Some("Building {target}".into()),
            intent: Some("Compile and link {target} with {config}".into()),
            action: Some("Running build command".into()),
            required_fields: vec!["target".into()],
            optional_fields: vec!["config".into(), "flags".into()],
            ..Template::default()
        },
    );
    map.insert(
        "test".to_string(),
        Template {
            name: "test".into(),
            description: "Test execution entry".into(),
            context: Some("Running tests for {target}".into()),
            intent: Some("Verify {target} functionality".into()),
            required_fields: vec!["target".into()],
            optional_fields: vec!["test_filter".into(), "flags".into()],
            ..Template::default()
        },
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_check_required_reports_missing() {
        let templates = default_templates();
        let build = &templates["build"];
        let err = build.check_required(&BTreeMap::new()).unwrap_err();
        match err {
            JournalError::MissingTemplateField { template, missing } => {
                assert_eq!(template, "build");
                assert_eq!(missing, vec!["target".to_string()]);
            }
            other => panic!("expected MissingTemplateField, got {other:?}"),
        }
        assert!(build.check_required(&values(&[("target", "release")])).is_ok());
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let templates = default_templates();
        let build = &templates["build"];
        let narrative = build.render(&values(&[("target", "release"), ("config", "fast")]));
        assert_eq!(narrative.context.as_deref(), Some("Building release"));
        assert_eq!(
            narrative.intent.as_deref(),
            Some("Compile and link release with fast")
        );
    }

    #[test]
    fn test_render_keeps_unresolved_placeholders() {
        let templates = default_templates();
        let build = &templates["build"];
        let narrative = build.render(&values(&[("target", "release")]));
        // `{config}` was not supplied; body is kept readable instead of failing.
        assert_eq!(
            narrative.intent.as_deref(),
            Some("Compile and link release with {config}")
        );
    }

    #[test]
    fn test_default_templates_present() {
        let templates = default_templates();
        assert!(templates.contains_key("diagnostic"));
        assert!(templates.contains_key("build"));
        assert!(templates.contains_key("test"));
    }
}
