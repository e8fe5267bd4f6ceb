//! Placeholder templating for configuration values.
//!
//! Values may reference run-time facts with `{name}`, most commonly
//! `{repo_path}`, the local checkout of the project being built:
//!
//! ```text
//! sub-build { path "{repo_path}/nodejs" }
//! ```
//!
//! Unknown placeholders are left as written.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

// Regex for matching {...} placeholders
static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("valid placeholder regex"));

/// A string-valued configuration field that may contain placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Template(String);

impl Template {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The value as written in the configuration.
    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Substitute every known placeholder.
    pub fn render(&self, ctx: &TemplateContext) -> String {
        PLACEHOLDER_REGEX
            .replace_all(&self.0, |caps: &regex::Captures| {
                let name = &caps[1];
                ctx.get(name)
                    .map(str::to_string)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

impl From<&str> for Template {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Values available to placeholders during a run.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a project checkout.
    pub fn for_repo(repo_path: &Path) -> Self {
        let mut ctx = Self::new();
        ctx.set("repo_path", repo_path.to_string_lossy());
        ctx
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}
