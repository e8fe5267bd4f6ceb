//! Project identity.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifies one branch of one clone, and therefore one report location.
///
/// Several keys may share a `git_name`: those descriptors share a checkout and
/// are executed together on one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{branch}.{git_name}")]
pub struct ProjectKey {
    pub branch: String,
    pub git_name: String,
}

impl ProjectKey {
    pub fn new(branch: impl Into<String>, git_name: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            git_name: git_name.into(),
        }
    }

    /// File name of this project's reports.
    pub fn report_name(&self) -> String {
        sanitize_report_name(&self.to_string())
    }
}

/// Replace path separators so a report name is a single path component.
pub fn sanitize_report_name(name: &str) -> String {
    name.replace(['/', '\\'], "-")
}
