//! Project descriptors.

use devserver_core::ProjectKey;
use kdl::KdlNode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::kdl_util::{get_child_pairs, get_first_string_arg, get_string_prop, require_string_arg};
use crate::{ConfigError, ConfigResult, Template};

/// Default branch when a project does not name one.
pub const DEFAULT_BRANCH: &str = "master";

/// One monitored branch of a git clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    /// Directory name of the clone under the repos path.
    pub git_name: String,
    pub branch: String,
    /// Display name for the landing page.
    pub name: Option<String>,
    pub development_url: Option<String>,
    pub build: Option<BuildSpec>,
    /// Test fixture, relative to the checkout.
    pub test_fixture: Option<String>,
}

impl ProjectDescriptor {
    pub fn key(&self) -> ProjectKey {
        ProjectKey::new(&self.branch, &self.git_name)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.git_name)
    }
}

/// Build script selection and the variables handed to it.
///
/// Variable names are fully prefixed (`docker_registry`), so the script
/// contract is unchanged no matter where a value was declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    pub build_type: String,
    /// Global `build-type` values merged with the project's `env` block.
    pub env: BTreeMap<String, Template>,
    /// One script invocation per entry when present.
    pub sub_builds: Option<Vec<SubBuild>>,
}

impl BuildSpec {
    /// File name of the build script, relative to the scripts path.
    pub fn script_name(&self) -> String {
        format!("{}.sh", self.build_type)
    }
}

/// Extra variables for one invocation of the build script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubBuild {
    pub env: BTreeMap<String, Template>,
}

/// Prefix a configuration key with its build type unless it already is.
pub fn prefixed_key(build_type: &str, key: &str) -> String {
    let prefix = format!("{}_", build_type);
    if key.starts_with(&prefix) {
        key.to_string()
    } else {
        format!("{}{}", prefix, key.replace('-', "_"))
    }
}

/// Parse a `project` node.
///
/// ```kdl
/// project "example" branch="master" build="docker" {
///     name "Example"
///     test-fixture "test_fixture.sh"
///     env { registry "rep.example.com" }
///     sub-build { path "{repo_path}"; tag "example:latest" }
/// }
/// ```
pub(crate) fn parse_project(
    node: &KdlNode,
    build_types: &HashMap<String, BTreeMap<String, Template>>,
) -> ConfigResult<ProjectDescriptor> {
    let git_name = require_string_arg(node, "project git name")?;
    let branch = get_string_prop(node, "branch").unwrap_or_else(|| DEFAULT_BRANCH.to_string());
    if branch.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: format!("project '{}' branch", git_name),
            message: "branch cannot be empty".to_string(),
        });
    }
    let build_type = get_string_prop(node, "build");

    let mut name = None;
    let mut development_url = None;
    let mut test_fixture = None;
    let mut project_env = Vec::new();
    let mut sub_builds = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "name" => name = get_first_string_arg(child),
                "development-url" => development_url = get_first_string_arg(child),
                "test-fixture" => test_fixture = get_first_string_arg(child),
                "env" => project_env.extend(get_child_pairs(child, "env")?),
                "sub-build" => sub_builds.push(get_child_pairs(child, "sub-build")?),
                _ => {} // Ignore unknown nodes
            }
        }
    }

    let build = match build_type {
        Some(build_type) => {
            if build_type.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("project '{}' build", git_name),
                    message: "build type cannot be empty".to_string(),
                });
            }

            let mut env = build_types.get(&build_type).cloned().unwrap_or_default();
            for (key, value) in project_env {
                env.insert(prefixed_key(&build_type, &key), Template::new(value));
            }

            let sub_builds = if sub_builds.is_empty() {
                None
            } else {
                Some(
                    sub_builds
                        .into_iter()
                        .map(|pairs| SubBuild {
                            env: pairs
                                .into_iter()
                                .map(|(k, v)| (prefixed_key(&build_type, &k), Template::new(v)))
                                .collect(),
                        })
                        .collect(),
                )
            };

            Some(BuildSpec {
                build_type,
                env,
                sub_builds,
            })
        }
        None => {
            if !sub_builds.is_empty() || !project_env.is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "build type for project '{}' (env and sub-build need build=...)",
                    git_name
                )));
            }
            None
        }
    };

    Ok(ProjectDescriptor {
        git_name,
        branch,
        name,
        development_url,
        build,
        test_fixture,
    })
}
