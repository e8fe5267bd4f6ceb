//! Server configuration parsing.

use kdl::KdlDocument;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kdl_util::{
    get_child_pairs, get_first_integer_arg, get_first_string_arg, get_integer_prop,
    require_string_arg,
};
use crate::project::{ProjectDescriptor, parse_project, prefixed_key};
use crate::{ConfigError, ConfigResult, Template};

pub const DEFAULT_PORT: u16 = 2500;
pub const DEFAULT_REPOS_PATH: &str = "/var/lib/devserver/repos";
pub const DEFAULT_REPORTS_PATH: &str = "/var/lib/devserver/reports";
pub const DEFAULT_TESTS_PATH: &str = "/var/lib/devserver/tests";
pub const DEFAULT_SCRIPTS_PATH: &str = "sh";
pub const DEFAULT_WEB_PATH: &str = "web";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevserverConfig {
    /// Public host name, shown on the landing page.
    pub hostname: Option<String>,
    pub port: u16,
    /// Parent directory of every project clone.
    pub repos_path: PathBuf,
    /// Build reports.
    pub reports_path: PathBuf,
    /// Test reports.
    pub tests_path: PathBuf,
    /// Build scripts, `<build_type>.sh`.
    pub scripts_path: PathBuf,
    /// Static assets for the web UI.
    pub web_path: PathBuf,
    pub site_auth: Option<SiteAuth>,
    pub github_webhook_secret: Option<String>,
    pub poll_interval: PollInterval,
    /// Projects in configuration order.
    pub projects: Vec<ProjectDescriptor>,
}

/// Credentials for the web UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteAuth {
    pub user: String,
    pub pass: String,
}

/// Bounds of the jittered delay between full passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollInterval {
    pub min: Duration,
    pub max: Duration,
}

impl Default for PollInterval {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(150),
            max: Duration::from_secs(450),
        }
    }
}

impl Default for DevserverConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            port: DEFAULT_PORT,
            repos_path: PathBuf::from(DEFAULT_REPOS_PATH),
            reports_path: PathBuf::from(DEFAULT_REPORTS_PATH),
            tests_path: PathBuf::from(DEFAULT_TESTS_PATH),
            scripts_path: PathBuf::from(DEFAULT_SCRIPTS_PATH),
            web_path: PathBuf::from(DEFAULT_WEB_PATH),
            site_auth: None,
            github_webhook_secret: None,
            poll_interval: PollInterval::default(),
            projects: Vec::new(),
        }
    }
}

impl DevserverConfig {
    /// Distinct git names, in the order they first appear.
    pub fn git_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.projects
            .iter()
            .filter(|p| seen.insert(p.git_name.as_str()))
            .map(|p| p.git_name.clone())
            .collect()
    }

    /// Every descriptor sharing a clone, in configuration order.
    pub fn projects_for(&self, git_name: &str) -> Vec<ProjectDescriptor> {
        self.projects
            .iter()
            .filter(|p| p.git_name == git_name)
            .cloned()
            .collect()
    }

    /// Local checkout of a clone.
    pub fn repo_path(&self, git_name: &str) -> PathBuf {
        self.repos_path.join(git_name)
    }
}

/// Parse the server configuration from KDL text.
pub fn parse_config(kdl: &str) -> ConfigResult<DevserverConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = DevserverConfig::default();
    let mut site_user = None;
    let mut site_pass = None;

    // Build types first so a project may precede the block it refers to.
    let mut build_types: HashMap<String, BTreeMap<String, Template>> = HashMap::new();
    for node in doc.nodes().iter().filter(|n| n.name().value() == "build-type") {
        let build_type = require_string_arg(node, "build-type name")?;
        let globals = build_types.entry(build_type.clone()).or_default();
        for (key, value) in get_child_pairs(node, "build-type")? {
            globals.insert(prefixed_key(&build_type, &key), Template::new(value));
        }
    }

    for node in doc.nodes() {
        match node.name().value() {
            "hostname" => config.hostname = get_first_string_arg(node),
            "port" => config.port = parse_port(get_first_integer_arg(node))?,
            "repos-path" => config.repos_path = require_path(node, "repos-path")?,
            "reports-path" => config.reports_path = require_path(node, "reports-path")?,
            "tests-path" => config.tests_path = require_path(node, "tests-path")?,
            "scripts-path" => config.scripts_path = require_path(node, "scripts-path")?,
            "web-path" => config.web_path = require_path(node, "web-path")?,
            "site-user" => site_user = get_first_string_arg(node),
            "site-pass" => site_pass = get_first_string_arg(node),
            "github-webhook-secret" => {
                config.github_webhook_secret = get_first_string_arg(node).filter(|s| !s.is_empty())
            }
            "poll-interval" => config.poll_interval = parse_poll_interval(node)?,
            "project" => config.projects.push(parse_project(node, &build_types)?),
            _ => {} // Ignore unknown nodes
        }
    }

    config.site_auth = match (site_user, site_pass) {
        (Some(user), Some(pass)) if !user.is_empty() => Some(SiteAuth { user, pass }),
        _ => None,
    };

    // Two descriptors with the same key would write the same report file
    let mut keys = HashSet::new();
    for project in &config.projects {
        if !keys.insert(project.key()) {
            return Err(ConfigError::Duplicate(format!(
                "project '{}' on branch '{}'",
                project.git_name, project.branch
            )));
        }
    }

    Ok(config)
}

/// Read and parse a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<DevserverConfig> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_config(&text)
}

fn require_path(node: &kdl::KdlNode, field: &str) -> ConfigResult<PathBuf> {
    require_string_arg(node, field).map(PathBuf::from)
}

fn parse_port(value: Option<i128>) -> ConfigResult<u16> {
    let value = value.ok_or_else(|| ConfigError::MissingField("port value".to_string()))?;
    u16::try_from(value)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: "port".to_string(),
            message: format!("{} is not a valid port", value),
        })
}

fn parse_poll_interval(node: &kdl::KdlNode) -> ConfigResult<PollInterval> {
    let defaults = PollInterval::default();
    let seconds = |name: &str, default: Duration| -> ConfigResult<Duration> {
        match get_integer_prop(node, name) {
            None => Ok(default),
            Some(v) if v > 0 => u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue {
                    field: format!("poll-interval {}", name),
                    message: format!("{} is out of range", v),
                }),
            Some(v) => Err(ConfigError::InvalidValue {
                field: format!("poll-interval {}", name),
                message: format!("{} must be positive", v),
            }),
        }
    };

    let interval = PollInterval {
        min: seconds("min", defaults.min)?,
        max: seconds("max", defaults.max)?,
    };
    if interval.min > interval.max {
        return Err(ConfigError::InvalidValue {
            field: "poll-interval".to_string(),
            message: "min must not exceed max".to_string(),
        });
    }
    Ok(interval)
}
