//! KDL configuration parsing for devserver.
//!
//! This crate handles:
//! - The server configuration file (paths, credentials, poll interval)
//! - Project descriptors and their typed build-type variables
//! - `{repo_path}` templating of configuration values
//! - Reloading the configuration while keeping the last good one

pub mod error;
pub mod handle;
mod kdl_util;
pub mod project;
pub mod system;
pub mod template;

pub use error::{ConfigError, ConfigResult};
pub use handle::{ConfigHandle, watch_config};
pub use project::{BuildSpec, ProjectDescriptor, SubBuild};
pub use system::{DevserverConfig, PollInterval, SiteAuth, load_config, parse_config};
pub use template::{Template, TemplateContext};
