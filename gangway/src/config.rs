// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files and working with a gangway
//! server configuration

use camino::Utf8Path;
use camino::Utf8PathBuf;
use dropshot::ConfigDropshot;
use dropshot::ConfigLogging;
use serde::Deserialize;
use serde::Serialize;
use slog_error_chain::SlogInlineError;
use std::net::SocketAddr;
use thiserror::Error;

/// Configuration for a gangway server
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Configuration for the dropshot server.
    pub dropshot: ConfigDropshot,
    /// Server-wide logging configuration.
    pub log: ConfigLogging,
    /// Configuration for routing proxied traffic to backends.
    pub proxy: ProxyConfig,
}

impl Config {
    /// Load a `Config` from the given TOML file
    ///
    /// This config object can then be used to create a new gangway
    /// server.
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }
}

/// How to find the backend serving a given deployment
///
/// Backends are addressed by name: the deployment and workspace ids are
/// embedded into a host name under `domain_suffix`, the convention used
/// by the service fabric the deployments run on.  No discovery happens
/// here.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Label prepended to deployment and workspace ids when forming
    /// backend host names.
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,
    /// Domain appended after the workspace label.
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,
    /// Port the backends listen on.
    #[serde(default = "default_backend_port")]
    pub backend_port: u16,
    /// If set, every backend resolves to this address instead of its
    /// derived name.  Intended for testing against a local backend.
    #[serde(default)]
    pub backend_override: Option<SocketAddr>,
}

impl Default for ProxyConfig {
    fn default() -> ProxyConfig {
        ProxyConfig {
            service_prefix: default_service_prefix(),
            domain_suffix: default_domain_suffix(),
            backend_port: default_backend_port(),
            backend_override: None,
        }
    }
}

fn default_service_prefix() -> String {
    "gw".to_string()
}

fn default_domain_suffix() -> String {
    "svc.cluster.local".to_string()
}

fn default_backend_port() -> u16 {
    80
}

#[derive(Debug, Error, SlogInlineError)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}
