//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Spamsweep.
//
// Spamsweep is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Spamsweep is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Spamsweep. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::Error;
use crate::sweep::Action;

/// The optional configuration file.
///
/// Every setting here can also be given on the command line, which takes
/// precedence. The file is mainly useful for keeping the password off the
/// command line when running from cron.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: Option<String>,
    /// Defaults to 993 if `ssl` is set and 143 otherwise.
    pub port: Option<u16>,
    #[serde(default)]
    pub ssl: bool,
    /// Skip certificate verification. Only for testing.
    #[serde(default)]
    pub allow_insecure_tls_connections: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    /// If set, log in as `DOMAIN\user`, as Exchange wants.
    pub domain: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    pub action: Option<Action>,
    pub spam_dir: Option<String>,
    /// Mailboxes to sweep besides INBOX.
    #[serde(default)]
    pub mailboxes: Vec<String>,
    /// Check read messages too.
    #[serde(default)]
    pub all_mail: bool,
    pub workers: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// The spamc binary. Found on `PATH` by default.
    pub program: Option<PathBuf>,
    /// Extra arguments for every invocation, e.g. `["-d", "spamhost"]`.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A log4rs configuration file to use instead of the built-in setup.
    pub config_file: Option<PathBuf>,
    /// Log to syslog when not attached to a terminal.
    #[serde(default)]
    pub syslog: bool,
}

impl SweepConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path).map_err(|source| Error::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_slice(&data).map_err(|source| Error::ConfigSyntax {
            path: path.display().to_string(),
            source,
        })
    }
}
