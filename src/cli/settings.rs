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

//! Merging the command line with the configuration file.

use std::path::PathBuf;

use super::main::Options;
use crate::support::error::Error;
use crate::support::sweep_config::SweepConfig;
use crate::support::threading::WorkerPool;
use crate::sweep::ScanOptions;

const IMAP_PORT: u16 = 143;
const IMAPS_PORT: u16 = 993;
const DEFAULT_SPAM_DIR: &str = "Spam";
const DEFAULT_CLASSIFIER: &str = "spamc";

/// Everything needed for one run, fully resolved.
#[derive(Clone, Debug)]
pub(super) struct Settings {
    pub(super) host: String,
    pub(super) port: u16,
    pub(super) ssl: bool,
    pub(super) allow_insecure_tls_connections: bool,
    /// What is actually sent in `LOGIN`; includes the domain if there is one.
    pub(super) login_name: String,
    /// `None` if it still needs to be prompted for.
    pub(super) password: Option<String>,
    pub(super) learn: bool,
    pub(super) scan: ScanOptions,
    pub(super) workers: usize,
    pub(super) classifier_program: PathBuf,
    pub(super) classifier_args: Vec<String>,
    pub(super) verbosity: u32,
    pub(super) trace: bool,
    pub(super) syslog: bool,
    pub(super) log_config: Option<PathBuf>,
}

impl Settings {
    pub(super) fn resolve(
        options: Options,
        config: SweepConfig,
    ) -> Result<Self, Error> {
        let host = options
            .server
            .or(config.server.host)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::Config("No server given (use --server)".to_owned())
            })?;
        let ssl = options.ssl || config.server.ssl;
        let port = options.port.or(config.server.port).unwrap_or(if ssl {
            IMAPS_PORT
        } else {
            IMAP_PORT
        });

        let user = options
            .user
            .or(config.credentials.user)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                Error::Config("No user given (use --user)".to_owned())
            })?;
        let login_name =
            match options.domain.or(config.credentials.domain) {
                Some(ref domain) if !domain.is_empty() => {
                    format!("{}\\{}", domain, user)
                }
                _ => user,
            };

        let workers = options
            .workers
            .or(config.scan.workers)
            .unwrap_or(WorkerPool::DEFAULT_WORKERS);
        if 0 == workers {
            return Err(Error::Config(
                "Number of workers must be at least 1".to_owned(),
            ));
        }

        let extra_mailboxes = if options.mailboxes.is_empty() {
            config.scan.mailboxes
        } else {
            options.mailboxes
        };

        let mut classifier_args = config.classifier.args;
        classifier_args.extend(options.classifier_arg);

        Ok(Settings {
            host,
            port,
            ssl,
            allow_insecure_tls_connections: options
                .allow_insecure_tls_connections
                || config.server.allow_insecure_tls_connections,
            login_name,
            password: options.password.or(config.credentials.password),
            learn: options.learn,
            scan: ScanOptions {
                action: options
                    .method
                    .or(config.scan.action)
                    .unwrap_or_default(),
                spam_dir: options
                    .spam_dir
                    .or(config.scan.spam_dir)
                    .unwrap_or_else(|| DEFAULT_SPAM_DIR.to_owned()),
                mailboxes: mailbox_list(extra_mailboxes),
                only_unread: !(options.all_mail || config.scan.all_mail),
                dry_run: options.dry_run,
            },
            workers,
            classifier_program: options
                .classifier
                .or(config.classifier.program)
                .unwrap_or_else(|| DEFAULT_CLASSIFIER.into()),
            classifier_args,
            verbosity: options.verbose,
            trace: options.trace,
            syslog: options.syslog || config.logging.syslog,
            log_config: config.logging.config_file,
        })
    }
}

/// INBOX, followed by `extra` in order, without duplicates.
fn mailbox_list(extra: Vec<String>) -> Vec<String> {
    let mut mailboxes = vec!["INBOX".to_owned()];
    for mailbox in extra {
        // INBOX is case-insensitive, and is always already present
        let dupe = "INBOX".eq_ignore_ascii_case(&mailbox)
            || mailboxes.iter().any(|m| *m == mailbox);
        if !dupe && !mailbox.is_empty() {
            mailboxes.push(mailbox);
        }
    }
    mailboxes
}

/// Settings for connecting to a plaintext server on localhost.
#[cfg(test)]
pub(super) fn test_settings(port: u16) -> Settings {
    Settings::resolve(
        Options {
            server: Some("127.0.0.1".to_owned()),
            port: Some(port),
            user: Some("azure".to_owned()),
            ..Options::default()
        },
        SweepConfig::default(),
    )
    .unwrap()
}
