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

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use log::{debug, error, info, LevelFilter};
use structopt::StructOpt;

use super::connect::connect;
use super::settings::Settings;
use crate::classify::Spamc;
use crate::imap::session::MailboxSession;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::sweep_config::SweepConfig;
use crate::support::sysexits::*;
use crate::support::threading::WorkerPool;
use crate::sweep::{self, Action, LearnReport, ScanReport};

// Once logging is set up, fatal errors need to go there rather than to
// stderr, which may not be watched when running from cron.
macro_rules! fatal {
    ($ex:ident, $($stuff:tt)*) => {{
        error!($($stuff)*);
        crate::support::sysexits::$ex.exit()
    }}
}

/// Detects and removes spam from IMAP mailboxes.
///
/// Each message is checked with spamc, and those found to be spam are moved
/// to the spam mailbox or deleted outright. Messages are fetched without
/// marking them as read.
///
/// With --learn, the messages in the spam mailbox are instead fed to spamc
/// as known spam. This requires spamd to be run with --allow-tell.
#[derive(StructOpt, Debug, Default)]
#[structopt(max_term_width = 80)]
pub(super) struct Options {
    /// The IMAP server to connect to.
    #[structopt(long, short)]
    pub(super) server: Option<String>,
    /// The port to connect to [default: 143, or 993 with --ssl]
    #[structopt(long, short)]
    pub(super) port: Option<u16>,
    /// Connect with TLS.
    #[structopt(long)]
    pub(super) ssl: bool,
    /// Don't verify the server's TLS certificate.
    #[structopt(long)]
    pub(super) allow_insecure_tls_connections: bool,

    /// The user to log in as.
    #[structopt(long, short)]
    pub(super) user: Option<String>,
    /// The password to log in with. If not given here or in the
    /// configuration file, it is prompted for.
    #[structopt(long, short = "w")]
    pub(super) password: Option<String>,
    /// Log in as DOMAIN\USER, as some Exchange servers require.
    #[structopt(long)]
    pub(super) domain: Option<String>,

    /// Instead of looking for spam, learn the messages in the spam mailbox
    /// as spam.
    #[structopt(long, short)]
    pub(super) learn: bool,
    /// What to do with spam: move or delete [default: move]
    #[structopt(long, short)]
    pub(super) method: Option<Action>,
    /// The mailbox spam is moved to, and learnt from [default: Spam]
    #[structopt(long, short = "d")]
    pub(super) spam_dir: Option<String>,
    /// Another mailbox to check besides INBOX. Can be passed multiple times.
    #[structopt(long, short = "b", number_of_values(1))]
    pub(super) mailboxes: Vec<String>,
    /// Check all messages, not just unread ones.
    #[structopt(long)]
    pub(super) all_mail: bool,
    /// How many messages to check at once [default: 5]
    #[structopt(long)]
    pub(super) workers: Option<usize>,
    /// Report what was found and don't change anything.
    #[structopt(long)]
    pub(super) dry_run: bool,

    /// The spamc binary to run [default: spamc]
    #[structopt(long, parse(from_os_str))]
    pub(super) classifier: Option<PathBuf>,
    /// An extra argument to pass to spamc, e.g. --classifier-arg=-d
    /// --classifier-arg=spamhost. Can be passed multiple times.
    #[structopt(long, number_of_values(1), allow_hyphen_values = true)]
    pub(super) classifier_arg: Vec<String>,

    /// Be more verbose. Can be passed up to three times.
    #[structopt(long, short, parse(from_occurrences))]
    pub(super) verbose: u32,
    /// Dump a trace of the IMAP connection to standard error.
    #[structopt(long)]
    pub(super) trace: bool,
    /// Log to syslog instead of standard error, unless attached to a
    /// terminal.
    #[structopt(long)]
    pub(super) syslog: bool,
    /// Read settings from this TOML file. Command-line options take
    /// precedence.
    #[structopt(long, short, parse(from_os_str))]
    pub(super) config: Option<PathBuf>,
}

pub fn main() {
    // Clap's own exit path doesn't let us choose the status
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            }
            Err(e) => {
                eprintln!("{}", e.message);
                EX_FATAL.exit()
            }
        });

    let config = match options.config {
        Some(ref path) => match SweepConfig::load(path) {
            Ok(config) => config,
            Err(e) => die!(EX_FATAL, "{}", e),
        },
        None => SweepConfig::default(),
    };

    let settings = match Settings::resolve(options, config) {
        Ok(settings) => settings,
        Err(e) => die!(EX_FATAL, "{}", e),
    };

    init_logging(&settings);

    let password = match password(&settings) {
        Ok(password) => password,
        Err(e) => fatal!(EX_FATAL, "{}", e),
    };

    let log_prefix = LogPrefix::new(&settings.login_name, &settings.host);
    let mut session = match connect(&settings, &password, &log_prefix) {
        Ok(session) => session,
        Err(e) => fatal!(EX_FATAL, "{} {}", log_prefix, e),
    };

    let classifier = Spamc::new(
        settings.classifier_program.clone(),
        settings.classifier_args.clone(),
    );
    let pool = WorkerPool::new(settings.workers);

    debug!(
        "{} Checking up to {} messages at once",
        log_prefix,
        pool.max_workers()
    );

    // A panic in a worker is re-raised here; catch it long enough to log
    // out.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        if settings.learn {
            sweep::learn::run(
                &mut session,
                &classifier,
                &pool,
                &settings.scan.spam_dir,
                &log_prefix,
            )
            .map(|report| report_learn(&report, &log_prefix))
        } else {
            sweep::scan::run(
                &mut session,
                &classifier,
                &pool,
                &settings.scan,
                &log_prefix,
            )
            .map(|report| report_scan(&report, &log_prefix))
        }
    }));

    // Always try to leave cleanly, even if the sweep failed
    if let Err(e) = session.logout() {
        debug!("{} Logout failed: {}", log_prefix, e);
    }

    match result {
        Ok(Ok(())) => EX_OK.exit(),
        Ok(Err(e)) => fatal!(EX_FATAL, "{} {}", log_prefix, Error::from(e)),
        Err(payload) => panic::resume_unwind(payload),
    }
}

fn report_scan(report: &ScanReport, log_prefix: &LogPrefix) {
    for mailbox in &report.mailboxes {
        info!(
            "{} {}: {} spam messages found among {} checked",
            log_prefix,
            mailbox.mailbox,
            mailbox.spam().len(),
            mailbox.candidates
        );
    }

    info!(
        "{} {} spam messages found in total",
        log_prefix,
        report.total_spam()
    );
}

fn report_learn(report: &LearnReport, log_prefix: &LogPrefix) {
    if report.aborted.is_some() {
        return;
    }

    info!(
        "{} Learned {} of {} messages ({} already known, {} not learned, \
         {} failed)",
        log_prefix,
        report.learned,
        report.candidates,
        report.already_learned,
        report.not_learned,
        report.connection_errors + report.failed
    );
}

fn password(settings: &Settings) -> Result<String, Error> {
    if let Some(ref password) = settings.password {
        return Ok(password.clone());
    }

    if Ok(true) != nix::unistd::isatty(0) {
        return Err(Error::Config(
            "No password given and not running interactively".to_owned(),
        ));
    }

    let prompt =
        format!("Password for {}@{}: ", settings.login_name, settings.host);
    Ok(rpassword::read_password_from_tty(Some(prompt.as_str()))?)
}

fn level_filter(verbosity: u32) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logging(settings: &Settings) {
    let level = level_filter(settings.verbosity);

    if let Some(ref log_config_file) = settings.log_config {
        if let Err(e) = log4rs::init_file(
            log_config_file,
            log4rs::config::Deserializers::new(),
        ) {
            die!(
                EX_FATAL,
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
        }
    } else if settings.syslog && Ok(true) != nix::unistd::isatty(2) {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        let logger = match syslog::unix(formatter) {
            Ok(logger) => logger,
            Err(e) => die!(EX_FATAL, "Failed to connect to syslog: {}", e),
        };
        if let Err(e) =
            log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
                .map(|_| log::set_max_level(level))
        {
            die!(EX_FATAL, "Failed to initialise logging: {}", e);
        }
    } else {
        crate::init_simple_log(level);
    }
}
