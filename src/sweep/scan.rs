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

//! Sweeping mailboxes for spam.

use log::{debug, info, warn};

use super::{
    Action, MailboxOutcome, MailboxReport, ScanOptions, ScanReport, Verdict,
};
use crate::classify::Classifier;
use crate::imap::model::{Flag, SearchCriterion, UidSet};
use crate::imap::session::{Error, MailboxSession};
use crate::support::log_prefix::LogPrefix;
use crate::support::threading::WorkerPool;

/// Sweep every mailbox in `options.mailboxes`, in order.
///
/// A mailbox the server won't let us examine is skipped, and a failure to
/// remove spam is logged and otherwise ignored; both are recorded in the
/// report. The only errors returned are those after which the session is
/// unusable.
pub fn run(
    session: &mut impl MailboxSession,
    classifier: &impl Classifier,
    pool: &WorkerPool,
    options: &ScanOptions,
    log_prefix: &LogPrefix,
) -> Result<ScanReport, Error> {
    let mut report = ScanReport::default();

    for mailbox in &options.mailboxes {
        let prefix = format!("{} {}", log_prefix, mailbox);
        let mailbox_report = match scan_mailbox(
            session, classifier, pool, options, mailbox, &prefix,
        ) {
            Ok(r) => r,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{} Skipping mailbox: {}", prefix, e);
                MailboxReport {
                    mailbox: mailbox.clone(),
                    candidates: 0,
                    verdicts: vec![],
                    outcome: MailboxOutcome::Skipped(e.to_string()),
                }
            }
        };

        report.mailboxes.push(mailbox_report);
    }

    Ok(report)
}

fn scan_mailbox(
    session: &mut impl MailboxSession,
    classifier: &impl Classifier,
    pool: &WorkerPool,
    options: &ScanOptions,
    mailbox: &str,
    prefix: &str,
) -> Result<MailboxReport, Error> {
    session.select(mailbox)?;
    let criterion = if options.only_unread {
        SearchCriterion::Unseen
    } else {
        SearchCriterion::All
    };
    let uids = session.search(criterion)?;
    let candidates = uids.len();
    info!("{} Found {} candidate messages", prefix, candidates);

    let uids = match UidSet::of(uids) {
        Some(uids) => uids,
        None => {
            return Ok(MailboxReport {
                mailbox: mailbox.to_owned(),
                candidates: 0,
                verdicts: vec![],
                outcome: MailboxOutcome::Clean,
            })
        }
    };

    let mut fetched = session.fetch_peek(&uids)?;
    let mut work = Vec::with_capacity(fetched.len());
    for uid in uids.iter() {
        match fetched.remove(&uid) {
            Some(message) => work.push((uid, message)),
            None => warn!(
                "{} UID {} disappeared before it could be fetched",
                prefix, uid
            ),
        }
    }

    let verdicts = pool.run_all(work, |(uid, message)| {
        match classifier.classify(&message) {
            Ok(classification) => {
                debug!(
                    "{} UID {} scored {}{}",
                    prefix,
                    uid,
                    classification.score,
                    if classification.is_spam { " (spam)" } else { "" }
                );
                Verdict {
                    uid,
                    is_spam: classification.is_spam,
                    score: classification.score,
                    error: None,
                }
            }
            Err(e) => {
                warn!("{} UID {} could not be classified: {}", prefix, uid, e);
                Verdict {
                    uid,
                    is_spam: false,
                    score: String::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    });

    let spam = UidSet::of(verdicts.iter().filter(|v| v.is_spam).map(|v| v.uid));
    let outcome = if options.dry_run {
        match spam {
            None => MailboxOutcome::Clean,
            Some(ref spam) => {
                info!(
                    "{} Dry run, leaving {} spam messages in place: {}",
                    prefix,
                    spam.len(),
                    spam
                );
                MailboxOutcome::Untouched
            }
        }
    } else {
        // The UIDs are only meaningful in this mailbox, so make certain it is
        // the one selected before acting on them.
        match session.select(mailbox) {
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    "{} Can't re-select mailbox, leaving it alone: {}",
                    prefix, e
                );
                MailboxOutcome::Skipped(e.to_string())
            }
            Ok(_) => match spam {
                None => MailboxOutcome::Clean,
                Some(ref spam) => match remove(session, spam, options, prefix) {
                    Ok(()) => MailboxOutcome::Removed,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(
                            "{} Failed to remove spam ({}): {}",
                            prefix, spam, e
                        );
                        MailboxOutcome::MutationFailed(e.to_string())
                    }
                },
            },
        }
    };

    Ok(MailboxReport {
        mailbox: mailbox.to_owned(),
        candidates,
        verdicts,
        outcome,
    })
}

fn remove(
    session: &mut impl MailboxSession,
    spam: &UidSet,
    options: &ScanOptions,
    prefix: &str,
) -> Result<(), Error> {
    if Action::Move == options.action {
        match session.copy_to(spam, &options.spam_dir) {
            Ok(()) => (),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(
                "{} Failed to copy spam to {}, deleting anyway: {}",
                prefix, options.spam_dir, e
            ),
        }
    }

    session.store_flag(spam, Flag::Deleted)?;
    session.expunge()?;
    info!("{} Removed {} spam messages: {}", prefix, spam.len(), spam);
    Ok(())
}
