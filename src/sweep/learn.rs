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

//! Teaching the classifier from a mailbox of known spam.

use log::{error, info, warn};

use super::LearnReport;
use crate::classify::{Classifier, TrainOutcome};
use crate::imap::model::{SearchCriterion, UidSet};
use crate::imap::session::{Error, MailboxSession};
use crate::support::log_prefix::LogPrefix;
use crate::support::threading::WorkerPool;

/// Feed every message in `spam_dir` to the classifier as spam.
///
/// The mailbox itself is never modified. If it can't be read, learning is
/// abandoned and the reason recorded in the report; only errors which make
/// the session unusable are returned.
pub fn run(
    session: &mut impl MailboxSession,
    classifier: &impl Classifier,
    pool: &WorkerPool,
    spam_dir: &str,
    log_prefix: &LogPrefix,
) -> Result<LearnReport, Error> {
    let prefix = format!("{} {}", log_prefix, spam_dir);
    info!("{} Learning spam", prefix);

    match learn(session, classifier, pool, spam_dir, &prefix) {
        Ok(report) => Ok(report),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!("{} Can't read spam mailbox, aborting: {}", prefix, e);
            Ok(LearnReport {
                aborted: Some(e.to_string()),
                ..LearnReport::default()
            })
        }
    }
}

fn learn(
    session: &mut impl MailboxSession,
    classifier: &impl Classifier,
    pool: &WorkerPool,
    spam_dir: &str,
    prefix: &str,
) -> Result<LearnReport, Error> {
    session.select(spam_dir)?;
    let uids = match UidSet::of(session.search(SearchCriterion::All)?) {
        Some(uids) => uids,
        None => {
            info!("{} Nothing to learn", prefix);
            return Ok(LearnReport::default());
        }
    };

    let mut fetched = session.fetch_peek(&uids)?;
    let mut report = LearnReport {
        candidates: uids.len(),
        ..LearnReport::default()
    };

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

    let outcomes = pool.run_all(work, |(uid, message)| {
        (uid, classifier.train(&message))
    });

    for (uid, outcome) in outcomes {
        match outcome {
            Ok(TrainOutcome::Learned) => report.learned += 1,
            Ok(TrainOutcome::AlreadyLearned) => report.already_learned += 1,
            Ok(TrainOutcome::NotLearned) => report.not_learned += 1,
            Ok(TrainOutcome::ConnectionError) => {
                warn!(
                    "{} Could not learn UID {}: error connecting to spamd",
                    prefix, uid
                );
                report.connection_errors += 1;
            }
            Err(e) => {
                warn!("{} Could not learn UID {}: {}", prefix, uid, e);
                report.failed += 1;
            }
        }
    }

    info!("{} Learned {} new messages", prefix, report.learned);
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::super::fake::*;
    use super::*;

    fn learn(
        session: &mut RecordingSession,
        log: &CallLog,
    ) -> Result<LearnReport, Error> {
        crate::init_test_log();
        run(
            session,
            &FakeClassifier::new(log),
            &WorkerPool::new(2),
            "Spam",
            &LogPrefix::new("azure", "localhost"),
        )
    }

    #[test]
    fn counts_each_outcome() {
        let log = CallLog::default();
        let mut session = RecordingSession::new(&log).with_mailbox(
            "Spam",
            &[
                (1, "pills", true),
                (2, "already seen this", false),
                (3, "watches", true),
                (4, "unreachable", true),
                (5, "junk", true),
                (6, "BROKEN", true),
                (7, "prize", true),
            ],
        );
        let report = learn(&mut session, &log).unwrap();

        assert_eq!(
            LearnReport {
                candidates: 7,
                learned: 3,
                already_learned: 1,
                not_learned: 1,
                connection_errors: 1,
                failed: 1,
                aborted: None,
            },
            report
        );

        let calls = calls(&log);
        assert_eq!(
            vec![
                Call::Select("Spam".to_owned()),
                Call::Search(SearchCriterion::All),
                Call::FetchPeek(vec![1, 2, 3, 4, 5, 6, 7]),
            ],
            calls[..3].to_vec()
        );
        assert_eq!(10, calls.len());
        assert!(calls[3..].iter().all(|c| matches!(*c, Call::Train(..))));
    }

    #[test]
    fn mailbox_is_not_modified() {
        let log = CallLog::default();
        let mut session = RecordingSession::new(&log)
            .with_mailbox("Spam", &[(1, "pills", false), (2, "prize", true)]);
        learn(&mut session, &log).unwrap();

        assert_eq!(vec![1, 2], session.uids_in("Spam"));
        assert_eq!(vec![1], session.unseen_in("Spam"));
    }

    #[test]
    fn empty_mailbox_fetches_nothing() {
        let log = CallLog::default();
        let mut session = RecordingSession::new(&log).with_mailbox("Spam", &[]);
        let report = learn(&mut session, &log).unwrap();

        assert_eq!(LearnReport::default(), report);
        assert_eq!(
            vec![
                Call::Select("Spam".to_owned()),
                Call::Search(SearchCriterion::All),
            ],
            calls(&log)
        );
    }

    #[test]
    fn missing_mailbox_aborts() {
        let log = CallLog::default();
        let mut session = RecordingSession::new(&log);
        let report = learn(&mut session, &log).unwrap();

        assert!(report.aborted.is_some());
        assert_eq!(0, report.learned);
        assert_eq!(vec![Call::Select("Spam".to_owned())], calls(&log));
    }

    #[test]
    fn fetch_failure_aborts() {
        let log = CallLog::default();
        let mut session =
            RecordingSession::new(&log).with_mailbox("Spam", &[(1, "x", true)]);
        session.refuse.insert("FETCH");
        let report = learn(&mut session, &log).unwrap();

        assert!(report.aborted.is_some());
        assert!(!calls(&log).iter().any(|c| matches!(*c, Call::Train(..))));
    }

    #[test]
    fn connection_failure_is_fatal() {
        let log = CallLog::default();
        let mut session =
            RecordingSession::new(&log).with_mailbox("Spam", &[(1, "x", true)]);
        session.hang_up_on = Some("SEARCH");
        assert_matches!(Err(Error::Bye(_)), learn(&mut session, &log));
    }
}
