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

//! The two things the program actually does: sweeping mailboxes for spam,
//! and teaching the classifier from a mailbox of known spam.
//!
//! Both are written against `MailboxSession` and `Classifier` rather than
//! the concrete IMAP client and spamc, and both absorb the errors that only
//! affect one mailbox or one message. Only errors that make the session
//! unusable come back out.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::imap::model::Uid;

#[cfg(test)]
mod fake;
pub mod learn;
pub mod scan;

/// What to do with messages found to be spam.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Copy into the spam mailbox, then remove from the original.
    Move,
    /// Just remove.
    Delete,
}

impl Default for Action {
    fn default() -> Self {
        Action::Move
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "move" => Ok(Action::Move),
            "delete" => Ok(Action::Delete),
            _ => Err(format!(
                "Invalid action '{}'; must be 'move' or 'delete'",
                s
            )),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Action::Move => write!(f, "move"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub action: Action,
    /// Where `Action::Move` puts spam.
    pub spam_dir: String,
    /// The mailboxes to sweep, in order.
    pub mailboxes: Vec<String>,
    /// Only consider messages without the `\Seen` flag.
    pub only_unread: bool,
    /// Classify and report, but don't touch anything.
    pub dry_run: bool,
}

/// The classifier's opinion of one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub uid: Uid,
    pub is_spam: bool,
    pub score: String,
    /// Set if the classifier could not be consulted, in which case the
    /// message is assumed not to be spam.
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailboxOutcome {
    /// The mailbox could not be examined at all.
    Skipped(String),
    /// No spam was found, so nothing was done.
    Clean,
    /// Spam was found but left alone because this is a dry run.
    Untouched,
    /// The spam was removed (and copied, if moving).
    Removed,
    /// Spam was found, but removing it failed.
    MutationFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxReport {
    pub mailbox: String,
    /// How many messages the search turned up.
    pub candidates: usize,
    pub verdicts: Vec<Verdict>,
    pub outcome: MailboxOutcome,
}

impl MailboxReport {
    /// The UIDs of the messages found to be spam, ascending.
    pub fn spam(&self) -> Vec<Uid> {
        self.verdicts
            .iter()
            .filter(|v| v.is_spam)
            .map(|v| v.uid)
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub mailboxes: Vec<MailboxReport>,
}

impl ScanReport {
    pub fn total_spam(&self) -> usize {
        self.mailboxes.iter().map(|m| m.spam().len()).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LearnReport {
    pub candidates: usize,
    pub learned: usize,
    pub already_learned: usize,
    pub not_learned: usize,
    pub connection_errors: usize,
    /// Messages the classifier could not be run on at all.
    pub failed: usize,
    /// Set if the spam mailbox could not be read.
    pub aborted: Option<String>,
}
