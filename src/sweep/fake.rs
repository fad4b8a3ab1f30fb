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

//! In-memory stand-ins for the server and the classifier, which record
//! everything done to them in one shared log.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::classify::{self, Classification, Classifier, TrainOutcome};
use crate::imap::model::{Flag, RawMessage, SearchCriterion, Uid, UidSet};
use crate::imap::response::RespCondType;
use crate::imap::session::{Error, MailboxSession};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Select(String),
    Search(SearchCriterion),
    FetchPeek(Vec<u32>),
    StoreFlag(Vec<u32>, Flag),
    CopyTo(Vec<u32>, String),
    Expunge,
    Logout,
    Classify(String),
    Train(String),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

#[derive(Clone, Debug)]
pub struct FakeMessage {
    pub body: String,
    pub seen: bool,
    pub deleted: bool,
}

fn raw(uids: &UidSet) -> Vec<u32> {
    uids.iter().map(|u| u.0.get()).collect()
}

fn rejected(command: &'static str) -> Error {
    Error::Rejected {
        command,
        cond: RespCondType::No,
        quip: format!("{} refused by fake", command),
    }
}

#[derive(Debug, Default)]
pub struct RecordingSession {
    log: CallLog,
    pub mailboxes: HashMap<String, BTreeMap<u32, FakeMessage>>,
    selected: Option<String>,
    /// Operations (by command name) which the server refuses.
    pub refuse: HashSet<&'static str>,
    /// Mailboxes for which SEARCH is refused.
    pub refuse_search_in: HashSet<String>,
    /// An operation (by command name) which kills the connection.
    pub hang_up_on: Option<&'static str>,
    /// UIDs which SEARCH reports but FETCH does not return, as if another
    /// client expunged them in between.
    pub vanishing: HashSet<u32>,
    /// If set, how many more SELECTs succeed before the server starts
    /// refusing them.
    pub selects_allowed: Option<usize>,
}

impl RecordingSession {
    pub fn new(log: &CallLog) -> Self {
        RecordingSession {
            log: Arc::clone(log),
            ..RecordingSession::default()
        }
    }

    /// Add a mailbox containing messages of the form
    /// `(uid, body, seen)`.
    pub fn with_mailbox(
        mut self,
        name: &str,
        messages: &[(u32, &str, bool)],
    ) -> Self {
        self.mailboxes.insert(
            name.to_owned(),
            messages
                .iter()
                .map(|&(uid, body, seen)| {
                    (
                        uid,
                        FakeMessage {
                            body: body.to_owned(),
                            seen,
                            deleted: false,
                        },
                    )
                })
                .collect(),
        );
        self
    }

    pub fn uids_in(&self, mailbox: &str) -> Vec<u32> {
        self.mailboxes[mailbox].keys().copied().collect()
    }

    pub fn unseen_in(&self, mailbox: &str) -> Vec<u32> {
        self.mailboxes[mailbox]
            .iter()
            .filter(|&(_, m)| !m.seen)
            .map(|(&uid, _)| uid)
            .collect()
    }

    fn record(
        &mut self,
        call: Call,
        command: &'static str,
    ) -> Result<(), Error> {
        self.log.lock().unwrap().push(call);

        if Some(command) == self.hang_up_on {
            return Err(Error::Bye("fake server hung up".to_owned()));
        }

        if self.refuse.contains(command) {
            return Err(rejected(command));
        }

        Ok(())
    }

    fn selected_mut(&mut self) -> &mut BTreeMap<u32, FakeMessage> {
        let name = self.selected.clone().expect("No mailbox selected");
        self.mailboxes.get_mut(&name).unwrap()
    }
}

impl MailboxSession for RecordingSession {
    fn select(&mut self, mailbox: &str) -> Result<u32, Error> {
        self.selected = None;
        self.record(Call::Select(mailbox.to_owned()), "SELECT")?;
        if let Some(ref mut allowed) = self.selects_allowed {
            if 0 == *allowed {
                return Err(rejected("SELECT"));
            }
            *allowed -= 1;
        }
        let count = self
            .mailboxes
            .get(mailbox)
            .ok_or_else(|| rejected("SELECT"))?
            .len();
        self.selected = Some(mailbox.to_owned());
        Ok(count as u32)
    }

    fn search(
        &mut self,
        criterion: SearchCriterion,
    ) -> Result<Vec<Uid>, Error> {
        self.record(Call::Search(criterion), "SEARCH")?;
        if self
            .selected
            .as_ref()
            .map_or(false, |s| self.refuse_search_in.contains(s))
        {
            return Err(rejected("SEARCH"));
        }

        Ok(self
            .selected_mut()
            .iter()
            .filter(|&(_, m)| match criterion {
                SearchCriterion::All => true,
                SearchCriterion::Unseen => !m.seen,
            })
            .map(|(&uid, _)| Uid::u(uid))
            .collect())
    }

    fn fetch_peek(
        &mut self,
        uids: &UidSet,
    ) -> Result<BTreeMap<Uid, RawMessage>, Error> {
        self.record(Call::FetchPeek(raw(uids)), "FETCH")?;
        let vanishing = self.vanishing.clone();
        let mailbox = self.selected_mut();
        Ok(uids
            .iter()
            .filter(|uid| !vanishing.contains(&uid.0.get()))
            .filter_map(|uid| {
                mailbox
                    .get(&uid.0.get())
                    .map(|m| (uid, m.body.clone().into_bytes()))
            })
            .collect())
    }

    fn store_flag(&mut self, uids: &UidSet, flag: Flag) -> Result<(), Error> {
        self.record(Call::StoreFlag(raw(uids), flag), "STORE")?;
        let mailbox = self.selected_mut();
        for uid in uids.iter() {
            if let Some(m) = mailbox.get_mut(&uid.0.get()) {
                m.deleted = true;
            }
        }
        Ok(())
    }

    fn copy_to(&mut self, uids: &UidSet, dst: &str) -> Result<(), Error> {
        self.record(Call::CopyTo(raw(uids), dst.to_owned()), "COPY")?;
        if !self.mailboxes.contains_key(dst) {
            return Err(rejected("COPY"));
        }

        let copies: Vec<FakeMessage> = {
            let src = self.selected_mut();
            uids.iter()
                .filter_map(|uid| src.get(&uid.0.get()))
                .map(|m| FakeMessage {
                    deleted: false,
                    ..m.clone()
                })
                .collect()
        };

        let dst = self.mailboxes.get_mut(dst).unwrap();
        for m in copies {
            let next = dst.keys().next_back().copied().unwrap_or(0) + 1;
            dst.insert(next, m);
        }
        Ok(())
    }

    fn expunge(&mut self) -> Result<(), Error> {
        self.record(Call::Expunge, "EXPUNGE")?;
        self.selected_mut().retain(|_, m| !m.deleted);
        Ok(())
    }

    fn logout(&mut self) -> Result<(), Error> {
        self.record(Call::Logout, "LOGOUT")?;
        self.selected = None;
        Ok(())
    }
}

/// A classifier which considers anything mentioning "SPAM" to be spam.
///
/// Training outcomes are likewise chosen by the message text: "already",
/// "unreachable" and "junk" give `AlreadyLearned`, `ConnectionError` and
/// `NotLearned` respectively; anything else is `Learned`. A message
/// containing "BROKEN" makes either operation fail.
pub struct FakeClassifier {
    log: CallLog,
}

impl FakeClassifier {
    pub fn new(log: &CallLog) -> Self {
        FakeClassifier {
            log: Arc::clone(log),
        }
    }

    fn broken(text: &str) -> Result<(), classify::Error> {
        if text.contains("BROKEN") {
            Err(classify::Error::Terminated {
                program: "fake".to_owned(),
            })
        } else {
            Ok(())
        }
    }
}

impl Classifier for FakeClassifier {
    fn classify(
        &self,
        message: &[u8],
    ) -> Result<Classification, classify::Error> {
        let text = String::from_utf8_lossy(message).into_owned();
        self.log.lock().unwrap().push(Call::Classify(text.clone()));
        FakeClassifier::broken(&text)?;

        let is_spam = text.contains("SPAM");
        Ok(Classification {
            is_spam,
            score: if is_spam { "20.0/5.0" } else { "0.1/5.0" }.to_owned(),
        })
    }

    fn train(&self, message: &[u8]) -> Result<TrainOutcome, classify::Error> {
        let text = String::from_utf8_lossy(message).into_owned();
        self.log.lock().unwrap().push(Call::Train(text.clone()));
        FakeClassifier::broken(&text)?;

        Ok(if text.contains("already") {
            TrainOutcome::AlreadyLearned
        } else if text.contains("unreachable") {
            TrainOutcome::ConnectionError
        } else if text.contains("junk") {
            TrainOutcome::NotLearned
        } else {
            TrainOutcome::Learned
        })
    }
}
