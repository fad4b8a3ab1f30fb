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

//! The mailbox session: the sweeper's view of the one IMAP connection.
//!
//! IMAP sessions are stateful and strictly sequential. Every method here
//! takes `&mut self`, so there can never be two commands in flight, and the
//! session cannot be shared with the classification workers.
//!
//! Nothing here remembers which mailbox is selected on behalf of the caller.
//! UIDs are only meaningful relative to the selected mailbox, so callers must
//! `select()` immediately before any sequence of operations that depends on
//! it.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use log::{debug, warn};
use thiserror::Error;

use super::client::{self, Client};
use super::command::Command;
use super::model::{Flag, RawMessage, SearchCriterion, Uid, UidSet};
use super::response::{
    CondResponse, RespCondType, Response, ResponseLine, Value,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection to server failed: {0}")]
    Connection(#[from] client::Error),
    #[error("Server closed the connection: {0}")]
    Bye(String),
    #[error("{command} failed: {cond:?} {quip}")]
    Rejected {
        command: &'static str,
        cond: RespCondType,
        quip: String,
    },
    #[error("Server sent no usable greeting")]
    BadGreeting,
}

impl Error {
    /// Whether the error means the session is unusable.
    ///
    /// Anything else is the server refusing one command, which only affects
    /// the mailbox being worked on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            *self,
            Error::Connection(..) | Error::Bye(..) | Error::BadGreeting
        )
    }
}

/// The operations the sweeper performs against a mailbox store.
pub trait MailboxSession {
    /// Select `mailbox`, returning the number of messages it contains.
    fn select(&mut self, mailbox: &str) -> Result<u32, Error>;

    /// Return the UIDs of messages in the selected mailbox matching
    /// `criterion`.
    fn search(
        &mut self,
        criterion: SearchCriterion,
    ) -> Result<Vec<Uid>, Error>;

    /// Fetch the full content of the given messages in the selected mailbox
    /// without affecting their `\Seen` flag.
    ///
    /// UIDs which no longer exist are simply absent from the result.
    fn fetch_peek(
        &mut self,
        uids: &UidSet,
    ) -> Result<BTreeMap<Uid, RawMessage>, Error>;

    /// Add `flag` to the given messages in the selected mailbox.
    fn store_flag(&mut self, uids: &UidSet, flag: Flag) -> Result<(), Error>;

    /// Copy the given messages from the selected mailbox into `mailbox`.
    fn copy_to(&mut self, uids: &UidSet, mailbox: &str) -> Result<(), Error>;

    /// Permanently remove `\Deleted` messages from the selected mailbox.
    fn expunge(&mut self) -> Result<(), Error>;

    /// End the session.
    fn logout(&mut self) -> Result<(), Error>;
}

/// How the server greeted us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Greeting {
    /// The server wants us to log in.
    Ok,
    /// The connection is already authenticated.
    PreAuth,
}

/// A `MailboxSession` speaking IMAP4rev1 over a `Client`.
pub struct ImapSession<R, W> {
    client: Client<R, W>,
    buffer: Vec<u8>,
    selected: bool,
    logged_out: bool,
}

impl<R: BufRead, W: Write> ImapSession<R, W> {
    pub fn new(client: Client<R, W>) -> Self {
        ImapSession {
            client,
            buffer: Vec::new(),
            selected: false,
            logged_out: false,
        }
    }

    #[cfg(test)]
    pub fn client(&self) -> &Client<R, W> {
        &self.client
    }

    /// Read the server greeting.
    pub fn greet(&mut self) -> Result<Greeting, Error> {
        let greeting = self.client.read_one_response(&mut self.buffer)?;
        match greeting.response {
            Response::Cond(CondResponse {
                cond: RespCondType::Ok,
                ..
            }) => Ok(Greeting::Ok),
            Response::Cond(CondResponse {
                cond: RespCondType::PreAuth,
                ..
            }) => Ok(Greeting::PreAuth),
            Response::Cond(CondResponse {
                cond: RespCondType::Bye,
                quip,
                ..
            }) => Err(Error::Bye(quip.into_owned())),
            _ => Err(Error::BadGreeting),
        }
    }

    /// Authenticate with the `LOGIN` command.
    pub fn log_in(
        &mut self,
        userid: &str,
        password: &str,
    ) -> Result<(), Error> {
        self.run(Command::LogIn { userid, password })?;
        Ok(())
    }

    /// Send `command` and check that it completed successfully.
    ///
    /// On success, the untagged responses are returned.
    fn run(
        &mut self,
        command: Command<'_>,
    ) -> Result<Vec<ResponseLine<'_>>, Error> {
        let mut responses = self.client.command(&command, &mut self.buffer)?;

        // `Client::command` only returns once it has seen a tagged response,
        // which is always last.
        let tagged = responses.pop().map(|r| r.response);

        for r in &responses {
            if let Response::Cond(CondResponse {
                cond: RespCondType::Bye,
                ref quip,
                ..
            }) = r.response
            {
                return Err(Error::Bye(quip.to_string()));
            }
        }

        match tagged {
            Some(Response::Cond(CondResponse {
                cond: RespCondType::Ok,
                ..
            })) => Ok(responses),
            Some(Response::Cond(CondResponse { cond, quip, .. })) => {
                Err(Error::Rejected {
                    command: command.name(),
                    cond,
                    quip: quip.into_owned(),
                })
            }
            // Completion of a command with a continuation instead of a
            // status can't happen since the client doesn't stop there.
            _ => Err(Error::Rejected {
                command: command.name(),
                cond: RespCondType::Bad,
                quip: "Malformed command completion".to_owned(),
            }),
        }
    }
}

impl<R: BufRead, W: Write> MailboxSession for ImapSession<R, W> {
    fn select(&mut self, mailbox: &str) -> Result<u32, Error> {
        // A failed SELECT leaves no mailbox selected
        self.selected = false;
        let responses = self.run(Command::Select(mailbox))?;
        let exists = responses
            .iter()
            .filter_map(|r| match r.response {
                Response::Exists(n) => Some(n),
                _ => None,
            })
            .last()
            .unwrap_or(0);

        self.selected = true;
        Ok(exists)
    }

    fn search(
        &mut self,
        criterion: SearchCriterion,
    ) -> Result<Vec<Uid>, Error> {
        let responses = self.run(Command::UidSearch(criterion))?;
        Ok(responses
            .iter()
            .filter_map(|r| match r.response {
                Response::Search(ref hits) => Some(hits),
                _ => None,
            })
            .flatten()
            .copied()
            .filter_map(Uid::of)
            .collect())
    }

    fn fetch_peek(
        &mut self,
        uids: &UidSet,
    ) -> Result<BTreeMap<Uid, RawMessage>, Error> {
        let responses = self.run(Command::UidFetchPeek(uids))?;
        let mut messages = BTreeMap::new();

        for r in &responses {
            let fetch = match r.response {
                Response::Fetch(ref fetch) => fetch,
                _ => continue,
            };

            let uid = match fetch.att("UID") {
                Some(&Value::Number(uid)) => Uid::of(uid),
                _ => None,
            };
            let body = match fetch.att("BODY[]") {
                Some(&Value::String(ref body)) => Some(body),
                _ => None,
            };

            match (uid, body) {
                (Some(uid), Some(body)) if uids.contains(uid) => {
                    messages.insert(uid, body.to_vec());
                }
                // Unsolicited flag updates and the like
                (_, None) => (),
                (uid, Some(_)) => {
                    warn!(
                        "Ignoring message body for unexpected UID {:?}",
                        uid
                    );
                }
            }
        }

        Ok(messages)
    }

    fn store_flag(&mut self, uids: &UidSet, flag: Flag) -> Result<(), Error> {
        self.run(Command::UidStore(uids, flag))?;
        Ok(())
    }

    fn copy_to(&mut self, uids: &UidSet, mailbox: &str) -> Result<(), Error> {
        self.run(Command::UidCopy(uids, mailbox))?;
        Ok(())
    }

    fn expunge(&mut self) -> Result<(), Error> {
        self.run(Command::Expunge)?;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), Error> {
        if self.logged_out {
            return Ok(());
        }
        self.logged_out = true;

        if self.selected {
            self.selected = false;
            if let Err(e) = self.run(Command::Close) {
                if e.is_fatal() {
                    return Err(e);
                }
                debug!("CLOSE failed: {}", e);
            }
        }

        match self.run(Command::LogOut) {
            Ok(_) => Ok(()),
            // The server is supposed to say BYE before completing LOGOUT
            Err(Error::Bye(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    type ScriptedSession = ImapSession<Cursor<Vec<u8>>, Vec<u8>>;

    fn session(server: &str) -> ScriptedSession {
        ImapSession::new(Client::new(
            Cursor::new(server.as_bytes().to_vec()),
            Vec::new(),
            false,
        ))
    }

    fn written(session: &ScriptedSession) -> String {
        String::from_utf8(session.client().written().clone()).unwrap()
    }

    fn uids(raw: &[u32]) -> UidSet {
        UidSet::of(raw.iter().copied().map(Uid::u)).unwrap()
    }

    #[test]
    fn greeting_and_login() {
        let mut session =
            session("* OK IMAP4rev1 ready\r\nA1 OK LOGIN completed\r\n");
        assert_eq!(Greeting::Ok, session.greet().unwrap());
        session.log_in("azure", "hunter2").unwrap();
        assert_eq!("A1 LOGIN azure hunter2\r\n", written(&session));
    }

    #[test]
    fn preauth_greeting() {
        let mut session = session("* PREAUTH welcome back\r\n");
        assert_eq!(Greeting::PreAuth, session.greet().unwrap());
    }

    #[test]
    fn bye_greeting_is_fatal() {
        let mut session = session("* BYE too busy\r\n");
        let err = session.greet().unwrap_err();
        assert_matches!(Error::Bye(_), err);
        assert!(err.is_fatal());
    }

    #[test]
    fn login_rejected() {
        let mut session = session(
            "* OK ready\r\n\
             A1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n",
        );
        session.greet().unwrap();
        let err = session.log_in("azure", "wrong").unwrap_err();
        assert_matches!(
            Error::Rejected {
                command: "LOGIN",
                cond: RespCondType::No,
                ..
            },
            err
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn select_reports_exists() {
        let mut session = session(
            "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
             * 172 EXISTS\r\n\
             * 1 RECENT\r\n\
             * OK [UIDVALIDITY 3857529045] UIDs valid\r\n\
             A1 OK [READ-WRITE] SELECT completed\r\n",
        );
        assert_eq!(172, session.select("INBOX").unwrap());
        assert_eq!("A1 SELECT INBOX\r\n", written(&session));
    }

    #[test]
    fn select_nonexistent_is_recoverable() {
        let mut session = session("A1 NO [NONEXISTENT] No such mailbox\r\n");
        let err = session.select("Nope").unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn search_collects_uids() {
        let mut session = session(
            "* SEARCH 101 102\r\n\
             * SEARCH 103\r\n\
             A1 OK SEARCH completed\r\n\
             * SEARCH\r\n\
             A2 OK SEARCH completed\r\n",
        );
        assert_eq!(
            vec![Uid::u(101), Uid::u(102), Uid::u(103)],
            session.search(SearchCriterion::Unseen).unwrap()
        );
        assert_eq!(
            Vec::<Uid>::new(),
            session.search(SearchCriterion::All).unwrap()
        );
        assert_eq!(
            "A1 UID SEARCH UNSEEN\r\nA2 UID SEARCH ALL\r\n",
            written(&session)
        );
    }

    #[test]
    fn fetch_peek_maps_uids_to_bodies() {
        let mut session = session(
            "* 1 FETCH (UID 101 BODY[] {5}\r\nhello)\r\n\
             * 2 FETCH (FLAGS (\\Seen) UID 102)\r\n\
             * 3 FETCH (BODY[] {5}\r\nworld UID 103 FLAGS ())\r\n\
             * 9 FETCH (UID 999 BODY[] {4}\r\nnope)\r\n\
             A1 OK FETCH completed\r\n",
        );

        let messages = session.fetch_peek(&uids(&[101, 102, 103])).unwrap();
        assert_eq!(2, messages.len());
        assert_eq!(b"hello".to_vec(), messages[&Uid::u(101)]);
        assert_eq!(b"world".to_vec(), messages[&Uid::u(103)]);
        assert_eq!(
            "A1 UID FETCH 101,102,103 (UID BODY.PEEK[])\r\n",
            written(&session)
        );
    }

    #[test]
    fn mutations() {
        let mut session = session(
            "A1 OK [COPYUID 1 102 7] COPY completed\r\n\
             A2 OK STORE completed\r\n\
             * 2 EXPUNGE\r\n\
             A3 OK EXPUNGE completed\r\n",
        );

        session.copy_to(&uids(&[102]), "Spam").unwrap();
        session.store_flag(&uids(&[102]), Flag::Deleted).unwrap();
        session.expunge().unwrap();
        assert_eq!(
            "A1 UID COPY 102 Spam\r\n\
             A2 UID STORE 102 +FLAGS.SILENT (\\Deleted)\r\n\
             A3 EXPUNGE\r\n",
            written(&session)
        );
    }

    #[test]
    fn untagged_bye_is_fatal() {
        let mut session = session(
            "* BYE Server shutting down\r\n\
             A1 NO shutting down\r\n",
        );
        let err = session.expunge().unwrap_err();
        assert_matches!(Error::Bye(_), err);
        assert!(err.is_fatal());
    }

    #[test]
    fn lost_connection_is_fatal() {
        let mut session = session("* 1 EXISTS\r\n");
        let err = session.select("INBOX").unwrap_err();
        assert_matches!(Error::Connection(_), err);
        assert!(err.is_fatal());
    }

    #[test]
    fn logout_closes_selected_mailbox() {
        let mut session = session(
            "* 0 EXISTS\r\n\
             A1 OK SELECT completed\r\n\
             A2 OK CLOSE completed\r\n\
             * BYE logging out\r\n\
             A3 OK LOGOUT completed\r\n",
        );
        session.select("INBOX").unwrap();
        session.logout().unwrap();
        // Second logout is a no-op
        session.logout().unwrap();
        assert_eq!(
            "A1 SELECT INBOX\r\nA2 CLOSE\r\nA3 LOGOUT\r\n",
            written(&session)
        );
    }

    #[test]
    fn logout_without_selection() {
        let mut session =
            session("* BYE logging out\r\nA1 OK LOGOUT completed\r\n");
        session.logout().unwrap();
        assert_eq!("A1 LOGOUT\r\n", written(&session));
    }
}
