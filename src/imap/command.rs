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

//! Serialisation of the commands the sweeper sends.
//!
//! Strings are encoded conservatively. A string is only sent as an atom if it
//! consists entirely of `a-zA-Z0-9?=+/_.-` and is not `NIL`. Otherwise it is
//! sent quoted if it is shorter than 100 bytes and contains nothing but
//! printable ASCII other than `"` and `\`. Everything else is sent as a
//! synchronising literal, which splits the command into several segments:
//! after each segment but the last, the client must wait for the server's
//! continuation request before sending the next.

use std::fmt::Display;
use std::io::Write;

use super::mailbox_name;
use super::model::{Flag, SearchCriterion, UidSet};

#[derive(Clone, Copy, Debug)]
pub enum Command<'a> {
    LogIn { userid: &'a str, password: &'a str },
    Select(&'a str),
    UidSearch(SearchCriterion),
    UidFetchPeek(&'a UidSet),
    UidStore(&'a UidSet, Flag),
    UidCopy(&'a UidSet, &'a str),
    Expunge,
    Close,
    LogOut,
}

impl Command<'_> {
    /// The command name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match *self {
            Command::LogIn { .. } => "LOGIN",
            Command::Select(..) => "SELECT",
            Command::UidSearch(..) => "UID SEARCH",
            Command::UidFetchPeek(..) => "UID FETCH",
            Command::UidStore(..) => "UID STORE",
            Command::UidCopy(..) => "UID COPY",
            Command::Expunge => "EXPUNGE",
            Command::Close => "CLOSE",
            Command::LogOut => "LOGOUT",
        }
    }

    /// Whether the command carries credentials that must never be traced.
    pub fn is_sensitive(&self) -> bool {
        matches!(*self, Command::LogIn { .. })
    }

    /// Render the full command line, including `tag` and the final CRLF, as
    /// a sequence of segments split at synchronising literals.
    pub fn render(&self, tag: &str) -> Vec<Vec<u8>> {
        let mut w = CommandWriter::default();
        w.verbatim(tag);
        w.verbatim(" ");

        match *self {
            Command::LogIn { userid, password } => {
                w.verbatim("LOGIN ");
                w.astring(userid);
                w.verbatim(" ");
                w.astring(password);
            }

            Command::Select(mailbox) => {
                w.verbatim("SELECT ");
                w.mailbox(mailbox);
            }

            Command::UidSearch(criterion) => {
                w.verbatim("UID SEARCH ");
                w.verbatim(criterion.keyword());
            }

            // BODY.PEEK[] rather than BODY[] or RFC822 so that \Seen is left
            // alone.
            Command::UidFetchPeek(uids) => {
                w.verbatim("UID FETCH ");
                w.verbatim(uids);
                w.verbatim(" (UID BODY.PEEK[])");
            }

            Command::UidStore(uids, flag) => {
                w.verbatim("UID STORE ");
                w.verbatim(uids);
                w.verbatim(" +FLAGS.SILENT (");
                w.verbatim(flag);
                w.verbatim(")");
            }

            Command::UidCopy(uids, mailbox) => {
                w.verbatim("UID COPY ");
                w.verbatim(uids);
                w.verbatim(" ");
                w.mailbox(mailbox);
            }

            Command::Expunge => w.verbatim("EXPUNGE"),
            Command::Close => w.verbatim("CLOSE"),
            Command::LogOut => w.verbatim("LOGOUT"),
        }

        w.finish()
    }
}

#[derive(Default)]
struct CommandWriter {
    segments: Vec<Vec<u8>>,
    current: Vec<u8>,
}

impl CommandWriter {
    fn verbatim(&mut self, s: impl Display) {
        // Writing to a Vec can't fail
        let _ = write!(self.current, "{}", s);
    }

    fn mailbox(&mut self, name: &str) {
        self.astring(&mailbox_name::encode(name));
    }

    fn astring(&mut self, s: &str) {
        if is_conservative_atom(s) {
            self.verbatim(s);
        } else if is_quotable(s) {
            self.verbatim(format_args!("\"{}\"", s));
        } else {
            self.literal(s.as_bytes());
        }
    }

    fn literal(&mut self, data: &[u8]) {
        self.verbatim(format_args!("{{{}}}\r\n", data.len()));
        let finished = std::mem::replace(&mut self.current, data.to_vec());
        self.segments.push(finished);
    }

    fn finish(mut self) -> Vec<Vec<u8>> {
        self.current.extend_from_slice(b"\r\n");
        self.segments.push(self.current);
        self.segments
    }
}

fn is_conservative_atom(s: &str) -> bool {
    !"nil".eq_ignore_ascii_case(s)
        && !s.is_empty()
        && s.bytes().all(|b| {
            matches!(
                b,
                b'a'..=b'z'
                    | b'A'..=b'Z'
                    | b'0'..=b'9'
                    | b'='
                    | b'?'
                    | b'/'
                    | b'+'
                    | b'_'
                    | b'.'
                    | b'-'
            )
        })
}

fn is_quotable(s: &str) -> bool {
    s.len() < 100
        && s.bytes().all(|b| match b {
            0..=31 | 127..=255 | b'\\' | b'"' => false,
            _ => true,
        })
}
