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

//! The line-level IMAP client.
//!
//! This knows how to frame responses (lines plus any embedded literals), how
//! to send a command that may contain synchronising literals, and how to
//! collect everything the server sends up to the tagged completion of a
//! command. It knows nothing about what the commands mean; that's
//! `session.rs`.

use std::io::{self, BufRead, Read, Write};
use std::str;

use lazy_static::lazy_static;
use regex::bytes::Regex;
use thiserror::Error;

use super::command::Command;
use super::response::ResponseLine;

lazy_static! {
    static ref LITERAL_AT_EOL: Regex =
        Regex::new(r#"~?\{([0-9]+)\}\r\n$"#).unwrap();
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Nom(String),
    #[error("Failed to parse whole response")]
    PartialParse,
}

pub struct Client<R, W> {
    read: R,
    write: W,
    trace: bool,
    next_tag: u64,
}

impl<R: BufRead, W: Write> Client<R, W> {
    /// Create a client over the given halves of a connection.
    ///
    /// If `trace` is set, everything crossing the wire is dumped to standard
    /// error, except for credentials.
    pub fn new(read: R, write: W, trace: bool) -> Self {
        Client {
            read,
            write,
            trace,
            next_tag: 1,
        }
    }

    #[cfg(test)]
    pub fn written(&self) -> &W {
        &self.write
    }

    fn read_line_raw(&mut self, dst: &mut Vec<u8>) -> Result<usize, Error> {
        let start = dst.len();
        let nread = self.read.read_until(b'\n', dst)?;
        self.trace(false, "<<[eol]", &dst[start..]);
        Ok(nread)
    }

    fn read_data_raw(
        &mut self,
        dst: &mut Vec<u8>,
        n: u32,
    ) -> Result<(), Error> {
        let start = dst.len();
        let nread = self.read.by_ref().take(n.into()).read_to_end(dst)?;
        self.trace(true, "<<[lit]", &dst[start..]);
        if n as usize > nread {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Hit EOF before end of literal",
            )));
        }

        Ok(())
    }

    /// Read one line, together with any literals it announces, onto the end
    /// of `dst`.
    pub fn read_logical_line(
        &mut self,
        dst: &mut Vec<u8>,
    ) -> Result<(), Error> {
        loop {
            let nread = self.read_line_raw(dst)?;
            if 0 == nread || !dst.ends_with(b"\r\n") {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Line didn't end with CRLF",
                )));
            }

            let literal_len = LITERAL_AT_EOL
                .captures(&dst[dst.len() - nread..])
                .and_then(|cap| cap.get(1))
                .and_then(|len| str::from_utf8(len.as_bytes()).ok())
                .and_then(|len| len.parse::<u32>().ok());

            match literal_len {
                Some(literal_len) => self.read_data_raw(dst, literal_len)?,
                None => break,
            }
        }

        Ok(())
    }

    /// Read and parse a single response, e.g. the server greeting.
    pub fn read_one_response<'a>(
        &mut self,
        dst: &'a mut Vec<u8>,
    ) -> Result<ResponseLine<'a>, Error> {
        dst.clear();
        self.read_logical_line(dst)?;
        parse_line(&dst[..dst.len() - 2])
    }

    /// Send `command` and collect every response up to and including its
    /// tagged completion.
    ///
    /// The last element of the returned vector is always the tagged response.
    /// Everything in `response_buffer` is discarded first.
    pub fn command<'a>(
        &mut self,
        command: &Command<'_>,
        response_buffer: &'a mut Vec<u8>,
    ) -> Result<Vec<ResponseLine<'a>>, Error> {
        response_buffer.clear();

        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let segments = command.render(&tag);
        let nsegments = segments.len();
        let mut boundaries = vec![0];
        let mut completed_early = false;

        for (ix, segment) in segments.into_iter().enumerate() {
            if command.is_sensitive() {
                self.trace_censored(">>[cmd]", &tag, command.name());
            } else {
                self.trace(false, ">>[cmd]", &segment);
            }
            self.write.write_all(&segment)?;
            self.write.flush()?;

            if ix + 1 == nsegments {
                break;
            }

            // Wait for the continuation request before sending the literal.
            // The server may instead reject the command outright.
            loop {
                let start = response_buffer.len();
                self.read_logical_line(response_buffer)?;
                boundaries.push(response_buffer.len());

                match response_buffer[start] {
                    b'*' => continue,
                    b'+' => break,
                    _ => {
                        completed_early = true;
                        break;
                    }
                }
            }

            if completed_early {
                break;
            }
        }

        if !completed_early {
            loop {
                let start = response_buffer.len();
                self.read_logical_line(response_buffer)?;
                boundaries.push(response_buffer.len());

                if response_buffer[start..].starts_with(tag.as_bytes())
                    && Some(&b' ') == response_buffer.get(start + tag.len())
                {
                    break;
                }
            }
        }

        let response_buffer: &'a Vec<u8> = &*response_buffer;
        boundaries
            .windows(2)
            .map(|w| &response_buffer[w[0]..w[1] - 2])
            .map(parse_line)
            .collect()
    }

    fn trace_censored(&self, what: &str, tag: &str, name: &str) {
        if self.trace {
            eprintln!("WIRE {} {} {} <censored>", what, tag, name);
        }
    }

    fn trace(&self, truncate: bool, what: &str, data: &[u8]) {
        if !self.trace {
            return;
        }

        if data.is_empty() {
            eprintln!("WIRE {}<empty>", what);
            return;
        }

        let (data, truncated) = if truncate {
            data.split_at(data.len().min(128))
        } else {
            (data, &[] as &[u8])
        };

        let mut start = 0;
        for split in memchr::memchr_iter(b'\n', data)
            .chain(std::iter::once(data.len() - 1))
        {
            if split < start {
                continue;
            }

            let line = &data[start..=split];
            start = split + 1;

            let mut vis = String::new();
            for &byte in line {
                match byte {
                    b' '..=b'~' => vis.push(byte as char),
                    b'\n' => vis.push_str("\\n"),
                    b'\r' => vis.push_str("\\r"),
                    b => vis.push_str(&format!("\\x{:02X}", b)),
                }
            }

            eprintln!("WIRE {} {}", what, vis);
        }

        if !truncated.is_empty() {
            eprintln!("WIRE {}<{} more bytes>", what, truncated.len());
        }
    }
}

fn parse_line(line: &[u8]) -> Result<ResponseLine<'_>, Error> {
    let (remaining, r) = ResponseLine::parse(line)
        .map_err(|e| Error::Nom(format!("{:?}", e)))?;
    if !remaining.is_empty() {
        return Err(Error::PartialParse);
    }

    Ok(r)
}
