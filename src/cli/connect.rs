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

//! Establishing the authenticated session.

use std::cell::RefCell;
use std::io::{self, BufRead, Read, Write};
use std::net::{self, ToSocketAddrs};
use std::rc::Rc;

use log::{debug, info};
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslVerifyMode};

use super::settings::Settings;
use crate::imap::client::Client;
use crate::imap::session::MailboxSession;
use crate::imap::session::{self, Greeting, ImapSession};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

pub(super) type RemoteSession = ImapSession<Box<dyn BufRead>, Box<dyn Write>>;

/// Shares one bidirectional stream between a reader and a writer, so that
/// the read half can be put behind a `BufReader`.
struct SharedStream<T>(Rc<RefCell<T>>);

impl<T> Clone for SharedStream<T> {
    fn clone(&self) -> Self {
        SharedStream(Rc::clone(&self.0))
    }
}

impl<T: Read> Read for SharedStream<T> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.0.borrow_mut().read(dst)
    }
}

impl<T: Write> Write for SharedStream<T> {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(src)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

fn split<T: Read + Write + 'static>(
    stream: T,
) -> (Box<dyn BufRead>, Box<dyn Write>) {
    let write = SharedStream(Rc::new(RefCell::new(stream)));
    let read = io::BufReader::new(write.clone());
    (Box::new(read), Box::new(write))
}

/// Connect to the server and log in.
pub(super) fn connect(
    settings: &Settings,
    password: &str,
    log_prefix: &LogPrefix,
) -> Result<RemoteSession, Error> {
    let address = (&settings.host as &str, settings.port)
        .to_socket_addrs()
        .map_err(|e| {
            Error::Connection(format!("Can't resolve {}: {}", settings.host, e))
        })?
        .next()
        .ok_or_else(|| {
            Error::Connection(format!("{}: Host not found", settings.host))
        })?;

    info!("{} Connecting to {}", log_prefix, address);
    let tcp_stream = net::TcpStream::connect(address).map_err(|e| {
        Error::Connection(format!("Can't connect to {}: {}", address, e))
    })?;

    let (read, write) = if settings.ssl {
        let mut connector = SslConnector::builder(SslMethod::tls())?;
        if settings.allow_insecure_tls_connections {
            connector.set_verify(SslVerifyMode::NONE);
        }

        let ssl_stream = connector
            .build()
            .connect(&settings.host, tcp_stream)
            .map_err(|e| match e {
                HandshakeError::SetupFailure(es) => Error::Ssl(es),
                HandshakeError::Failure(f) => Error::Ssl2(f.into_error()),
                HandshakeError::WouldBlock(_) => unreachable!(),
            })?;
        split(ssl_stream)
    } else {
        split(tcp_stream)
    };

    let mut session =
        ImapSession::new(Client::new(read, write, settings.trace));
    log_in(&mut session, &settings.login_name, password, log_prefix)?;
    Ok(session)
}

/// Wait for the greeting on a fresh session, then log in if the server
/// wants us to.
fn log_in<R: BufRead, W: Write>(
    session: &mut ImapSession<R, W>,
    login_name: &str,
    password: &str,
    log_prefix: &LogPrefix,
) -> Result<(), Error> {
    match session.greet().map_err(connection_error)? {
        Greeting::PreAuth => {
            info!("{} Connection is pre-authenticated", log_prefix);
            Ok(())
        }
        Greeting::Ok => match session.log_in(login_name, password) {
            Ok(()) => {
                info!("{} Logged in", log_prefix);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(connection_error(e)),
            Err(e) => {
                if let Err(e) = session.logout() {
                    debug!("{} Logout failed: {}", log_prefix, e);
                }
                Err(Error::Auth(format!(
                    "{} (check your user name and password)",
                    e
                )))
            }
        },
    }
}

fn connection_error(e: session::Error) -> Error {
    Error::Connection(e.to_string())
}
