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

use std::io;

use thiserror::Error;

/// Errors which end the whole run.
///
/// Everything which only affects one mailbox or one message is dealt with
/// where it happens and never gets this far.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Error reading '{path}': {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Error in config file '{path}': {source}")]
    ConfigSyntax {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Login failed: {0}")]
    Auth(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Ssl(#[from] openssl::error::ErrorStack),
    #[error(transparent)]
    Ssl2(#[from] openssl::ssl::Error),
    #[error(transparent)]
    Session(#[from] crate::imap::session::Error),
}
