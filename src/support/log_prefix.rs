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

use std::fmt;

/// Text included at the start of every log statement about the session,
/// identifying the account being swept.
///
/// This matters when the sweeper runs from cron for several accounts and all
/// of them log to the same place.
#[derive(Clone, Debug)]
pub struct LogPrefix {
    user: String,
    host: String,
}

impl LogPrefix {
    pub fn new(user: &str, host: &str) -> Self {
        Self {
            user: sanitise(user),
            host: sanitise(host),
        }
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "imap[{}@{}]", self.user, self.host)
    }
}

fn sanitise(s: &str) -> String {
    let mut s: String = s.chars().filter(|c| !c.is_control()).collect();
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}
