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

//! Types shared between the IMAP session and the sweep orchestrators.

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;

/// A server-assigned message UID.
///
/// UIDs are scoped to one mailbox; a UID only means something while the
/// mailbox it was obtained from is the selected one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl Uid {
    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

/// A non-empty set of UIDs.
///
/// IMAP has no way to express an empty set, so there is no way to construct
/// one here either. Callers with nothing to operate on simply don't issue the
/// command.
#[derive(Clone, PartialEq, Eq)]
pub struct UidSet {
    uids: BTreeSet<Uid>,
}

impl UidSet {
    /// Collect `uids` into a set, or return `None` if there are none.
    pub fn of(uids: impl IntoIterator<Item = Uid>) -> Option<Self> {
        let uids: BTreeSet<Uid> = uids.into_iter().collect();
        if uids.is_empty() {
            None
        } else {
            Some(UidSet { uids })
        }
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.uids.contains(&uid)
    }

    /// Iterate the UIDs in ascending order.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = Uid> + 'a {
        self.uids.iter().copied()
    }
}

/// Renders the set in the wire format, i.e., a comma-separated list.
impl fmt::Display for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for uid in &self.uids {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{}", uid)?;
        }

        Ok(())
    }
}

impl fmt::Debug for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UidSet[{}]", self)
    }
}

/// Which messages a search should return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchCriterion {
    All,
    Unseen,
}

impl SearchCriterion {
    pub fn keyword(self) -> &'static str {
        match self {
            SearchCriterion::All => "ALL",
            SearchCriterion::Unseen => "UNSEEN",
        }
    }
}

/// The system flags the sweeper has any reason to set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Deleted,
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Deleted => write!(f, "\\Deleted"),
        }
    }
}

/// The complete, undecoded content of a message as returned by the server.
pub type RawMessage = Vec<u8>;
