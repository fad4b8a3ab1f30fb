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

//! Process exit statuses.
//!
//! The sweeper itself only ever exits with `EX_OK` or `EX_FATAL`. The
//! `sysexits.h` values are here because spamc reports its own failures with
//! them.

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_OK: Sysexit = Sysexit(0);
/// Bad configuration, or failure to connect or log in.
pub const EX_FATAL: Sysexit = Sysexit(1);

pub const EX_UNAVAILABLE: Sysexit = Sysexit(69);
pub const EX_IOERR: Sysexit = Sysexit(74);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}
