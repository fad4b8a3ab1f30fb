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

//! Wire encoding of mailbox names.
//!
//! RFC 3501 requires mailbox names to be sent in "modified UTF-7": printable
//! ASCII passes through, `&` is escaped as `&-`, and every run of other
//! characters becomes `&`, the base-64 (with `,` in place of `/` and no
//! padding) of its UTF-16BE encoding, and `-`.
//!
//! We only ever *send* mailbox names (the names come from the configuration,
//! never from a LIST response), so there is no decoder.

use std::borrow::Cow;

/// Encode `name` into IMAP modified UTF-7.
///
/// The output is minimal: no shift sequence is emitted for a printable ASCII
/// character, and each run of non-printable characters shares one shift
/// sequence.
pub fn encode(name: &str) -> Cow<'_, str> {
    if name.bytes().all(is_direct) {
        return Cow::Borrowed(name);
    }

    let mut encoded = String::with_capacity(name.len() + 8);
    let mut pending = String::new();

    for ch in name.chars() {
        if ch.is_ascii() && is_direct(ch as u8) {
            flush_shifted(&mut encoded, &mut pending);
            encoded.push(ch);
        } else if '&' == ch {
            flush_shifted(&mut encoded, &mut pending);
            encoded.push_str("&-");
        } else {
            pending.push(ch);
        }
    }

    flush_shifted(&mut encoded, &mut pending);
    Cow::Owned(encoded)
}

fn flush_shifted(dst: &mut String, pending: &mut String) {
    if pending.is_empty() {
        return;
    }

    let mut utf16be = Vec::with_capacity(pending.len() * 2);
    for unit in pending.encode_utf16() {
        utf16be.extend_from_slice(&unit.to_be_bytes());
    }

    dst.push('&');
    dst.push_str(&base64::encode_config(&utf16be, base64::IMAP_MUTF7));
    dst.push('-');
    pending.clear();
}

fn is_direct(byte: u8) -> bool {
    byte >= b' ' && byte < 0x7F && byte != b'&'
}
