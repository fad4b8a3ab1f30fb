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

//! Parser for the subset of IMAP server responses the sweeper needs to
//! understand.
//!
//! Each input is one *logical* line, i.e., a line together with any literals
//! embedded in it, without the final CRLF. Parsing is zero-copy where
//! possible; the results borrow from the buffer the line was read into.
//!
//! Status responses, `SEARCH`, `EXISTS`, and `FETCH` are understood. Every
//! other untagged response is returned as `Response::Other` so that servers
//! volunteering unsolicited data (`FLAGS`, `RECENT`, `CAPABILITY`, ...) don't
//! derail the session.
//!
//! `FETCH` attributes are parsed generically as key/value pairs, since
//! servers freely add attributes (typically `FLAGS`) that weren't asked for.

use std::borrow::Cow;
use std::str;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case as kw, take, take_while, take_while1},
    character::complete::digit1,
    combinator::{map, map_opt, opt, recognize, rest, value},
    multi::{many0, separated_list},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RespCondType {
    Ok,
    No,
    Bad,
    Bye,
    PreAuth,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CondResponse<'a> {
    pub cond: RespCondType,
    pub code: Option<Cow<'a, str>>,
    pub quip: Cow<'a, str>,
}

/// A generic IMAP data item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value<'a> {
    Nil,
    Number(u32),
    Atom(&'a str),
    String(Cow<'a, [u8]>),
    List(Vec<Value<'a>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse<'a> {
    pub seqnum: u32,
    pub atts: Vec<(&'a str, Value<'a>)>,
}

impl<'a> FetchResponse<'a> {
    /// Look up an attribute by name, case-insensitively.
    pub fn att(&self, name: &str) -> Option<&Value<'a>> {
        self.atts
            .iter()
            .find(|&&(key, _)| key.eq_ignore_ascii_case(name))
            .map(|&(_, ref value)| value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response<'a> {
    Cond(CondResponse<'a>),
    Search(Vec<u32>),
    Exists(u32),
    Fetch(FetchResponse<'a>),
    Continuation(Cow<'a, str>),
    Other(&'a [u8]),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseLine<'a> {
    /// The tag of the command this line completes, or `None` for untagged
    /// and continuation lines.
    pub tag: Option<&'a str>,
    pub response: Response<'a>,
}

impl<'a> ResponseLine<'a> {
    pub fn parse(i: &'a [u8]) -> IResult<&'a [u8], Self> {
        alt((
            map(preceded(tag("* "), untagged), |response| ResponseLine {
                tag: None,
                response,
            }),
            map(preceded(tag("+"), rest), |text: &'a [u8]| ResponseLine {
                tag: None,
                response: Response::Continuation(String::from_utf8_lossy(
                    text.strip_prefix(b" ").unwrap_or(text),
                )),
            }),
            map(
                tuple((command_tag, tag(" "), cond_response)),
                |(t, _, cond)| ResponseLine {
                    tag: Some(t),
                    response: Response::Cond(cond),
                },
            ),
        ))(i)
    }
}

fn is_atom_char(b: u8) -> bool {
    b > b' ' && b < 0x7F && !b"(){%*\"\\]".contains(&b)
}

fn is_value_atom_char(b: u8) -> bool {
    b > b' ' && b < 0x7F && !b"(){\"".contains(&b)
}

fn is_fetch_key_char(b: u8) -> bool {
    is_atom_char(b) && b != b'[' && b != b'<'
}

/// Succeeds without consuming anything if the input is at a word boundary.
fn word_end(i: &[u8]) -> IResult<&[u8], ()> {
    if i.is_empty() || b' ' == i[0] {
        Ok((i, ()))
    } else {
        Err(nom::Err::Error((i, nom::error::ErrorKind::Space)))
    }
}

fn number(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(digit1, |d| str::from_utf8(d).ok().and_then(|s| s.parse().ok()))(
        i,
    )
}

fn command_tag(i: &[u8]) -> IResult<&[u8], &str> {
    map_opt(take_while1(|b| is_atom_char(b) && b != b'+'), |t| {
        str::from_utf8(t).ok()
    })(i)
}

fn cond_type(i: &[u8]) -> IResult<&[u8], RespCondType> {
    terminated(
        alt((
            value(RespCondType::Ok, kw("OK")),
            value(RespCondType::No, kw("NO")),
            value(RespCondType::Bad, kw("BAD")),
            value(RespCondType::Bye, kw("BYE")),
            value(RespCondType::PreAuth, kw("PREAUTH")),
        )),
        word_end,
    )(i)
}

fn cond_response(i: &[u8]) -> IResult<&[u8], CondResponse<'_>> {
    let (i, cond) = cond_type(i)?;
    let (i, code) = opt(preceded(
        tag(" ["),
        terminated(take_while(|b| b != b']'), tag("]")),
    ))(i)?;
    let (i, quip) = opt(preceded(tag(" "), rest))(i)?;

    Ok((
        i,
        CondResponse {
            cond,
            code: code.map(String::from_utf8_lossy),
            quip: String::from_utf8_lossy(quip.unwrap_or_default()),
        },
    ))
}

fn quoted(input: &[u8]) -> IResult<&[u8], Cow<'_, [u8]>> {
    let (body, _) = tag("\"")(input)?;

    let mut unescaped: Option<Vec<u8>> = None;
    let mut ix = 0;
    while ix < body.len() {
        match body[ix] {
            b'"' => {
                let content = match unescaped {
                    Some(v) => Cow::Owned(v),
                    None => Cow::Borrowed(&body[..ix]),
                };
                return Ok((&body[ix + 1..], content));
            }

            b'\\' if ix + 1 < body.len() => {
                unescaped
                    .get_or_insert_with(|| body[..ix].to_vec())
                    .push(body[ix + 1]);
                ix += 2;
            }

            b => {
                if let Some(ref mut v) = unescaped {
                    v.push(b);
                }
                ix += 1;
            }
        }
    }

    Err(nom::Err::Error((input, nom::error::ErrorKind::Escaped)))
}

fn literal(i: &[u8]) -> IResult<&[u8], &[u8]> {
    let (i, len) = delimited(
        preceded(opt(tag("~")), tag("{")),
        number,
        tag("}\r\n"),
    )(i)?;
    take(len as usize)(i)
}

fn atom_value(i: &[u8]) -> IResult<&[u8], Value<'_>> {
    map_opt(take_while1(is_value_atom_char), |a| {
        let a = str::from_utf8(a).ok()?;
        Some(if a.eq_ignore_ascii_case("NIL") {
            Value::Nil
        } else if a.bytes().all(|b| b.is_ascii_digit()) {
            Value::Number(a.parse().ok()?)
        } else {
            Value::Atom(a)
        })
    })(i)
}

fn list(i: &[u8]) -> IResult<&[u8], Vec<Value<'_>>> {
    delimited(tag("("), separated_list(tag(" "), data_value), tag(")"))(i)
}

fn data_value(i: &[u8]) -> IResult<&[u8], Value<'_>> {
    alt((
        map(quoted, Value::String),
        map(literal, |l| Value::String(Cow::Borrowed(l))),
        map(list, Value::List),
        atom_value,
    ))(i)
}

/// Attribute names, including any section specifier and partial origin,
/// e.g. `UID`, `BODY[]`, `BODY[HEADER.FIELDS (FROM)]<0>`.
fn fetch_key(i: &[u8]) -> IResult<&[u8], &str> {
    map_opt(
        recognize(tuple((
            take_while1(is_fetch_key_char),
            opt(delimited(tag("["), take_while(|b| b != b']'), tag("]"))),
            opt(delimited(tag("<"), digit1, tag(">"))),
        ))),
        |k| str::from_utf8(k).ok(),
    )(i)
}

fn msg_atts(i: &[u8]) -> IResult<&[u8], Vec<(&str, Value<'_>)>> {
    delimited(
        tag("("),
        separated_list(
            tag(" "),
            tuple((terminated(fetch_key, tag(" ")), data_value)),
        ),
        tag(")"),
    )(i)
}

fn untagged(i: &[u8]) -> IResult<&[u8], Response<'_>> {
    alt((
        map(
            delimited(
                terminated(kw("SEARCH"), word_end),
                many0(preceded(tag(" "), number)),
                opt(tag(" ")),
            ),
            Response::Search,
        ),
        map(
            terminated(number, terminated(kw(" EXISTS"), word_end)),
            Response::Exists,
        ),
        map(
            tuple((number, kw(" FETCH "), msg_atts)),
            |(seqnum, _, atts)| Response::Fetch(FetchResponse { seqnum, atts }),
        ),
        map(cond_response, Response::Cond),
        map(rest, Response::Other),
    ))(i)
}
