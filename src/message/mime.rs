// testmsg – generator of valid, optionally DKIM-signed test email messages
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! MIME encoding helpers.

use crate::util::{self, CanonicalStr};
use base64ct::{Base64, Encoding};
use bstr::ByteSlice;

const CRLF: &[u8] = b"\r\n";

/// Maximum line length in octets, excluding CRLF (RFC 5322, §2.1.1).
pub const MAX_LINE_LENGTH: usize = 998;

/// Preferred header line width (RFC 5322, §2.1.1).
const FOLD_WIDTH: usize = 78;

/// Line width of Base64 content (RFC 2045, §6.8).
pub const BASE64_LINE_WIDTH: usize = 76;

// encoded-word overhead is `=?utf-8?b?` + `?=`
const ENCODED_WORD_CHUNK: usize = 45;

/// A content transfer encoding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Base64,
}

impl CanonicalStr for TransferEncoding {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Base64 => "base64",
        }
    }
}

/// Encodes body text for transmission.
///
/// Line endings (CRLF, LF, and lone CR) become CRLF and the text always ends
/// with a line terminator. ASCII text with short lines stays `7bit`, other
/// UTF-8 text with short lines is sent `8bit`, and anything with over-long
/// lines is Base64-encoded.
pub fn encode_text(text: &str) -> (Box<[u8]>, TransferEncoding) {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut normalized = Vec::with_capacity(text.len() + 2);
    let mut longest = 0;
    for line in text.lines() {
        longest = longest.max(line.len());
        normalized.extend(line.as_bytes());
        normalized.extend(CRLF);
    }
    if normalized.is_empty() {
        normalized.extend(CRLF);
    }

    if longest > MAX_LINE_LENGTH {
        (encode_base64_lines(&normalized).into(), TransferEncoding::Base64)
    } else if normalized.is_ascii() {
        (normalized.into(), TransferEncoding::SevenBit)
    } else {
        (normalized.into(), TransferEncoding::EightBit)
    }
}

/// Encodes binary content as Base64, wrapped in CRLF-terminated lines.
pub fn encode_base64_lines(content: &[u8]) -> Vec<u8> {
    let encoded = Base64::encode_string(content);

    let mut result = Vec::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH * 2 + 2);
    for line in encoded.as_bytes().chunks(BASE64_LINE_WIDTH) {
        result.extend(line);
        result.extend(CRLF);
    }
    result
}

/// Encodes the value of header field `name` for transmission.
///
/// Non-ASCII values become RFC 2047 encoded-words, one per continuation line.
/// ASCII values are folded at spaces so that lines stay within 78 columns
/// where the words allow it. Returns `None` if a line would still exceed the
/// 998 octet limit.
pub fn encode_header_value(name: &str, value: &str) -> Option<String> {
    let encoded = if value.is_ascii() {
        fold_at_spaces(name.len() + 2, value)
    } else {
        encode_words(value)
    };

    // the first line also holds "Name: "
    let fits = encoded
        .split("\r\n")
        .enumerate()
        .all(|(i, line)| line.len() + if i == 0 { name.len() + 2 } else { 0 } <= MAX_LINE_LENGTH);

    fits.then_some(encoded)
}

fn encode_words(value: &str) -> String {
    let mut words = vec![];
    let mut rest = value;
    while !rest.is_empty() {
        let mut end = rest.len().min(ENCODED_WORD_CHUNK);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let chunk;
        (chunk, rest) = rest.split_at(end);
        words.push(format!("=?utf-8?b?{}?=", util::encode_base64(chunk)));
    }

    words.join("\r\n ")
}

// A fold replaces the space before a word, so unfolding restores the value.
// Folds only go before non-empty words: no continuation line is blank.
fn fold_at_spaces(first_line_len: usize, value: &str) -> String {
    let mut result = String::with_capacity(value.len() + value.len() / FOLD_WIDTH * 2);
    let mut words = value.split(' ');

    let first = words.next().unwrap_or_default();
    result.push_str(first);
    let mut line_len = first_line_len + first.len();

    for word in words {
        if !word.is_empty() && line_len + 1 + word.len() > FOLD_WIDTH {
            result.push_str("\r\n ");
            line_len = 1 + word.len();
        } else {
            result.push(' ');
            line_len += 1 + word.len();
        }
        result.push_str(word);
    }

    result
}

/// Chooses a multipart boundary that occurs in none of the given parts.
pub fn make_boundary<'a, I>(parts: I) -> Result<String, getrandom::Error>
where
    I: IntoIterator<Item = &'a [u8]> + Clone,
{
    loop {
        let token = util::random_u64()? % 10_000_000_000_000_000_000;
        let boundary = format!("==============={token:019}==");

        if !parts.clone().into_iter().any(|part| part.contains_str(&boundary)) {
            return Ok(boundary);
        }
    }
}
