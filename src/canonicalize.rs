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

//! Canonicalization of header fields and body as described in RFC 6376,
//! §3.4.
//!
//! Only CRLF is recognised as line terminator. Stray CR and LF are treated
//! like any other byte.

use crate::{
    header::{FieldName, HeaderFields},
    message::EmailMessage,
    signature::{Canonicalization, CanonicalizationAlgorithm},
};
use bstr::ByteSlice;
use std::collections::HashSet;

const SP: u8 = b' ';
const CRLF: [u8; 2] = [b'\r', b'\n'];

/// Produces the canonical header block and canonical body of a message.
///
/// Only the headers named in `header_names` are included, in that order. Each
/// name selects the bottom-most occurrence not yet used; absent headers are
/// skipped. Every canonical header line is terminated with CRLF.
pub fn canonicalize(
    message: &EmailMessage,
    header_names: &[FieldName],
    canonicalization: Canonicalization,
) -> (Vec<u8>, Vec<u8>) {
    let headers = canonicalize_headers(canonicalization.header, message.headers(), header_names);
    let body = canonicalize_body(canonicalization.body, &message.body());
    (headers, body)
}

/// Produces the body canonicalization result for a complete body.
pub fn canonicalize_body(algorithm: CanonicalizationAlgorithm, body: &[u8]) -> Vec<u8> {
    let mut lines: Vec<&[u8]> = body.split_str(&CRLF).collect();

    // the remainder after the final CRLF is not a line
    if matches!(lines.last(), Some(l) if l.is_empty()) {
        lines.pop();
    }

    let mut result = Vec::with_capacity(body.len() + 2);
    let mut empty_lines = 0;

    for line in lines {
        let start = result.len();
        match algorithm {
            CanonicalizationAlgorithm::Simple => result.extend(line),
            CanonicalizationAlgorithm::Relaxed => compress_wsp(&mut result, line),
        }

        if result.len() == start {
            // defer empty lines until there is content after them
            empty_lines += 1;
            continue;
        }

        let content = result.split_off(start);
        for _ in 0..empty_lines {
            result.extend(CRLF);
        }
        empty_lines = 0;
        result.extend(content);
        result.extend(CRLF);
    }

    if result.is_empty() && algorithm == CanonicalizationAlgorithm::Simple {
        // an empty body is a single CRLF in simple canonicalization
        result.extend(CRLF);
    }

    result
}

// reduce WSP runs to one SP, drop WSP at end of line
fn compress_wsp(result: &mut Vec<u8>, line: &[u8]) {
    fn is_wsp(b: u8) -> bool {
        matches!(b, b'\t' | b' ')
    }

    let mut pending_sp = false;
    for &b in line {
        if is_wsp(b) {
            pending_sp = true;
        } else {
            if pending_sp {
                result.push(SP);
                pending_sp = false;
            }
            result.push(b);
        }
    }
}

/// Produces the header canonicalization result for some header fields.
pub fn canonicalize_headers(
    canon_alg: CanonicalizationAlgorithm,
    headers: &HeaderFields,
    selected_headers: &[FieldName],
) -> Vec<u8> {
    let mut result = vec![];
    let mut processed_indexes = HashSet::with_capacity(selected_headers.len());

    for selected_header in selected_headers {
        let found = headers
            .iter()
            .enumerate()
            .rev()
            .find(|(i, (name, _))| name == selected_header && !processed_indexes.contains(i));

        if let Some((i, (name, val))) = found {
            canonicalize_header(&mut result, canon_alg, name, val);
            result.extend(CRLF);
            processed_indexes.insert(i);
        }
    }

    result
}

/// Canonicalizes a header field into some result vector.
pub fn canonicalize_header(
    result: &mut Vec<u8>,
    algorithm: CanonicalizationAlgorithm,
    name: impl AsRef<str>,
    value: impl AsRef<[u8]>,
) {
    let name = name.as_ref();
    let value = value.as_ref();

    match algorithm {
        CanonicalizationAlgorithm::Simple => {
            result.extend(name.bytes());
            result.push(b':');
            result.extend(value);
        }
        CanonicalizationAlgorithm::Relaxed => {
            result.extend(name.to_ascii_lowercase().bytes());
            result.push(b':');
            canonicalize_header_relaxed(result, value);
        }
    }
}

fn canonicalize_header_relaxed(canon_headers: &mut Vec<u8>, value: &[u8]) {
    fn is_space(c: char) -> bool {
        matches!(c, ' ' | '\t' | '\r' | '\n')
    }

    let value = value.trim_with(is_space);

    let mut compressing = false;
    for &b in value {
        if is_space(b.into()) {
            if !compressing {
                canon_headers.push(SP);
                compressing = true;
            }
        } else {
            canon_headers.push(b);
            compressing = false;
        }
    }
}
