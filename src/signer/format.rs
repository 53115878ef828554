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

use crate::{
    header::FieldName,
    signature::{Canonicalization, DomainName, Selector, SignatureAlgorithm, DKIM_SIGNATURE_NAME},
    signer::OutputFormat,
    util::{encode_base64, CanonicalStr},
};
use std::iter;

// Note: Careful with offsets: formatting works with *characters*, not bytes!

/// DKIM signature data that does not yet have a cryptographic signature.
pub struct UnsignedDkimSignature<'a> {
    pub algorithm: SignatureAlgorithm,
    pub body_hash: &'a [u8],
    pub canonicalization: Canonicalization,
    pub domain: &'a DomainName,
    pub selector: &'a Selector,
    pub signed_headers: &'a [FieldName],
    pub timestamp: Option<u64>,
}

// Ephemeral context holding current formatting options.
#[derive(Clone, Copy)]
struct Fmt<'a> {
    width: usize,
    indent: &'a str,
    last: bool,
}

/// Formats the signature with an empty *b=* tag, and returns it together with
/// the index where the *b=* tag value is to be inserted.
///
/// The tags always appear in the same order: *v=*, *a=*, *c=*, *d=*, *s=*,
/// *t=* (if present), *h=*, *bh=*, *b=*.
pub fn format_without_signature(
    sig: &UnsignedDkimSignature<'_>,
    format: &OutputFormat,
    b_tag_len: usize,
) -> (String, usize) {
    let fmt = Fmt {
        width: format.width(),
        indent: &format.indentation,
        last: false,
    };

    // The starting point of cursor `i` is just past header name + ':'.
    let mut output = String::new();
    let mut i = DKIM_SIGNATURE_NAME.len() + 1;

    let out = &mut output;
    let i = &mut i;

    format_tag(out, i, fmt, "v", "1");
    format_tag(out, i, fmt, "a", sig.algorithm.canonical_str());
    format_tag(out, i, fmt, "c", sig.canonicalization.canonical_str());
    format_tag(out, i, fmt, "d", sig.domain.as_ref());
    format_tag(out, i, fmt, "s", sig.selector.as_ref());
    if let Some(timestamp) = sig.timestamp {
        format_tag(out, i, fmt, "t", &timestamp.to_string());
    }
    format_tag_h(out, i, fmt, sig.signed_headers);
    format_tag_bh(out, i, fmt, sig.body_hash);

    let insertion_i = format_tag_name_b(out, i, Fmt { last: true, ..fmt }, b_tag_len);

    (output, insertion_i)
}

fn format_tag(out: &mut String, i: &mut usize, fmt: Fmt<'_>, name: &str, value: &str) {
    debug_assert!(name.is_ascii());

    let Fmt { last, .. } = fmt;

    // name + '=' + val [+ ';']
    let taglen = name.len() + value.chars().count() + if last { 1 } else { 2 };

    advance_i_initial(out, i, taglen, fmt);
    out.push_str(name);
    out.push('=');
    out.push_str(value);

    if !last {
        out.push(';');
    }
}

fn format_tag_h(out: &mut String, i: &mut usize, fmt: Fmt<'_>, value: &[FieldName]) {
    let Fmt { last, .. } = fmt;

    let mut names = value.iter().map(|f| f.as_ref()).peekable();

    let Some(first_name) = names.next() else {
        return;
    };

    // "h=" + name [+ ';'/':']
    let taglen = first_name.chars().count() + if names.peek().is_none() && last { 2 } else { 3 };

    advance_i_initial(out, i, taglen, fmt);
    out.push_str("h=");
    out.push_str(first_name);
    // the ;/: matching the cursor is written right away in the next statement

    while let Some(name) = names.next() {
        out.push(':');

        // name [+ ';'/':']
        let len = name.chars().count() + if names.peek().is_none() && last { 0 } else { 1 };

        advance_i(out, i, len, fmt);
        out.push_str(name);
    }

    if !last {
        out.push(';');
    }
}

fn format_tag_bh(out: &mut String, i: &mut usize, fmt: Fmt<'_>, value: &[u8]) {
    let Fmt { last, .. } = fmt;

    let value = encode_base64(value);

    // "bh=" + 1 char (we prefer at least one additional char behind =)
    let taglen = 4;

    advance_i_initial(out, i, taglen, fmt);
    *i -= 1;  // backwards again before the ghost character
    out.push_str("bh=");

    format_chunks_into_string(out, i, fmt, &value);

    // if final chunk makes line *width* chars long, the final ; will be
    // appended nevertheless (giving a width of *width + 1*; this is fine)
    if !last {
        out.push(';');
        *i += 1;
    }
}

fn format_tag_name_b(out: &mut String, i: &mut usize, fmt: Fmt<'_>, b_tag_len: usize) -> usize {
    // "b=" + 1 char (we prefer at least one additional char behind =)
    let taglen = if b_tag_len == 0 { 2 } else { 3 };
    advance_i_initial(out, i, taglen, fmt);
    if b_tag_len > 0 {
        *i -= 1;  // backwards again before the ghost character
    }
    out.push_str("b=");

    out.len()
}

/// Advances the cursor `i`, making space for an item of length `len`, inserting
/// line break and indentation if necessary.
fn advance_i(out: &mut String, i: &mut usize, len: usize, fmt: Fmt<'_>) {
    let Fmt { width, indent, .. } = fmt;

    if i.saturating_add(len) <= width {
        *i += len;
    } else {
        out.push_str("\r\n");
        out.push_str(indent);
        *i = indent.len() + len;
    }
}

fn advance_i_initial(out: &mut String, i: &mut usize, len: usize, fmt: Fmt<'_>) {
    let Fmt { width, indent, .. } = fmt;

    // + 1 for initial SP
    if i.saturating_add(len + 1) <= width {
        out.push(' ');
        *i += len + 1;
    } else {
        out.push_str("\r\n");
        out.push_str(indent);
        *i = indent.len() + len;
    }
}

fn format_chunks_into_string(out: &mut String, i: &mut usize, fmt: Fmt<'_>, mut s: &str) {
    let Fmt { width, indent, .. } = fmt;

    let first_chunk_len = width.saturating_sub(*i);
    let first_chunk_len = first_chunk_len.min(s.chars().count());

    if first_chunk_len > 0 {
        let c = match s.char_indices().nth(first_chunk_len) {
            Some((c, _)) => c,
            None => s.len(),
        };
        let first_chunk;
        (first_chunk, s) = s.split_at(c);
        out.push_str(first_chunk);
        *i += first_chunk.chars().count();
    }

    let chunk_width = width.saturating_sub(indent.len()).max(1);  // no empty chunks
    let chunks = iter::from_fn(|| {
        if s.is_empty() {
            None
        } else {
            let chunk;
            let c = s.char_indices().nth(chunk_width).map_or(s.len(), |(c, _)| c);
            (chunk, s) = s.split_at(c);
            Some(chunk)
        }
    });

    for chunk in chunks {
        out.push_str("\r\n");
        out.push_str(indent);
        out.push_str(chunk);
        *i = chunk.chars().count() + indent.len();
    }
}

/// Inserts the Base64-encoded signature data at the insertion index, folding
/// it according to the output format.
pub fn insert_signature_data(
    formatted_header: &mut String,
    insertion_index: usize,
    signature_data: &[u8],
    format: &OutputFormat,
) {
    debug_assert!(insertion_index <= formatted_header.len());

    let fmt = Fmt {
        width: format.width(),
        indent: &format.indentation,
        last: true,
    };

    let s = encode_base64(signature_data);

    let formatted_header_pre = &formatted_header[..insertion_index];

    let mut it = formatted_header_pre.rsplit("\r\n");
    let last_line = it.next().unwrap_or_default();
    let mut len = if it.next().is_some() {
        last_line.chars().count()
    } else {
        DKIM_SIGNATURE_NAME.len() + last_line.chars().count() + 1
    };

    let mut result = String::with_capacity(s.len());
    format_chunks_into_string(&mut result, &mut len, fmt, &s);

    formatted_header.insert_str(insertion_index, &result);
}

/// Estimates the length of the Base64-encoded signature for a signature of
/// `n` bytes.
pub fn estimate_b_tag_length(n: usize) -> usize {
    (n + 2) / 3 * 4
}
