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
    error::{Error, Result},
    header::{FieldBody, FieldName, HeaderFields},
    message::{
        mime,
        Attachment, EmailMessage, MessageSpec, TextPart,
    },
    util::{self, CanonicalStr},
};
use std::{process, time::SystemTime};
use time::{macros::format_description, OffsetDateTime};
use tracing::debug;

/// Assembles a message from a [`MessageSpec`] and the resolved body text.
///
/// Headers appear in this order: the MIME headers, the custom headers as
/// given, then *Subject*, *From*, *To*, *Date*, and *Message-Id*.
pub fn build(spec: &MessageSpec, body_text: &str) -> Result<EmailMessage> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    build_at(spec, body_text, now)
}

/// Assembles a message, dated at the given time.
pub fn build_at(spec: &MessageSpec, body_text: &str, now: OffsetDateTime) -> Result<EmailMessage> {
    if let Some((name, _)) = spec
        .headers
        .iter()
        .find(|(name, _)| BUILDER_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)))
    {
        return Err(Error::InvalidHeader(format!("{name} cannot be set as a custom header")));
    }

    let (content, transfer_encoding) = mime::encode_text(body_text);
    let text = TextPart { content, transfer_encoding };

    let attachments = spec
        .attachments
        .iter()
        .map(|path| Attachment::read(path, spec.fallback_media_type.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut headers = HeaderFields::default();

    push(&mut headers, "MIME-Version", "1.0")?;

    let boundary = if attachments.is_empty() {
        push(&mut headers, "Content-Type", TEXT_CONTENT_TYPE)?;
        push(&mut headers, "Content-Transfer-Encoding", text.transfer_encoding.canonical_str())?;
        None
    } else {
        let encoded: Vec<_> = attachments
            .iter()
            .map(|a| mime::encode_base64_lines(&a.content))
            .collect();
        let parts = encoded.iter().map(Vec::as_slice).chain([&text.content[..]]);
        let boundary = mime::make_boundary(parts)?;
        push(&mut headers, "Content-Type", &format!("multipart/mixed; boundary=\"{boundary}\""))?;
        Some(boundary.into_boxed_str())
    };

    for (name, value) in &spec.headers {
        push_text(&mut headers, name, value)?;
    }

    push_text(&mut headers, "Subject", &spec.subject)?;
    push(&mut headers, "From", &format_address(&spec.from))?;
    push(&mut headers, "To", &format_address(&spec.to))?;
    push(&mut headers, "Date", &format_date(now)?)?;

    let id_domain = spec.sender_domain().unwrap_or("localhost");
    push(&mut headers, "Message-Id", &make_message_id(id_domain)?)?;

    debug!(
        "built message with {} headers and {} attachments",
        headers.len(),
        attachments.len()
    );

    Ok(EmailMessage {
        headers,
        text,
        attachments,
        boundary,
    })
}

pub(crate) const TEXT_CONTENT_TYPE: &str = "text/plain; charset=\"utf-8\"";

/// Headers the builder writes itself, each exactly once.
const BUILDER_HEADERS: [&str; 8] = [
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Subject",
    "From",
    "To",
    "Date",
    "Message-Id",
];

fn push(headers: &mut HeaderFields, name: &str, value: &str) -> Result<()> {
    let field_name = FieldName::new(name).map_err(|_| Error::InvalidHeader(name.into()))?;
    let body = FieldBody::with_leading_space(value)
        .map_err(|_| Error::InvalidHeader(format!("{name}: {value:?}")))?;
    headers.push(field_name, body);
    Ok(())
}

fn push_text(headers: &mut HeaderFields, name: &str, value: &str) -> Result<()> {
    let encoded = mime::encode_header_value(name, value)
        .ok_or_else(|| Error::InvalidHeader(format!("{name}: line too long and cannot be folded")))?;
    push(headers, name, &encoded)
}

// The address doubles as display name.
fn format_address(address: &str) -> String {
    format!("\"{address}\" <{address}>")
}

/// Formats an RFC 5322 date-time with numeric zone offset.
pub fn format_date(now: OffsetDateTime) -> Result<String> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]"
    );
    Ok(now.format(format)?)
}

/// Generates a new *Message-Id* value with 64 bits of randomness.
pub fn make_message_id(domain: &str) -> Result<String> {
    let centis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |t| t.as_millis() / 10);
    let pid = process::id();
    let random = util::random_u64()?;

    Ok(format!("<{centis}.{pid}.{random}@{domain}>"))
}
