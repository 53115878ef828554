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
    message::{build::TEXT_CONTENT_TYPE, mime, EmailMessage},
    util::CanonicalStr,
};
use std::io::Write;

const CRLF: &[u8] = b"\r\n";

/// Serializes a message to the bytes that are written out or transmitted.
///
/// Headers are emitted in stored order as `Name:value` lines, followed by a
/// blank line and the body.
pub fn render(message: &EmailMessage) -> Vec<u8> {
    let mut result = vec![];

    for (name, value) in message.headers().iter() {
        result.extend(name.as_ref().bytes());
        result.push(b':');
        result.extend(value.as_ref());
        result.extend(CRLF);
    }

    result.extend(CRLF);
    result.extend(render_body(message));

    result
}

/// Serializes the message body, including multipart framing if the message
/// has attachments.
pub fn render_body(message: &EmailMessage) -> Vec<u8> {
    let text = message.text();

    let boundary = match message.boundary() {
        Some(boundary) => boundary,
        None => return text.content().to_vec(),
    };

    let mut result = vec![];

    // `Vec<u8>` as `io::Write` cannot fail
    let _ = write!(
        result,
        "--{boundary}\r\n\
         Content-Type: {TEXT_CONTENT_TYPE}\r\n\
         Content-Transfer-Encoding: {}\r\n\
         \r\n",
        text.transfer_encoding().canonical_str(),
    );
    result.extend(text.content());

    for attachment in message.attachments() {
        let _ = write!(
            result,
            "\r\n--{boundary}\r\n\
             Content-Type: {}\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment; filename=\"{}\"\r\n\
             \r\n",
            attachment.media_type,
            attachment.file_name().replace(['\\', '"'], "_"),
        );
        result.extend(mime::encode_base64_lines(&attachment.content));
    }

    let _ = write!(result, "\r\n--{boundary}--\r\n");

    result
}
