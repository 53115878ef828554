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

//! Email message assembly and rendering.

mod build;
pub mod mime;
mod render;

pub use self::{
    build::{build, build_at, format_date, make_message_id},
    render::{render, render_body},
};

use crate::{
    body::BodySource,
    error::{Error, Result},
    header::{FieldBody, FieldName, HeaderFields},
    media_type::MediaType,
    message::mime::TransferEncoding,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// The description of a message to generate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageSpec {
    /// The sender address, used in the *From* header.
    pub from: String,
    /// The recipient address, used in the *To* header.
    pub to: String,
    pub subject: String,
    /// Custom headers, in order. Repeated names are kept.
    pub headers: Vec<(String, String)>,
    /// The source of the body text.
    pub body: BodySource,
    /// Whether to prefix the body text with a timestamp line.
    pub timestamp: bool,
    /// Files to attach, in order.
    pub attachments: Vec<PathBuf>,
    /// The envelope sender, if different from `from`.
    pub return_path: Option<String>,
    /// The media type to use for attachments with an unknown extension.
    pub fallback_media_type: Option<MediaType>,
}

impl MessageSpec {
    /// Returns the domain part of the sender address.
    pub fn sender_domain(&self) -> Result<&str> {
        match self.from.rsplit_once('@') {
            Some((_, domain)) if !domain.is_empty() => Ok(domain),
            _ => Err(Error::InvalidAddress(self.from.clone())),
        }
    }

    /// Returns the envelope sender: the return path if set, else `from`.
    pub fn envelope_sender(&self) -> &str {
        self.return_path.as_deref().unwrap_or(&self.from)
    }
}

/// A file attached to a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attachment {
    pub path: PathBuf,
    pub media_type: MediaType,
    pub content: Vec<u8>,
}

impl Attachment {
    /// Reads an attachment file and determines its media type.
    ///
    /// The media type is checked before the file is read.
    pub fn read(path: &Path, fallback: Option<&MediaType>) -> Result<Self> {
        let media_type = MediaType::resolve(path, fallback)
            .ok_or_else(|| Error::UnknownMediaType { path: path.into() })?;

        let content = fs::read(path).map_err(|source| Error::Io {
            path: path.into(),
            source,
        })?;

        debug!("attaching {} ({media_type}, {} bytes)", path.display(), content.len());

        Ok(Self {
            path: path.into(),
            media_type,
            content,
        })
    }

    /// The file name announced in the *Content-Disposition* header.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// The plain-text part of a message, already in transfer-encoded form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TextPart {
    pub(crate) content: Box<[u8]>,
    pub(crate) transfer_encoding: TransferEncoding,
}

impl TextPart {
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.transfer_encoding
    }
}

/// An assembled email message.
///
/// There are no public mutators: once built, the only way to add a header is
/// [`attach`][crate::splice::attach], which appends a *DKIM-Signature* and
/// leaves every existing header as it was.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EmailMessage {
    headers: HeaderFields,
    text: TextPart,
    attachments: Vec<Attachment>,
    boundary: Option<Box<str>>,
}

impl EmailMessage {
    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    pub fn text(&self) -> &TextPart {
        &self.text
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// The multipart boundary, present only when there are attachments.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// Returns the body as transmitted, after the blank line.
    pub fn body(&self) -> Vec<u8> {
        render_body(self)
    }

    pub(crate) fn append_header(&mut self, name: FieldName, body: FieldBody) {
        self.headers.push(name, body);
    }
}
