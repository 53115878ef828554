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

//! A library for generating syntactically valid email messages for testing
//! mail infrastructure, optionally signed with a *DomainKeys Identified Mail*
//! (DKIM) signature as described in [RFC 6376], and optionally delivered over
//! SMTP.
//!
//! The message pipeline runs leaves first:
//!
//! 1. the body is resolved from literal text, filler text, a file, or stdin
//!    (module `body`);
//! 2. a message is assembled from the body, custom headers, the standard
//!    headers, and attachments (module `message`);
//! 3. if signing is requested, the selected headers and the body are
//!    canonicalised (module `canonicalize`) and signed (module `signer`);
//! 4. the resulting *DKIM-Signature* header is appended to the message without
//!    touching any existing header (module `splice`);
//! 5. the message is rendered and either written out or handed to an SMTP
//!    server (module `delivery`).
//!
//! Module `pipeline` ties these steps together for a resolved [`Config`].
//!
//! This crate only ever signs. It never looks up or verifies a signature.
//!
//! [RFC 6376]: https://www.rfc-editor.org/rfc/rfc6376

pub mod body;
pub mod canonicalize;
pub mod config;
pub mod crypto;
pub mod delivery;
mod error;
pub mod header;
pub mod media_type;
pub mod message;
pub mod pipeline;
pub mod signature;
pub mod signer;
pub mod splice;
mod util;

pub use crate::{
    body::{resolve_body, BodySource},
    canonicalize::canonicalize,
    config::{Config, ConfigLayer},
    crypto::SigningKey,
    delivery::{Delivery, DeliveryReport, Envelope, SmtpDelivery, TlsMode, TransportConfig, WriterDelivery},
    error::{Error, Result},
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    media_type::MediaType,
    message::{build, render, Attachment, EmailMessage, MessageSpec},
    signature::{Canonicalization, CanonicalizationAlgorithm, DkimSignature, DomainName, Selector, SignatureAlgorithm},
    signer::{sign, DkimConfig, OutputFormat, Timestamp},
    splice::attach,
    util::{encode_base64, CanonicalStr},
};
