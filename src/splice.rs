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

//! Header Splicer.
//!
//! Attaching a signature is the only way to add a header to a built
//! [`EmailMessage`]. The existing headers are never touched: the new
//! *DKIM-Signature* header goes to the end of the header sequence.

use crate::{
    canonicalize,
    crypto,
    error::{Error, Result},
    header::{FieldBody, FieldName},
    message::EmailMessage,
    signature::{DkimSignature, DKIM_SIGNATURE_NAME},
};
use tracing::debug;

/// Appends the *DKIM-Signature* header for `signature` to the message.
///
/// The signed headers of the message are canonicalized again and compared
/// with what the signature was computed over; if they differ, the message was
/// changed after signing and [`Error::SignatureMismatch`] is returned.
pub fn attach(mut message: EmailMessage, signature: &DkimSignature) -> Result<EmailMessage> {
    let canonical_headers = canonicalize::canonicalize_headers(
        signature.canonicalization.header,
        message.headers(),
        &signature.signed_headers,
    );
    let digest = crypto::data_hash_digest(signature.algorithm.hash_algorithm(), [&canonical_headers]);

    if digest != signature.signed_headers_digest {
        return Err(Error::SignatureMismatch);
    }

    let name = FieldName::new(DKIM_SIGNATURE_NAME)
        .map_err(|e| Error::InvalidHeader(format!("{DKIM_SIGNATURE_NAME}: {e}")))?;
    let body = FieldBody::new(signature.header_value().as_bytes())
        .map_err(|e| Error::InvalidHeader(format!("{DKIM_SIGNATURE_NAME}: {e}")))?;

    message.append_header(name, body);

    debug!("attached {DKIM_SIGNATURE_NAME} header as header #{}", message.headers().len());

    Ok(message)
}
