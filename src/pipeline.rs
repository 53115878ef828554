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

//! The complete pipeline: body, message, signature, delivery.

use crate::{
    body,
    canonicalize::canonicalize,
    config::Config,
    delivery::{Delivery, DeliveryReport, Envelope, SmtpDelivery, WriterDelivery},
    error::Result,
    message::{self, EmailMessage, MessageSpec},
    signer::{self, DkimConfig},
    splice,
};
use std::io::{self, Read};
use time::OffsetDateTime;
use tracing::debug;

/// Runs one invocation: generates the message and sends it to the configured
/// SMTP server, or writes it to standard output.
pub fn run(config: &Config) -> Result<DeliveryReport> {
    let transport = config.transport_config()?;

    let (envelope, message) = generate(config, io::stdin().lock())?;
    let bytes = message::render(&message);

    match transport {
        Some(transport) => SmtpDelivery::new(transport).deliver(&envelope, &bytes),
        None => WriterDelivery::new(io::stdout().lock()).deliver(&envelope, &bytes),
    }
}

/// Generates the message for a configuration, signed if a selector and key
/// are configured.
///
/// The signing configuration is resolved first, so a bad sender address or
/// an unreadable key is reported before any input is consumed.
pub fn generate<R: Read>(config: &Config, stdin: R) -> Result<(Envelope, EmailMessage)> {
    let spec = config.message_spec()?;
    let dkim = config.dkim_config()?;

    let body_text = body::resolve_body_from(&spec, stdin, OffsetDateTime::now_local().ok())?;
    let message = compose(&spec, &body_text, dkim.as_ref())?;

    let envelope = Envelope::new(spec.envelope_sender(), spec.to.as_str());

    Ok((envelope, message))
}

/// Builds a message from a [`MessageSpec`] and body text, and signs it if
/// requested.
pub fn compose(spec: &MessageSpec, body_text: &str, dkim: Option<&DkimConfig>) -> Result<EmailMessage> {
    let message = message::build(spec, body_text)?;

    match dkim {
        Some(dkim) => sign_message(message, dkim),
        None => Ok(message),
    }
}

/// Signs a built message and attaches the signature.
///
/// Nothing else touches the message between canonicalization and attaching
/// the signature.
pub fn sign_message(message: EmailMessage, config: &DkimConfig) -> Result<EmailMessage> {
    let (headers, body) = canonicalize(&message, &config.signed_headers, config.canonicalization);

    debug!(
        "canonicalized {} header bytes and {} body bytes ({})",
        headers.len(),
        body.len(),
        config.canonicalization
    );

    let signature = signer::sign(&headers, &body, config)?;

    splice::attach(message, &signature)
}

/// Delivers a finished message.
pub fn deliver(
    delivery: &mut dyn Delivery,
    envelope: &Envelope,
    message: &EmailMessage,
) -> Result<DeliveryReport> {
    delivery.deliver(envelope, &message::render(message))
}
