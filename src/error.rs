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

//! Errors surfaced by the message pipeline.

use std::{io, path::PathBuf};

/// An error that aborts the current invocation.
///
/// None of these errors are retried internally: each one ends the run with a
/// single diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A body source, attachment, or configuration file could not be read.
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Text content was expected but the input is not valid UTF-8.
    #[error("{source_name} does not contain valid UTF-8 text")]
    Encoding { source_name: String },

    /// The media type of an attachment could not be determined.
    #[error("cannot determine media type of attachment {}", path.display())]
    UnknownMediaType { path: PathBuf },

    /// An address lacks a usable domain part.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A header name or value cannot be placed in a message.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The private key file could not be read.
    #[error("could not load private key {}: {source}", path.display())]
    KeyLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The key material is malformed or signing failed.
    #[error("signature error: {0}")]
    Signature(String),

    /// A signature was attached to a message whose signed headers differ from
    /// the ones it was computed over.
    #[error("signed headers of the message do not match the signature")]
    SignatureMismatch,

    /// The SMTP server rejected a command.
    #[error("SMTP error{}: {message}", code.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
    SmtpProtocol {
        code: Option<String>,
        message: String,
    },

    /// Connecting, negotiating TLS, or authenticating failed.
    #[error("SMTP connection error: {0}")]
    SmtpConnection(String),

    /// The configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The operating system's random source failed.
    #[error("no random data available: {0}")]
    Random(#[from] getrandom::Error),

    /// A date could not be formatted.
    #[error("could not format date: {0}")]
    Time(#[from] time::error::Format),
}

pub type Result<T> = std::result::Result<T, Error>;
