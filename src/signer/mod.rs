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

//! DKIM Signer.
//!
//! The signer takes the canonical header block and canonical body produced by
//! [`canonicalize`][crate::canonicalize::canonicalize] and computes a
//! [`DkimSignature`]. The signature covers the canonical header block followed
//! by the canonicalized *DKIM-Signature* header itself with an empty *b=* tag,
//! as described in RFC 6376, §3.7.

mod format;

use crate::{
    canonicalize,
    crypto::{self, SigningKey},
    error::{Error, Result},
    header::FieldName,
    signature::{
        Canonicalization, CanonicalizationAlgorithm, DkimSignature, DomainName, Selector,
        SignatureAlgorithm, DKIM_SIGNATURE_NAME,
    },
};
use std::{fs, num::NonZeroUsize, path::Path, time::SystemTime};
use tracing::{debug, trace};

/// The line width used when folding is requested without a width.
pub const LINE_WIDTH: usize = 78;

/// A generator for the timestamp tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Timestamp {
    #[default]
    Now,
    Exact(u64),
}

/// Formatting options for the *DKIM-Signature* header value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputFormat {
    /// The maximum line width in characters to use when breaking lines. The
    /// default is `None`, which renders the whole value on a single line.
    pub line_width: Option<NonZeroUsize>,
    /// The indentation whitespace to use for continuation lines. Must be a
    /// non-empty sequence of space and tab characters. The default is `"\t"`.
    pub indentation: String,
}

impl OutputFormat {
    /// A format that folds lines at the usual width of 78 characters.
    pub fn folded() -> Self {
        Self {
            line_width: NonZeroUsize::new(LINE_WIDTH),
            ..Default::default()
        }
    }

    fn width(&self) -> usize {
        self.line_width.map_or(usize::MAX, NonZeroUsize::get)
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            line_width: None,
            indentation: "\t".into(),
        }
    }
}

/// The configuration for signing a message.
#[derive(Debug)]
pub struct DkimConfig {
    /// The signing domain, the *d=* tag.
    pub domain: DomainName,
    /// The selector, the *s=* tag.
    pub selector: Selector,
    /// The key to use for producing the cryptographic signature.
    pub signing_key: SigningKey,
    /// The headers to sign, in order. Must not be empty.
    pub signed_headers: Vec<FieldName>,
    pub canonicalization: Canonicalization,
    /// The *t=* tag; `None` omits it.
    pub timestamp: Option<Timestamp>,
    pub format: OutputFormat,
}

impl DkimConfig {
    /// Creates a configuration with the default policy: headers *To*, *From*,
    /// and *Subject* signed, relaxed/simple canonicalization, timestamp set.
    pub fn new(domain: DomainName, selector: Selector, signing_key: SigningKey) -> Self {
        Self {
            domain,
            selector,
            signing_key,
            signed_headers: default_signed_headers(),
            canonicalization: Canonicalization {
                header: CanonicalizationAlgorithm::Relaxed,
                body: CanonicalizationAlgorithm::Simple,
            },
            timestamp: Some(Timestamp::Now),
            format: Default::default(),
        }
    }

    /// Creates a configuration for the given sender address.
    ///
    /// The domain is derived before the key file is read, so an address
    /// without domain fails without touching the key.
    pub fn for_sender(sender: &str, selector: &str, key_path: &Path) -> Result<Self> {
        let domain = signing_domain(sender)?;
        let selector = Selector::new(selector)
            .map_err(|_| Error::Config(format!("invalid selector \"{selector}\"")))?;
        let signing_key = load_signing_key(key_path)?;

        Ok(Self::new(domain, selector, signing_key))
    }
}

/// Returns the headers signed by default: *To*, *From*, *Subject*.
pub fn default_signed_headers() -> Vec<FieldName> {
    ["To", "From", "Subject"]
        .into_iter()
        .filter_map(|n| FieldName::new(n).ok())
        .collect()
}

/// Derives the signing domain from a sender address: everything after the
/// last `@`.
pub fn signing_domain(sender: &str) -> Result<DomainName> {
    let (_, domain) = sender
        .rsplit_once('@')
        .ok_or_else(|| Error::InvalidAddress(sender.into()))?;

    // tolerate a trailing angle bracket from "Name <addr>" input
    let domain = domain.trim_end_matches('>');

    DomainName::new(domain).map_err(|_| Error::InvalidAddress(sender.into()))
}

/// Reads a private key from a PEM file.
pub fn load_signing_key(path: &Path) -> Result<SigningKey> {
    let pem = fs::read_to_string(path).map_err(|source| Error::KeyLoad {
        path: path.into(),
        source,
    })?;

    let key = SigningKey::from_pem(&pem)
        .map_err(|e| Error::Signature(format!("{}: {e}", path.display())))?;

    debug!("loaded {:?} signing key from {}", key.key_type(), path.display());

    Ok(key)
}

/// Computes a DKIM signature over a canonical header block and canonical body.
pub fn sign(
    canonical_headers: &[u8],
    canonical_body: &[u8],
    config: &DkimConfig,
) -> Result<DkimSignature> {
    if config.signed_headers.is_empty() {
        return Err(Error::Config("no headers selected for signing".into()));
    }
    // h= is a colon-separated list inside a ;-separated tag list
    if let Some(name) = config.signed_headers.iter().find(|n| n.as_ref().contains(';')) {
        return Err(Error::Config(format!("cannot sign header name \"{name}\"")));
    }

    let signing_key = &config.signing_key;
    let algorithm = SignatureAlgorithm::from(signing_key.key_type());
    let hash_alg = algorithm.hash_algorithm();
    let canonicalization = config.canonicalization;

    let body_hash = crypto::data_hash_digest(hash_alg, [canonical_body]);

    let timestamp = config.timestamp.map(|timestamp| match timestamp {
        Timestamp::Now => now_unix_secs(),
        Timestamp::Exact(t) => t,
    });

    let unsigned = format::UnsignedDkimSignature {
        algorithm,
        body_hash: &body_hash,
        canonicalization,
        domain: &config.domain,
        selector: &config.selector,
        signed_headers: &config.signed_headers,
        timestamp,
    };

    let b_len = format::estimate_b_tag_length(signing_key.signature_length());

    let (mut header_value, insertion_index) =
        format::format_without_signature(&unsigned, &config.format, b_len);

    // the DKIM-Signature header is hashed last, without trailing CRLF
    let mut canonical_sig_header = Vec::with_capacity(header_value.len() + DKIM_SIGNATURE_NAME.len() + 1);
    canonicalize::canonicalize_header(
        &mut canonical_sig_header,
        canonicalization.header,
        DKIM_SIGNATURE_NAME,
        &header_value,
    );

    trace!("to-be-signed DKIM header: {:?}", bstr::BStr::new(&canonical_sig_header));

    let data_hash = crypto::data_hash_digest(hash_alg, [canonical_headers, canonical_sig_header.as_slice()]);

    let signature_data = signing_key
        .sign_hash(hash_alg, &data_hash)
        .map_err(|e| Error::Signature(e.to_string()))?;

    trace!("{algorithm} signing successful");

    format::insert_signature_data(&mut header_value, insertion_index, &signature_data, &config.format);

    debug!(
        "signed message as d={} s={} over {} header bytes",
        config.domain,
        config.selector,
        canonical_headers.len()
    );

    Ok(DkimSignature {
        algorithm,
        signature_data: signature_data.into(),
        body_hash,
        canonicalization,
        domain: config.domain.clone(),
        selector: config.selector.clone(),
        signed_headers: config.signed_headers.clone().into(),
        timestamp,
        header_value: header_value.into(),
        signed_headers_digest: crypto::data_hash_digest(hash_alg, [canonical_headers]),
    })
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |t| t.as_secs())
}
