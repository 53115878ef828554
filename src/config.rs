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

//! Layered configuration.
//!
//! A [`ConfigLayer`] holds optional values from one source: the built-in
//! defaults, a TOML file, or the command line. [`Config::resolve`] folds the
//! layers into a complete [`Config`], from which the inputs of each pipeline
//! stage are derived.

use crate::{
    body::BodySource,
    delivery::{TlsMode, TransportConfig},
    error::{Error, Result},
    header::FieldName,
    media_type::MediaType,
    message::MessageSpec,
    signature::Canonicalization,
    signer::{DkimConfig, OutputFormat},
};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_FROM: &str = "from@example.com";
pub const DEFAULT_TO: &str = "to@example.net";
pub const DEFAULT_SUBJECT: &str = "Sent with github.com/yaroslaff/testmsg";

/// One layer of configuration values. Absent values leave the value of the
/// layers below in place.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    /// Custom headers; appended to the headers of the layers below.
    pub headers: Option<Vec<(String, String)>>,
    pub text: Option<String>,
    pub lorem: Option<bool>,
    /// Path of a body file, or `-` for standard input.
    pub msg: Option<String>,
    pub time: Option<bool>,
    /// Attachment paths; appended to the attachments of the layers below.
    pub attachments: Option<Vec<PathBuf>>,
    pub fallback_media_type: Option<String>,

    pub selector: Option<String>,
    pub privkey: Option<PathBuf>,
    pub signed_headers: Option<Vec<String>>,
    pub canonicalization: Option<String>,
    /// Fold the *DKIM-Signature* header at 78 columns.
    pub fold_signature: Option<bool>,

    /// The SMTP server to send to; without one the message is printed.
    pub send: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsMode>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub helo: Option<String>,
    pub return_path: Option<String>,
    pub verbose: Option<bool>,
}

impl ConfigLayer {
    /// The built-in defaults.
    pub fn defaults() -> Self {
        Self {
            from: Some(DEFAULT_FROM.into()),
            to: Some(DEFAULT_TO.into()),
            subject: Some(DEFAULT_SUBJECT.into()),
            signed_headers: Some(vec!["To".into(), "From".into(), "Subject".into()]),
            canonicalization: Some("relaxed/simple".into()),
            ..Default::default()
        }
    }

    /// Parses a layer from TOML text.
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads a layer from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.into(),
            source,
        })?;
        toml::from_str(&s).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

/// The resolved configuration of one invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub headers: Vec<(String, String)>,
    pub text: Option<String>,
    pub lorem: bool,
    pub msg: Option<String>,
    pub time: bool,
    pub attachments: Vec<PathBuf>,
    pub fallback_media_type: Option<String>,

    pub selector: Option<String>,
    pub privkey: Option<PathBuf>,
    pub signed_headers: Vec<String>,
    pub canonicalization: Option<String>,
    pub fold_signature: bool,

    pub send: Option<String>,
    pub port: Option<u16>,
    pub tls: TlsMode,
    pub user: Option<String>,
    pub password: Option<String>,
    pub helo: Option<String>,
    pub return_path: Option<String>,
    pub verbose: bool,
}

impl Config {
    /// Folds layers in the order given; later values override earlier ones.
    pub fn resolve<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = ConfigLayer>,
    {
        fn set<T>(target: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *target = value;
            }
        }

        fn set_opt<T>(target: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *target = value;
            }
        }

        let mut config = Self::default();

        for layer in layers {
            set(&mut config.from, layer.from);
            set(&mut config.to, layer.to);
            set(&mut config.subject, layer.subject);
            config.headers.extend(layer.headers.unwrap_or_default());
            set_opt(&mut config.text, layer.text);
            set(&mut config.lorem, layer.lorem);
            set_opt(&mut config.msg, layer.msg);
            set(&mut config.time, layer.time);
            config.attachments.extend(layer.attachments.unwrap_or_default());
            set_opt(&mut config.fallback_media_type, layer.fallback_media_type);

            set_opt(&mut config.selector, layer.selector);
            set_opt(&mut config.privkey, layer.privkey);
            set(&mut config.signed_headers, layer.signed_headers);
            set_opt(&mut config.canonicalization, layer.canonicalization);
            set(&mut config.fold_signature, layer.fold_signature);

            set_opt(&mut config.send, layer.send);
            set_opt(&mut config.port, layer.port);
            set(&mut config.tls, layer.tls);
            set_opt(&mut config.user, layer.user);
            set_opt(&mut config.password, layer.password);
            set_opt(&mut config.helo, layer.helo);
            set_opt(&mut config.return_path, layer.return_path);
            set(&mut config.verbose, layer.verbose);
        }

        config
    }

    /// Returns the description of the message to generate.
    pub fn message_spec(&self) -> Result<MessageSpec> {
        let fallback_media_type = self
            .fallback_media_type
            .as_deref()
            .map(|s| {
                s.parse::<MediaType>()
                    .map_err(|e| Error::Config(format!("fallback media type \"{s}\": {e}")))
            })
            .transpose()?;

        Ok(MessageSpec {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: self.subject.clone(),
            headers: self.headers.clone(),
            body: BodySource::select(self.text.as_deref(), self.lorem, self.msg.as_deref()),
            timestamp: self.time,
            attachments: self.attachments.clone(),
            return_path: self.return_path.clone(),
            fallback_media_type,
        })
    }

    /// Returns the signing configuration, if signing is requested.
    ///
    /// Signing needs both a selector and a private key path. The sender
    /// domain is checked before the key file is read.
    pub fn dkim_config(&self) -> Result<Option<DkimConfig>> {
        let (selector, privkey) = match (&self.selector, &self.privkey) {
            (None, None) => return Ok(None),
            (Some(selector), Some(privkey)) => (selector, privkey),
            (Some(_), None) => return Err(Error::Config("selector given without private key".into())),
            (None, Some(_)) => return Err(Error::Config("private key given without selector".into())),
        };

        let signed_headers = self
            .signed_headers
            .iter()
            .map(|name| {
                FieldName::new(name.as_str())
                    .map_err(|_| Error::Config(format!("invalid header name to sign \"{name}\"")))
            })
            .collect::<Result<Vec<_>>>()?;

        let canonicalization = self
            .canonicalization
            .as_deref()
            .map(|s| {
                s.parse::<Canonicalization>()
                    .map_err(|e| Error::Config(format!("canonicalization \"{s}\": {e}")))
            })
            .transpose()?;

        let mut config = DkimConfig::for_sender(&self.from, selector, privkey)?;
        config.signed_headers = signed_headers;
        if let Some(canonicalization) = canonicalization {
            config.canonicalization = canonicalization;
        }
        if self.fold_signature {
            config.format = OutputFormat::folded();
        }

        Ok(Some(config))
    }

    /// Returns the SMTP configuration, if sending is requested.
    pub fn transport_config(&self) -> Result<Option<TransportConfig>> {
        let Some(host) = &self.send else {
            return Ok(None);
        };

        let credentials = match (&self.user, &self.password) {
            (None, None) => None,
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            (Some(user), None) => Some((user.clone(), String::new())),
            (None, Some(_)) => return Err(Error::Config("password given without user".into())),
        };

        Ok(Some(TransportConfig {
            host: host.clone(),
            port: self.port,
            tls: self.tls,
            credentials,
            helo: self.helo.clone(),
            verbose: self.verbose,
            timeout: None,
        }))
    }
}
