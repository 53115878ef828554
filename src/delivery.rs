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

//! SMTP Delivery Adapter.
//!
//! A finished message is handed to a [`Delivery`]: either an SMTP server
//! ([`SmtpDelivery`]) or a byte sink such as standard output
//! ([`WriterDelivery`]).

use crate::error::{Error, Result};
use lettre::{
    address::Envelope as LettreEnvelope,
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{Tls, TlsParameters},
        extension::ClientId,
        Error as SmtpError, SmtpTransport,
    },
    Address, Transport,
};
use serde::Deserialize;
use std::{
    error::Error as _,
    fmt::{self, Display, Formatter},
    io::Write,
    str::FromStr,
    time::Duration,
};
use tracing::{debug, info};

/// The SMTP envelope: the reverse path and the forward paths.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub sender: String,
    pub recipients: Vec<String>,
}

impl Envelope {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipients: vec![recipient.into()],
        }
    }

    fn to_lettre(&self) -> Result<LettreEnvelope> {
        let parse = |s: &str| {
            s.parse::<Address>()
                .map_err(|_| Error::InvalidAddress(s.into()))
        };

        let sender = parse(&self.sender)?;
        let recipients = self
            .recipients
            .iter()
            .map(|r| parse(r))
            .collect::<Result<Vec<_>>>()?;

        LettreEnvelope::new(Some(sender), recipients)
            .map_err(|e| Error::InvalidAddress(format!("{}: {e}", self.sender)))
    }
}

/// The outcome of a successful delivery.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeliveryReport {
    /// The final reply code, if the message went over SMTP.
    pub code: Option<String>,
    pub message: String,
}

/// A destination for finished messages.
pub trait Delivery {
    /// Delivers the rendered message bytes.
    fn deliver(&mut self, envelope: &Envelope, message: &[u8]) -> Result<DeliveryReport>;
}

/// The transport security mode of an SMTP connection.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain text.
    #[default]
    None,
    /// Upgrade with STARTTLS after connecting.
    StartTls,
    /// Implicit TLS from the start of the connection.
    Ssl,
}

impl TlsMode {
    /// Returns the port used when none is configured.
    pub fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Ssl => 465,
        }
    }
}

impl Display for TlsMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::StartTls => "starttls",
            Self::Ssl => "ssl",
        })
    }
}

impl FromStr for TlsMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("none") {
            Ok(Self::None)
        } else if s.eq_ignore_ascii_case("starttls") {
            Ok(Self::StartTls)
        } else if s.eq_ignore_ascii_case("ssl") {
            Ok(Self::Ssl)
        } else {
            Err(Error::Config(format!("unknown TLS mode \"{s}\"")))
        }
    }
}

/// The configuration of an SMTP connection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TransportConfig {
    pub host: String,
    /// The port; `None` selects the default for the TLS mode.
    pub port: Option<u16>,
    pub tls: TlsMode,
    /// User name and password for AUTH.
    pub credentials: Option<(String, String)>,
    /// The name announced in EHLO; `None` uses the local host name.
    pub helo: Option<String>,
    /// Log the SMTP exchange at info level instead of debug level.
    pub verbose: bool,
    /// Timeout for each network operation; `None` uses 60 seconds.
    pub timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.tls.default_port())
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Delivery to an SMTP server.
///
/// Each call to [`deliver`][Delivery::deliver] opens one connection, makes
/// exactly one send attempt, and closes the connection with QUIT whether the
/// attempt succeeded or not. There are no retries.
pub struct SmtpDelivery {
    config: TransportConfig,
}

impl SmtpDelivery {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let config = &self.config;

        let tls_parameters = || {
            TlsParameters::new(config.host.clone())
                .map_err(|e| Error::SmtpConnection(format!("TLS setup for {} failed: {e}", config.host)))
        };
        let tls = match config.tls {
            TlsMode::None => Tls::None,
            TlsMode::StartTls => Tls::Required(tls_parameters()?),
            TlsMode::Ssl => Tls::Wrapper(tls_parameters()?),
        };

        let hello_name = match &config.helo {
            Some(helo) => ClientId::Domain(helo.clone()),
            None => ClientId::default(),
        };

        let mut builder = SmtpTransport::builder_dangerous(config.host.as_str())
            .port(config.port())
            .tls(tls)
            .hello_name(hello_name)
            .timeout(Some(config.timeout.unwrap_or(DEFAULT_TIMEOUT)));

        if let Some((user, password)) = &config.credentials {
            builder = builder
                .credentials(Credentials::new(user.clone(), password.clone()))
                .authentication(vec![Mechanism::Plain, Mechanism::Login]);
        }

        Ok(builder.build())
    }

    fn log(&self, message: fmt::Arguments<'_>) {
        if self.config.verbose {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }
}

impl Delivery for SmtpDelivery {
    fn deliver(&mut self, envelope: &Envelope, message: &[u8]) -> Result<DeliveryReport> {
        let lettre_envelope = envelope.to_lettre()?;
        let transport = self.transport()?;

        self.log(format_args!(
            "sending {} bytes to {}:{} ({}) from <{}> to {:?}",
            message.len(),
            self.config.host,
            self.config.port(),
            self.config.tls,
            envelope.sender,
            envelope.recipients,
        ));

        let response = transport
            .send_raw(&lettre_envelope, message)
            .map_err(map_smtp_error)?;

        let report = DeliveryReport {
            code: Some(response.code().to_string()),
            message: response.message().collect::<Vec<_>>().join(" "),
        };

        self.log(format_args!(
            "server accepted message: {} {}",
            report.code.as_deref().unwrap_or_default(),
            report.message
        ));

        Ok(report)
    }
}

fn map_smtp_error(error: SmtpError) -> Error {
    if error.is_permanent() || error.is_transient() {
        // the source holds the server's reply text without the code
        let message = error
            .source()
            .map_or_else(|| error.to_string(), ToString::to_string);
        Error::SmtpProtocol {
            code: error.status().map(|code| code.to_string()),
            message,
        }
    } else {
        Error::SmtpConnection(error.to_string())
    }
}

/// Delivery to a byte sink, typically standard output.
///
/// The message is written exactly as it would go over SMTP, with CRLF line
/// endings.
pub struct WriterDelivery<W> {
    writer: W,
}

impl<W: Write> WriterDelivery<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Delivery for WriterDelivery<W> {
    fn deliver(&mut self, _envelope: &Envelope, message: &[u8]) -> Result<DeliveryReport> {
        let io_error = |source| Error::Io {
            path: "<output>".into(),
            source,
        };

        self.writer.write_all(message).map_err(io_error)?;
        self.writer.flush().map_err(io_error)?;

        Ok(DeliveryReport {
            code: None,
            message: format!("wrote {} bytes", message.len()),
        })
    }
}
