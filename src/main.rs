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

use anyhow::Context;
use clap::{ArgAction, Parser};
use std::{path::PathBuf, process::ExitCode};
use testmsg::{config::ConfigLayer, delivery::TlsMode, pipeline, Config};
use tracing::debug;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Generate and send valid RFC 5322 email messages for testing
#[derive(Debug, Parser, PartialEq)]
#[command(about, version)]
struct Args {
    /// TOML configuration file, overridden by the flags below
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, value_name = "EMAIL")]
    from: Option<String>,

    #[arg(short, long, value_name = "EMAIL")]
    to: Option<String>,

    #[arg(short, long)]
    subject: Option<String>,

    /// Add header (repeatable)
    #[arg(short = 'a', long = "add", num_args = 2, value_names = ["HEADER", "VALUE"], action = ArgAction::Append)]
    headers: Vec<String>,

    #[arg(long, help_heading = "Message body")]
    text: Option<String>,

    /// Use lorem ipsum text
    #[arg(long, help_heading = "Message body")]
    lorem: bool,

    /// Read message body from file (or "-" to read from stdin)
    #[arg(long, value_name = "FILE", help_heading = "Message body")]
    msg: Option<String>,

    /// Add timestamp to text
    #[arg(long, help_heading = "Message body")]
    time: bool,

    /// Add attachment
    #[arg(long, value_name = "FILE", num_args = 1.., help_heading = "Message body")]
    attach: Vec<PathBuf>,

    /// DKIM selector, e.g. "mail"
    #[arg(long, help_heading = "DKIM signature (optional)")]
    selector: Option<String>,

    /// Path to private key
    #[arg(long, value_name = "FILE", help_heading = "DKIM signature (optional)")]
    privkey: Option<PathBuf>,

    #[arg(long, value_name = "HOST", help_heading = "Sending (optional)")]
    send: Option<String>,

    #[arg(long, help_heading = "Sending (optional)")]
    port: Option<u16>,

    /// none, starttls, or ssl
    #[arg(long, value_name = "MODE", help_heading = "Sending (optional)")]
    tls: Option<TlsMode>,

    #[arg(long, help_heading = "Sending (optional)")]
    user: Option<String>,

    #[arg(long, help_heading = "Sending (optional)")]
    password: Option<String>,

    /// Name to announce in EHLO
    #[arg(long, help_heading = "Sending (optional)")]
    helo: Option<String>,

    /// Envelope sender, if different from --from
    #[arg(long, value_name = "EMAIL", help_heading = "Sending (optional)")]
    return_path: Option<String>,

    /// Verbose SMTP
    #[arg(short, long, help_heading = "Sending (optional)")]
    verbose: bool,
}

impl Args {
    fn into_layer(self) -> ConfigLayer {
        let headers = self
            .headers
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect::<Vec<_>>();

        ConfigLayer {
            from: self.from,
            to: self.to,
            subject: self.subject,
            headers: Some(headers).filter(|h| !h.is_empty()),
            text: self.text,
            lorem: self.lorem.then_some(true),
            msg: self.msg,
            time: self.time.then_some(true),
            attachments: Some(self.attach).filter(|a| !a.is_empty()),
            selector: self.selector,
            privkey: self.privkey,
            send: self.send,
            port: self.port,
            tls: self.tls,
            user: self.user,
            password: self.password,
            helo: self.helo,
            return_path: self.return_path,
            verbose: self.verbose.then_some(true),
            ..Default::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(args: Args) -> anyhow::Result<Config> {
    let mut layers = vec![ConfigLayer::defaults()];

    if let Some(path) = &args.config {
        let layer = ConfigLayer::from_file(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?;
        layers.push(layer);
    }

    layers.push(args.into_layer());

    Ok(Config::resolve(layers))
}

fn run(config: &Config) -> anyhow::Result<()> {
    let report = pipeline::run(config)?;

    debug!(
        "delivery finished: {} {}",
        report.code.as_deref().unwrap_or("-"),
        report.message
    );

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let result = load_config(args).and_then(|config| {
        init_logging(config.verbose);
        run(&config)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
