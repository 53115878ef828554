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

//! Resolution of the plain-text message body.

use crate::{
    error::{Error, Result},
    message::MessageSpec,
};
use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
};
use time::{macros::format_description, OffsetDateTime};
use tracing::debug;

/// Filler text used for `--lorem` bodies.
pub const LOREM_IPSUM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, \
sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.\n\
Ut enim ad minim veniam,\
quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat.\n\
Duis aute irure dolor in reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur.\n\
Excepteur sint occaecat cupidatat non proident, \
sunt in culpa qui officia deserunt mollit anim id est laborum.\n";

/// The selected origin of the body text.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum BodySource {
    /// No body source was given: the body is empty.
    #[default]
    Empty,
    /// Literal text.
    Text(String),
    /// The built-in filler text.
    Lorem,
    /// The contents of a file.
    File(PathBuf),
    /// Everything readable from standard input.
    Stdin,
}

impl BodySource {
    /// Selects exactly one source when several are configured.
    ///
    /// Literal text wins over filler text, which wins over a file or stdin
    /// (`-`). Empty literal text counts as absent. Sources that lose are
    /// ignored.
    pub fn select(text: Option<&str>, lorem: bool, file: Option<&str>) -> Self {
        match (text, lorem, file) {
            (Some(text), ..) if !text.is_empty() => Self::Text(text.into()),
            (_, true, _) => Self::Lorem,
            (_, _, Some("-")) => Self::Stdin,
            (_, _, Some(path)) if !path.is_empty() => Self::File(path.into()),
            _ => Self::Empty,
        }
    }
}

/// Resolves the body text for a message, reading stdin if selected.
pub fn resolve_body(spec: &MessageSpec) -> Result<String> {
    resolve_body_from(spec, io::stdin().lock(), OffsetDateTime::now_local().ok())
}

/// Resolves the body text, with stdin and the clock supplied by the caller.
///
/// When `now` is not known, the timestamp line falls back to UTC.
pub fn resolve_body_from<R: Read>(
    spec: &MessageSpec,
    stdin: R,
    now: Option<OffsetDateTime>,
) -> Result<String> {
    let text = match &spec.body {
        BodySource::Empty => String::new(),
        BodySource::Text(text) => text.clone(),
        BodySource::Lorem => LOREM_IPSUM.into(),
        BodySource::File(path) => {
            debug!("reading body from {}", path.display());
            let bytes = fs::read(path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            into_text(bytes, || path.display().to_string())?
        }
        BodySource::Stdin => {
            debug!("reading body from standard input");
            let mut bytes = vec![];
            let mut stdin = stdin;
            stdin.read_to_end(&mut bytes).map_err(|source| Error::Io {
                path: "<stdin>".into(),
                source,
            })?;
            into_text(bytes, || "standard input".into())?
        }
    };

    if spec.timestamp {
        let now = now.unwrap_or_else(OffsetDateTime::now_utc);
        Ok(format!("{}\n{text}", format_timestamp(now)?))
    } else {
        Ok(text)
    }
}

fn into_text(bytes: Vec<u8>, source_name: impl FnOnce() -> String) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| Error::Encoding {
        source_name: source_name(),
    })
}

/// Formats a locale-independent, second-precision timestamp line
/// (`MM/DD/YY HH:MM:SS`).
pub fn format_timestamp(now: OffsetDateTime) -> Result<String> {
    let format = format_description!("[month]/[day]/[year repr:last_two] [hour]:[minute]:[second]");
    Ok(now.format(format)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use time::macros::datetime;

    fn spec_with(body: BodySource, timestamp: bool) -> MessageSpec {
        MessageSpec {
            body,
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn select_precedence() {
        assert_eq!(
            BodySource::select(Some("a"), true, Some("-")),
            BodySource::Text("a".into())
        );
        assert_eq!(BodySource::select(None, true, Some("body.txt")), BodySource::Lorem);
        assert_eq!(BodySource::select(Some(""), true, None), BodySource::Lorem);
        assert_eq!(BodySource::select(None, false, Some("-")), BodySource::Stdin);
        assert_eq!(
            BodySource::select(None, false, Some("body.txt")),
            BodySource::File("body.txt".into())
        );
        assert_eq!(BodySource::select(None, false, None), BodySource::Empty);
    }

    #[test]
    fn empty_stdin_is_empty_body() {
        let spec = spec_with(BodySource::Stdin, false);

        let body = resolve_body_from(&spec, Cursor::new(b""), None).unwrap();

        assert_eq!(body, "");
    }

    #[test]
    fn stdin_read_fully() {
        let spec = spec_with(BodySource::Stdin, false);

        let body = resolve_body_from(&spec, Cursor::new(b"line one\nline two\n"), None).unwrap();

        assert_eq!(body, "line one\nline two\n");
    }

    #[test]
    fn invalid_utf8_stdin() {
        let spec = spec_with(BodySource::Stdin, false);

        let result = resolve_body_from(&spec, Cursor::new(b"caf\xe9"), None);

        assert!(matches!(result, Err(Error::Encoding { .. })));
    }

    #[test]
    fn missing_file_reports_path() {
        let spec = spec_with(BodySource::File("/nonexistent/testmsg/body.txt".into()), false);

        let error = resolve_body_from(&spec, io::empty(), None).unwrap_err();

        assert!(matches!(&error, Error::Io { path, .. } if path.ends_with("body.txt")));
        assert!(error.to_string().contains("/nonexistent/testmsg/body.txt"));
    }

    #[test]
    fn timestamp_prefix() {
        let spec = spec_with(BodySource::Text("Hello".into()), true);
        let now = datetime!(2023-06-09 16:13:12 +02:00);

        let body = resolve_body_from(&spec, io::empty(), Some(now)).unwrap();

        assert_eq!(body, "06/09/23 16:13:12\nHello");
    }

    #[test]
    fn lorem_body() {
        let spec = spec_with(BodySource::Lorem, false);

        let body = resolve_body_from(&spec, io::empty(), None).unwrap();

        assert!(body.starts_with("Lorem ipsum dolor sit amet"));
        assert!(body.ends_with("id est laborum.\n"));
    }
}
