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

pub mod common;

use base64ct::{Base64, Encoding};
use bstr::ByteSlice;
use std::io;
use testmsg::{
    message::render, pipeline, signer, BodySource, Config, ConfigLayer,
    DkimConfig, DomainName, Error, MediaType, MessageSpec, Selector, SigningKey,
};

const STANDARD_HEADERS: [&str; 6] = ["MIME-Version", "Content-Type", "Subject", "From", "To", "Date"];

#[test]
fn standard_headers_appear_once() {
    common::init_tracing();

    let spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        subject: "Hi".into(),
        headers: vec![
            ("X-Mailer".into(), "one".into()),
            ("X-Mailer".into(), "two".into()),
        ],
        ..Default::default()
    };

    let bytes = render(&pipeline::compose(&spec, "", None).unwrap());
    let (fields, body) = common::split_message(&bytes);

    for name in STANDARD_HEADERS.iter().chain(&["Message-Id"]) {
        assert_eq!(common::header_values(&fields, name).len(), 1, "{name}");
    }
    assert_eq!(common::header_values(&fields, "X-Mailer"), [" one", " two"]);
    assert!(common::header_values(&fields, "DKIM-Signature").is_empty());
    assert_eq!(body, b"\r\n");
}

#[test]
fn message_id_uses_sender_domain() {
    let spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        ..Default::default()
    };

    let bytes = render(&pipeline::compose(&spec, "x", None).unwrap());
    let (fields, _) = common::split_message(&bytes);

    let id = common::header_values(&fields, "Message-Id")[0];
    assert!(id.starts_with(" <"));
    assert!(id.ends_with("@example.com>"));
}

#[test]
fn signing_only_appends() {
    let spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        subject: "Hi".into(),
        ..Default::default()
    };
    let key = SigningKey::from_pem(common::ED25519_KEY_PEM).unwrap();
    let config = DkimConfig::new(
        DomainName::new("example.com").unwrap(),
        Selector::new("mail").unwrap(),
        key,
    );

    let unsigned = testmsg::build(&spec, "Hello").unwrap();
    let unsigned_bytes = render(&unsigned);

    let signed = pipeline::sign_message(unsigned, &config).unwrap();
    let signed_bytes = render(&signed);

    let (unsigned_header, unsigned_body) = unsigned_bytes.split_once_str("\r\n\r\n").unwrap();
    let (signed_header, signed_body) = signed_bytes.split_once_str("\r\n\r\n").unwrap();

    assert!(signed_header.starts_with(unsigned_header));
    assert!(signed_header[unsigned_header.len()..].starts_with(b"\r\nDKIM-Signature:"));
    assert_eq!(unsigned_body, signed_body);
}

#[test]
fn signature_for_other_message_is_rejected() {
    let key = SigningKey::from_pem(common::ED25519_KEY_PEM).unwrap();
    let config = DkimConfig::new(
        DomainName::new("example.com").unwrap(),
        Selector::new("mail").unwrap(),
        key,
    );

    let spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        subject: "First".into(),
        ..Default::default()
    };
    let first = testmsg::build(&spec, "Hello").unwrap();
    let second = testmsg::build(&MessageSpec { subject: "Second".into(), ..spec }, "Hello").unwrap();

    let (headers, body) = testmsg::canonicalize(&first, &config.signed_headers, config.canonicalization);
    let signature = signer::sign(&headers, &body, &config).unwrap();

    assert!(matches!(
        testmsg::attach(second, &signature),
        Err(Error::SignatureMismatch)
    ));
    let signed = testmsg::attach(first, &signature).unwrap();
    let bytes = render(&signed);
    assert!(bytes.contains_str(format!("\r\n{}\r\n\r\n", signature.format_header())));
}

#[test]
fn attachment_round_trip() {
    common::init_tracing();

    let content: Vec<u8> = (0..=255).cycle().take(1000).collect();
    let file = common::temp_file(&content, ".png");

    let spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        subject: "With attachment".into(),
        attachments: vec![file.path().into()],
        ..Default::default()
    };

    let message = pipeline::compose(&spec, "See attached.", None).unwrap();
    let boundary = message.boundary().unwrap().to_owned();
    let bytes = render(&message);

    let (fields, body) = common::split_message(&bytes);
    assert_eq!(
        common::header_values(&fields, "Content-Type"),
        [format!(" multipart/mixed; boundary=\"{boundary}\"").as_str()]
    );
    assert!(common::header_values(&fields, "Content-Transfer-Encoding").is_empty());

    let file_name = file.path().file_name().unwrap().to_str().unwrap();
    let disposition = format!("Content-Disposition: attachment; filename=\"{file_name}\"\r\n\r\n");
    let start = body.find(&disposition).unwrap() + disposition.len();
    let end = start + body[start..].find(format!("\r\n--{boundary}--\r\n")).unwrap();

    let encoded: Vec<u8> = body[start..end]
        .iter()
        .copied()
        .filter(|b| !b"\r\n".contains(b))
        .collect();
    for line in body[start..end].lines() {
        assert!(line.len() <= 76);
    }
    assert_eq!(Base64::decode_vec(encoded.to_str().unwrap()).unwrap(), content);

    assert!(body.contains_str("Content-Type: image/png\r\n"));
    assert!(body.starts_with(format!("--{boundary}\r\n").as_bytes()));
    assert!(body.ends_with(format!("--{boundary}--\r\n").as_bytes()));
}

#[test]
fn unknown_attachment_type_fails_unless_fallback() {
    let file = common::temp_file("data", ".unknownext");

    let mut spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        attachments: vec![file.path().into()],
        ..Default::default()
    };

    let result = pipeline::compose(&spec, "", None);
    assert!(matches!(result, Err(Error::UnknownMediaType { .. })));

    spec.fallback_media_type = Some(MediaType::new("application", "octet-stream").unwrap());
    let message = pipeline::compose(&spec, "", None).unwrap();
    assert_eq!(
        message.attachments()[0].media_type,
        MediaType::new("application", "octet-stream").unwrap()
    );
}

#[test]
fn body_from_stdin_through_config() {
    let config = Config::resolve([
        ConfigLayer::defaults(),
        ConfigLayer {
            msg: Some("-".into()),
            ..Default::default()
        },
    ]);

    let input = io::Cursor::new(b"line one\nline two\n".to_vec());
    let (envelope, message) = pipeline::generate(&config, input).unwrap();

    assert_eq!(envelope.recipients.len(), 1);
    assert_eq!(message.text().content(), b"line one\r\nline two\r\n");
}

#[test]
fn body_source_precedence() {
    assert_eq!(
        BodySource::select(Some("text"), true, Some("-")),
        BodySource::Text("text".into())
    );
    assert_eq!(BodySource::select(Some(""), true, Some("-")), BodySource::Lorem);
    assert_eq!(BodySource::select(None, false, Some("-")), BodySource::Stdin);
    assert_eq!(BodySource::select(None, false, None), BodySource::Empty);
}

#[test]
fn custom_standard_header_is_rejected() {
    let spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        subject: "Hi".into(),
        headers: vec![
            ("Subject".into(), "custom".into()),
            ("Content-Type".into(), "text/html".into()),
            ("Date".into(), "x".into()),
        ],
        ..Default::default()
    };

    let result = pipeline::compose(&spec, "Hello", None);

    assert!(matches!(result, Err(Error::InvalidHeader(_))));
}

#[test]
fn long_header_values_stay_within_line_limit() {
    let long_value = ["0123456789"; 120].join(" ");
    let spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        subject: long_value.clone(),
        headers: vec![("X-Long".into(), long_value.clone())],
        ..Default::default()
    };

    let bytes = render(&pipeline::compose(&spec, "Hello", None).unwrap());

    let longest_line = bytes.split_str("\r\n").map(<[u8]>::len).max().unwrap();
    assert!(longest_line <= 78, "longest line: {longest_line}");

    let (fields, _) = common::split_message(&bytes);
    for name in ["Subject", "X-Long"] {
        let values = common::header_values(&fields, name);
        assert_eq!(values.len(), 1);
        let unfolded = values[0].replace("\r\n", "");
        assert_eq!(unfolded, format!(" {long_value}"));
    }
}

#[test]
fn bare_carriage_returns_in_body_become_line_breaks() {
    let spec = MessageSpec {
        from: "test@example.com".into(),
        to: "dest@example.net".into(),
        ..Default::default()
    };

    let bytes = render(&pipeline::compose(&spec, "one\rtwo\r", None).unwrap());

    let (_, body) = common::split_message(&bytes);
    assert_eq!(body, b"one\r\ntwo\r\n");
    let bare_crs = bytes
        .windows(2)
        .filter(|w| w[0] == b'\r' && w[1] != b'\n')
        .count();
    assert_eq!(bare_crs, 0);
}
