//! Decoding of synthesized and real-world-shaped messages.

use mailsync_mime::{Error, MimePart, Tier, open};
use proptest::prelude::*;

/// Builds `multipart/mixed` with one text part and one named attachment.
fn text_with_attachment(text: &str, filename: &str, attachment: &[u8]) -> Vec<u8> {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(attachment);
    format!(
        "From: sender@example.com\r\n\
         To: recipient@example.com\r\n\
         Subject: Test\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"=_boundary_42\"\r\n\
         \r\n\
         This is a multi-part message in MIME format.\r\n\
         --=_boundary_42\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Transfer-Encoding: 7bit\r\n\
         \r\n\
         {text}\r\n\
         --=_boundary_42\r\n\
         Content-Type: application/octet-stream\r\n\
         Content-Disposition: attachment; filename=\"{filename}\"\r\n\
         Content-Transfer-Encoding: base64\r\n\
         \r\n\
         {encoded}\r\n\
         --=_boundary_42--\r\n"
    )
    .into_bytes()
}

#[test]
fn test_text_and_attachment_round_trip() {
    let raw = text_with_attachment("Hello there", "notes.bin", &[0, 1, 2, 254, 255]);
    let mut reader = open(raw).unwrap();

    let mut inline = Vec::new();
    let mut attachments = Vec::new();
    while let Some(part) = reader.next_part().unwrap() {
        if part.is_attachment() {
            attachments.push(part);
        } else {
            inline.push(part);
        }
    }

    assert_eq!(inline.len(), 1);
    assert_eq!(inline[0].content_type().mime_type(), "text/plain");
    assert_eq!(inline[0].body().text(), Some("Hello there"));

    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].filename(), Some("notes.bin"));
    assert_eq!(attachments[0].body().bytes().as_ref(), &[0, 1, 2, 254, 255]);
    assert!(reader.warnings().is_empty());
}

#[test]
fn test_unsupported_charset_is_not_fatal() {
    let raw = concat!(
        "Subject: =?x-klingon?Q?qapla?=\r\n",
        "Content-Type: multipart/alternative; boundary=alt\r\n",
        "\r\n",
        "--alt\r\n",
        "Content-Type: text/plain; charset=x-klingon\r\n",
        "\r\n",
        "nuqneH\r\n",
        "--alt\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "\r\n",
        "<b>hi</b>\r\n",
        "--alt--\r\n",
    );
    let mut reader = open(raw.as_bytes().to_vec()).unwrap();
    // An undecodable encoded word stays verbatim
    assert_eq!(reader.header().subject.as_deref(), Some("=?x-klingon?Q?qapla?="));

    let first = reader.next_part().unwrap().unwrap();
    assert!(first.body().text().is_none());
    assert_eq!(first.body().bytes().as_ref(), b"nuqneH");
    assert_eq!(first.header().raw_content_type(), Some("text/plain; charset=x-klingon"));

    let second = reader.next_part().unwrap().unwrap();
    assert_eq!(second.body().text(), Some("<b>hi</b>"));
    assert!(reader.next_part().unwrap().is_none());

    assert!(matches!(reader.warnings(), [Error::UnknownCharset(label)] if label == "x-klingon"));
    assert!(!reader.is_truncated());
}

#[test]
fn test_rfc2231_attachment_name_and_content_id() {
    let raw = concat!(
        "Content-Type: multipart/related; boundary=rel\n\n",
        "--rel\nContent-Type: text/html\n\n<img src=\"cid:img1\">\n",
        "--rel\nContent-Type: image/png\n",
        "Content-Disposition: attachment;\n filename*=utf-8''%E2%82%AC.png\n",
        "Content-ID: <img1>\n\nPNG\n",
        "--rel--\n",
    );
    let parts: Vec<MimePart> = open(raw.as_bytes().to_vec())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(parts.len(), 2);
    match &parts[1] {
        MimePart::Attachment {
            filename,
            content_id,
            ..
        } => {
            assert_eq!(filename.as_deref(), Some("€.png"));
            assert_eq!(content_id.as_deref(), Some("img1"));
        }
        MimePart::Inline { .. } => panic!("expected an attachment"),
    }
}

#[test]
fn test_lf_only_message() {
    let raw = text_with_attachment("body", "a.txt", b"abc");
    let lf: Vec<u8> = String::from_utf8(raw).unwrap().replace("\r\n", "\n").into_bytes();
    let parts: Vec<MimePart> = open(lf).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].body().text(), Some("body"));
    assert_eq!(parts[1].body().bytes().as_ref(), b"abc");
}

#[test]
fn test_broken_outer_header_keeps_message() {
    let mut raw = b"Subject: Caf\xe9 menu\r\n".to_vec();
    raw.extend_from_slice(b">>> pasted by a broken gateway\r\n");
    raw.extend_from_slice(&text_with_attachment("lunch", "menu.pdf", b"%PDF"));

    let mut reader = open(raw).unwrap();
    assert_eq!(reader.header().subject.as_deref(), Some("Café menu"));
    assert_eq!(reader.header().from[0].email, "sender@example.com");

    let parts: Vec<MimePart> = reader.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].body().text(), Some("lunch"));
    assert_eq!(parts[1].filename(), Some("menu.pdf"));

    assert!(matches!(
        reader.warnings(),
        [Error::InvalidHeader(line)] if line.starts_with(">>>")
    ));
    assert_eq!(reader.warnings()[0].tier(), Tier::Structure);
    assert!(!reader.is_truncated());
}

proptest! {
    #[test]
    fn test_arbitrary_input_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        if let Ok(mut reader) = open(data) {
            let mut guard = 0;
            while let Ok(Some(_)) = reader.next_part() {
                guard += 1;
                prop_assert!(guard < 1024);
            }
        }
    }

    #[test]
    fn test_attachment_filename_survives(name in "[a-zA-Z0-9_]{1,20}\\.[a-z]{1,4}", text in "[a-zA-Z ]{0,40}") {
        let raw = text_with_attachment(&text, &name, b"payload");
        let mut reader = open(raw).unwrap();
        let mut names = Vec::new();
        while let Some(part) = reader.next_part().unwrap() {
            if let Some(found) = part.filename() {
                names.push(found.to_string());
            }
        }
        prop_assert_eq!(names, vec![name]);
        prop_assert!(reader.warnings().iter().all(|w| w.tier() < Tier::Fatal));
    }
}
