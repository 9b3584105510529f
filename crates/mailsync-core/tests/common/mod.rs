//! An in-memory IMAP server that follows a script.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Once;

use mailsync_auth::PlainCredential;
use mailsync_core::Session;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// One step of a server script.
#[derive(Debug, Clone)]
pub enum Step {
    /// Write these bytes to the client.
    Send(String),
    /// Read one line and compare it, CRLF excluded.
    Expect(String),
    /// Read one line and check how it starts.
    ExpectPrefix(String),
}

/// Shorthand for [`Step::Send`].
pub fn send(data: impl Into<String>) -> Step {
    Step::Send(data.into())
}

/// Shorthand for [`Step::Expect`].
pub fn expect(line: impl Into<String>) -> Step {
    Step::Expect(line.into())
}

/// Shorthand for [`Step::ExpectPrefix`].
pub fn expect_prefix(prefix: impl Into<String>) -> Step {
    Step::ExpectPrefix(prefix.into())
}

/// Greeting, LOGIN as `ann`, and a selection of INBOX with three messages.
pub fn login_and_examine(capabilities: &str) -> Vec<Step> {
    vec![
        send(format!("* OK [CAPABILITY {capabilities}] ready\r\n")),
        expect("A0000 LOGIN ann secret"),
        send(format!("A0000 OK [CAPABILITY {capabilities}] logged in\r\n")),
        expect("A0001 EXAMINE INBOX"),
        send(
            "* 3 EXISTS\r\n* 0 RECENT\r\n* FLAGS (\\Seen \\Answered \\Flagged)\r\n\
             * OK [UIDVALIDITY 1] valid\r\n* OK [UIDNEXT 4] next\r\n\
             A0001 OK [READ-ONLY] EXAMINE completed\r\n",
        ),
    ]
}

/// A FETCH response carrying UID, flags, an envelope and a body literal.
pub fn fetch_response(seq: u32, uid: u32, subject: &str, body: &str) -> String {
    format!(
        "* {seq} FETCH (UID {uid} FLAGS () ENVELOPE (\"Mon, 1 Jan 2024 10:00:00 +0000\" \
         \"{subject}\" ((\"Ann\" NIL \"ann\" \"example.com\")) NIL NIL \
         ((\"Bob\" NIL \"bob\" \"example.com\")) NIL NIL NIL \"<{uid}@example.com>\") \
         BODY[] {{{}}}\r\n{body})\r\n",
        body.len()
    )
}

/// A small RFC 822 message.
pub fn message(subject: &str) -> String {
    format!(
        "From: Ann <ann@example.com>\r\nTo: Bob <bob@example.com>\r\n\
         Subject: {subject}\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\n\r\nHello.\r\n"
    )
}

/// Starts a server running `script` and returns the client end.
///
/// Once the script is done the server reads until the client disconnects.
/// A mismatch panics the server task; await the handle to surface it.
pub fn serve(script: Vec<Step>) -> (DuplexStream, JoinHandle<()>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(server);
        let mut lines = BufReader::new(read);
        let mut line = String::new();
        for step in script {
            match step {
                Step::Send(data) => write.write_all(data.as_bytes()).await.unwrap(),
                Step::Expect(expected) => {
                    line.clear();
                    lines.read_line(&mut line).await.unwrap();
                    assert_eq!(line.trim_end_matches("\r\n"), expected);
                }
                Step::ExpectPrefix(prefix) => {
                    line.clear();
                    lines.read_line(&mut line).await.unwrap();
                    assert!(line.starts_with(&prefix), "{line:?} lacks {prefix:?}");
                }
            }
        }
        loop {
            line.clear();
            match lines.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });
    (client, task)
}

/// Connects to a scripted server and logs in as `ann`.
pub async fn login(stream: DuplexStream) -> Session<DuplexStream> {
    let mut session = Session::from_stream(stream).await.unwrap();
    session
        .authenticate(&PlainCredential::new("ann", "secret"))
        .await
        .unwrap();
    session
}

/// Routes engine logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
