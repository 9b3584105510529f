//! End-to-end tests against a scripted in-memory server.

#![allow(clippy::unwrap_used, clippy::similar_names)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use common::{
    expect, expect_prefix, fetch_response, init_tracing, login, login_and_examine, message, send,
    serve,
};
use mailsync_auth::PlainCredential;
use mailsync_core::{
    Backoff, Error, FetchConfig, FetchSpec, IdKind, IdSet, IdleWatcher, ItemKind, ReconnectPolicy,
    SearchCriteria, Session, SessionState, SyncConfig, WatchConfig, WatchEvent, WatchHandler,
    WatchState, sync_folder,
};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_inbox_window_fetch_leaves_flags_alone() {
    init_tracing();
    let mut script = login_and_examine("IMAP4rev1");
    script.extend([
        expect_prefix("A0002 UID SEARCH SENTSINCE "),
        send("* SEARCH 2 3\r\nA0002 OK done\r\n"),
        expect("A0003 UID FETCH 2:3 (UID ENVELOPE BODY.PEEK[])"),
        send(fetch_response(2, 2, "Second", &message("Second"))),
        send(fetch_response(3, 3, "Third", &message("Third"))),
        send("A0003 OK done\r\n"),
        expect("A0004 UID FETCH 2:3 (UID FLAGS)"),
        send("* 2 FETCH (UID 2 FLAGS ())\r\n* 3 FETCH (UID 3 FLAGS ())\r\nA0004 OK done\r\n"),
    ]);
    let (stream, server) = serve(script);
    let mut session = login(stream).await;

    let status = session.select("INBOX", true).await.unwrap();
    assert_eq!(status.exists, 3);
    assert_eq!(status.uid_validity.map(|v| v.get()), Some(1));
    assert!(status.read_only);

    let uids = session
        .search_uids(&SearchCriteria::sent_within(30))
        .await
        .unwrap();
    assert_eq!(uids.numbers().into_iter().collect::<Vec<_>>(), vec![2, 3]);

    let spec = FetchSpec::new().envelope().body_peek();
    let mut stream = session.fetch(&uids, &spec, &FetchConfig::new());
    let mut subjects = Vec::new();
    while let Some(item) = stream.next().await {
        let fetched = item.unwrap();
        assert!(fetched.body.is_some());
        assert!(fetched.missing.is_empty());
        subjects.push(fetched.subject().unwrap());
    }
    assert_eq!(subjects, vec!["Second", "Third"]);
    let mut session = stream.finish().await.unwrap();
    assert_eq!(session.state(), SessionState::Selected);

    let flags = session
        .fetch_all(&uids, &FetchSpec::new().flags(), &FetchConfig::new())
        .await
        .unwrap();
    assert_eq!(flags.messages.len(), 2);
    assert!(flags.messages.iter().all(|m| !m.is_seen()));

    drop(session);
    server.await.unwrap();
}

#[tokio::test]
async fn test_empty_search_matches_all_time_window() {
    let mut script = login_and_examine("IMAP4rev1");
    script.extend([
        expect("A0002 UID SEARCH ALL"),
        send("* SEARCH 1 2 3\r\nA0002 OK done\r\n"),
        expect("A0003 UID SEARCH SINCE 1-Jan-1970"),
        send("* SEARCH 3 1 2\r\nA0003 OK done\r\n"),
    ]);
    let (stream, server) = serve(script);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let everything = session.search_uids(&SearchCriteria::new()).await.unwrap();
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let windowed = session
        .search_uids(&SearchCriteria::new().since(epoch))
        .await
        .unwrap();
    assert_eq!(everything, windowed);

    drop(session);
    server.await.unwrap();
}

#[tokio::test]
async fn test_fetch_twice_is_stable() {
    let response = format!(
        "{}{}A{{tag}} OK done\r\n",
        fetch_response(1, 1, "One", &message("One")),
        fetch_response(2, 2, "Two", &message("Two")),
    );
    let mut script = login_and_examine("IMAP4rev1");
    for tag in ["0002", "0003"] {
        script.push(expect(format!(
            "A{tag} UID FETCH 1:2 (UID ENVELOPE FLAGS INTERNALDATE BODY.PEEK[])"
        )));
        script.push(send(response.replace("{tag}", tag)));
    }
    let (stream, server) = serve(script);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let set = IdSet::uids([1, 2]);
    let first = session
        .fetch_all(&set, &FetchSpec::full(), &FetchConfig::new())
        .await
        .unwrap();
    let second = session
        .fetch_all(&set, &FetchSpec::full(), &FetchConfig::new().queue_depth(1))
        .await
        .unwrap();
    assert_eq!(first.messages, second.messages);
    // The server sent no INTERNALDATE.
    assert_eq!(first.messages[0].missing, vec![ItemKind::InternalDate]);

    drop(session);
    server.await.unwrap();
}

#[tokio::test]
async fn test_missing_body_fails_one_message() {
    let mut script = login_and_examine("IMAP4rev1");
    script.extend([
        expect("A0002 FETCH 1:3 BODY.PEEK[]"),
        send(format!(
            "* 1 FETCH (BODY[] {{5}}\r\nfirst)\r\n* 2 FETCH (BODY[] NIL)\r\n\
             * 3 FETCH (BODY[] {{5}}\r\nthird)\r\nA0002 OK done\r\n"
        )),
    ]);
    let (stream, server) = serve(script);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let set = IdSet::range(IdKind::Sequence, 1, 3);
    let mut stream = session.fetch(&set, &FetchSpec::new().body_peek(), &FetchConfig::new());
    let mut outcomes = Vec::new();
    while let Some(item) = stream.next().await {
        outcomes.push(item);
    }
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    assert!(matches!(
        outcomes[1],
        Err(Error::FetchItemMissing {
            item: ItemKind::Body,
            ..
        })
    ));
    assert!(outcomes[2].is_ok());
    let session = stream.finish().await.unwrap();
    assert_eq!(session.state(), SessionState::Selected);

    drop(session);
    server.await.unwrap();
}

#[tokio::test]
async fn test_sync_folder_decodes_messages() {
    let mut script = login_and_examine("IMAP4rev1");
    script.extend([
        expect("A0002 EXAMINE INBOX"),
        send("* 3 EXISTS\r\n* OK [UIDVALIDITY 1] valid\r\nA0002 OK [READ-ONLY] done\r\n"),
        expect_prefix("A0003 UID SEARCH SENTSINCE "),
        send("* SEARCH 2 3\r\nA0003 OK done\r\n"),
        expect("A0004 UID FETCH 2:3 (FLAGS UID ENVELOPE BODY.PEEK[])"),
        send(fetch_response(2, 2, "Second", &message("Second"))),
        send(fetch_response(3, 3, "Third", "Content-Type: text/plain\r\n")),
        send("A0004 OK done\r\n"),
    ]);
    let (stream, server) = serve(script);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let config = SyncConfig::new().window_days(30);
    let synced = sync_folder(&mut session, "INBOX", &config, &FetchConfig::new())
        .await
        .unwrap();
    assert_eq!(synced.status.exists, 3);
    assert_eq!(synced.messages.len() + synced.failures.len(), 2);
    let second = &synced.messages[0];
    assert_eq!(second.header.subject.as_deref(), Some("Second"));
    assert_eq!(second.text("plain").map(str::trim_end), Some("Hello."));
    assert_eq!(session.state(), SessionState::Selected);

    drop(session);
    server.await.unwrap();
}

#[tokio::test]
async fn test_malformed_header_line_does_not_fail_message() {
    let body = "Subject: Broken\r\nthis line has no colon\r\nFrom: ann@example.com\r\n\r\nStill readable.\r\n";
    let mut script = login_and_examine("IMAP4rev1");
    script.extend([
        expect("A0002 EXAMINE INBOX"),
        send("* 3 EXISTS\r\nA0002 OK [READ-ONLY] done\r\n"),
        expect_prefix("A0003 UID SEARCH SENTSINCE "),
        send("* SEARCH 2\r\nA0003 OK done\r\n"),
        expect("A0004 UID FETCH 2 (FLAGS UID ENVELOPE BODY.PEEK[])"),
        send(fetch_response(2, 2, "Broken", body)),
        send("A0004 OK done\r\n"),
    ]);
    let (stream, server) = serve(script);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let config = SyncConfig::new().window_days(30);
    let synced = sync_folder(&mut session, "INBOX", &config, &FetchConfig::new())
        .await
        .unwrap();
    assert!(synced.failures.is_empty());
    let message = &synced.messages[0];
    assert_eq!(message.header.subject.as_deref(), Some("Broken"));
    assert_eq!(message.header.from.len(), 1);
    assert_eq!(message.text("plain").map(str::trim_end), Some("Still readable."));
    assert_eq!(message.warnings.len(), 1);
    assert!(message.warnings[0].contains("this line has no colon"));

    drop(session);
    server.await.unwrap();
}

struct Recorder {
    events: mpsc::UnboundedSender<WatchEvent>,
    errors: mpsc::UnboundedSender<String>,
}

impl WatchHandler for Recorder {
    fn on_event(&mut self, event: WatchEvent) {
        let _ = self.events.send(event);
    }

    fn on_error(&mut self, error: &Error) {
        let _ = self.errors.send(error.to_string());
    }
}

fn recorder() -> (
    Recorder,
    mpsc::UnboundedReceiver<WatchEvent>,
    mpsc::UnboundedReceiver<String>,
) {
    let (events, event_rx) = mpsc::unbounded_channel();
    let (errors, error_rx) = mpsc::unbounded_channel();
    (Recorder { events, errors }, event_rx, error_rx)
}

#[tokio::test(start_paused = true)]
async fn test_stop_within_grace_then_reuse_session() {
    init_tracing();
    let mut script = login_and_examine("IMAP4rev1 IDLE");
    script.extend([
        expect("A0002 IDLE"),
        send("+ idling\r\n"),
        send("* 4 EXISTS\r\n"),
        expect("DONE"),
        send("A0002 OK IDLE terminated\r\n"),
        expect("A0003 UID SEARCH ALL"),
        send("* SEARCH 1 2 3 4\r\nA0003 OK done\r\n"),
    ]);
    let (stream, server) = serve(script);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let grace = Duration::from_secs(2);
    let (handler, mut events, _errors) = recorder();
    let handle = IdleWatcher::new(WatchConfig::new().grace_period(grace)).watch(session, handler);
    assert_eq!(events.recv().await, Some(WatchEvent::CountChanged(4)));

    let started = tokio::time::Instant::now();
    let mut session = handle.stop().await.unwrap();
    assert!(started.elapsed() <= grace);
    assert_eq!(session.state(), SessionState::Selected);

    let all = session.search_uids(&SearchCriteria::new()).await.unwrap();
    assert_eq!(all.len(), Some(4));

    drop(session);
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_gives_up_after_grace() {
    let mut script = login_and_examine("IMAP4rev1 IDLE");
    script.extend([expect("A0002 IDLE"), send("+ idling\r\n"), expect("DONE")]);
    let (stream, server) = serve(script);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let grace = Duration::from_secs(3);
    let (handler, _events, _errors) = recorder();
    let handle = IdleWatcher::new(WatchConfig::new().grace_period(grace)).watch(session, handler);
    let mut states = handle.subscribe();
    states.wait_for(|s| *s == WatchState::Idle).await.unwrap();
    tokio::task::yield_now().await;

    let started = tokio::time::Instant::now();
    let error = handle.stop().await.unwrap_err();
    assert!(matches!(error, Error::IdleTransport(_)));
    assert_eq!(started.elapsed(), grace);

    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_with_backoff_and_resumes() {
    init_tracing();
    let mut first = login_and_examine("IMAP4rev1 IDLE");
    first.extend([
        expect("A0002 IDLE"),
        send("+ idling\r\n"),
        send("* BYE server restarting\r\n"),
    ]);
    let (stream, first_server) = serve(first);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let reconnect = move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                let (stream, _server) = serve(vec![send("* BYE too busy\r\n")]);
                return Session::from_stream(stream).await;
            }
            let script = vec![
                send("* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n"),
                expect("A0000 LOGIN ann secret"),
                send("A0000 OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n"),
                expect("A0001 EXAMINE INBOX"),
                send("* 6 EXISTS\r\n* OK [UIDVALIDITY 1] valid\r\nA0001 OK [READ-ONLY] done\r\n"),
                expect("A0002 IDLE"),
                send("+ idling\r\n"),
                send("* 7 EXISTS\r\n"),
                expect("DONE"),
                send("A0002 OK IDLE terminated\r\n"),
            ];
            let (stream, _server) = serve(script);
            let mut session: Session<DuplexStream> = Session::from_stream(stream).await?;
            session
                .authenticate(&PlainCredential::new("ann", "secret"))
                .await?;
            Ok(session)
        }
    };

    let backoff = Backoff::new()
        .initial(Duration::from_secs(2))
        .max(Duration::from_secs(10))
        .max_attempts(3);
    let config = WatchConfig::new().reconnect(ReconnectPolicy::new().backoff(backoff));
    let (handler, mut events, mut errors) = recorder();
    let started = tokio::time::Instant::now();
    let handle = IdleWatcher::new(config)
        .reconnect(reconnect)
        .watch(session, handler);

    let lost = errors.recv().await.unwrap();
    assert!(lost.contains("IDLE transport failed"), "{lost}");
    let refused = errors.recv().await.unwrap();
    assert!(refused.contains("connect"), "{refused}");

    assert_eq!(events.recv().await, Some(WatchEvent::CountChanged(7)));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    // First delay 2 s, second 4 s.
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert_eq!(handle.state(), WatchState::Idle);

    let session = handle.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Selected);
    assert_eq!(session.selected().unwrap().status().exists, 7);
    first_server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let mut first = login_and_examine("IMAP4rev1 IDLE");
    first.extend([
        expect("A0002 IDLE"),
        send("+ idling\r\n"),
        send("* BYE gone\r\n"),
    ]);
    let (stream, first_server) = serve(first);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let reconnect = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let (stream, _server) = serve(vec![send("* BYE still down\r\n")]);
            Session::from_stream(stream).await
        }
    };

    let backoff = Backoff::new().max_attempts(2);
    let config = WatchConfig::new().reconnect(ReconnectPolicy::new().backoff(backoff));
    let (handler, _events, _errors) = recorder();
    let handle = IdleWatcher::new(config)
        .reconnect(reconnect)
        .watch(session, handler);

    let mut states = handle.subscribe();
    states.wait_for(|s| *s == WatchState::Reconnecting).await.unwrap();
    states.wait_for(|s| *s == WatchState::Failed).await.unwrap();
    let session = handle.stop().await.unwrap();
    assert!(session.is_closed());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    first_server.await.unwrap();
}

fn drops_during_idle() -> Vec<common::Step> {
    let mut script = login_and_examine("IMAP4rev1 IDLE");
    script.extend([
        expect("A0002 IDLE"),
        send("+ idling\r\n"),
        send("* BYE dropping you\r\n"),
    ]);
    script
}

#[tokio::test(start_paused = true)]
async fn test_backoff_escalates_when_server_keeps_dropping() {
    let (stream, first_server) = serve(drops_during_idle());
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let reconnect = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let (stream, _server) = serve(drops_during_idle());
            let mut session: Session<DuplexStream> = Session::from_stream(stream).await?;
            session
                .authenticate(&PlainCredential::new("ann", "secret"))
                .await?;
            Ok(session)
        }
    };

    let backoff = Backoff::new()
        .initial(Duration::from_secs(2))
        .max(Duration::from_secs(60))
        .max_attempts(3);
    let config = WatchConfig::new().reconnect(ReconnectPolicy::new().backoff(backoff));
    let (handler, mut events, _errors) = recorder();
    let started = tokio::time::Instant::now();
    let handle = IdleWatcher::new(config)
        .reconnect(reconnect)
        .watch(session, handler);

    let mut states = handle.subscribe();
    states.wait_for(|s| *s == WatchState::Reconnecting).await.unwrap();
    states.wait_for(|s| *s == WatchState::Failed).await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    // 2 s, then 4 s, then 8 s.
    assert!(started.elapsed() >= Duration::from_secs(14));
    assert!(events.try_recv().is_err());

    let session = handle.stop().await.unwrap();
    assert!(session.is_closed());
    first_server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_idle_is_renewed_before_server_timeout() {
    let mut script = login_and_examine("IMAP4rev1 IDLE");
    script.extend([
        expect("A0002 IDLE"),
        send("+ idling\r\n"),
        expect("DONE"),
        send("A0002 OK IDLE terminated\r\n"),
        expect("A0003 IDLE"),
        send("+ idling\r\n"),
        send("* 5 EXISTS\r\n"),
        expect("DONE"),
        send("A0003 OK IDLE terminated\r\n"),
    ]);
    let (stream, server) = serve(script);
    let mut session = login(stream).await;
    session.select("INBOX", true).await.unwrap();

    let renewal = Duration::from_secs(60);
    let (handler, mut events, _errors) = recorder();
    let started = tokio::time::Instant::now();
    let handle = IdleWatcher::new(WatchConfig::new().idle_renewal(renewal)).watch(session, handler);

    assert_eq!(events.recv().await, Some(WatchEvent::CountChanged(5)));
    assert!(started.elapsed() >= renewal);
    assert_eq!(handle.state(), WatchState::Idle);

    let session = handle.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Selected);
    assert_eq!(session.selected().unwrap().status().exists, 5);

    drop(session);
    server.await.unwrap();
}
