//! Integration tests for the IMAP client.
//!
//! The wire is scripted with `tokio_test::io::Builder`: every command the
//! client writes must match the script byte for byte.

use mailsync_auth::{BearerCredential, BearerToken, PlainCredential, sasl};
use mailsync_imap::command::{FetchAttribute, SearchKey, StoreMode};
use mailsync_imap::types::{Flag, MailboxAttribute, ResponseCode};
use mailsync_imap::{Capability, Client, Error, FetchItem, IdleEvent, SequenceSet, Uid};
use tokio_test::io::Builder;

const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 IDLE SASL-IR AUTH=PLAIN AUTH=XOAUTH2] ready\r\n";

#[tokio::test]
async fn test_login_examine_search_fetch() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0000 LOGIN ann secret\r\n")
        .read(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n")
        .write(b"A0001 EXAMINE INBOX\r\n")
        .read(
            b"* 3 EXISTS\r\n* 0 RECENT\r\n* FLAGS (\\Seen \\Flagged)\r\n\
              * OK [UIDVALIDITY 1] ok\r\n* OK [UIDNEXT 4] ok\r\n\
              A0001 OK [READ-ONLY] EXAMINE completed\r\n",
        )
        .write(b"A0002 UID SEARCH ALL\r\n")
        .read(b"* SEARCH 1 2 3\r\nA0002 OK done\r\n")
        .write(b"A0003 UID FETCH 2:3 (UID FLAGS)\r\n")
        .read(b"* 2 FETCH (UID 2 FLAGS ())\r\n")
        .read(b"* 3 FETCH (UID 3 FLAGS (\\Seen))\r\nA0003 OK done\r\n")
        .write(b"A0004 LOGOUT\r\n")
        .read(b"* BYE bye\r\nA0004 OK done\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    assert!(client.capabilities().has(&Capability::SaslIr));

    let client = client.login("ann", "secret").await.unwrap();
    assert!(!client.capabilities().has(&Capability::SaslIr));

    let mut client = client.examine("INBOX").await.map_err(|(e, _)| e).unwrap();
    let status = client.state().status().clone();
    assert_eq!(status.exists, 3);
    assert_eq!(status.uid_validity.map(|v| v.get()), Some(1));
    assert!(status.read_only);
    assert!(status.flags.contains(&Flag::Flagged));

    let uids = client.search(&SearchKey::All, true).await.unwrap();
    assert_eq!(uids, vec![1, 2, 3]);

    let set = SequenceSet::from_numbers([3, 2]).unwrap();
    let mut responses = client
        .fetch(&set, &[FetchAttribute::Uid, FetchAttribute::Flags], true)
        .await
        .unwrap();
    let mut seen = Vec::new();
    while let Some((seq, items)) = responses.next().await.unwrap() {
        seen.push((seq.get(), items));
    }
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, 2);
    assert_eq!(seen[1].1[0], FetchItem::Uid(Uid::new(3).unwrap()));

    client.logout().await.unwrap();
}

#[tokio::test]
async fn test_failed_select_returns_authenticated_client() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0000 LOGIN ann secret\r\n")
        .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
        .write(b"A0001 SELECT Missing\r\n")
        .read(b"A0001 NO [NONEXISTENT] no such mailbox\r\n")
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(
            b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n\
              * LIST (\\Noselect \\HasChildren) \"/\" Archive\r\n\
              A0002 OK done\r\n",
        )
        .build();

    let client = Client::from_stream(mock)
        .await
        .unwrap()
        .login("ann", "secret")
        .await
        .unwrap();

    let (error, mut client) = client.select("Missing").await.unwrap_err();
    assert!(matches!(
        error,
        Error::No {
            code: Some(ResponseCode::NonExistent),
            ..
        }
    ));
    assert!(error.is_rejection());

    let entries = client.list_all("", "*").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_selectable());
    assert!(entries[1].attributes.contains(&MailboxAttribute::NoSelect));
    assert!(!entries[1].is_selectable());
}

#[tokio::test]
async fn test_sasl_plain_without_initial_response() {
    let reply = format!("{}\r\n", sasl::plain_response("ann", "pw"));
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] hi\r\n")
        .write(b"A0000 AUTHENTICATE PLAIN\r\n")
        .read(b"+ \r\n")
        .write(reply.as_bytes())
        .read(b"A0000 OK done\r\n")
        .write(b"A0001 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 IDLE\r\nA0001 OK done\r\n")
        .build();

    let credential = PlainCredential::new("ann", "pw").with_sasl_plain();
    let client = Client::from_stream(mock)
        .await
        .unwrap()
        .authenticate(&credential)
        .await
        .unwrap();
    assert!(client.capabilities().supports_idle());
}

#[tokio::test]
async fn test_bearer_rejection_is_auth_error() {
    let command = format!(
        "A0000 AUTHENTICATE XOAUTH2 {}\r\n",
        sasl::xoauth2_response("ann@example.com", "tok")
    );
    let mock = Builder::new()
        .read(GREETING)
        .write(command.as_bytes())
        .read(b"+ eyJzdGF0dXMiOiI0MDEiLCJzY2hlbWVzIjoiYmVhcmVyIn0=\r\n")
        .write(b"\r\n")
        .read(b"A0000 NO [AUTHENTICATIONFAILED] invalid credentials\r\n")
        .build();

    let credential = BearerCredential::xoauth2("ann@example.com", BearerToken::new("tok"));
    let result = Client::from_stream(mock)
        .await
        .unwrap()
        .authenticate(&credential)
        .await;
    assert!(matches!(result, Err(Error::Auth(_))));
}

#[tokio::test]
async fn test_login_disabled_is_refused_locally() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] hi\r\n")
        .build();

    let result = Client::from_stream(mock).await.unwrap().login("a", "b").await;
    assert!(matches!(result, Err(Error::Auth(_))));
}

#[tokio::test]
async fn test_abandoned_fetch_is_drained() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0000 LOGIN ann secret\r\n")
        .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
        .write(b"A0001 SELECT INBOX\r\n")
        .read(b"* 3 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n")
        .write(b"A0002 FETCH 1:3 UID\r\n")
        .read(b"* 1 FETCH (UID 1)\r\n")
        .read(b"* 2 FETCH (UID 2)\r\n* 3 FETCH (UID 3)\r\nA0002 OK done\r\n")
        .write(b"A0003 NOOP\r\n")
        .read(b"* 4 EXISTS\r\nA0003 OK done\r\n")
        .build();

    let client = Client::from_stream(mock)
        .await
        .unwrap()
        .login("ann", "secret")
        .await
        .unwrap();
    let mut client = client.select("INBOX").await.map_err(|(e, _)| e).unwrap();

    let set = SequenceSet::range(1, 3).unwrap();
    {
        let mut responses = client.fetch(&set, &[FetchAttribute::Uid], false).await.unwrap();
        assert!(responses.next().await.unwrap().is_some());
    }

    let updates = client.poll().await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(client.state().status().exists, 4);
}

#[tokio::test]
async fn test_store_echo_and_idle() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0000 LOGIN ann secret\r\n")
        .read(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] ok\r\n")
        .write(b"A0001 SELECT INBOX\r\n")
        .read(b"* 2 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n")
        .write(b"A0002 UID STORE 7 +FLAGS (\\Flagged)\r\n")
        .read(b"* 2 FETCH (UID 7 FLAGS (\\Flagged \\Seen))\r\nA0002 OK done\r\n")
        .write(b"A0003 IDLE\r\n")
        .read(b"+ idling\r\n")
        .read(b"* 3 EXISTS\r\n")
        .write(b"DONE\r\n")
        .read(b"A0003 OK IDLE terminated\r\n")
        .build();

    let client = Client::from_stream(mock)
        .await
        .unwrap()
        .login("ann", "secret")
        .await
        .unwrap();
    let mut client = client.select("INBOX").await.map_err(|(e, _)| e).unwrap();

    let set = SequenceSet::single(7).unwrap();
    let updated = client
        .store(&set, StoreMode::Add, &[Flag::Flagged], false, true)
        .await
        .unwrap();
    assert_eq!(updated.len(), 1);
    assert!(updated[0].1.is_flagged());

    let mut handle = client.idle().await.unwrap();
    let event = handle
        .wait(std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(event, IdleEvent::Exists(3));
    handle.done().await.unwrap();
    assert_eq!(client.state().status().exists, 3);
}

#[tokio::test]
async fn test_store_refused_on_read_only_selection() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0000 LOGIN ann secret\r\n")
        .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
        .write(b"A0001 EXAMINE INBOX\r\n")
        .read(b"* 1 EXISTS\r\nA0001 OK [READ-ONLY] done\r\n")
        .build();

    let client = Client::from_stream(mock)
        .await
        .unwrap()
        .login("ann", "secret")
        .await
        .unwrap();
    let mut client = client.examine("INBOX").await.map_err(|(e, _)| e).unwrap();
    let set = SequenceSet::single(1).unwrap();
    let result = client
        .store(&set, StoreMode::Add, &[Flag::Seen], true, false)
        .await;
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn test_bye_greeting() {
    let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
    assert!(matches!(
        Client::from_stream(mock).await,
        Err(Error::Bye(_))
    ));
}
