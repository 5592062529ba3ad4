//! Integration tests for the SMTP client.
//!
//! Each test runs a scripted fake server on a loopback listener and checks
//! the exact command sequence the client produces.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mailflash_smtp::connection::connect;
use mailflash_smtp::{Address, AuthMechanism, Client, Error};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One scripted exchange: the expected command prefix and the reply.
type Step = (&'static str, &'static str);

/// Starts a fake server that greets, then answers each command per `script`.
///
/// After a `354` reply the server reads the message up to the lone `.` line
/// and records it as a single entry. Returns the port and a handle that
/// yields everything the client sent.
async fn fake_server(greeting: &'static str, script: Vec<Step>) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        let mut received = Vec::new();

        write.write_all(greeting.as_bytes()).await.unwrap();
        let mut in_data = false;
        for (expected, reply) in script {
            let mut entry = String::new();
            if in_data {
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    if line == ".\r\n" {
                        break;
                    }
                    entry.push_str(&line);
                }
            } else {
                reader.read_line(&mut entry).await.unwrap();
                entry.truncate(entry.trim_end().len());
            }

            assert!(
                entry.starts_with(expected),
                "expected {expected:?}, got {entry:?}"
            );
            received.push(entry);
            write.write_all(reply.as_bytes()).await.unwrap();
            in_data = reply.starts_with("354");
        }
        received
    });

    (port, handle)
}

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

#[tokio::test]
async fn test_full_transaction() {
    let (port, server) = fake_server(
        "220 mx.test ESMTP\r\n",
        vec![
            ("EHLO client.test", "250-mx.test\r\n250-SIZE 1000000\r\n250 8BITMIME\r\n"),
            ("MAIL FROM:<a@test> BODY=8BITMIME", "250 OK\r\n"),
            ("RCPT TO:<b@test> NOTIFY=NEVER", "250 OK\r\n"),
            ("RCPT TO:<c@test> NOTIFY=NEVER", "250 OK\r\n"),
            ("DATA", "354 go ahead\r\n"),
            ("Subject: hi", "250 queued\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    assert_eq!(client.server_info().hostname, "mx.test");

    let client = client.ehlo("client.test").await.unwrap();
    assert_eq!(client.server_info().extensions.max_size(), Some(1_000_000));

    let client = client
        .send_mail(
            Some(addr("a@test")),
            &[addr("b@test"), addr("c@test")],
            b"Subject: hi\r\n\r\n.dot line\r\n",
            &["BODY=8BITMIME".to_string()],
            &["NOTIFY=NEVER".to_string()],
        )
        .await
        .unwrap();
    client.quit().await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received[5], "Subject: hi\r\n\r\n..dot line\r\n");
}

#[tokio::test]
async fn test_helo_fallback() {
    let (port, server) = fake_server(
        "220 old.test\r\n",
        vec![
            ("EHLO me", "502 not implemented\r\n"),
            ("HELO me", "250 old.test\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    assert!(client.server_info().extensions.is_empty());
    client.quit().await.unwrap();
    assert_eq!(server.await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_auth_prefers_plain() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO me", "250-mx.test\r\n250 AUTH LOGIN PLAIN\r\n"),
            ("AUTH PLAIN AHVzZXIAc2VjcmV0", "235 ok\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    assert_eq!(
        client.server_info().extensions.auth_mechanisms(),
        &[AuthMechanism::Login, AuthMechanism::Plain]
    );
    let client = client.auth("user", "secret").await.unwrap();
    client.quit().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_auth_login_exchange() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO me", "250-mx.test\r\n250 AUTH LOGIN\r\n"),
            ("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
            ("dXNlcg==", "334 UGFzc3dvcmQ6\r\n"),
            ("c2VjcmV0", "235 ok\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    client.auth("user", "secret").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_auth_without_mechanisms_is_not_supported() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![("EHLO me", "250 mx.test\r\n")],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    let err = client.auth("user", "secret").await.unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_starttls_requires_extension() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![("EHLO me", "250-mx.test\r\n250 SIZE 10\r\n")],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    let err = client.starttls("localhost").await.unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_partial_recipient_refusal_still_delivers() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO me", "250 mx.test\r\n"),
            ("MAIL FROM:<>", "250 OK\r\n"),
            ("RCPT TO:<bad@test>", "550 no such user\r\n"),
            ("RCPT TO:<good@test>", "250 OK\r\n"),
            ("DATA", "354 go ahead\r\n"),
            ("body", "250 queued\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    client
        .send_mail(None, &[addr("bad@test"), addr("good@test")], b"body", &[], &[])
        .await
        .unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_all_recipients_refused_resets() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO me", "250 mx.test\r\n"),
            ("MAIL FROM:<a@test>", "250 OK\r\n"),
            ("RCPT TO:<bad@test>", "550 no such user\r\n"),
            ("RSET", "250 OK\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    let err = client
        .send_mail(Some(addr("a@test")), &[addr("bad@test")], b"body", &[], &[])
        .await
        .unwrap_err();
    assert!(err.error().is_permanent());
    assert!(err.is_recoverable());

    let (_, client) = err.into_parts();
    client.unwrap().quit().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_refused_sender_keeps_session() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO me", "250 mx.test\r\n"),
            ("MAIL FROM:<spam@test>", "550 sender blocked\r\n"),
            ("RSET", "250 OK\r\n"),
            ("MAIL FROM:<a@test>", "250 OK\r\n"),
            ("RCPT TO:<b@test>", "250 OK\r\n"),
            ("DATA", "354 go ahead\r\n"),
            ("second", "250 queued\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();

    let err = client
        .send_mail(Some(addr("spam@test")), &[addr("b@test")], b"first", &[], &[])
        .await
        .unwrap_err();
    assert!(matches!(err.error(), Error::SmtpError { code: 550, .. }));

    let client = err.into_parts().1.unwrap();
    let client = client
        .send_mail(Some(addr("a@test")), &[addr("b@test")], b"second", &[], &[])
        .await
        .unwrap();
    client.quit().await.unwrap();
    assert_eq!(server.await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_rejected_data_keeps_session() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO me", "250 mx.test\r\n"),
            ("MAIL FROM:<a@test>", "250 OK\r\n"),
            ("RCPT TO:<b@test>", "250 OK\r\n"),
            ("DATA", "354 go ahead\r\n"),
            ("spam", "554 content rejected\r\n"),
            ("RSET", "250 OK\r\n"),
            ("QUIT", "221 bye\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    let err = client
        .send_mail(Some(addr("a@test")), &[addr("b@test")], b"spam", &[], &[])
        .await
        .unwrap_err();

    let (err, client) = err.into_parts();
    assert!(err.is_permanent());
    client.unwrap().quit().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_closing_server_loses_session() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![
            ("EHLO me", "250 mx.test\r\n"),
            ("MAIL FROM:<a@test>", "421 shutting down\r\n"),
        ],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    let err = client
        .send_mail(Some(addr("a@test")), &[addr("b@test")], b"body", &[], &[])
        .await
        .unwrap_err();

    assert!(!err.is_recoverable());
    assert!(matches!(err.error(), Error::SmtpError { code: 421, .. }));
    assert_eq!(server.await.unwrap().len(), 2, "no RSET after 421");
}

#[tokio::test]
async fn test_parameter_with_line_break_is_never_sent() {
    let (port, server) = fake_server(
        "220 mx.test\r\n",
        vec![("EHLO me", "250 mx.test\r\n"), ("QUIT", "221 bye\r\n")],
    )
    .await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let client = Client::from_stream(stream).await.unwrap();
    let client = client.ehlo("me").await.unwrap();
    let err = client
        .send_mail(
            Some(addr("a@test")),
            &[addr("b@test")],
            b"body",
            &["SIZE=1\r\nRCPT TO:<x@evil>".to_string()],
            &[],
        )
        .await
        .unwrap_err();

    assert!(matches!(err.error(), Error::Protocol(_)));
    let client = err.into_parts().1.unwrap();
    client.quit().await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received, ["EHLO me", "QUIT"]);
}

#[tokio::test]
async fn test_rejected_greeting() {
    let (port, server) = fake_server("554 go away\r\n", vec![]).await;

    let stream = connect("127.0.0.1", port).await.unwrap();
    let err = Client::from_stream(stream).await.unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_hangup_is_io_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let stream = connect("127.0.0.1", port).await.unwrap();
    let err = Client::from_stream(stream).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    server.await.unwrap();
}
