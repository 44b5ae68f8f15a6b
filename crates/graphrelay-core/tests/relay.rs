//! Integration tests for the relay pipeline.
//!
//! The scripted tests drive an SMTP connection over a mock stream; the
//! end-to-end test runs the TCP server against a mock Graph endpoint.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use graphrelay_core::{GraphClient, MailSender, OutboundRequest, Relay, SendError};
use graphrelay_mime::BodyKind;
use graphrelay_oauth::{Token, TokenCache, TokenSource};
use graphrelay_smtp::{Backend, Connection, Server, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_test::io::Builder;

const GREETING: &[u8] = b"220 relay.example.com ESMTP Service Ready\r\n";

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, OutboundRequest)>>,
}

#[async_trait]
impl MailSender for RecordingSender {
    async fn send(&self, identity: &str, request: &OutboundRequest) -> Result<(), SendError> {
        self.sent
            .lock()
            .unwrap()
            .push((identity.to_string(), request.clone()));
        Ok(())
    }
}

fn config() -> Arc<ServerConfig> {
    Arc::new(ServerConfig::new("relay.example.com"))
}

#[tokio::test]
async fn test_authenticated_submission_is_relayed() {
    let sender = Arc::new(RecordingSender::default());
    let relay = Relay::new(sender.clone());

    let stream = Builder::new()
        .write(GREETING)
        .read(b"HELO client.example.com\r\n")
        .write(b"250 relay.example.com Hello client.example.com\r\n")
        .read(b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n")
        .write(b"235 Authentication succeeded\r\n")
        .read(b"MAIL FROM:<alice@example.com>\r\n")
        .write(b"250 OK\r\n")
        .read(b"RCPT TO:<bob@example.com>\r\n")
        .write(b"250 OK\r\n")
        .read(b"DATA\r\n")
        .write(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
        .read(b"Subject: Hi\r\nContent-Type: text/plain\r\n\r\nHello Bob\r\n.\r\n")
        .write(b"250 OK: message accepted\r\n")
        .read(b"QUIT\r\n")
        .write(b"221 Bye\r\n")
        .build();

    Connection::new(stream, relay.new_session(None), config())
        .run()
        .await
        .unwrap();

    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (identity, request) = &sent[0];
    assert_eq!(identity, "alice@example.com");
    assert_eq!(request.subject(), "Hi");
    assert_eq!(request.body().kind, BodyKind::Text);
    assert_eq!(request.body().content, "Hello Bob\r\n");
    assert_eq!(request.recipients().len(), 1);
    assert_eq!(request.recipients()[0].address, "bob@example.com");
    assert!(request.save_to_sent_items());
}

#[tokio::test]
async fn test_two_messages_on_one_connection() {
    let sender = Arc::new(RecordingSender::default());
    let relay = Relay::new(sender.clone());

    let stream = Builder::new()
        .write(GREETING)
        .read(b"HELO client.example.com\r\n")
        .write(b"250 relay.example.com Hello client.example.com\r\n")
        .read(b"MAIL FROM:<alice@example.com>\r\n")
        .write(b"250 OK\r\n")
        .read(b"RCPT TO:<bob@example.com>\r\n")
        .write(b"250 OK\r\n")
        .read(b"RCPT TO:<carol@example.com>\r\n")
        .write(b"250 OK\r\n")
        .read(b"DATA\r\n")
        .write(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
        .read(b"Subject: One\r\n\r\nfirst\r\n.\r\n")
        .write(b"250 OK: message accepted\r\n")
        .read(b"MAIL FROM:<alice@example.com>\r\n")
        .write(b"250 OK\r\n")
        .read(b"RCPT TO:<dave@example.com>\r\n")
        .write(b"250 OK\r\n")
        .read(b"DATA\r\n")
        .write(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
        .read(b"Subject: Two\r\nContent-Type: text/html\r\n\r\n<p>second</p>\r\n.\r\n")
        .write(b"250 OK: message accepted\r\n")
        .read(b"QUIT\r\n")
        .write(b"221 Bye\r\n")
        .build();

    Connection::new(stream, relay.new_session(None), config())
        .run()
        .await
        .unwrap();

    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);

    let first: Vec<_> = sent[0].1.recipients().iter().map(|r| r.address.as_str()).collect();
    assert_eq!(first, ["bob@example.com", "carol@example.com"]);

    let second = &sent[1].1;
    assert_eq!(second.subject(), "Two");
    assert_eq!(second.body().kind, BodyKind::Html);
    assert_eq!(second.recipients().len(), 1);
    assert_eq!(second.recipients()[0].address, "dave@example.com");
}

#[tokio::test]
async fn test_null_sender_without_auth_is_rejected() {
    let sender = Arc::new(RecordingSender::default());
    let relay = Relay::new(sender.clone());

    let stream = Builder::new()
        .write(GREETING)
        .read(b"HELO client.example.com\r\n")
        .write(b"250 relay.example.com Hello client.example.com\r\n")
        .read(b"MAIL FROM:<>\r\n")
        .write(b"250 OK\r\n")
        .read(b"RCPT TO:<bob@example.com>\r\n")
        .write(b"250 OK\r\n")
        .read(b"DATA\r\n")
        .write(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
        .read(b"Subject: Bounce\r\n\r\nbody\r\n.\r\n")
        .write(b"554 Authentication required to send as a mailbox\r\n")
        .read(b"QUIT\r\n")
        .write(b"221 Bye\r\n")
        .build();

    Connection::new(stream, relay.new_session(None), config())
        .run()
        .await
        .unwrap();

    assert!(sender.sent.lock().unwrap().is_empty());
}

struct FixedToken;

#[async_trait]
impl TokenSource for FixedToken {
    async fn fetch_token(&self) -> graphrelay_oauth::Result<Token> {
        Ok(Token::new("app-token", "Bearer"))
    }
}

async fn expect_reply<R>(reader: &mut R, code: &str)
where
    R: AsyncBufReadExt + Unpin,
{
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with(code), "expected {code}, got {line:?}");
        if line.as_bytes().get(3) != Some(&b'-') {
            return;
        }
    }
}

#[tokio::test]
async fn test_end_to_end_over_tcp() {
    let mut graph = mockito::Server::new_async().await;
    let mock = graph
        .mock("POST", "/v1.0/users/alice@example.com/sendMail")
        .match_header("authorization", "Bearer app-token")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "message": {
                "subject": "Hi",
                "toRecipients": [{"emailAddress": {"address": "bob@example.com"}}]
            },
            "saveToSentItems": true
        })))
        .with_status(202)
        .create_async()
        .await;

    let client = GraphClient::new(TokenCache::new(FixedToken))
        .unwrap()
        .with_base_url(url::Url::parse(&graph.url()).unwrap());
    let relay = Relay::new(Arc::new(client));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        Server::new(Arc::new(relay), ServerConfig::new("relay.example.com"))
            .serve_with_shutdown(listener, async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    expect_reply(&mut reader, "220").await;
    let script: [(&[u8], &str); 7] = [
        (b"EHLO client.example.com\r\n", "250"),
        (b"AUTH PLAIN AGFsaWNlQGV4YW1wbGUuY29tAHNlY3JldA==\r\n", "235"),
        (b"MAIL FROM:<alice@example.com>\r\n", "250"),
        (b"RCPT TO:<bob@example.com>\r\n", "250"),
        (b"DATA\r\n", "354"),
        (b"Subject: Hi\r\n\r\nHello Bob\r\n.\r\n", "250"),
        (b"QUIT\r\n", "221"),
    ];
    for (command, code) in script {
        write.write_all(command).await.unwrap();
        expect_reply(&mut reader, code).await;
    }

    mock.assert_async().await;

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
