// WebSocket relay for mailbox files
// Carries offer.txt and answer.txt between two machines that share no directory

use anyhow::{anyhow, bail, Context};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_async, connect_async};
use tracing::{debug, info, warn};

use super::codec::{decode, SignalingMessage};
use super::mailbox::{Mailbox, MailboxSlot, DEFAULT_POLL_INTERVAL};

/// Default listen address of `mailbox-relay serve`
pub const DEFAULT_BIND: &str = "0.0.0.0:7575";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// First message from the answering side
    Hello { client_id: String },

    /// Client id matches, the offer follows
    Accepted,

    /// Mailbox text of the offer, exactly as stored in offer.txt
    Offer { text: String },

    /// Mailbox text of the answer
    Answer { text: String },

    AnswerSaved,

    Error { message: String },
}

async fn send_message<S>(ws: &mut S, message: &RelayMessage) -> anyhow::Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let json = serde_json::to_string(message)?;
    ws.send(Message::Text(json)).await?;
    Ok(())
}

async fn next_message<S>(ws: &mut S) -> anyhow::Result<RelayMessage>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => {
                return serde_json::from_str(&text)
                    .with_context(|| format!("invalid relay message: {}", text));
            }
            Message::Close(_) => break,
            other => debug!("Ignoring websocket frame {:?}", other),
        }
    }
    Err(anyhow!("relay connection closed"))
}

// Mailbox I/O is blocking std::fs, so it runs on the blocking pool

async fn read_slot(mailbox: &Mailbox, slot: MailboxSlot) -> anyhow::Result<Option<SignalingMessage>> {
    let mailbox = mailbox.clone();
    tokio::task::spawn_blocking(move || mailbox.read(slot))
        .await
        .context("mailbox read task failed")
}

async fn publish_slot(
    mailbox: &Mailbox,
    slot: MailboxSlot,
    message: SignalingMessage,
) -> anyhow::Result<()> {
    let mailbox = mailbox.clone();
    tokio::task::spawn_blocking(move || mailbox.publish(slot, &message))
        .await
        .context("mailbox write task failed")
}

/// Wait until the slot holds a complete message
async fn wait_for_slot(mailbox: &Mailbox, slot: MailboxSlot) -> anyhow::Result<SignalingMessage> {
    info!("Waiting for {} ...", mailbox.path(slot).display());
    loop {
        if let Some(message) = read_slot(mailbox, slot).await? {
            return Ok(message);
        }
        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

/// Offer side: hand the local offer to one peer and store its answer
///
/// Sessions with the wrong client id are turned away and the next connection
/// is accepted.
pub async fn serve(listener: TcpListener, mailbox: &Mailbox, client_id: &str) -> anyhow::Result<()> {
    info!("🚀 Mailbox relay for {} listening on {}", client_id, listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("📥 New connection from {}", addr);

        let result: anyhow::Result<()> = async {
            let mut ws = accept_async(stream).await?;
            serve_session(&mut ws, mailbox, client_id).await
        }
        .await;

        match result {
            Ok(()) => return Ok(()),
            Err(e) => warn!("Relay session with {} failed: {:#}", addr, e),
        }
    }
}

async fn serve_session<S>(ws: &mut S, mailbox: &Mailbox, client_id: &str) -> anyhow::Result<()>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    match next_message(ws).await? {
        RelayMessage::Hello { client_id: id } if id == client_id => {
            send_message(ws, &RelayMessage::Accepted).await?;
        }
        other => {
            let message = format!("expected hello for {}", client_id);
            send_message(ws, &RelayMessage::Error { message }).await?;
            let _ = ws.close().await;
            bail!("rejected peer, got {:?}", other);
        }
    }

    let offer = wait_for_slot(mailbox, MailboxSlot::Offer).await?;
    send_message(ws, &RelayMessage::Offer { text: offer.encode() }).await?;
    info!("📨 Offer sent ({} candidates)", offer.candidates.len());

    let RelayMessage::Answer { text } = next_message(ws).await? else {
        bail!("expected answer");
    };
    let answer = decode(&text).ok_or_else(|| anyhow!("answer is not a complete mailbox message"))?;
    publish_slot(mailbox, MailboxSlot::Answer, answer).await?;
    send_message(ws, &RelayMessage::AnswerSaved).await?;
    info!("✅ Answer saved to {}", mailbox.path(MailboxSlot::Answer).display());
    Ok(())
}

/// Answer side: fetch the remote offer, then send back the local answer
pub async fn connect(url: &str, mailbox: &Mailbox, client_id: &str) -> anyhow::Result<()> {
    let (mut ws, _) = connect_async(url)
        .await
        .with_context(|| format!("cannot connect to {}", url))?;
    info!("Connected to relay {}", url);

    let hello = RelayMessage::Hello {
        client_id: client_id.to_string(),
    };
    send_message(&mut ws, &hello).await?;
    match next_message(&mut ws).await? {
        RelayMessage::Accepted => {}
        RelayMessage::Error { message } => bail!("relay refused {}: {}", client_id, message),
        other => bail!("unexpected relay message {:?}", other),
    }

    let RelayMessage::Offer { text } = next_message(&mut ws).await? else {
        bail!("expected offer");
    };
    let offer = decode(&text).ok_or_else(|| anyhow!("offer is not a complete mailbox message"))?;
    let candidates = offer.candidates.len();
    publish_slot(mailbox, MailboxSlot::Offer, offer).await?;
    info!(
        "📨 Offer written to {} ({} candidates)",
        mailbox.path(MailboxSlot::Offer).display(),
        candidates
    );

    let answer = wait_for_slot(mailbox, MailboxSlot::Answer).await?;
    send_message(&mut ws, &RelayMessage::Answer { text: answer.encode() }).await?;

    match next_message(&mut ws).await? {
        RelayMessage::AnswerSaved => {
            info!("✅ Answer delivered");
            let _ = ws.close(None).await;
            Ok(())
        }
        other => bail!("unexpected relay message {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\n";
    const ANSWER: &str = "v=0\r\no=- 2 1 IN IP4 0.0.0.0\r\ns=-\r\n";

    #[test]
    fn test_relay_message_json_shape() {
        let json = serde_json::to_string(&RelayMessage::Hello {
            client_id: "client_1".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"hello","client_id":"client_1"}"#);

        let saved: RelayMessage = serde_json::from_str(r#"{"type":"answer_saved"}"#).unwrap();
        assert_eq!(saved, RelayMessage::AnswerSaved);
    }

    #[tokio::test]
    async fn test_offer_and_answer_cross_the_relay() {
        let server_root = tempfile::tempdir().unwrap();
        let client_root = tempfile::tempdir().unwrap();
        let server_mailbox = Mailbox::new(server_root.path(), "client_1");
        let client_mailbox = Mailbox::new(client_root.path(), "client_1");

        let candidate = "candidate:1 1 udp 1 10.0.0.1 5000 typ host".to_string();
        let offer = SignalingMessage::new(OFFER, vec![candidate]);
        let answer = SignalingMessage::new(ANSWER, vec![]);
        server_mailbox.publish(MailboxSlot::Offer, &offer);
        client_mailbox.publish(MailboxSlot::Answer, &answer);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = {
            let mailbox = server_mailbox.clone();
            tokio::spawn(async move { serve(listener, &mailbox, "client_1").await })
        };

        connect(&url, &client_mailbox, "client_1").await.unwrap();
        server.await.unwrap().unwrap();

        assert_eq!(client_mailbox.read(MailboxSlot::Offer), Some(offer));
        assert_eq!(server_mailbox.read(MailboxSlot::Answer), Some(answer));
    }

    #[tokio::test]
    async fn test_wait_for_slot_sees_late_publish() {
        let root = tempfile::tempdir().unwrap();
        let mailbox = Mailbox::new(root.path(), "client_1");
        let answer = SignalingMessage::new(ANSWER, vec![]);

        let waiter = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { wait_for_slot(&mailbox, MailboxSlot::Answer).await })
        };
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 2).await;
        assert!(!waiter.is_finished());

        publish_slot(&mailbox, MailboxSlot::Answer, answer.clone()).await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), answer);
    }

    #[tokio::test]
    async fn test_wrong_client_id_is_refused() {
        let server_root = tempfile::tempdir().unwrap();
        let client_root = tempfile::tempdir().unwrap();
        let server_mailbox = Mailbox::new(server_root.path(), "client_1");
        let client_mailbox = Mailbox::new(client_root.path(), "client_1");

        let offer = SignalingMessage::new(OFFER, vec![]);
        let answer = SignalingMessage::new(ANSWER, vec![]);
        server_mailbox.publish(MailboxSlot::Offer, &offer);
        client_mailbox.publish(MailboxSlot::Answer, &answer);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = {
            let mailbox = server_mailbox.clone();
            tokio::spawn(async move { serve(listener, &mailbox, "client_1").await })
        };

        let err = connect(&url, &Mailbox::new(client_root.path(), "client_2"), "client_2")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refused"));
        assert!(!server.is_finished());

        // The relay keeps listening for the right peer
        connect(&url, &client_mailbox, "client_1").await.unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(server_mailbox.read(MailboxSlot::Answer), Some(answer));
        assert_eq!(client_mailbox.read(MailboxSlot::Offer), Some(offer));
    }
}
