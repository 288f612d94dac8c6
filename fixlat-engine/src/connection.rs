//! Per-connection session driver.
//!
//! Each connection runs two tasks: a writer that owns the outbound sequence
//! number and stamps the standard header, and the reader loop below which
//! captures receipt times, polices inbound sequence numbers, answers the
//! session-level protocol and invokes the [`Application`] callbacks.

use crate::application::Application;
use crate::codec::FrameReader;
use crate::error::EngineError;
use crate::message::Message;
use crate::session::{Outbound, SessionId, SessionRegistry};
use crate::settings::SessionSettings;
use crate::tags::{self, msg_type};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// How long to wait for the counterparty's Logout after sending ours.
const LOGOUT_GRACE: Duration = Duration::from_secs(2);

/// Which side of the logon exchange we play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Acceptor,
    Initiator,
}

enum Flow {
    Continue,
    Stop,
}

/// Run one connection from logon to disconnect.
pub(crate) async fn establish<A: Application>(
    stream: TcpStream,
    role: Role,
    settings: &SessionSettings,
    app: Arc<A>,
    registry: SessionRegistry,
    shutdown: watch::Receiver<bool>,
) -> Result<(), EngineError> {
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let id = settings.session_id();

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(id.clone(), write_half, rx));

    if role == Role::Initiator {
        let _ = tx.send(Outbound::Message(logon_message(settings)));
    }

    let logon = match read_logon(&mut reader, &id, settings.logon_timeout).await {
        Ok(logon) => logon,
        Err(err) => {
            let _ = tx.send(Outbound::Close);
            let _ = writer.await;
            return Err(err);
        }
    };

    if let Err(err) = registry.register(&id, tx.clone()) {
        let _ = tx.send(Outbound::Close);
        let _ = writer.await;
        return Err(err);
    }

    if role == Role::Acceptor {
        let _ = tx.send(Outbound::Message(logon_message(settings)));
    }
    info!(session = %id, ?role, "session logged on");

    let driver = SessionDriver {
        id: id.clone(),
        app,
        heartbeat: settings.heartbeat_interval,
        next_target_seq: logon.seq_num().unwrap_or(1) + 1,
        logout_sent: false,
    };
    let result = driver.run(&mut reader, &tx, shutdown).await;

    registry.unregister(&id);
    let _ = tx.send(Outbound::Close);
    let _ = writer.await;
    info!(session = %id, "session disconnected");
    result
}

fn logon_message(settings: &SessionSettings) -> Message {
    Message::new(msg_type::LOGON)
        .with_field(tags::ENCRYPT_METHOD, 0)
        .with_field(tags::HEART_BT_INT, settings.heartbeat_interval.as_secs())
}

async fn read_logon<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    id: &SessionId,
    timeout: Duration,
) -> Result<Message, EngineError> {
    let frame = tokio::time::timeout(timeout, reader.next_frame())
        .await
        .map_err(|_| EngineError::LogonTimeout(timeout))??
        .ok_or_else(|| EngineError::Logon("connection closed before logon".to_string()))?;
    let logon = Message::parse(frame, Instant::now())?;
    validate_logon(&logon, id)?;
    Ok(logon)
}

/// Check that `logon` is a Logon addressed from our counterparty to us.
pub(crate) fn validate_logon(logon: &Message, id: &SessionId) -> Result<(), EngineError> {
    if logon.msg_type() != msg_type::LOGON {
        return Err(EngineError::Logon(format!(
            "expected Logon, got MsgType {}",
            logon.msg_type()
        )));
    }
    if logon.begin_string() != id.begin_string {
        return Err(EngineError::Logon(format!(
            "unexpected BeginString {}",
            logon.begin_string()
        )));
    }
    let sender = logon.get_field(tags::SENDER_COMP_ID).unwrap_or_default();
    let target = logon.get_field(tags::TARGET_COMP_ID).unwrap_or_default();
    if sender != id.target_comp_id || target != id.sender_comp_id {
        return Err(EngineError::Logon(format!(
            "unknown session {sender}->{target}"
        )));
    }
    Ok(())
}

/// Fill in the standard header for an outbound message.
pub(crate) fn stamp_header(message: &mut Message, id: &SessionId, seq: u64) {
    message.set_field(tags::BEGIN_STRING, &id.begin_string);
    message.set_field(tags::SENDER_COMP_ID, &id.sender_comp_id);
    message.set_field(tags::TARGET_COMP_ID, &id.target_comp_id);
    message.set_field(tags::MSG_SEQ_NUM, seq);
    message.set_field(
        tags::SENDING_TIME,
        chrono::Utc::now().format("%Y%m%d-%H:%M:%S%.3f"),
    );
}

async fn write_loop<W: AsyncWrite + Unpin>(
    id: SessionId,
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut next_seq = 1u64;
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Message(mut message) => {
                stamp_header(&mut message, &id, next_seq);
                next_seq += 1;
                let bytes = message.encode();
                if let Err(err) = writer.write_all(&bytes).await {
                    warn!(session = %id, error = %err, "write failed, closing writer");
                    break;
                }
                trace!(session = %id, msg_type = message.msg_type(), "sent");
            }
            Outbound::Close => break,
        }
    }
    let _ = writer.shutdown().await;
}

struct SessionDriver<A> {
    id: SessionId,
    app: Arc<A>,
    heartbeat: Duration,
    next_target_seq: u64,
    logout_sent: bool,
}

impl<A: Application> SessionDriver<A> {
    async fn run<R: AsyncRead + Unpin>(
        mut self,
        reader: &mut FrameReader<R>,
        tx: &mpsc::UnboundedSender<Outbound>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        self.app.on_logon(&self.id);

        let start = tokio::time::Instant::now() + self.heartbeat;
        let mut heartbeat = tokio::time::interval_at(start, self.heartbeat);
        let mut logout_deadline: Option<tokio::time::Instant> = None;

        let result = loop {
            tokio::select! {
                frame = reader.next_frame() => match frame {
                    Ok(Some(raw)) => {
                        let received = Instant::now();
                        match self.handle_frame(raw, received, tx) {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Stop) => break Ok(()),
                            Err(err) => break Err(err),
                        }
                    }
                    Ok(None) => {
                        debug!(session = %self.id, "peer closed connection");
                        break Ok(());
                    }
                    Err(err) => break Err(err),
                },
                _ = heartbeat.tick() => {
                    let _ = tx.send(Outbound::Message(Message::new(msg_type::HEARTBEAT)));
                }
                changed = shutdown.changed(), if logout_deadline.is_none() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.send_logout(tx, None);
                        logout_deadline = Some(tokio::time::Instant::now() + LOGOUT_GRACE);
                    }
                }
                _ = sleep_until(logout_deadline), if logout_deadline.is_some() => {
                    debug!(session = %self.id, "no Logout reply within grace period");
                    break Ok(());
                }
            }
        };

        self.app.on_logout(&self.id);
        result
    }

    fn handle_frame(
        &mut self,
        raw: Vec<u8>,
        received: Instant,
        tx: &mpsc::UnboundedSender<Outbound>,
    ) -> Result<Flow, EngineError> {
        let message = match Message::parse(raw, received) {
            Ok(message) => message,
            Err(err) => {
                warn!(session = %self.id, error = %err, "dropping garbled message");
                return Ok(Flow::Continue);
            }
        };

        if !self.check_seq(&message, tx)? {
            return Ok(Flow::Continue);
        }

        if message.is_admin() {
            return Ok(self.handle_admin(&message, tx));
        }

        if let Err(reject) = self.app.from_app(&message, &self.id) {
            debug!(session = %self.id, reason = %reject, "rejecting application message");
            let _ = tx.send(Outbound::Message(reject.to_message(&message)));
        }
        Ok(Flow::Continue)
    }

    /// Returns whether the message should be dispatched.
    fn check_seq(
        &mut self,
        message: &Message,
        tx: &mpsc::UnboundedSender<Outbound>,
    ) -> Result<bool, EngineError> {
        let Some(seq) = message.seq_num() else {
            warn!(session = %self.id, "message without MsgSeqNum ignored");
            return Ok(false);
        };

        let expected = self.next_target_seq;
        if seq == expected {
            self.next_target_seq += 1;
            return Ok(true);
        }
        if seq > expected {
            // No resend support: note the gap and move on.
            warn!(session = %self.id, expected, received = seq, "sequence gap");
            self.next_target_seq = seq + 1;
            return Ok(true);
        }
        if message.is_poss_dup() {
            debug!(session = %self.id, seq, "ignoring possible duplicate");
            return Ok(false);
        }

        let text = format!("MsgSeqNum too low, expecting {expected} but received {seq}");
        self.send_logout(tx, Some(text));
        Err(EngineError::SeqNumTooLow {
            expected,
            received: seq,
        })
    }

    fn handle_admin(&mut self, message: &Message, tx: &mpsc::UnboundedSender<Outbound>) -> Flow {
        if let Err(reject) = self.app.from_admin(message, &self.id) {
            let _ = tx.send(Outbound::Message(reject.to_message(message)));
        }

        match message.msg_type() {
            msg_type::TEST_REQUEST => {
                let mut reply = Message::new(msg_type::HEARTBEAT);
                if let Some(req_id) = message.get_field(tags::TEST_REQ_ID) {
                    reply.set_field(tags::TEST_REQ_ID, req_id);
                }
                let _ = tx.send(Outbound::Message(reply));
                Flow::Continue
            }
            msg_type::LOGOUT => {
                if !self.logout_sent {
                    self.send_logout(tx, None);
                }
                info!(session = %self.id, "received Logout");
                Flow::Stop
            }
            msg_type::REJECT => {
                warn!(
                    session = %self.id,
                    ref_seq = message.get_field(tags::REF_SEQ_NUM).unwrap_or("?"),
                    text = message.get_field(tags::TEXT).unwrap_or(""),
                    "counterparty rejected a message"
                );
                Flow::Continue
            }
            _ => Flow::Continue,
        }
    }

    fn send_logout(&mut self, tx: &mpsc::UnboundedSender<Outbound>, text: Option<String>) {
        let mut logout = Message::new(msg_type::LOGOUT);
        if let Some(text) = text {
            logout.set_field(tags::TEXT, text);
        }
        let _ = tx.send(Outbound::Message(logout));
        self.logout_sent = true;
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
