use fixlat_engine::{Application, Message, MessageReject, SessionId};
use std::sync::Once;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().with_target(true))
            .with(filter)
            .init();
    });
}

#[derive(Debug)]
#[allow(dead_code)]
pub enum Event {
    Created(SessionId),
    Logon(SessionId),
    Logout(SessionId),
    Admin(Message),
    App(Message),
}

/// Application that forwards every callback to a channel.
pub struct Recorder {
    events: mpsc::UnboundedSender<Event>,
    reject_app: Option<String>,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: tx,
                reject_app: None,
            },
            rx,
        )
    }

    pub fn rejecting(reason: &str) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (mut recorder, rx) = Self::new();
        recorder.reject_app = Some(reason.to_string());
        (recorder, rx)
    }
}

impl Application for Recorder {
    fn on_create(&self, session_id: &SessionId) {
        let _ = self.events.send(Event::Created(session_id.clone()));
    }

    fn on_logon(&self, session_id: &SessionId) {
        let _ = self.events.send(Event::Logon(session_id.clone()));
    }

    fn on_logout(&self, session_id: &SessionId) {
        let _ = self.events.send(Event::Logout(session_id.clone()));
    }

    fn from_admin(&self, message: &Message, _session_id: &SessionId) -> Result<(), MessageReject> {
        let _ = self.events.send(Event::Admin(message.clone()));
        Ok(())
    }

    fn from_app(&self, message: &Message, _session_id: &SessionId) -> Result<(), MessageReject> {
        let _ = self.events.send(Event::App(message.clone()));
        match &self.reject_app {
            Some(reason) => Err(MessageReject::new(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Wait for the first event matching `pred`, skipping others.
pub async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<Event>, mut pred: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
