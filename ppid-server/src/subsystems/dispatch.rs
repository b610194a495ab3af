//! Per-chat FIFO workers.
//!
//! Each chat id gets its own queue and task, so messages of one chat are
//! handled strictly in arrival order while different chats run
//! concurrently. Idle workers retire after a while; the queue entry is
//! removed under the same shard lock that senders take, so no message can
//! slip into a retiring queue.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::app::App;
use crate::subsystems::escalation;
use crate::transport::{mask_chat_id, InboundMessage};

const IDLE_RETIRE: Duration = Duration::from_secs(600);

pub struct Dispatcher {
    app: Arc<App>,
    queues: Arc<DashMap<String, mpsc::UnboundedSender<InboundMessage>>>,
    shutdown: broadcast::Sender<()>,
}

impl Dispatcher {
    pub fn new(app: Arc<App>, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            app,
            queues: Arc::new(DashMap::new()),
            shutdown,
        }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    pub fn active_workers(&self) -> usize {
        self.queues.len()
    }

    /// Queue `msg` behind earlier messages of the same chat.
    pub fn dispatch(&self, mut msg: InboundMessage) {
        msg.received_at.get_or_insert_with(Instant::now);
        let chat_id = msg.chat_id.clone();
        let entry = self
            .queues
            .entry(chat_id.clone())
            .or_insert_with(|| self.spawn_worker(chat_id.clone()));
        if entry.send(msg).is_err() {
            tracing::warn!(chat = %mask_chat_id(&chat_id), "Chat worker gone, message dropped");
        }
    }

    fn spawn_worker(&self, chat_id: String) -> mpsc::UnboundedSender<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            self.app.clone(),
            self.queues.clone(),
            chat_id,
            rx,
            self.shutdown.subscribe(),
        ));
        tx
    }
}

async fn run_worker(
    app: Arc<App>,
    queues: Arc<DashMap<String, mpsc::UnboundedSender<InboundMessage>>>,
    chat_id: String,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => {
                    let outcome = escalation::handle_inbound(&app, msg).await;
                    tracing::debug!(chat = %mask_chat_id(&chat_id), ?outcome, "Message handled");
                }
                None => break,
            },
            _ = tokio::time::sleep(IDLE_RETIRE) => {
                if queues.remove_if(&chat_id, |_, _| rx.is_empty()).is_some() {
                    break;
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
