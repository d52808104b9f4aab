//! Reconnecting client bus.
//!
//! [`BusClient`] owns one outbound WebSocket connection at a time,
//! re-establishes it on failure, performs the `#handshake` to obtain its
//! server-assigned identity, and exposes the same emit/on/off/once and
//! acknowledgement surface as a server peer — with one deliberate
//! difference: the client registry is multi-handler (every listener bound
//! to an event name fires, in insertion order).
//!
//! ```no_run
//! use sockethub::client::BusClient;
//! use sockethub::config::ClientConfig;
//!
//! # async fn example() -> Result<(), sockethub::BusError> {
//! let client = BusClient::new(ClientConfig::new("ws://localhost:3000/ws"));
//! client.on("chat", |data| println!("chat: {data}"));
//! client.connect();
//! let sum = client.emit_with_ack("sum", serde_json::json!({"a": 2, "b": 3})).await?;
//! # Ok(())
//! # }
//! ```

pub mod registry;

mod connection;

pub use registry::{Listener, ListenerId, ListenerSet};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::config::ClientConfig;
use crate::error::BusError;
use crate::protocol::{Frame, ack_event_name};

type ConnectedHook = Arc<dyn Fn(&str) + Send + Sync>;
type LifecycleHook = Arc<dyn Fn() + Send + Sync>;

/// State shared between the public client handle and its run-loop task.
pub(crate) struct ClientShared {
    pub(crate) config: ClientConfig,
    pub(crate) listeners: ListenerSet,
    id: RwLock<Option<String>>,
    writer: RwLock<Option<mpsc::UnboundedSender<Message>>>,
    shutdown: AtomicBool,
    pre_connected: RwLock<Option<LifecycleHook>>,
    connected: RwLock<Option<ConnectedHook>>,
    disconnected: RwLock<Option<LifecycleHook>>,
}

impl ClientShared {
    pub(crate) fn new(config: ClientConfig) -> Self {
        Self {
            config,
            listeners: ListenerSet::new(),
            id: RwLock::new(None),
            writer: RwLock::new(None),
            shutdown: AtomicBool::new(false),
            pre_connected: RwLock::new(None),
            connected: RwLock::new(None),
            disconnected: RwLock::new(None),
        }
    }

    pub(crate) fn id(&self) -> Option<String> {
        self.id.read().clone()
    }

    pub(crate) fn set_id(&self, id: &str) {
        *self.id.write() = Some(id.to_string());
    }

    pub(crate) fn set_writer(&self, writer: mpsc::UnboundedSender<Message>) {
        *self.writer.write() = Some(writer);
    }

    /// Clears the identity and writer after a transport close.
    pub(crate) fn clear_connection(&self) {
        *self.id.write() = None;
        *self.writer.write() = None;
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let writer = self.writer.read().clone();
        if let Some(writer) = writer {
            let _ = writer.send(Message::Close(None));
        }
    }

    /// Encodes and enqueues a frame on the open transport.
    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<(), BusError> {
        let writer = self.writer.read().clone();
        let Some(writer) = writer else {
            return Err(BusError::NotConnected);
        };
        let text = frame.encode()?;
        writer
            .send(Message::text(text))
            .map_err(|_| BusError::Transport("writer task terminated".to_string()))
    }

    pub(crate) fn set_pre_connected_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.pre_connected.write() = Some(Arc::new(hook));
    }

    pub(crate) fn set_connected_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.connected.write() = Some(Arc::new(hook));
    }

    pub(crate) fn set_disconnected_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.disconnected.write() = Some(Arc::new(hook));
    }

    pub(crate) fn notify_pre_connected(&self) {
        let hook = self.pre_connected.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub(crate) fn notify_connected(&self, id: &str) {
        let hook = self.connected.read().clone();
        if let Some(hook) = hook {
            hook(id);
        }
    }

    pub(crate) fn notify_disconnected(&self) {
        let hook = self.disconnected.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl fmt::Debug for ClientShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientShared")
            .field("id", &self.id())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

/// Reconnecting event-bus client.
pub struct BusClient {
    shared: Arc<ClientShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BusClient {
    /// Creates a client for the configured endpoint. No connection is
    /// opened until [`BusClient::connect`] is called.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(ClientShared::new(config)),
            task: Mutex::new(None),
        }
    }

    /// Spawns the connect/reconnect loop. Idempotent: a second call while
    /// the loop is running is a no-op. Must be called from within a tokio
    /// runtime.
    pub fn connect(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(connection::run_loop(shared)));
    }

    /// Stops the reconnect loop and closes any open transport. The client
    /// does not reconnect after this.
    pub fn close(&self) {
        self.shared.request_shutdown();
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        self.shared.clear_connection();
    }

    /// Returns the server-assigned identity, or `None` while disconnected
    /// or before the handshake completes.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.shared.id()
    }

    /// Returns `true` once the transport is open and the handshake has
    /// completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.id().is_some()
    }

    /// Appends a listener for `event`. Every listener bound to the name
    /// fires on a matching frame, in insertion order.
    pub fn on(&self, event: &str, listener: impl Fn(Value) + Send + Sync + 'static) {
        self.shared.listeners.bind(event, Arc::new(listener), false);
    }

    /// Appends a one-shot listener: removed before it first fires, so it
    /// can never fire twice.
    pub fn once(&self, event: &str, listener: impl Fn(Value) + Send + Sync + 'static) {
        self.shared.listeners.bind(event, Arc::new(listener), true);
    }

    /// Removes every listener bound to `event`.
    pub fn off(&self, event: &str) {
        self.shared.listeners.off(event);
    }

    /// Registers a hook fired when the transport opens, before the
    /// handshake. Replaces any previous hook.
    pub fn on_pre_connected(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.shared.set_pre_connected_hook(hook);
    }

    /// Registers a hook fired with the assigned identity once the
    /// handshake completes. Replaces any previous hook.
    pub fn on_connected(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.set_connected_hook(hook);
    }

    /// Registers a hook fired on every transport close, before the
    /// reconnect delay starts. Replaces any previous hook.
    pub fn on_disconnected(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.shared.set_disconnected_hook(hook);
    }

    /// Emits `{event, data}` on the open transport.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotConnected`] immediately when no transport is
    /// open — emits are never queued across reconnects — or
    /// [`BusError::Transport`] when the write side has failed.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), BusError> {
        self.shared.send_frame(&Frame::new(event, data))
    }

    /// Emits `{event, data}` with a fresh correlation id and waits for the
    /// matching `{event}@ack:{id}` reply, resolving to its `result` value.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotConnected`] when no transport is open,
    /// [`BusError::AckTimeout`] when no reply arrives within the configured
    /// window (the pending one-shot listener is removed), or
    /// [`BusError::Transport`] when the connection drops before the reply.
    pub async fn emit_with_ack(&self, event: &str, data: Value) -> Result<Value, BusError> {
        let ack_id = uuid::Uuid::new_v4().to_string();
        let reply_event = ack_event_name(event, &ack_id);

        let (reply_tx, reply_rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(reply_tx)));
        let listener_id = self.shared.listeners.bind(
            &reply_event,
            Arc::new(move |data: Value| {
                if let Some(tx) = slot.lock().take() {
                    let result = data.get("result").cloned().unwrap_or(Value::Null);
                    let _ = tx.send(result);
                }
            }),
            true,
        );

        if let Err(err) = self
            .shared
            .send_frame(&Frame::with_ack(event, data, &ack_id))
        {
            self.shared.listeners.remove(&reply_event, listener_id);
            return Err(err);
        }

        match self.shared.config.ack_timeout {
            Some(window) => match tokio::time::timeout(window, reply_rx).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(_)) => {
                    self.shared.listeners.remove(&reply_event, listener_id);
                    Err(BusError::Transport("ack reply channel dropped".to_string()))
                }
                Err(_) => {
                    self.shared.listeners.remove(&reply_event, listener_id);
                    Err(BusError::AckTimeout {
                        event: event.to_string(),
                        waited_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            },
            None => reply_rx
                .await
                .map_err(|_| BusError::Transport("ack reply channel dropped".to_string())),
        }
    }
}

impl fmt::Debug for BusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusClient")
            .field("url", &self.shared.config.url)
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        self.shared.request_shutdown();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
