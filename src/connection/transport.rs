//! WebSocket transport and I/O loop.

use crate::clock::ClockSync;
use crate::codec::{decode_control, decode_values, encode_control, encode_value, ControlMessage};
use crate::codec::ValueFrame;
use crate::connection::ConnectionStatus;
use crate::types::{Timestamp, TopicId, Value};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// Default server port when the address does not carry one.
const DEFAULT_PORT: u16 = 5810;

/// Socket read timeout; bounds the latency of outbound drains, clock
/// pings, and shutdown checks on the I/O loop.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Receiver of decoded traffic. Implemented by the client core; every
/// method runs synchronously on the I/O thread.
pub trait FrameSink: Send + Sync + 'static {
    /// Called once the transport is up. The returned messages (standing
    /// subscriptions, publishes) are sent to the peer as one text frame.
    fn on_connected(&self) -> Vec<ControlMessage>;

    /// Called when the transport goes down, whether by failure, peer
    /// close, or explicit disconnect.
    fn on_disconnected(&self);

    /// One decoded text frame.
    fn on_control(&self, messages: Vec<ControlMessage>);

    /// One decoded binary frame batch (the delivery window). Clock-sync
    /// frames are already filtered out.
    fn on_values(&self, frames: Vec<ValueFrame>);
}

enum Outbound {
    Text(String),
    Binary(Vec<u8>),
}

/// Owns the transport socket via its I/O thread. At most one exists per
/// client; creating a new one requires disconnecting the old first.
pub struct Connection {
    status: Arc<RwLock<ConnectionStatus>>,
    outbound_tx: Sender<Outbound>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Connection {
    /// Open a transport to `address` and start the I/O thread. Returns
    /// immediately in the Connecting state; success or failure is
    /// reported through the sink.
    pub fn open(
        address: &str,
        identity: &str,
        sink: Arc<dyn FrameSink>,
        clock: Arc<ClockSync>,
        sync_interval: Duration,
    ) -> Self {
        let status = Arc::new(RwLock::new(ConnectionStatus::Connecting));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (outbound_tx, outbound_rx) = unbounded();

        let url = endpoint_url(address, identity);
        let thread_status = Arc::clone(&status);
        let thread_shutdown = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new()
            .name("ntlink-io".to_string())
            .spawn(move || {
                io_thread(
                    url,
                    thread_status,
                    thread_shutdown,
                    outbound_rx,
                    sink,
                    clock,
                    sync_interval,
                );
            })
            .expect("failed to spawn I/O thread");

        Self {
            status,
            outbound_tx,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    /// Queue control messages for the peer. A no-op while not connected.
    pub fn send_control(&self, messages: &[ControlMessage]) {
        if !self.status().is_connected() {
            debug!("dropping control send while not connected");
            return;
        }
        match encode_control(messages) {
            Ok(text) => {
                let _ = self.outbound_tx.send(Outbound::Text(text));
            }
            Err(e) => warn!(error = %e, "failed to encode control messages"),
        }
    }

    /// Queue a value frame for the peer. A no-op while not connected.
    pub fn send_value(&self, id: TopicId, timestamp: Timestamp, value: &Value) {
        if !self.status().is_connected() {
            debug!("dropping value send while not connected");
            return;
        }
        match encode_value(id, timestamp, value) {
            Ok(buf) => {
                let _ = self.outbound_tx.send(Outbound::Binary(buf));
            }
            Err(e) => warn!(error = %e, "failed to encode value frame"),
        }
    }

    /// Stop the I/O thread and close the transport. Idempotent; always
    /// leaves the state machine Disconnected.
    pub fn disconnect(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Build the WebSocket URL for a server address, appending the default
/// port when the address does not name one.
fn endpoint_url(address: &str, identity: &str) -> String {
    let address = address.trim_end_matches(':');
    if address.contains(':') {
        format!("ws://{}/nt/{}", address, identity)
    } else {
        format!("ws://{}:{}/nt/{}", address, DEFAULT_PORT, identity)
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn io_thread(
    url: String,
    status: Arc<RwLock<ConnectionStatus>>,
    shutdown: Arc<AtomicBool>,
    outbound_rx: Receiver<Outbound>,
    sink: Arc<dyn FrameSink>,
    clock: Arc<ClockSync>,
    sync_interval: Duration,
) {
    let mut socket = match tungstenite::connect(&url) {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!(url = %url, error = %e, "connect failed");
            *status.write() = ConnectionStatus::Disconnected;
            sink.on_disconnected();
            return;
        }
    };

    if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
        if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
            warn!(error = %e, "failed to set read timeout");
        }
    }

    *status.write() = ConnectionStatus::Connected;
    debug!(url = %url, "connected");

    // Re-assert standing intent (subscriptions, publishes) as one frame.
    let greeting = sink.on_connected();
    if !greeting.is_empty() {
        match encode_control(&greeting) {
            Ok(text) => {
                if let Err(e) = socket.send(Message::Text(text)) {
                    warn!(error = %e, "failed to send greeting");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode greeting"),
        }
    }

    run_loop(&mut socket, &shutdown, &outbound_rx, &sink, &clock, sync_interval);

    let _ = socket.close(None);
    *status.write() = ConnectionStatus::Disconnected;
    debug!(url = %url, "disconnected");
    sink.on_disconnected();
}

fn run_loop(
    socket: &mut Socket,
    shutdown: &AtomicBool,
    outbound_rx: &Receiver<Outbound>,
    sink: &Arc<dyn FrameSink>,
    clock: &Arc<ClockSync>,
    sync_interval: Duration,
) {
    let mut last_ping: Option<Instant> = None;

    'io: while !shutdown.load(Ordering::SeqCst) {
        // Drain queued outbound traffic; this thread is the sole writer.
        while let Ok(frame) = outbound_rx.try_recv() {
            let message = match frame {
                Outbound::Text(text) => Message::Text(text),
                Outbound::Binary(buf) => Message::Binary(buf),
            };
            if let Err(e) = socket.send(message) {
                warn!(error = %e, "write failed");
                break 'io;
            }
        }

        // Single in-flight time request; stale replies fail the nonce check.
        let due = last_ping.map_or(true, |t| t.elapsed() >= sync_interval);
        if due {
            let nonce = clock.begin_ping();
            match encode_value(TopicId::RTT, Timestamp(0), &Value::Int(nonce.0)) {
                Ok(buf) => {
                    if let Err(e) = socket.send(Message::Binary(buf)) {
                        warn!(error = %e, "ping write failed");
                        break 'io;
                    }
                    last_ping = Some(Instant::now());
                }
                Err(e) => warn!(error = %e, "failed to encode ping"),
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => match decode_control(&text) {
                Ok(messages) => sink.on_control(messages),
                // Malformed frame: drop it, keep the connection up.
                Err(e) => warn!(error = %e, "dropping undecodable text frame"),
            },
            Ok(Message::Binary(buf)) => match decode_values(&buf) {
                Ok(frames) => {
                    let now = Timestamp::local_now();
                    let mut values = Vec::with_capacity(frames.len());
                    for frame in frames {
                        if frame.id == TopicId::RTT {
                            if let Value::Int(echoed) = frame.value {
                                clock.on_pong(Timestamp(echoed), frame.timestamp, now);
                            }
                        } else {
                            values.push(frame);
                        }
                    }
                    if !values.is_empty() {
                        sink.on_values(values);
                    }
                }
                Err(e) => warn!(error = %e, "dropping undecodable binary frame"),
            },
            Ok(Message::Close(_)) => {
                debug!("peer closed");
                break 'io;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Read timeout; loop around for outbound/ping/shutdown work.
            }
            Err(e) => {
                warn!(error = %e, "read failed");
                break 'io;
            }
        }
    }
}
