//! ## fleetsim-sink::mqtt
//! **QoS 1 telemetry publisher over plain TCP**
//!
//! A shared token uses one session for the whole fleet. Per-device tokens
//! get one session each, keyed by device id. Publishes on a session are
//! pipelined: a writer task owns the outbound half of the socket and a
//! reader task matches PUBACKs to waiting publishers by packet id, so one
//! slow round trip never holds up the rest of the fleet. The writer sends
//! PINGREQ when the session has been idle for half the keep-alive period.
//! A broken session is reopened once per send before the send is reported
//! as failed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use fleetsim_core::snapshot::Envelope;
use fleetsim_protocols::{ConnectReturnCode, MqttParseError, MqttParser, Packet};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::credentials::Credentials;
use crate::{SinkError, TelemetrySink};

pub const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
pub const KEEP_ALIVE_SECS: u16 = 60;
const SHARED_SESSION: &str = "";

/// Publishes awaiting their PUBACK.
#[derive(Default)]
struct Inflight {
    pending: parking_lot::Mutex<HashMap<u16, oneshot::Sender<()>>>,
    closed: AtomicBool,
}

impl Inflight {
    fn ack(&self, packet_id: u16) {
        if let Some(waiter) = self.pending.lock().remove(&packet_id) {
            // The publisher may have given up already.
            let _ = waiter.send(());
        }
    }

    /// Marks the session dead and wakes every waiter with an error.
    fn fail_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.lock().clear();
    }
}

/// Drops the waiter entry when a publish finishes or is abandoned.
struct PendingAck<'a> {
    inflight: &'a Inflight,
    packet_id: u16,
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        self.inflight.pending.lock().remove(&self.packet_id);
    }
}

struct ReaderTask(JoinHandle<()>);

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One open broker connection.
struct MqttSession {
    outbound: mpsc::UnboundedSender<Bytes>,
    inflight: Arc<Inflight>,
    writer: JoinHandle<()>,
    _reader: ReaderTask,
    io_timeout: Duration,
}

impl MqttSession {
    async fn open(
        addr: &str,
        client_id: &str,
        username: &str,
        keep_alive_secs: u16,
        io_timeout: Duration,
    ) -> Result<Self, SinkError> {
        let mut stream = timeout(io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SinkError::Timeout(io_timeout.as_millis() as u64))??;
        stream.set_nodelay(true)?;
        let parser = MqttParser::new();
        let mut buffer = BytesMut::with_capacity(256);

        let connect = parser.connect(client_id, Some(username), keep_alive_secs)?;
        stream.write_all(&connect).await?;
        let connack = timeout(io_timeout, next_packet(&mut stream, &mut buffer))
            .await
            .map_err(|_| SinkError::Timeout(io_timeout.as_millis() as u64))??;
        match connack {
            Packet::ConnAck {
                code: ConnectReturnCode::Accepted,
                ..
            } => {}
            Packet::ConnAck { code, .. } => return Err(SinkError::Refused(code.describe())),
            other => return Err(MqttParseError::Unexpected(format!("{other:?}")).into()),
        }

        let (read_half, write_half) = stream.into_split();
        let inflight = Arc::new(Inflight::default());
        let (outbound, queue) = mpsc::unbounded_channel();
        let ping_after = Duration::from_millis(u64::from(keep_alive_secs.max(1)) * 500);
        let writer = tokio::spawn(write_packets(write_half, queue, inflight.clone(), ping_after));
        let reader = tokio::spawn(read_acks(read_half, buffer, inflight.clone()));
        Ok(Self {
            outbound,
            inflight,
            writer,
            _reader: ReaderTask(reader),
            io_timeout,
        })
    }

    fn is_alive(&self) -> bool {
        !self.inflight.closed.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }

    /// Queues a PUBLISH and waits for its PUBACK. Other publishes on the
    /// same session proceed meanwhile.
    async fn publish(&self, packet_id: u16, payload: &[u8]) -> Result<(), SinkError> {
        let packet = MqttParser::new().publish_qos1(TELEMETRY_TOPIC, packet_id, payload)?;
        let (waiter, acked) = oneshot::channel();
        self.inflight.pending.lock().insert(packet_id, waiter);
        let _pending = PendingAck {
            inflight: &self.inflight,
            packet_id,
        };
        // Checked after registering so a concurrent `fail_all` cannot miss us.
        if self.inflight.closed.load(Ordering::SeqCst) || self.outbound.send(packet).is_err() {
            return Err(SinkError::NotConnected);
        }
        match timeout(self.io_timeout, acked).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SinkError::NotConnected),
            Err(_) => Err(SinkError::Timeout(self.io_timeout.as_millis() as u64)),
        }
    }

    async fn close(self) -> Result<(), SinkError> {
        if self.outbound.send(MqttParser::new().disconnect()).is_err() {
            return Err(SinkError::NotConnected);
        }
        drop(self.outbound);
        timeout(self.io_timeout, self.writer)
            .await
            .map_err(|_| SinkError::Timeout(self.io_timeout.as_millis() as u64))?
            .map_err(|e| SinkError::Io(std::io::Error::other(e)))
    }
}

async fn next_packet(stream: &mut TcpStream, buffer: &mut BytesMut) -> Result<Packet, SinkError> {
    let parser = MqttParser::new();
    loop {
        match parser.parse(buffer) {
            Ok((packet, used)) => {
                buffer.advance(used);
                return Ok(packet);
            }
            Err(MqttParseError::InsufficientData | MqttParseError::PacketIncomplete) => {
                if stream.read_buf(buffer).await? == 0 {
                    return Err(SinkError::Io(std::io::ErrorKind::UnexpectedEof.into()));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Routes PUBACKs to their publishers until the broker goes away.
async fn read_acks(mut stream: OwnedReadHalf, mut buffer: BytesMut, inflight: Arc<Inflight>) {
    let parser = MqttParser::new();
    loop {
        match parser.parse(&buffer) {
            Ok((Packet::PubAck { packet_id }, used)) => {
                buffer.advance(used);
                inflight.ack(packet_id);
            }
            Ok((other, used)) => {
                buffer.advance(used);
                debug!(?other, "Ignoring broker packet");
            }
            Err(MqttParseError::InsufficientData | MqttParseError::PacketIncomplete) => {
                match stream.read_buf(&mut buffer).await {
                    Ok(0) => {
                        debug!("Broker closed the MQTT session");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT read failed");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed packet from broker");
                break;
            }
        }
    }
    inflight.fail_all();
}

/// Writes queued packets in order, pinging when idle. Ends once every
/// sender is gone.
async fn write_packets(
    mut stream: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    inflight: Arc<Inflight>,
    ping_after: Duration,
) {
    let parser = MqttParser::new();
    loop {
        let packet = match timeout(ping_after, queue.recv()).await {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(_) => parser.pingreq(),
        };
        if let Err(e) = stream.write_all(&packet).await {
            warn!(error = %e, "MQTT write failed");
            inflight.fail_all();
            return;
        }
    }
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "MQTT shutdown failed");
    }
}

type Slot = Arc<AsyncMutex<Option<Arc<MqttSession>>>>;

pub struct MqttSink {
    addr: String,
    credentials: Credentials,
    io_timeout: Duration,
    keep_alive_secs: u16,
    client_prefix: String,
    next_packet_id: AtomicU16,
    slots: parking_lot::Mutex<HashMap<String, Slot>>,
}

impl MqttSink {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        credentials: Credentials,
        io_timeout: Duration,
    ) -> Self {
        Self {
            addr: format!("{}:{}", host.into(), port),
            credentials,
            io_timeout,
            keep_alive_secs: KEEP_ALIVE_SECS,
            client_prefix: format!("fleetsim-{}", std::process::id()),
            next_packet_id: AtomicU16::new(1),
            slots: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Keep-alive announced in CONNECT; idle sessions ping at half of it.
    pub fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    fn packet_id(&self) -> u16 {
        loop {
            let id = self.next_packet_id.fetch_add(1, Ordering::Relaxed);
            // Zero is not a valid packet identifier.
            if id != 0 {
                return id;
            }
        }
    }

    fn session_key<'a>(&self, device_id: &'a str) -> &'a str {
        if self.credentials.is_per_device() {
            device_id
        } else {
            SHARED_SESSION
        }
    }

    fn client_id(&self, key: &str) -> String {
        if key.is_empty() {
            self.client_prefix.clone()
        } else {
            key.to_string()
        }
    }

    fn slot(&self, key: &str) -> Slot {
        self.slots
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    async fn open_session(&self, key: &str, token: &str) -> Result<MqttSession, SinkError> {
        MqttSession::open(
            &self.addr,
            &self.client_id(key),
            token,
            self.keep_alive_secs,
            self.io_timeout,
        )
        .await
    }

    /// The live session for `key`, opening one if needed. A session equal
    /// to `stale` is replaced even if it still looks alive.
    async fn session(
        &self,
        key: &str,
        token: &str,
        stale: Option<&Arc<MqttSession>>,
    ) -> Result<Arc<MqttSession>, SinkError> {
        let slot = self.slot(key);
        let mut slot = slot.lock().await;
        if let Some(current) = slot.as_ref() {
            let replaced = stale.is_some_and(|s| Arc::ptr_eq(s, current));
            if current.is_alive() && !replaced {
                return Ok(current.clone());
            }
        }
        let session = Arc::new(self.open_session(key, token).await?);
        *slot = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl TelemetrySink for MqttSink {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn connect(&self) -> Result<(), SinkError> {
        match &self.credentials {
            Credentials::Single(token) => {
                self.session(SHARED_SESSION, token, None).await?;
                info!("Connected to MQTT broker at {}", self.addr);
                Ok(())
            }
            Credentials::PerDevice(tokens) => {
                let mut connected = 0usize;
                let mut last_error = None;
                for device_id in self.credentials.device_ids() {
                    let token = &tokens[device_id];
                    match self.session(device_id, token, None).await {
                        Ok(_) => {
                            connected += 1;
                            info!("Connected device {} to {}", device_id, self.addr);
                        }
                        Err(e) => {
                            error!("Failed to connect device {}: {}", device_id, e);
                            last_error = Some(e);
                        }
                    }
                }
                match last_error {
                    Some(e) if connected == 0 => Err(e),
                    // Devices that failed here get another attempt on their first send.
                    _ => Ok(()),
                }
            }
        }
    }

    async fn send(&self, device_id: &str, envelope: &Envelope) -> Result<(), SinkError> {
        let token = self.credentials.for_device(device_id)?;
        let key = self.session_key(device_id);
        let payload = envelope.to_bytes()?;

        let stale = match self.session(key, token, None).await {
            Ok(session) => match session.publish(self.packet_id(), &payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(device_id, error = %e, "MQTT session lost, reconnecting");
                    Some(session)
                }
            },
            Err(e) => {
                warn!(device_id, error = %e, "MQTT reconnect failed, retrying");
                None
            }
        };
        let session = self.session(key, token, stale.as_ref()).await?;
        session.publish(self.packet_id(), &payload).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        let slots: Vec<_> = self.slots.lock().drain().collect();
        for (key, slot) in slots {
            let Some(session) = slot.lock().await.take() else {
                continue;
            };
            match Arc::try_unwrap(session) {
                Ok(session) => {
                    if let Err(e) = session.close().await {
                        warn!("Error closing MQTT session {:?}: {}", key, e);
                    }
                }
                // Still held by an abandoned send; dropping it ends the writer.
                Err(_) => debug!("MQTT session {:?} still in use at close", key),
            }
        }
        info!("Disconnected from MQTT broker at {}", self.addr);
        Ok(())
    }
}
