//! The connection manager: owns the byte stream, frames packets, feeds
//! the [`Alarm`] model, serializes outbound commands, runs the
//! keep-alive/status polling loop, and reconnects with backoff.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::alarm::{Alarm, Notification};
use crate::config::{ClientConfig, Endpoint};
use crate::error::ClientError;
use crate::event::{self, DecodeErrorInfo, DecodedMessage, StatusUpdate, UserInterfaceRequest};
use crate::observer::{Disposer, ObserverHub, Subscription, DEFAULT_SUBSCRIPTION_CAPACITY};
use crate::packet::Packet;
use crate::transport::{SerialTransport, TcpTransport, Transport};
use crate::types::{ArmingState, ZoneState};

/// Emitted on the `zone_changes()` stream / `on_zone_change` callback.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ZoneChangeEvent {
    pub zone: u8,
    pub state: ZoneState,
    pub previous: ZoneState,
}

/// Emitted on the `state_changes()` stream / `on_state_change` callback.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateChangeEvent {
    pub state: ArmingState,
    pub previous: ArmingState,
}

struct OutboundItem {
    packet: Packet,
}

/// FIFO outbound queue with a bounded capacity and configurable overflow
/// policy. Not built on `tokio::mpsc` because `DropOldest` requires
/// evicting from the middle of the channel, which `mpsc` cannot do.
struct OutboundQueue {
    items: Mutex<VecDeque<OutboundItem>>,
    capacity: Option<usize>,
    overflow: crate::types::OverflowPolicy,
    notify: Notify,
    closed: AtomicBool,
}

impl OutboundQueue {
    fn new(capacity: Option<usize>, overflow: crate::types::OverflowPolicy) -> Self {
        OutboundQueue {
            items: Mutex::new(VecDeque::new()),
            capacity,
            overflow,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, item: OutboundItem) -> Result<(), ClientError> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cap) = self.capacity {
            if items.len() >= cap {
                match self.overflow {
                    crate::types::OverflowPolicy::DropOldest => {
                        items.pop_front();
                    }
                    crate::types::OverflowPolicy::Reject => return Err(ClientError::QueueFull),
                }
            }
        }
        items.push_back(item);
        drop(items);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Option<OutboundItem> {
        loop {
            {
                let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    async fn wait_drained(&self) {
        loop {
            if self.items.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Exponential backoff with full jitter, base 1s / cap configurable.
struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    fn new(base: Duration, cap: Duration) -> Self {
        Backoff { base, cap, attempt: 0 }
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_delay(&mut self) -> Duration {
        let exp = 2u32.saturating_pow(self.attempt.min(10));
        let raw = self.base.saturating_mul(exp).min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        let jitter = rand::thread_rng().gen_range(-0.2..=0.2);
        let millis = (raw.as_millis() as f64 * (1.0 + jitter)).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

fn keepalive_suite(include_s20: bool, include_version: bool) -> Vec<UserInterfaceRequest> {
    let mut reqs = vec![
        UserInterfaceRequest::StatusRequest(0),
        UserInterfaceRequest::StatusRequest(14),
        UserInterfaceRequest::StatusRequest(1),
    ];
    if include_s20 {
        reqs.push(UserInterfaceRequest::StatusRequest(20));
    }
    if include_version {
        reqs.push(UserInterfaceRequest::StatusRequest(17));
    }
    reqs
}

fn enqueue_status_refresh(queue: &OutboundQueue, include_s20: bool) {
    for req in keepalive_suite(include_s20, false) {
        let packet = event::encode_request(None, 0, &req);
        if queue.push(OutboundItem { packet }).is_err() {
            warn!("status refresh dropped: outbound queue rejected it");
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, packet: &Packet) -> std::io::Result<()> {
    writer.write_all(packet.encode_terminated().as_bytes()).await
}

async fn open_transport(config: &ClientConfig) -> Result<Box<dyn Transport>, crate::error::TransportError> {
    match &config.endpoint {
        Endpoint::Tcp { host, port } => TcpTransport::connect(host, *port, config.connect_timeout).await,
        Endpoint::Serial { device_path } => SerialTransport::connect(device_path, config.connect_timeout).await,
    }
}

fn publish_notifications(
    events: &ObserverHub<DecodedMessage>,
    state_changes: &ObserverHub<StateChangeEvent>,
    zone_changes: &ObserverHub<ZoneChangeEvent>,
    notifications: Vec<Notification>,
) -> bool {
    let mut needs_refresh = false;
    for notification in notifications {
        match notification {
            Notification::RawEvent(msg) => events.emit(msg),
            Notification::ZoneChange { zone, state, previous } => {
                zone_changes.emit(ZoneChangeEvent { zone, state, previous })
            }
            Notification::StateChange { state, previous } => {
                state_changes.emit(StateChangeEvent { state, previous })
            }
            Notification::NeedsStatusRefresh => needs_refresh = true,
        }
    }
    needs_refresh
}

async fn handle_line(
    line: &str,
    alarm: &RwLock<Alarm>,
    events: &ObserverHub<DecodedMessage>,
    state_changes: &ObserverHub<StateChangeEvent>,
    zone_changes: &ObserverHub<ZoneChangeEvent>,
    checksum_mode: crate::types::ChecksumMode,
    queue: &OutboundQueue,
    s20_silence: &AtomicU8,
) {
    let decoded = match Packet::decode(line, checksum_mode) {
        Ok(packet) => event::decode_message(&packet),
        Err(error) => {
            warn!(error = %error, line, "packet decode failed");
            DecodedMessage::DecodeError(DecodeErrorInfo {
                error,
                raw_line: line.to_string(),
            })
        }
    };

    if matches!(decoded, DecodedMessage::StatusUpdate(StatusUpdate::ZonesHigh { .. })) {
        s20_silence.store(0, Ordering::Release);
    }

    let notifications = alarm.write().unwrap_or_else(|e| e.into_inner()).apply(&decoded);
    let needs_refresh = publish_notifications(events, state_changes, zone_changes, notifications);

    if needs_refresh {
        let zones32 = alarm.read().unwrap_or_else(|e| e.into_inner()).zone_count() == 32;
        enqueue_status_refresh(queue, zones32);
    }
}

async fn run_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    alarm: Arc<RwLock<Alarm>>,
    events: ObserverHub<DecodedMessage>,
    state_changes: ObserverHub<StateChangeEvent>,
    zone_changes: ObserverHub<ZoneChangeEvent>,
    checksum_mode: crate::types::ChecksumMode,
    queue: Arc<OutboundQueue>,
    s20_silence: Arc<AtomicU8>,
) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            handle_line(
                trimmed,
                &alarm,
                &events,
                &state_changes,
                &zone_changes,
                checksum_mode,
                &queue,
                &s20_silence,
            )
            .await;
        }
    }
}

async fn run_writer_and_keepalive<W: AsyncWrite + Unpin>(
    mut writer: W,
    queue: Arc<OutboundQueue>,
    interval: Duration,
    keepalive_timeout: Duration,
    s20_silence: Arc<AtomicU8>,
) -> std::io::Result<()> {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    let mut version_probed = false;
    let mut s20_suppressed = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let include_s20 = !s20_suppressed;
                for req in keepalive_suite(include_s20, !version_probed) {
                    let packet = event::encode_request(None, 0, &req);
                    match tokio::time::timeout(keepalive_timeout, write_line(&mut writer, &packet)).await {
                        Ok(result) => result?,
                        Err(_) => {
                            warn!("keep-alive write timed out");
                            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "keep-alive write timed out"));
                        }
                    }
                }
                if include_s20 {
                    let silent_cycles = s20_silence.fetch_add(1, Ordering::AcqRel) + 1;
                    if silent_cycles >= 3 {
                        s20_suppressed = true;
                        debug!("S20 silent for 3 cycles, suppressing further probes");
                    }
                }
                if !version_probed {
                    version_probed = true;
                }
            }
            item = queue.pop() => {
                match item {
                    Some(item) => write_line(&mut writer, &item.packet).await?,
                    None => return Ok(()),
                }
            }
        }
    }
}

async fn supervisor_loop(
    config: ClientConfig,
    alarm: Arc<RwLock<Alarm>>,
    queue: Arc<OutboundQueue>,
    events: ObserverHub<DecodedMessage>,
    state_changes: ObserverHub<StateChangeEvent>,
    zone_changes: ObserverHub<ZoneChangeEvent>,
    closed: Arc<AtomicBool>,
) {
    let mut backoff = Backoff::new(Duration::from_secs(1), config.backoff_cap);

    loop {
        if closed.load(Ordering::Acquire) {
            return;
        }

        let transport = match open_transport(&config).await {
            Ok(transport) => {
                backoff.reset();
                transport
            }
            Err(error) => {
                warn!(error = %error, "connect failed, retrying");
                tokio::time::sleep(backoff.next_delay()).await;
                continue;
            }
        };

        info!("connected");
        {
            let notifications = alarm.write().unwrap_or_else(|e| e.into_inner()).reset();
            publish_notifications(&events, &state_changes, &zone_changes, notifications);
        }

        let (read_half, write_half) = tokio::io::split(transport);
        let s20_silence = Arc::new(AtomicU8::new(0));

        let mut tasks = JoinSet::new();
        tasks.spawn(run_reader(
            read_half,
            alarm.clone(),
            events.clone(),
            state_changes.clone(),
            zone_changes.clone(),
            config.validate_checksums,
            queue.clone(),
            s20_silence.clone(),
        ));
        tasks.spawn(run_writer_and_keepalive(
            write_half,
            queue.clone(),
            config.update_interval,
            config.keepalive_timeout,
            s20_silence,
        ));

        let outcome = tasks.join_next().await;
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        if closed.load(Ordering::Acquire) {
            return;
        }

        warn!(?outcome, "connection lost, reconnecting");
        tokio::time::sleep(backoff.next_delay()).await;
    }
}

/// Owns a byte stream to a Ness panel: frames, decodes, folds into the
/// [`Alarm`] model, serializes outbound commands, and reconnects.
pub struct Client {
    config: ClientConfig,
    alarm: Arc<RwLock<Alarm>>,
    queue: Arc<OutboundQueue>,
    events: ObserverHub<DecodedMessage>,
    state_changes: ObserverHub<StateChangeEvent>,
    zone_changes: ObserverHub<ZoneChangeEvent>,
    closed: Arc<AtomicBool>,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let alarm = Arc::new(RwLock::new(Alarm::new(config.infer_arming_state)));
        let queue = Arc::new(OutboundQueue::new(config.queue_capacity, config.queue_overflow));
        Client {
            config,
            alarm,
            queue,
            events: ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY),
            state_changes: ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY),
            zone_changes: ObserverHub::new(DEFAULT_SUBSCRIPTION_CAPACITY),
            closed: Arc::new(AtomicBool::new(false)),
            supervisor: Mutex::new(None),
        }
    }

    /// Start the connection supervisor. Idempotent while already
    /// connected or connecting.
    pub fn connect(&self) {
        let mut supervisor = self.supervisor.lock().unwrap_or_else(|e| e.into_inner());
        if supervisor.is_some() {
            return;
        }
        let handle = tokio::spawn(supervisor_loop(
            self.config.clone(),
            self.alarm.clone(),
            self.queue.clone(),
            self.events.clone(),
            self.state_changes.clone(),
            self.zone_changes.clone(),
            self.closed.clone(),
        ));
        *supervisor = Some(handle);
    }

    fn enqueue(&self, request: UserInterfaceRequest) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ClosedClientUsed);
        }
        let packet = event::encode_request(None, 0, &request);
        self.queue.push(OutboundItem { packet })
    }

    pub fn send_command(&self, keystring: impl Into<String>) -> Result<(), ClientError> {
        let keystring = keystring.into();
        for part in keystring.split('?') {
            if let Err((idx, c)) = event::validate_keystring(part) {
                return Err(ClientError::InvalidKeystring(format!(
                    "character {c:?} at position {idx} in {keystring:?}"
                )));
            }
        }
        self.enqueue(UserInterfaceRequest::Keystring(keystring))
    }

    pub fn arm_away(&self, code: &str) -> Result<(), ClientError> {
        self.send_command(format!("A{code}E"))
    }

    pub fn arm_home(&self, code: &str) -> Result<(), ClientError> {
        self.send_command(format!("H{code}E"))
    }

    pub fn disarm(&self, code: &str) -> Result<(), ClientError> {
        self.send_command(format!("{code}E"))
    }

    pub fn panic(&self, code: &str) -> Result<(), ClientError> {
        self.send_command(format!("P{code}E"))
    }

    pub fn aux(&self, output_id: u8, state: bool) -> Result<(), ClientError> {
        self.send_command(format!("*{:02}{}", output_id, u8::from(state)))
    }

    /// Enqueue a single `Sxx` status request for category `id`. Fails
    /// synchronously if `id` is out of the protocol's `0..=33` range.
    pub fn status_request(&self, id: u8) -> Result<(), ClientError> {
        if id > 33 {
            return Err(ClientError::InvalidStatusRequestId(id));
        }
        self.enqueue(UserInterfaceRequest::StatusRequest(id))
    }

    /// Enqueue the full status-probe suite (zones 1-16/17-32, arming,
    /// misc alarms) — the same thing the keep-alive loop sends on its
    /// own cadence.
    pub fn update_status(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ClosedClientUsed);
        }
        for req in keepalive_suite(true, false) {
            self.enqueue(req)?;
        }
        Ok(())
    }

    pub fn arming(&self) -> ArmingState {
        self.alarm.read().unwrap_or_else(|e| e.into_inner()).arming()
    }

    pub fn zone_state(&self, zone: u8) -> ZoneState {
        self.alarm.read().unwrap_or_else(|e| e.into_inner()).zone_state(zone)
    }

    pub fn events(&self) -> Subscription<DecodedMessage> {
        self.events.subscribe()
    }

    pub fn state_changes(&self) -> Subscription<StateChangeEvent> {
        self.state_changes.subscribe()
    }

    pub fn zone_changes(&self) -> Subscription<ZoneChangeEvent> {
        self.zone_changes.subscribe()
    }

    pub fn on_event(&self, handler: impl Fn(&DecodedMessage) + Send + Sync + 'static) -> Disposer<DecodedMessage> {
        self.events.on(handler)
    }

    pub fn on_state_change(
        &self,
        handler: impl Fn(&StateChangeEvent) + Send + Sync + 'static,
    ) -> Disposer<StateChangeEvent> {
        self.state_changes.on(handler)
    }

    pub fn on_zone_change(
        &self,
        handler: impl Fn(&ZoneChangeEvent) + Send + Sync + 'static,
    ) -> Disposer<ZoneChangeEvent> {
        self.zone_changes.on(handler)
    }

    /// Wire this client directly to an already-open transport, skipping
    /// `open_transport`/reconnect. For tests that drive a scripted panel
    /// over [`crate::transport::mock::pair`], where there's no
    /// host/port/device to dial.
    #[cfg(any(test, feature = "test-util"))]
    pub fn connect_with_transport(&self, transport: Box<dyn Transport>) {
        let mut supervisor = self.supervisor.lock().unwrap_or_else(|e| e.into_inner());
        if supervisor.is_some() {
            return;
        }
        let (read_half, write_half) = tokio::io::split(transport);
        let alarm = self.alarm.clone();
        let queue = self.queue.clone();
        let events = self.events.clone();
        let state_changes = self.state_changes.clone();
        let zone_changes = self.zone_changes.clone();
        let checksum_mode = self.config.validate_checksums;
        let update_interval = self.config.update_interval;
        let keepalive_timeout = self.config.keepalive_timeout;
        let handle = tokio::spawn(async move {
            let s20_silence = Arc::new(AtomicU8::new(0));
            let mut tasks = JoinSet::new();
            tasks.spawn(run_reader(
                read_half,
                alarm.clone(),
                events,
                state_changes,
                zone_changes,
                checksum_mode,
                queue.clone(),
                s20_silence.clone(),
            ));
            tasks.spawn(run_writer_and_keepalive(
                write_half,
                queue,
                update_interval,
                keepalive_timeout,
                s20_silence,
            ));
            let _ = tasks.join_next().await;
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        });
        *supervisor = Some(handle);
    }

    /// Cooperatively cancel the reader/writer/keep-alive tasks, drain the
    /// outbound queue up to `shutdown_drain_deadline`, and close the
    /// transport. No task remains scheduled once this resolves.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.close();
        let _ = tokio::time::timeout(self.config.shutdown_drain_deadline, self.queue.wait_drained()).await;
        if let Some(handle) = self.supervisor.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}
