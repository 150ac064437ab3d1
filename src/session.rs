//! Live session state exposed by the API routes.
//!
//! The session is the running tool whose state the control plane publishes:
//! a snapshot of monitored entities (interface, gateway, LAN hosts, WiFi
//! access points, BLE devices, packet counters, module options) plus an
//! append-only event log. State changes are recorded as events which are
//! also pushed to websocket subscribers via a broadcast channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Capacity of the broadcast channel feeding websocket subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// A recorded state-change notification.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub tag: String,
    pub time: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// A network endpoint (interface or gateway).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Endpoint {
    pub mac: String,
    pub ipv4: String,
    pub hostname: String,
}

/// A host discovered on the local network.
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub mac: String,
    pub ipv4: String,
    pub hostname: String,
    pub vendor: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A WiFi access point in range.
#[derive(Debug, Clone, Serialize)]
pub struct AccessPoint {
    pub mac: String,
    pub essid: String,
    pub channel: u8,
    pub encryption: String,
    pub clients: u32,
}

/// A BLE device in range.
#[derive(Debug, Clone, Serialize)]
pub struct BleDevice {
    pub mac: String,
    pub name: String,
    pub rssi: i32,
}

/// Packet counters for the capture queue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PacketStats {
    pub received: u64,
    pub sent: u64,
    pub errors: u64,
}

/// Mutable portion of the session, guarded by a read-write lock.
#[derive(Debug, Default, Serialize)]
pub struct Snapshot {
    pub interface: Endpoint,
    pub gateway: Endpoint,
    pub env: HashMap<String, String>,
    pub lan: Vec<Host>,
    pub wifi: Vec<AccessPoint>,
    pub ble: Vec<BleDevice>,
    pub packets: PacketStats,
    pub options: HashMap<String, String>,
}

struct SessionInner {
    started_at: DateTime<Utc>,
    snapshot: RwLock<Snapshot>,
    events: RwLock<Vec<Event>>,
    events_tx: broadcast::Sender<Event>,
}

/// Handle to the running session, cloneable across handlers.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                started_at: Utc::now(),
                snapshot: RwLock::new(Snapshot::default()),
                events: RwLock::new(Vec::new()),
                events_tx,
            }),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Read access to the current snapshot.
    pub async fn snapshot(&self) -> tokio::sync::RwLockReadGuard<'_, Snapshot> {
        self.inner.snapshot.read().await
    }

    /// Write access to the snapshot, for the runtime feeding the session.
    pub async fn snapshot_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, Snapshot> {
        self.inner.snapshot.write().await
    }

    /// Record a state-change event and push it to websocket subscribers.
    pub async fn record_event(&self, tag: &str, data: serde_json::Value) {
        let event = Event {
            tag: tag.to_string(),
            time: Utc::now(),
            data,
        };

        self.inner.events.write().await.push(event.clone());

        // Send fails only when no subscriber is connected, which is fine.
        let _ = self.inner.events_tx.send(event);
    }

    /// The most recent `limit` events, oldest first; all of them if `None`.
    pub async fn events(&self, limit: Option<usize>) -> Vec<Event> {
        let events = self.inner.events.read().await;
        match limit {
            Some(n) if n < events.len() => events[events.len() - n..].to_vec(),
            _ => events.clone(),
        }
    }

    /// Subscribe to live event notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events_tx.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
