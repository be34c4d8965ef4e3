//! Transfer Notifications
//!
//! Fire-and-forget lifecycle events. A sink must never block the caller or
//! fail the operation that emitted the event.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::context::RequestContext;
use crate::core_types::{Gigabytes, ProjectId, TransferId, UserId, VolumeId, VolumeTypeId};
use crate::volume::VolumeRecord;

/// Volume usage snapshot attached to every transfer event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsagePayload {
    pub tenant_id: ProjectId,
    pub user_id: UserId,
    pub volume_id: VolumeId,
    pub display_name: Option<String>,
    pub size: Gigabytes,
    pub status: String,
    pub volume_type_id: Option<VolumeTypeId>,
    pub created_at: DateTime<Utc>,
    pub transfer_id: Option<TransferId>,
}

impl UsagePayload {
    pub fn new(volume: &VolumeRecord, transfer_id: Option<TransferId>) -> Self {
        Self {
            tenant_id: volume.project_id.clone(),
            user_id: volume.user_id.clone(),
            volume_id: volume.id,
            display_name: volume.display_name.clone(),
            size: volume.size,
            status: volume.status.to_string(),
            volume_type_id: volume.volume_type_id.clone(),
            created_at: volume.created_at,
            transfer_id,
        }
    }
}

/// One emitted event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub event_type: String,
    pub request_id: String,
    pub payload: UsagePayload,
    pub timestamp: DateTime<Utc>,
}

pub trait NotificationSink: Send + Sync {
    fn emit(&self, ctx: &RequestContext, payload: &UsagePayload, event_name: &str);
}

/// Logs every event at `info` under the `notifications` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn emit(&self, ctx: &RequestContext, payload: &UsagePayload, event_name: &str) {
        info!(
            target: "notifications",
            event_type = event_name,
            request_id = %ctx.request_id,
            volume_id = %payload.volume_id,
            tenant_id = %payload.tenant_id,
            status = %payload.status,
            "{}", event_name
        );
    }
}

/// Forwards events to a bounded channel; drops them when full or closed
pub struct ChannelSink {
    tx: mpsc::Sender<Notification>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn emit(&self, ctx: &RequestContext, payload: &UsagePayload, event_name: &str) {
        let notification = Notification {
            event_type: event_name.to_string(),
            request_id: ctx.request_id.clone(),
            payload: payload.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.tx.try_send(notification) {
            warn!(event_type = event_name, error = %e, "Dropping notification");
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event names emitted so far
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|events| events.iter().map(|n| n.event_type.clone()).collect())
            .unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, ctx: &RequestContext, payload: &UsagePayload, event_name: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(Notification {
                event_type: event_name.to_string(),
                request_id: ctx.request_id.clone(),
                payload: payload.clone(),
                timestamp: Utc::now(),
            });
        }
    }
}
