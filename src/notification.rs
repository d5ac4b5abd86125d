//! Notifications and Scheduled Timers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub issued_at: DateTime<Utc>,
    /// `None` means the notification stays until replaced.
    #[serde(with = "optional_millis")]
    pub expiry: Option<Duration>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>, expiry: Option<Duration>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            issued_at: Utc::now(),
            expiry,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message, None)
    }

    pub fn success(message: impl Into<String>, expiry: Duration) -> Self {
        Self::new(NotificationKind::Success, message, Some(expiry))
    }

    pub fn error(message: impl Into<String>, expiry: Duration) -> Self {
        Self::new(NotificationKind::Error, message, Some(expiry))
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

/// A one-shot delayed task. Dropping or cancelling it aborts the task.
#[derive(Debug)]
pub struct Timer {
    task: JoinHandle<()>,
}

impl Timer {
    /// Run `on_fire` after `delay` on the current runtime.
    pub fn schedule<F>(delay: Duration, on_fire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cancel whatever timer occupies `slot`. Safe to call on an empty slot.
pub fn cancel_timer(slot: &mut Option<Timer>) {
    slot.take();
}
