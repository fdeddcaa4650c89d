use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::NotificationId;

/// Upper bound on kept notifications; the oldest are dropped first.
pub const MAX_FEED_LEN: usize = 100;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Order,
    Finance,
    Compliance,
    App,
}

impl NotificationKind {
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Order => "moped",
            Self::Finance => "wallet-outline",
            Self::Compliance => "shield-check-outline",
            Self::App => "bell-outline",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(alias = "message")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

/// Newest first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct NotificationFeed {
    items: Vec<Notification>,
}

impl NotificationFeed {
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    /// A notification with a known id replaces the existing entry.
    pub fn push(&mut self, notification: Notification) {
        self.items.retain(|n| n.id != notification.id);
        self.items.insert(0, notification);
        self.items.truncate(MAX_FEED_LEN);
    }

    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.items.iter_mut().find(|n| &n.id == id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for n in &mut self.items {
            n.is_read = true;
        }
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
