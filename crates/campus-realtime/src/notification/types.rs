//! Payloads pushed on the notifications hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_core::types::NotificationId;

use super::priority::NotificationPriority;

/// Event carrying a personal notification.
pub const NOTIFICATION_RECEIVED: &str = "NotificationReceived";
/// Event carrying a broadcast announcement.
pub const ANNOUNCEMENT_SENT: &str = "AnnouncementSent";
/// Event confirming an announcement was read (possibly on another device).
pub const ANNOUNCEMENT_READ: &str = "AnnouncementRead";

/// A personal notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    #[serde(default, alias = "message")]
    pub body: Option<String>,
    #[serde(default, rename = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: NotificationPriority,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: bool,
}

/// A broadcast announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: NotificationId,
    pub title: String,
    #[serde(default, alias = "content")]
    pub body: Option<String>,
    #[serde(default)]
    pub priority: NotificationPriority,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Read receipt for an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementRead {
    #[serde(alias = "announcementId")]
    pub id: NotificationId,
}

/// Where a feed item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    Notification,
    Announcement,
}

/// One entry of the notifications feed, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: NotificationId,
    pub source: FeedSource,
    pub title: String,
    pub body: Option<String>,
    pub priority: NotificationPriority,
    pub created_at: Option<DateTime<Utc>>,
    pub read: bool,
}

impl From<Notification> for FeedItem {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            source: FeedSource::Notification,
            title: n.title,
            body: n.body,
            priority: n.priority,
            created_at: n.created_at,
            read: n.is_read,
        }
    }
}

impl From<Announcement> for FeedItem {
    fn from(a: Announcement) -> Self {
        Self {
            id: a.id,
            source: FeedSource::Announcement,
            title: a.title,
            body: a.body,
            priority: a.priority,
            created_at: a.created_at,
            read: false,
        }
    }
}

/// Published state of the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub items: Vec<FeedItem>,
    pub unread_count: usize,
}
