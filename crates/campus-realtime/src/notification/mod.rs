//! Notifications hub feed: personal notifications and announcements.

pub mod dedup;
pub mod feed;
pub mod priority;
pub mod types;

pub use feed::{FeedStore, NotificationFeed};
pub use priority::NotificationPriority;
pub use types::{Announcement, FeedItem, FeedSnapshot, FeedSource, Notification};
