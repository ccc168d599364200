//! Notification priority levels.

use serde::{Deserialize, Deserializer, Serialize};

/// Priority attached to a notification or announcement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum NotificationPriority {
    /// Background information
    Low,
    /// Standard events
    #[default]
    Normal,
    /// Important events
    High,
    /// Requires immediate attention
    Urgent,
}

impl NotificationPriority {
    /// Parse from string, falling back to `Normal`.
    pub fn from_str_value(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" | "critical" => Self::Urgent,
            _ => Self::Normal,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Whether the item should be surfaced prominently.
    pub fn is_prominent(&self) -> bool {
        matches!(self, Self::High | Self::Urgent)
    }
}

// Backends send free-form priority strings; unknown values degrade to Normal.
impl<'de> Deserialize<'de> for NotificationPriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .map(Self::from_str_value)
            .unwrap_or_default())
    }
}
