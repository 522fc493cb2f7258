//! Named queue priority levels.

use serde::{Deserialize, Serialize};

/// Queue priority levels. Higher values are dispatched first.
///
/// Requests carry a plain `i32` priority; these levels are convenient
/// anchors and any integer in between is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum Priority {
    /// Low priority (background prefetches).
    Low = -10,
    /// Normal priority (default).
    Normal = 0,
    /// High priority (user-facing calls).
    High = 10,
    /// Critical priority (must jump the backlog).
    Critical = 20,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        match value {
            v if v >= 20 => Priority::Critical,
            v if v >= 10 => Priority::High,
            v if v <= -10 => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority as i32
    }
}
