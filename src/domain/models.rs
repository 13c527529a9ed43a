use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier with a short type prefix, e.g. `ntf-...`.
pub fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Scheduled,
    InProgress,
    Paused,
    Completed,
    Skipped,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "in_progress" => Some(Self::InProgress),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One concrete scheduled occurrence of a block type on the calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockInstance {
    pub id: String,
    pub user_id: String,
    pub block_type_id: String,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub status: BlockStatus,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub paused_until: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub notes: Option<String>,
}

impl BlockInstance {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "block_instance.id")?;
        validate_non_empty(&self.user_id, "block_instance.user_id")?;
        validate_non_empty(&self.block_type_id, "block_instance.block_type_id")?;
        if self.planned_end <= self.planned_start {
            return Err("block_instance.planned_end must be after planned_start".to_string());
        }
        if let (Some(actual_start), Some(actual_end)) = (self.actual_start, self.actual_end) {
            if actual_end < actual_start {
                return Err("block_instance.actual_end must be >= actual_start".to_string());
            }
        }
        Ok(())
    }
}

/// Reusable template that block instances are created from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockType {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub default_duration_minutes: u32,
    pub recurring_enabled: bool,
    pub recurring_days_of_week: Vec<u8>,
    pub recurring_time_of_day: Option<String>,
    pub recurring_weeks_in_advance: Option<u32>,
}

impl BlockType {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "block_type.id")?;
        validate_non_empty(&self.user_id, "block_type.user_id")?;
        validate_non_empty(&self.name, "block_type.name")?;
        if !is_hex_color(&self.color) {
            return Err("block_type.color must be a hex color (e.g., #3366FF)".to_string());
        }
        if self.default_duration_minutes == 0 {
            return Err("block_type.default_duration_minutes must be > 0".to_string());
        }
        for day in &self.recurring_days_of_week {
            if *day > 6 {
                return Err(
                    "block_type.recurring_days_of_week must contain integers 0..6 (Sun..Sat)"
                        .to_string(),
                );
            }
        }
        if let Some(time_of_day) = &self.recurring_time_of_day {
            validate_hhmm(time_of_day, "block_type.recurring_time_of_day")?;
        }
        if let Some(weeks) = self.recurring_weeks_in_advance {
            if weeks == 0 {
                return Err(
                    "block_type.recurring_weeks_in_advance must be > 0 if provided".to_string(),
                );
            }
        }
        Ok(())
    }
}

/// Display metadata carried into notification payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockTypeMeta {
    pub name: Option<String>,
    pub color: Option<String>,
}

pub fn block_type_meta_map(block_types: &[BlockType]) -> HashMap<String, BlockTypeMeta> {
    block_types
        .iter()
        .map(|block_type| {
            (
                block_type.id.clone(),
                BlockTypeMeta {
                    name: Some(block_type.name.clone()),
                    color: Some(block_type.color.clone()),
                },
            )
        })
        .collect()
}

/// External calendar event, read-only conflict source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPreferences {
    pub notifications_enabled: bool,
    pub notification_lead_time_minutes: Option<i64>,
    pub notification_sound_enabled: bool,
    pub standup_time: Option<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            notification_lead_time_minutes: None,
            notification_sound_enabled: true,
            standup_time: None,
        }
    }
}

impl UserPreferences {
    /// Lead time to use for upcoming warnings. Negative stored values behave
    /// like "not set" and fall back to the supplied default.
    pub fn effective_lead_minutes(&self, default_minutes: i64) -> i64 {
        self.notification_lead_time_minutes
            .filter(|minutes| *minutes >= 0)
            .unwrap_or(default_minutes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BlockUpcoming,
    BlockStart,
    BlockPaused,
    BlockResumed,
    Standup,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockUpcoming => "block_upcoming",
            Self::BlockStart => "block_start",
            Self::BlockPaused => "block_paused",
            Self::BlockResumed => "block_resumed",
            Self::Standup => "standup",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "block_upcoming" => Some(Self::BlockUpcoming),
            "block_start" => Some(Self::BlockStart),
            "block_paused" => Some(Self::BlockPaused),
            "block_resumed" => Some(Self::BlockResumed),
            "standup" => Some(Self::Standup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_minutes: Option<i64>,
    pub block_type_id: String,
    pub block_instance_id: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StandupPayload {
    pub time: String,
}

/// Per-type payload shape carried by queue rows. Serialized untagged so the
/// persisted JSON is the plain field set, no wrapper object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NotificationPayload {
    Block(BlockPayload),
    Standup(StandupPayload),
}

/// Candidate output of the pure scheduler; becomes persisted only once
/// reconciled into the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub id: String,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub target_time: DateTime<Utc>,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationQueueItem {
    pub id: String,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub target_time: DateTime<Utc>,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    parse_hhmm(value).ok_or_else(|| format!("{field_name} must be HH:MM"))?;
    Ok(())
}

pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    (digits.len() == 6 || digits.len() == 3) && digits.chars().all(|c| c.is_ascii_hexdigit())
}
