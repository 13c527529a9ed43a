use crate::domain::overlap::{overlaps, TimeRange};
use crate::infrastructure::block_repository::BlockRepository;
use crate::infrastructure::calendar_repository::CalendarEventRepository;
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    None,
    Blocks,
    BlocksAndCalendar,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Block,
    Calendar,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictDetail {
    pub kind: ConflictKind,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub struct ConflictResolver<B, C>
where
    B: BlockRepository,
    C: CalendarEventRepository,
{
    blocks: Arc<B>,
    calendar: Arc<C>,
}

impl<B, C> ConflictResolver<B, C>
where
    B: BlockRepository,
    C: CalendarEventRepository,
{
    pub fn new(blocks: Arc<B>, calendar: Arc<C>) -> Self {
        Self { blocks, calendar }
    }

    /// Existing blocks and (optionally) calendar events intersecting
    /// `[start, end)`. The repository applies the coarse range filter; each
    /// hit is re-verified with the overlap predicate before being reported.
    pub fn find_conflicts(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mode: ConflictMode,
        exclude_block_id: Option<&str>,
    ) -> Result<Vec<ConflictDetail>, EngineError> {
        if mode == ConflictMode::None {
            return Ok(Vec::new());
        }

        let mut conflicts = Vec::new();

        for block in self.blocks.list_blocks_in_range(user_id, start, end)? {
            if exclude_block_id.is_some_and(|excluded| block.id == excluded) {
                continue;
            }
            if overlaps(block.planned_start, block.planned_end, start, end) {
                conflicts.push(ConflictDetail {
                    kind: ConflictKind::Block,
                    id: block.id,
                    title: None,
                    start: block.planned_start,
                    end: block.planned_end,
                });
            }
        }

        if mode == ConflictMode::Blocks {
            return Ok(conflicts);
        }

        for event in self.calendar.list_events_in_range(user_id, start, end)? {
            if overlaps(event.start_time, event.end_time, start, end) {
                conflicts.push(ConflictDetail {
                    kind: ConflictKind::Calendar,
                    id: event.id,
                    title: event.title,
                    start: event.start_time,
                    end: event.end_time,
                });
            }
        }

        Ok(conflicts)
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionOptions {
    pub increment_minutes: i64,
    pub horizon_minutes: i64,
    pub max_suggestions: usize,
}

impl Default for SuggestionOptions {
    fn default() -> Self {
        Self {
            increment_minutes: 30,
            horizon_minutes: 8 * 60,
            max_suggestions: 3,
        }
    }
}

/// Scan forward from the requested start in fixed increments, keeping
/// windows of the same duration that clear the known conflict set. Bounded
/// by the horizon, so fewer than `max_suggestions` may come back.
pub fn suggest_free_slots(
    requested: &TimeRange,
    conflicts: &[ConflictDetail],
    options: &SuggestionOptions,
) -> Vec<TimeRange> {
    let duration = requested.duration();
    let increment = Duration::minutes(options.increment_minutes.max(1));
    let horizon_end = requested.start + Duration::minutes(options.horizon_minutes);

    let mut suggestions = Vec::new();
    let mut candidate_start = requested.start;

    while candidate_start <= horizon_end && suggestions.len() < options.max_suggestions {
        let candidate_end = candidate_start + duration;
        let clear = conflicts
            .iter()
            .all(|conflict| !overlaps(candidate_start, candidate_end, conflict.start, conflict.end));
        if clear {
            suggestions.push(TimeRange {
                start: candidate_start,
                end: candidate_end,
            });
        }
        candidate_start += increment;
    }

    suggestions
}
