use crate::application::conflicts::{ConflictDetail, ConflictMode, ConflictResolver};
use crate::domain::models::{next_id, BlockInstance, BlockStatus, BlockType};
use crate::domain::overlap::assert_valid_range;
use crate::infrastructure::block_repository::BlockRepository;
use crate::infrastructure::block_type_repository::BlockTypeRepository;
use crate::infrastructure::calendar_repository::CalendarEventRepository;
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

const FALLBACK_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub conflict_mode: ConflictMode,
    pub allow_conflicts: bool,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            conflict_mode: ConflictMode::BlocksAndCalendar,
            allow_conflicts: false,
        }
    }
}

/// Proposal/confirmation result: conflicts without a created block mean the
/// caller should confirm (retry with `allow_conflicts`) or pick another slot.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub created: Option<BlockInstance>,
    pub conflicts: Vec<ConflictDetail>,
}

#[derive(Debug, Clone)]
pub struct RescheduleOutcome {
    pub updated: Option<BlockInstance>,
    pub conflicts: Vec<ConflictDetail>,
}

pub struct BlockSchedulingService<B, T, C>
where
    B: BlockRepository,
    T: BlockTypeRepository,
    C: CalendarEventRepository,
{
    blocks: Arc<B>,
    block_types: Arc<T>,
    resolver: ConflictResolver<B, C>,
}

impl<B, T, C> BlockSchedulingService<B, T, C>
where
    B: BlockRepository,
    T: BlockTypeRepository,
    C: CalendarEventRepository,
{
    pub fn new(blocks: Arc<B>, block_types: Arc<T>, calendar: Arc<C>) -> Self {
        let resolver = ConflictResolver::new(Arc::clone(&blocks), calendar);
        Self {
            blocks,
            block_types,
            resolver,
        }
    }

    pub fn create_block_type(&self, block_type: &BlockType) -> Result<(), EngineError> {
        block_type
            .validate()
            .map_err(EngineError::InvalidConfig)?;
        self.block_types.insert_block_type(block_type)
    }

    /// Create one block instance. A missing `end` derives from the block
    /// type's default duration.
    pub fn schedule_block_instance(
        &self,
        user_id: &str,
        block_type_id: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        options: &ScheduleOptions,
    ) -> Result<ScheduleOutcome, EngineError> {
        let end = match end {
            Some(end) => end,
            None => start + Duration::minutes(self.default_duration(user_id, block_type_id)?),
        };

        assert_valid_range(start, end)?;
        let conflicts =
            self.resolver
                .find_conflicts(user_id, start, end, options.conflict_mode, None)?;
        if !conflicts.is_empty() && !options.allow_conflicts {
            return Ok(ScheduleOutcome {
                created: None,
                conflicts,
            });
        }

        let block = BlockInstance {
            id: next_id("blk"),
            user_id: user_id.to_string(),
            block_type_id: block_type_id.to_string(),
            planned_start: start,
            planned_end: end,
            status: BlockStatus::Scheduled,
            actual_start: None,
            actual_end: None,
            paused_until: None,
            pause_reason: None,
            notes: None,
        };
        self.blocks.insert_block(&block)?;

        Ok(ScheduleOutcome {
            created: Some(block),
            conflicts,
        })
    }

    /// Move an existing block, excluding it from its own conflict check.
    pub fn reschedule_block_instance(
        &self,
        user_id: &str,
        block_instance_id: &str,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        options: &ScheduleOptions,
    ) -> Result<RescheduleOutcome, EngineError> {
        assert_valid_range(new_start, new_end)?;

        let mut block = self
            .blocks
            .get_block(user_id, block_instance_id)?
            .ok_or_else(|| {
                EngineError::Repository(format!(
                    "block instance '{block_instance_id}' not found"
                ))
            })?;

        let conflicts = self.resolver.find_conflicts(
            user_id,
            new_start,
            new_end,
            options.conflict_mode,
            Some(block_instance_id),
        )?;
        if !conflicts.is_empty() && !options.allow_conflicts {
            return Ok(RescheduleOutcome {
                updated: None,
                conflicts,
            });
        }

        block.planned_start = new_start;
        block.planned_end = new_end;
        self.blocks.update_block(&block)?;

        Ok(RescheduleOutcome {
            updated: Some(block),
            conflicts,
        })
    }

    fn default_duration(&self, user_id: &str, block_type_id: &str) -> Result<i64, EngineError> {
        Ok(self
            .block_types
            .get_block_type(user_id, block_type_id)?
            .map(|block_type| i64::from(block_type.default_duration_minutes))
            .unwrap_or(FALLBACK_DURATION_MINUTES))
    }
}
