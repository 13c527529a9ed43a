pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::actions::{ActionHandler, NotificationAction};
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::conflicts::{
    suggest_free_slots, ConflictDetail, ConflictKind, ConflictMode, ConflictResolver,
    SuggestionOptions,
};
pub use application::delivery::{DeliveryRunner, DeliveryRunnerOptions};
pub use application::pause_watcher::subscribe_pause_notifications;
pub use application::queue::NotificationQueueService;
pub use application::scheduler_runner::{SchedulerRunner, SchedulerRunnerOptions};
pub use application::scheduling::{
    BlockSchedulingService, RescheduleOutcome, ScheduleOptions, ScheduleOutcome,
};
pub use application::service::{NotificationDeps, NotificationService};
pub use application::NowProvider;
pub use domain::models::{
    block_type_meta_map, BlockInstance, BlockPayload, BlockStatus, BlockType, BlockTypeMeta,
    CalendarEvent, NotificationPayload, NotificationQueueItem, NotificationType,
    ScheduledNotification, StandupPayload, UserPreferences,
};
pub use domain::overlap::{assert_valid_range, overlaps, overlaps_str, TimeRange};
pub use domain::scheduler::{schedule_block_notifications, ScheduleContext};
pub use infrastructure::block_repository::{
    BlockRepository, InMemoryBlockRepository, SqliteBlockRepository,
};
pub use infrastructure::block_type_repository::{
    BlockTypeRepository, InMemoryBlockTypeRepository, SqliteBlockTypeRepository,
};
pub use infrastructure::calendar_repository::{
    CalendarEventRepository, InMemoryCalendarEventRepository, SqliteCalendarEventRepository,
};
pub use infrastructure::change_feed::{
    BlockChange, ChangeCallback, ChangeEvent, ChangeFeed, ChangeSubscription, InMemoryChangeFeed,
};
pub use infrastructure::config::{
    ensure_default_configs, load_notification_settings, read_timezone, resolve_timezone,
    NotificationSettings,
};
pub use infrastructure::error::EngineError;
pub use infrastructure::notification_repository::{
    InMemoryNotificationRepository, NotificationRepository, SqliteNotificationRepository,
};
pub use infrastructure::notifier::{
    NotificationSurface, RecordingNotificationSurface, SentNotification,
};
pub use infrastructure::preferences_repository::{
    InMemoryPreferencesRepository, PreferencesRepository, SqlitePreferencesRepository,
};
pub use infrastructure::storage::initialize_database;
