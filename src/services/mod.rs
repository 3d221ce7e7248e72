pub mod records;
pub mod stats;
pub mod topics;
pub mod users;

pub use records::{NewRecord, RecordChanges, RecordPage, RecordQuery, RecordService};
pub use stats::StatsService;
pub use topics::TopicService;
pub use users::UserService;
