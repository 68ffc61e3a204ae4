/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier assigned to every comparison run.
pub type RunId = uuid::Uuid;
