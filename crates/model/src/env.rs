/// Environment variable selecting the log verbosity
pub const LOG_LEVEL: &str = "LOG_LEVEL";
/// Environment variable containing the status table name
pub const STATUS_TABLE_NAME: &str = "STATUS_TABLE_NAME";

/// Table used when `STATUS_TABLE_NAME` is unset
pub const DEFAULT_STATUS_TABLE_NAME: &str = "lambda-idempotency-status";
