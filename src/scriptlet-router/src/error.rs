use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("trigger registry error: {0}")]
    Registry(String),
    #[error("invalid cron expression `{0}`: {1}")]
    InvalidCron(String, String),
}
