use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Thread index {index} out of range (profile has {count} threads)")]
    ThreadIndexOutOfRange { index: usize, count: usize },

    #[error("Thread '{thread}' has no event delay column; check has_event_delays() first")]
    MissingEventDelays { thread: String },

    #[error(
        "Native allocations of thread '{thread}' carry no memory addresses; \
         check can_show_retained_memory() first"
    )]
    UnbalancedNativeAllocations { thread: String },

    #[error("Thread '{thread}' has no {table} table")]
    MissingTable { thread: String, table: &'static str },

    #[error("Malformed thread data: {0}")]
    MalformedThread(String),

    #[error("Transform {transform} failed: {reason}")]
    Transform { transform: String, reason: String },

    #[error("Unsupported profile schema version {found} (expected {expected})")]
    SchemaVersion { found: i32, expected: i32 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const PROFILE_NOT_FOUND: i32 = 3;
    pub const MISSING_DATA: i32 = 4;
    pub const MALFORMED_PROFILE: i32 = 5;
    pub const DATABASE_ERROR: i32 = 6;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ProfileNotFound(_) => exit_code::PROFILE_NOT_FOUND,
            Error::MissingEventDelays { .. }
            | Error::UnbalancedNativeAllocations { .. }
            | Error::MissingTable { .. } => exit_code::MISSING_DATA,
            Error::MalformedThread(_) | Error::SchemaVersion { .. } => {
                exit_code::MALFORMED_PROFILE
            }
            Error::Database(_) => exit_code::DATABASE_ERROR,
            Error::InvalidArgument(_) | Error::ThreadIndexOutOfRange { .. } => {
                exit_code::INVALID_ARGUMENTS
            }
            _ => exit_code::GENERAL_ERROR,
        }
    }
}
