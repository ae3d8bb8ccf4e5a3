//! Error types for Tidemark

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for catalog operations
///
/// Several variants carry exact message literals that callers compare
/// against (`subscription already exists`, the `invalid subscription URL`
/// prefix); those strings are part of the public contract.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database does not exist
    #[error("database not found: {0}")]
    DatabaseNotFound(String),
    /// Database name is empty
    #[error("database name required")]
    DatabaseNameRequired,
    /// Name is blank or contains whitespace
    #[error("invalid name: names may not be blank or contain whitespace")]
    InvalidName,
    /// Retention policy does not exist
    #[error("retention policy not found: {0}")]
    RetentionPolicyNotFound(String),
    /// Retention policy already exists with different parameters
    #[error("retention policy already exists")]
    RetentionPolicyExists,
    /// Requested retention policy disagrees with existing state
    #[error("retention policy conflicts with an existing policy")]
    RetentionPolicyConflict,
    /// Retention policy name is empty
    #[error("retention policy name required")]
    RetentionPolicyNameRequired,
    /// Retention duration is below the minimum
    #[error("retention policy duration must be at least 1h")]
    RetentionPolicyDurationTooLow,
    /// Shard group duration does not fit the retention duration
    #[error("retention policy duration must be greater than the shard group duration")]
    IncompatibleDurations,
    /// Replication factor below one
    #[error("replication factor must be greater than 0")]
    ReplicationFactorTooLow,
    /// User does not exist
    #[error("user not found")]
    UserNotFound,
    /// User already exists with different credentials
    #[error("user already exists")]
    UserExists,
    /// User name is empty
    #[error("username required")]
    UsernameRequired,
    /// Bad credentials
    #[error("authentication failed")]
    Authenticate,
    /// Continuous query already exists with a different query text
    #[error("continuous query already exists")]
    ContinuousQueryExists,
    /// Subscription name already registered on the retention policy
    #[error("subscription already exists")]
    SubscriptionExists,
    /// Subscription does not exist
    #[error("subscription not found")]
    SubscriptionNotFound,
    /// Subscription registered without any destinations
    #[error("subscription destinations required")]
    SubscriptionDestinationsRequired,
    /// Subscription destination failed validation
    #[error("invalid subscription URL: {0}")]
    InvalidSubscriptionUrl(String),
    /// Node address already registered
    #[error("node already exists")]
    NodeExists,
    /// Shard does not exist
    #[error("shard not found: {0}")]
    ShardNotFound(u64),
    /// Lease is held by another owner
    #[error("requested lease already owned")]
    LeaseConflict,
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
