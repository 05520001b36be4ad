use thiserror::Error;

/// Centralized error type for the core library
///
/// Storage, cache and domain services all report through this enum so the bot
/// and the HTTP API can tell domain outcomes (`NoInvite`, `CertificateNotFound`)
/// apart from infrastructure failures without looking at messages.
///
/// # Example
///
/// ```no_run
/// use immunecore::error::AppError;
///
/// fn is_user_facing(err: &AppError) -> bool {
///     err.is_domain()
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),

    /// Redis errors
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// QR code encoding errors
    #[error("QR encoding error: {0}")]
    Qr(#[from] qrcode::types::QrError),

    /// PNG rendering errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Metric registration or encoding errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// No user matched the lookup
    #[error("user not found")]
    UserNotFound,

    /// Invite code is unknown or already redeemed
    #[error("no such invite")]
    NoInvite,

    /// User tried to redeem an invite they own
    #[error("cannot activate own invite")]
    SelfInvite,

    /// Invite redemption for a user who is already active
    #[error("user is already active")]
    AlreadyActive,

    /// No certificate with this code
    #[error("certificate not found")]
    CertificateNotFound,

    /// Unique code generation ran out of attempts
    #[error("failed to generate a unique code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: usize },

    /// Invite code already belongs to another user
    #[error("invite code {code} is already taken")]
    InviteCodeTaken { code: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    /// Domain outcomes are expected during normal operation and carry a
    /// message that is safe to show to the user.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            AppError::UserNotFound
                | AppError::NoInvite
                | AppError::SelfInvite
                | AppError::AlreadyActive
                | AppError::CertificateNotFound
                | AppError::Validation(_)
        )
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
