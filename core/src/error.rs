//! Error types shared by the store and the service layer.

/// Result type for nibble-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nibble-core.
///
/// The three kinds are kept apart so callers can tell a bad request from a
/// missing record from a storage failure without inspecting messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input was rejected before anything touched the database.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No food entry with the given id exists.
    #[error("Food entry {0} not found")]
    NotFound(i64),

    /// The underlying SQLite operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Food name is required")]
    EmptyName,

    #[error("Calories per serving must be positive")]
    NonPositiveCalories,

    #[error("Servings must be positive")]
    NonPositiveServings,

    #[error("Invalid date '{0}'. Use YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Logged time must fall between years 0000 and 9999")]
    TimestampOutOfRange,
}

impl Error {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
