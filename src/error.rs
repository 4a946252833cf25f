use thiserror::Error;

/// Crate-wide error taxonomy for the room engine and its transport shell.
///
/// Variants map onto the error taxonomy of the design (guarded violations,
/// input validation, start-condition failure, transport/unknown); the
/// dispatch loop in [`crate::room`] decides drop-vs-reply-vs-log per variant,
/// it never lets one of these escape as a panic.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("not allowed in the current phase")]
    WrongPhase,

    #[error("not allowed for this player")]
    WrongRole,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("cannot start game: {0}")]
    StartCondition(String),

    #[error("room is full")]
    RoomFull,

    #[error("room not found")]
    RoomNotFound,
}

/// Errors surfaced while creating/looking up rooms in the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to allocate a unique room code after {0} attempts")]
    CodeExhausted(usize),
}
