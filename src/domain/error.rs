//! The four-kind domain error model from `spec.md` §7.

/// Errors surfaced by `RoomService` and `GameService`.
///
/// `NotFound`/`Forbidden`/`Conflict`/`Validation` never mutate state before
/// being returned (the one documented exception being the voting-deadline
/// race in `GameService::cast_vote`, which finalizes the vote before
/// returning `Conflict` so clients still observe `voting_result`).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation",
            Self::Internal(_) => "internal",
        }
    }
}
