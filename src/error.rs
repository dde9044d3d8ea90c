use thiserror::Error;

/// Operator-supplied input rejected before any statement is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("transaction id must not be empty")]
    EmptyTransactionId,

    #[error("'{raw}' is not a valid transaction id (expected a positive integer)")]
    MalformedTransactionId { raw: String },

    #[error("'{raw}' is not a valid decision (expected <transaction_id>=<fraud|legit|undecided>)")]
    MalformedDecision { raw: String },

    #[error("'{raw}' is not a valid verdict (expected fraud, legit, undecided, true or false)")]
    MalformedVerdict { raw: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
