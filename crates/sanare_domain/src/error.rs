use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeOfDayError {
    #[error("invalid time of day `{0}`, expected zero-padded HH:MM")]
    Invalid(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DayKeyError {
    #[error("invalid day key `{0}`, expected YYYY-MM-DD")]
    Invalid(String),
}

/// Failures surfaced by the checklist toggle path. A stock veto is not an
/// error and is reported through `ToggleOutcome` instead.
#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("no checklist entry loaded with id `{0}`")]
    UnknownEntry(String),
    #[error("failed to persist daily status: {cause}")]
    Persist { cause: anyhow::Error },
}
