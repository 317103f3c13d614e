//! Error types for fleet spec parsing and validation.

use thiserror::Error;

/// A malformed or inconsistent fleet specification.
///
/// Every variant identifies where the problem is: the fleet-level field, or
/// the offending bot and field. Validation is all-or-nothing, so a single
/// error aborts the whole render/plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecValidationError {
    /// The spec document could not be parsed.
    #[error("failed to parse fleet spec: {0}")]
    Parse(String),

    /// A fleet-wide setting is invalid.
    #[error("fleet.{field}: {reason}")]
    Fleet { field: String, reason: String },

    /// A bot-level setting is invalid.
    #[error("bot '{bot}': {field}: {reason}")]
    Bot {
        bot: String,
        field: String,
        reason: String,
    },

    /// Two bots share the same name.
    #[error("duplicate bot name '{0}'")]
    DuplicateName(String),

    /// Two distinct bot names derive the same workload identity.
    #[error("bots '{first}' and '{second}' both derive identity '{identity}'")]
    IdentityCollision {
        first: String,
        second: String,
        identity: String,
    },
}

impl SpecValidationError {
    pub(crate) fn fleet(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fleet {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn bot(
        bot: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Bot {
            bot: bot.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The bot the error is attributed to, if any.
    pub fn bot_name(&self) -> Option<&str> {
        match self {
            Self::Bot { bot, .. } => Some(bot),
            Self::DuplicateName(name) => Some(name),
            Self::IdentityCollision { second, .. } => Some(second),
            Self::Parse(_) | Self::Fleet { .. } => None,
        }
    }

    /// The offending field path, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Bot { field, .. } | Self::Fleet { field, .. } => Some(field),
            Self::DuplicateName(_) | Self::IdentityCollision { .. } => Some("name"),
            Self::Parse(_) => None,
        }
    }
}

/// Errors from parsing a resource quantity such as `500m` or `2Gi`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity cannot be empty")]
    Empty,

    #[error("invalid number in quantity '{0}'")]
    InvalidNumber(String),

    #[error("unknown unit suffix '{suffix}' in quantity '{input}'")]
    UnknownSuffix { input: String, suffix: String },

    #[error("quantity '{0}' is out of range")]
    Overflow(String),
}

/// Errors from parsing a 5-field cron expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), got {0}")]
    FieldCount(usize),

    #[error("{field}: empty list item")]
    EmptyItem { field: &'static str },

    #[error("{field}: invalid value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("{field}: value {value} outside {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field}: range start {start} is after end {end}")]
    InvertedRange {
        field: &'static str,
        start: u32,
        end: u32,
    },

    #[error("{field}: step must be at least 1")]
    ZeroStep { field: &'static str },
}
