//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for trailtrader.
#[derive(Debug, thiserror::Error)]
pub enum TrailtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error("bars for {symbol} are not strictly increasing at index {index} ({timestamp})")]
    NonMonotonicBars {
        symbol: String,
        index: usize,
        timestamp: NaiveDateTime,
    },

    #[error("insufficient history for {symbol}: first evaluated bar at index {bars}, need {minimum}")]
    InsufficientHistory {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("insufficient lookback: {reason}")]
    InsufficientLookback { reason: String },

    #[error("ledger violation: {reason}")]
    LedgerViolation { reason: String },

    #[error("no data for {symbol}")]
    DataUnavailable { symbol: String },

    #[error("data read error: {reason}")]
    DataRead { reason: String },

    #[error("execution venue error: {reason}")]
    Venue { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrailtraderError {
    /// True for errors raised before replay starts because inputs are unusable.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TrailtraderError::ConfigParse { .. }
                | TrailtraderError::ConfigMissing { .. }
                | TrailtraderError::ConfigInvalid { .. }
                | TrailtraderError::RuleInvalid { .. }
                | TrailtraderError::NonMonotonicBars { .. }
                | TrailtraderError::InsufficientHistory { .. }
        )
    }
}

impl From<&TrailtraderError> for std::process::ExitCode {
    fn from(err: &TrailtraderError) -> Self {
        let code: u8 = match err {
            TrailtraderError::Io(_) => 1,
            TrailtraderError::ConfigParse { .. }
            | TrailtraderError::ConfigMissing { .. }
            | TrailtraderError::ConfigInvalid { .. } => 2,
            TrailtraderError::DataRead { .. } => 3,
            TrailtraderError::RuleInvalid { .. } => 4,
            TrailtraderError::DataUnavailable { .. }
            | TrailtraderError::NonMonotonicBars { .. }
            | TrailtraderError::InsufficientHistory { .. } => 5,
            TrailtraderError::InsufficientLookback { .. }
            | TrailtraderError::LedgerViolation { .. }
            | TrailtraderError::Venue { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = TrailtraderError::ConfigInvalid {
            section: "rule".into(),
            key: "quorum".into(),
            reason: "quorum must be positive".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value [rule] quorum: quorum must be positive"
        );
    }

    #[test]
    fn configuration_family() {
        let err = TrailtraderError::InsufficientHistory {
            symbol: "TSLL".into(),
            bars: 3,
            minimum: 25,
        };
        assert!(err.is_configuration());

        let err = TrailtraderError::LedgerViolation {
            reason: "oversell".into(),
        };
        assert!(!err.is_configuration());

        let err = TrailtraderError::DataUnavailable {
            symbol: "TSLL".into(),
        };
        assert!(!err.is_configuration());
    }
}
