//! # Fixed Constants
//!
//! Values compiled into the engine. Changing any of them changes observable
//! behavior (token format, export bytes, catalog parsing).

/// Validity window of a freshly issued session, in hours (7 days).
pub const SESSION_TTL_HOURS: i64 = 168;

/// Entropy of a session token, in bytes (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Entropy of an assessment correlation token, in bytes.
pub const CORRELATION_BYTES: usize = 16;

/// Advice catalog keys equal to this are comments.
pub const ADVICE_COMMENT_KEY: &str = "//";

/// Answer set given to a non-banner question authored without answers.
pub const DEFAULT_ANSWERS: [(&str, f64); 2] = [("Yes", 1.0), ("No", 0.0)];

/// Header row of the CSV export.
pub const CSV_HEADER: [&str; 7] = [
    "Section",
    "Sub Category",
    "Question",
    "Possible Answers",
    "Max Score",
    "Answer(s)",
    "Score",
];

/// Default per-call storage timeout used by the CLI, in milliseconds.
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5000;
