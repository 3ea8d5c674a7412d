//! Swasthya Shared Utilities
//!
//! This crate provides common functionality for the Swasthya consent core:
//! - Principals, roles, access types and record actions
//! - Error taxonomy returned to the REST layer
//! - Field validation with accumulated errors
//! - Injectable wall clock
//! - Runtime configuration

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// Re-export commonly used items
pub use clock::*;
pub use config::*;
pub use errors::*;
pub use types::*;
pub use validation::*;

/// Identity and permission types shared by every crate
pub mod types {
    use super::*;

    /// Role of an authenticated user
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "snake_case")]
    pub enum Role {
        Patient,
        Doctor,
        Hospital,
        Insurer,
        Admin,
    }

    impl std::fmt::Display for Role {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Role::Patient => write!(f, "patient"),
                Role::Doctor => write!(f, "doctor"),
                Role::Hospital => write!(f, "hospital"),
                Role::Insurer => write!(f, "insurer"),
                Role::Admin => write!(f, "admin"),
            }
        }
    }

    /// The authenticated caller of an operation
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Principal {
        pub id: String,
        pub role: Role,
    }

    impl Principal {
        pub fn new(id: impl Into<String>, role: Role) -> Self {
            Self { id: id.into(), role }
        }

        pub fn patient(id: impl Into<String>) -> Self {
            Self::new(id, Role::Patient)
        }

        pub fn doctor(id: impl Into<String>) -> Self {
            Self::new(id, Role::Doctor)
        }

        pub fn admin(id: impl Into<String>) -> Self {
            Self::new(id, Role::Admin)
        }
    }

    /// Breadth of access a consent grant confers
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "snake_case")]
    pub enum AccessType {
        Read,
        Write,
        Full,
    }

    impl AccessType {
        /// Whether this access type covers the given action.
        ///
        /// `Read` covers every action that only discloses data, `Write`
        /// covers actions that add to or amend the record, `Full` covers all.
        pub fn permits(&self, action: Action) -> bool {
            match self {
                AccessType::Full => true,
                AccessType::Read => !action.is_write(),
                AccessType::Write => action.is_write(),
            }
        }
    }

    impl std::fmt::Display for AccessType {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                AccessType::Read => write!(f, "read"),
                AccessType::Write => write!(f, "write"),
                AccessType::Full => write!(f, "full"),
            }
        }
    }

    /// Operation a principal performs on a patient's records
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "snake_case")]
    pub enum Action {
        View,
        Download,
        Summarize,
        Predict,
        Upload,
        Amend,
    }

    impl Action {
        pub fn is_write(&self) -> bool {
            matches!(self, Action::Upload | Action::Amend)
        }

        pub fn as_str(&self) -> &'static str {
            match self {
                Action::View => "view",
                Action::Download => "download",
                Action::Summarize => "summarize",
                Action::Predict => "predict",
                Action::Upload => "upload",
                Action::Amend => "amend",
            }
        }
    }

    impl std::fmt::Display for Action {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// Generate a fresh opaque identifier
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Error taxonomy for recoverable business failures
pub mod errors {
    use super::*;

    /// Standard error types for consistent error handling.
    ///
    /// None of these are fatal to the process. The REST layer maps them to
    /// status codes with [`HealthError::http_status`].
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
    pub enum HealthError {
        #[error("Not found: {0}")]
        NotFound(String),
        #[error("Forbidden: {0}")]
        Forbidden(String),
        #[error("Invalid state: {0}")]
        InvalidState(String),
        #[error("Validation error: {0}")]
        Validation(String),
    }

    impl HealthError {
        pub fn http_status(&self) -> u16 {
            match self {
                HealthError::NotFound(_) => 404,
                HealthError::Forbidden(_) => 403,
                HealthError::InvalidState(_) | HealthError::Validation(_) => 400,
            }
        }
    }

    pub type HealthResult<T> = Result<T, HealthError>;
}

/// Input validation with accumulated, field-level errors
pub mod validation {
    use super::*;

    /// Longest identifier accepted from callers
    pub const MAX_IDENTIFIER_LEN: usize = 128;

    /// Validation error with detailed context
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ValidationError {
        pub field: String,
        pub message: String,
        pub code: ValidationErrorCode,
    }

    /// Specific validation error codes for programmatic handling
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum ValidationErrorCode {
        Required,
        InvalidFormat,
        OutOfRange,
        TooLong,
        InvalidCharacters,
    }

    impl std::fmt::Display for ValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}: {} ({:?})", self.field, self.message, self.code)
        }
    }

    /// Validation result that can accumulate multiple errors
    #[derive(Clone, Debug, Default)]
    pub struct ValidationResult {
        pub errors: Vec<ValidationError>,
    }

    impl ValidationResult {
        pub fn new() -> Self {
            Self { errors: Vec::new() }
        }

        pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
            self.errors.push(ValidationError {
                field: field.to_string(),
                message: message.to_string(),
                code,
            });
        }

        pub fn is_valid(&self) -> bool {
            self.errors.is_empty()
        }

        pub fn has_code(&self, code: ValidationErrorCode) -> bool {
            self.errors.iter().any(|e| e.code == code)
        }

        pub fn merge(&mut self, other: ValidationResult) {
            self.errors.extend(other.errors);
        }

        pub fn into_result(self) -> HealthResult<()> {
            if self.is_valid() {
                Ok(())
            } else {
                let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
                Err(HealthError::Validation(messages.join("; ")))
            }
        }
    }

    /// Validate an opaque identifier (user, grant or record id).
    ///
    /// Identifiers must be non-empty, at most [`MAX_IDENTIFIER_LEN`] bytes and
    /// free of whitespace and control characters.
    pub fn validate_identifier(value: &str, field: &str) -> ValidationResult {
        let mut result = ValidationResult::new();

        if value.trim().is_empty() {
            result.add_error(field, "Identifier is required", ValidationErrorCode::Required);
            return result;
        }
        if value.len() > MAX_IDENTIFIER_LEN {
            result.add_error(
                field,
                &format!("Identifier exceeds {} bytes", MAX_IDENTIFIER_LEN),
                ValidationErrorCode::TooLong,
            );
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            result.add_error(
                field,
                "Identifier contains whitespace or control characters",
                ValidationErrorCode::InvalidCharacters,
            );
        }

        result
    }

    /// Validate an email address used to look up a patient
    pub fn validate_email(email: &str, field: &str) -> ValidationResult {
        let mut result = ValidationResult::new();

        let trimmed = email.trim();
        if trimmed.is_empty() {
            result.add_error(field, "Email is required", ValidationErrorCode::Required);
            return result;
        }

        let mut parts = trimmed.split('@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        if local.is_empty() || domain.is_empty() || parts.next().is_some() {
            result.add_error(field, "Email must be of the form local@domain", ValidationErrorCode::InvalidFormat);
        }

        result
    }

    /// Validate that a grant duration lies within `[min, max]` hours
    pub fn validate_duration_hours(hours: u32, min: u32, max: u32, field: &str) -> ValidationResult {
        let mut result = ValidationResult::new();
        if hours < min || hours > max {
            result.add_error(
                field,
                &format!("Duration must be between {} and {} hours, got {}", min, max, hours),
                ValidationErrorCode::OutOfRange,
            );
        }
        result
    }
}

/// Wall clock abstraction so expiry can be tested deterministically
pub mod clock {
    use super::*;
    use std::sync::{Mutex, PoisonError};

    /// Source of the current time
    pub trait Clock: Send + Sync {
        fn now(&self) -> DateTime<Utc>;
    }

    /// Clock backed by the system time
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Clock that only moves when told to
    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self { now: Mutex::new(start) }
        }

        pub fn set(&self, instant: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

/// Runtime configuration
pub mod config {
    use super::*;

    /// Shortest grant a doctor may request
    pub const MIN_CONSENT_DURATION_HOURS: u32 = 1;
    /// Longest grant a doctor may request (30 days)
    pub const MAX_CONSENT_DURATION_HOURS: u32 = 720;

    const ENV_PREFIX: &str = "SWASTHYA_";

    #[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
    pub enum ConfigError {
        #[error("Failed to parse configuration: {0}")]
        Parse(String),
        #[error("Invalid configuration value for {field}: {message}")]
        Invalid { field: String, message: String },
    }

    /// Ledger tuning
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(default)]
    pub struct LedgerConfig {
        /// Proof recorded on the genesis block
        pub genesis_proof: u64,
        /// Proof used when a block is sealed automatically
        pub default_proof: u64,
        /// Seal a block once this many transactions are pending
        pub auto_seal_after: Option<usize>,
    }

    impl Default for LedgerConfig {
        fn default() -> Self {
            Self {
                genesis_proof: 1,
                default_proof: 1,
                auto_seal_after: None,
            }
        }
    }

    /// Consent grant bounds
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(default)]
    pub struct ConsentConfig {
        pub min_duration_hours: u32,
        pub max_duration_hours: u32,
    }

    impl Default for ConsentConfig {
        fn default() -> Self {
            Self {
                min_duration_hours: MIN_CONSENT_DURATION_HOURS,
                max_duration_hours: MAX_CONSENT_DURATION_HOURS,
            }
        }
    }

    /// Top-level configuration assembled at process bootstrap
    #[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(default)]
    pub struct SwasthyaConfig {
        pub ledger: LedgerConfig,
        pub consent: ConsentConfig,
    }

    impl SwasthyaConfig {
        /// Parse and validate a JSON document; missing fields take defaults
        pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
            let config: SwasthyaConfig =
                serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.validate()?;
            Ok(config)
        }

        /// Build from `SWASTHYA_*` environment variables over the defaults
        pub fn from_env() -> Result<Self, ConfigError> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Build from an arbitrary key lookup over the defaults.
        ///
        /// Recognised keys: `SWASTHYA_GENESIS_PROOF`, `SWASTHYA_DEFAULT_PROOF`,
        /// `SWASTHYA_AUTO_SEAL_AFTER`, `SWASTHYA_MIN_DURATION_HOURS`,
        /// `SWASTHYA_MAX_DURATION_HOURS`.
        pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where
            F: Fn(&str) -> Option<String>,
        {
            let mut config = SwasthyaConfig::default();

            if let Some(v) = parse_var(&lookup, "GENESIS_PROOF")? {
                config.ledger.genesis_proof = v;
            }
            if let Some(v) = parse_var(&lookup, "DEFAULT_PROOF")? {
                config.ledger.default_proof = v;
            }
            if let Some(v) = parse_var(&lookup, "AUTO_SEAL_AFTER")? {
                config.ledger.auto_seal_after = Some(v);
            }
            if let Some(v) = parse_var(&lookup, "MIN_DURATION_HOURS")? {
                config.consent.min_duration_hours = v;
            }
            if let Some(v) = parse_var(&lookup, "MAX_DURATION_HOURS")? {
                config.consent.max_duration_hours = v;
            }

            config.validate()?;
            Ok(config)
        }

        pub fn validate(&self) -> Result<(), ConfigError> {
            let consent = &self.consent;
            if consent.min_duration_hours == 0 {
                return Err(invalid("consent.min_duration_hours", "must be at least 1"));
            }
            if consent.max_duration_hours > MAX_CONSENT_DURATION_HOURS {
                return Err(invalid(
                    "consent.max_duration_hours",
                    &format!("must not exceed {}", MAX_CONSENT_DURATION_HOURS),
                ));
            }
            if consent.min_duration_hours > consent.max_duration_hours {
                return Err(invalid(
                    "consent.min_duration_hours",
                    "must not exceed consent.max_duration_hours",
                ));
            }
            if self.ledger.auto_seal_after == Some(0) {
                return Err(invalid("ledger.auto_seal_after", "must be at least 1 when set"));
            }
            Ok(())
        }
    }

    fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let key = format!("{}{}", ENV_PREFIX, name);
        match lookup(&key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| invalid(&key, &e.to_string())),
        }
    }

    fn invalid(field: &str, message: &str) -> ConfigError {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}
