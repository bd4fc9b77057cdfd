//! Success/failure value carrier for expected business outcomes.
//!
//! [`Outcome`] is the single channel for anticipated failures (validation,
//! business rules). Unexpected faults travel separately as Rust errors; an
//! `Outcome::Error` is never a fault by itself.

use serde::{Deserialize, Serialize};

/// Text returned by [`Outcome::error_message`] for a failure that carries no message.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Result of handling a request: a value on success, an optional message on failure.
///
/// The untyped form is `Outcome<()>`. A bare value converts into
/// `Outcome::Success` through `From`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome<T = ()> {
    Success(T),
    Error(Option<String>),
}

/// Errors from reading an [`Outcome`] in the wrong state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutcomeError {
    #[error("cannot access the value of an unsuccessful outcome: {message}")]
    NotSuccessful { message: String },
}

impl Outcome<()> {
    /// Successful outcome with no payload.
    #[must_use]
    pub fn ok() -> Self {
        Outcome::Success(())
    }
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn success(value: T) -> Self {
        Outcome::Success(value)
    }

    /// Failed outcome carrying `message`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error(Some(message.into()))
    }

    /// Failed outcome without a message. [`Outcome::error_message`] reports
    /// [`UNKNOWN_ERROR_MESSAGE`] for it.
    #[must_use]
    pub fn failed() -> Self {
        Outcome::Error(None)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Failure message; empty when successful.
    #[must_use]
    pub fn error_message(&self) -> &str {
        match self {
            Outcome::Success(_) => "",
            Outcome::Error(Some(message)) => message,
            Outcome::Error(None) => UNKNOWN_ERROR_MESSAGE,
        }
    }

    /// Borrow the success value.
    ///
    /// # Errors
    ///
    /// Returns [`OutcomeError::NotSuccessful`] when the outcome is a failure.
    pub fn value(&self) -> Result<&T, OutcomeError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Error(_) => Err(self.not_successful()),
        }
    }

    /// Take the success value.
    ///
    /// # Errors
    ///
    /// Returns [`OutcomeError::NotSuccessful`] when the outcome is a failure.
    pub fn into_value(self) -> Result<T, OutcomeError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Error(_) => Err(self.not_successful()),
        }
    }

    /// Transform the success value, keeping a failure untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Error(message) => Outcome::Error(message),
        }
    }

    /// Re-type a failure. Returns the success value back as `Err` so callers
    /// can decide what to do with it.
    ///
    /// # Errors
    ///
    /// Returns the success value when the outcome is not a failure.
    pub fn into_failure<U>(self) -> Result<Outcome<U>, T> {
        match self {
            Outcome::Success(value) => Err(value),
            Outcome::Error(message) => Ok(Outcome::Error(message)),
        }
    }

    fn not_successful(&self) -> OutcomeError {
        OutcomeError::NotSuccessful {
            message: self.error_message().to_string(),
        }
    }
}

impl<T> From<T> for Outcome<T> {
    fn from(value: T) -> Self {
        Outcome::Success(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn untyped_success_has_empty_message() {
        let outcome = Outcome::ok();
        assert!(outcome.is_success());
        assert_eq!(outcome.error_message(), "");
    }

    #[test]
    fn error_keeps_its_message() {
        let outcome: Outcome<u32> = Outcome::error("Age cannot be negative");
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_message(), "Age cannot be negative");
    }

    #[test]
    fn failure_without_message_reports_fallback() {
        let outcome: Outcome = Outcome::failed();
        assert_eq!(outcome.error_message(), UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn value_of_error_is_invalid_state() {
        let outcome: Outcome<String> = Outcome::error("boom");
        let err = outcome.value().unwrap_err();
        assert_eq!(
            err,
            OutcomeError::NotSuccessful {
                message: "boom".to_string()
            }
        );
        assert!(outcome.into_value().is_err());
    }

    #[test]
    fn bare_value_converts_to_success() {
        let outcome: Outcome<&str> = "john.doe@test.com".into();
        assert_eq!(outcome, Outcome::success("john.doe@test.com"));
    }

    #[test]
    fn map_leaves_failures_alone() {
        let failed: Outcome<u8> = Outcome::error("nope");
        assert_eq!(failed.map(u32::from), Outcome::error("nope"));
        assert_eq!(Outcome::success(2u8).map(|v| v * 2), Outcome::success(4));
    }

    #[test]
    fn into_failure_retypes_error_and_returns_value() {
        let failed: Outcome<u8> = Outcome::error("stop");
        assert_eq!(failed.into_failure::<String>(), Ok(Outcome::error("stop")));
        assert_eq!(Outcome::success(7u8).into_failure::<String>(), Err(7));
    }

    #[test]
    fn serializes_as_tagged_json() {
        let json = serde_json::to_string(&Outcome::success(42)).unwrap();
        assert_eq!(json, r#"{"success":42}"#);
        let json = serde_json::to_string(&Outcome::<i32>::error("db down")).unwrap();
        assert_eq!(json, r#"{"error":"db down"}"#);
    }

    proptest! {
        #[test]
        fn success_value_round_trips(value in any::<i64>(), text in ".*") {
            prop_assert_eq!(Outcome::success(value).into_value(), Ok(value));
            let outcome = Outcome::success(text.clone());
            prop_assert_eq!(outcome.value(), Ok(&text));
            prop_assert_eq!(outcome.error_message(), "");
        }

        #[test]
        fn error_value_always_fails(message in ".*") {
            let outcome: Outcome<i64> = Outcome::error(message.clone());
            prop_assert!(outcome.value().is_err());
            prop_assert_eq!(outcome.error_message(), message.as_str());
        }
    }
}
