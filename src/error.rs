//! Application error type.
//!
//! Every fallible operation in the crate returns `Result<_, AppError>`. The
//! exit code doubles as a coarse error category so the binary can map it
//! straight to a process status:
//!
//! - `2`: invalid input or configuration (flags, files, CSV syntax)
//! - `3`: dataset problems (missing/constant columns, too few rows)
//! - `4`: numerical failures (sampler initialization, singular projections)
//!
//! Sampler and cross-validation *diagnostics* are not errors; they are carried
//! in report structures and surfaced as warnings.

/// Exit code for invalid input or configuration.
pub const EXIT_INPUT: u8 = 2;
/// Exit code for unusable datasets.
pub const EXIT_DATA: u8 = 3;
/// Exit code for numerical failures.
pub const EXIT_NUMERIC: u8 = 4;

#[derive(Clone, PartialEq, Eq)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(EXIT_DATA, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(EXIT_NUMERIC, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_category_codes() {
        assert_eq!(AppError::input("x").exit_code(), EXIT_INPUT);
        assert_eq!(AppError::data("x").exit_code(), EXIT_DATA);
        assert_eq!(AppError::numeric("x").exit_code(), EXIT_NUMERIC);
        assert_eq!(AppError::numeric("boom").to_string(), "boom");
    }
}
