//! Instrument code type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Exchange instrument code, e.g. `"rb2410"` or `"IF2409"`.
///
/// Wraps a `String` with validation so that codes are safe to embed in
/// order ids and persistence keys.
///
/// # Examples
///
/// ```
/// use sirocco_core::types::Code;
///
/// let code = Code::new("rb2410").unwrap();
/// assert_eq!(code.as_str(), "rb2410");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    /// Creates a new `Code` from a string.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyCode` if the string is empty and
    /// `ValidationError::InvalidCode` if it contains characters other than
    /// ASCII alphanumerics, `.`, `-` or `_`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        match s.chars().next() {
            None => Err(ValidationError::EmptyCode),
            Some(_) if s.chars().any(|c| !is_code_char(c)) => {
                Err(ValidationError::InvalidCode(s))
            }
            Some(_) => Ok(Self(s)),
        }
    }

    /// Creates a new `Code` without validation.
    #[must_use]
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Characters an instrument code may contain.
fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Code {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Code {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
