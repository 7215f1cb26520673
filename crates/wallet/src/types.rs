//! Common types used across wallet operations.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{WalletError, WalletResult};

/// Maximum length of a wallet label in bytes.
pub const MAX_LABEL_LEN: usize = 128;

/// Key under which an [`Identity`](crate::Identity) is stored.
///
/// Labels double as file names in the durable store, so they are restricted
/// to ASCII alphanumerics plus `.`, `_`, `@` and `-`, must be non-empty, at
/// most [`MAX_LABEL_LEN`] bytes, and must not start with `.`.
///
/// # Examples
///
/// ```
/// use claimnet_wallet::Label;
///
/// let label = Label::new("hospital01").unwrap();
/// assert_eq!(label.as_str(), "hospital01");
///
/// assert!(Label::new("../etc/passwd").is_err());
/// assert!(Label::new("").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    /// Validates and wraps a label.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidLabel`] if the label is empty, longer
    /// than [`MAX_LABEL_LEN`], starts with `.`, or contains a character
    /// outside `[A-Za-z0-9._@-]`.
    pub fn new(label: impl Into<String>) -> WalletResult<Self> {
        let label = label.into();

        if label.is_empty() {
            return Err(WalletError::invalid_label(label, "must not be empty"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(WalletError::invalid_label(label, "exceeds 128 bytes"));
        }
        if label.starts_with('.') {
            return Err(WalletError::invalid_label(label, "must not start with '.'"));
        }
        if let Some(c) = label.chars().find(|c| !is_label_char(*c)) {
            let reason = if c == '/' || c == '\\' {
                "contains a path separator"
            } else {
                "contains a character outside [A-Za-z0-9._@-]"
            };
            return Err(WalletError::invalid_label(label, reason));
        }

        Ok(Self(label))
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-')
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Label {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Label {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Label {
    type Error = WalletError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}
