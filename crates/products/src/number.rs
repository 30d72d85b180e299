//! Product numbers.

use serde::{Deserialize, Serialize};

use kiosk_core::{DomainError, DomainResult, ValueObject};

const NUMBER_WIDTH: usize = 3;

/// Externally visible product identifier, e.g. `"001"`.
///
/// Registered products get zero-padded, monotonically increasing decimal
/// numbers. Lookups accept any string so that unknown numbers in a request can
/// simply fail to match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductNumber(String);

impl ValueObject for ProductNumber {}

impl ProductNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Number assigned to the very first registered product.
    pub fn first() -> Self {
        Self::from_sequence(1)
    }

    /// Number following `latest`, or [`ProductNumber::first`] for an empty catalog.
    pub fn next_after(latest: Option<&ProductNumber>) -> DomainResult<Self> {
        let Some(latest) = latest else {
            return Ok(Self::first());
        };
        let current: u64 = latest.0.parse().map_err(|_| {
            DomainError::invalid_id(format!("product number {:?} is not numeric", latest.0))
        })?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| DomainError::invariant("product number sequence exhausted"))?;
        Ok(Self::from_sequence(next))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    fn from_sequence(sequence: u64) -> Self {
        Self(format!("{sequence:0width$}", width = NUMBER_WIDTH))
    }
}

impl core::fmt::Display for ProductNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductNumber {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProductNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ProductNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
