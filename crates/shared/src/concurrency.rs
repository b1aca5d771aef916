//! Opaque optimistic-concurrency tokens.
//!
//! The persistence layer keeps a monotonically increasing row version. Callers
//! only ever see it as an opaque string, which they must echo back on update.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    /// Encodes a row version.
    pub fn from_version(version: i64) -> Self {
        Self(URL_SAFE_NO_PAD.encode(version.to_be_bytes()))
    }

    /// Decodes the row version, or `None` when the token was not issued by
    /// [`ConcurrencyToken::from_version`].
    pub fn version(&self) -> Option<i64> {
        let bytes = URL_SAFE_NO_PAD.decode(self.0.as_bytes()).ok()?;
        let bytes: [u8; 8] = bytes.try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }

    /// The token that follows this one after a successful write.
    pub fn next(&self) -> Option<Self> {
        self.version().map(|v| Self::from_version(v + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConcurrencyToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
