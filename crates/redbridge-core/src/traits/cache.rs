//! Generic cache capability

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::Result;

/// Key/value cache over serializable values
///
/// Absence is `Ok(None)`. Encode and decode failures are errors, never
/// reported as absence.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get a value
    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Set a value with an optional expiry
    ///
    /// Setting `None` deletes the key.
    async fn set_with_expiry<T>(
        &self,
        key: &str,
        value: Option<&T>,
        expires_in: Option<Duration>,
    ) -> Result<()>
    where
        T: Serialize + Sync + ?Sized;

    /// Delete a key
    async fn delete(&self, key: &str) -> Result<()>;

    /// Set a value that never expires
    ///
    /// Setting `None` deletes the key.
    async fn set<T>(&self, key: &str, value: Option<&T>) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.set_with_expiry(key, value, None).await
    }
}
