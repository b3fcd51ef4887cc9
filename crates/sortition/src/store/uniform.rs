use crate::Result;
use std::sync::Arc;

/// A provider of uniform integers in `[min, max)`.
///
/// The store asks this trait for the random offset used during selection, so
/// tests can make selection deterministic. In production the
/// [`IdAuthority`](crate::IdAuthority) serves it from its entropy pool.
pub trait UniformSource: Send + Sync {
    /// Returns an integer in `[min, max)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is empty or the randomness behind the
    /// provider is unavailable.
    fn uniform(&self, min: u32, max: u32) -> impl Future<Output = Result<u32>> + Send;
}

impl<T> UniformSource for Arc<T>
where
    T: UniformSource,
{
    fn uniform(&self, min: u32, max: u32) -> impl Future<Output = Result<u32>> + Send {
        (**self).uniform(min, max)
    }
}
