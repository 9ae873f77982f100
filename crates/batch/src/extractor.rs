use crate::error::Result;
use std::future::Future;

/// Turns one batch of work items into a result.
///
/// Must be safe to call again with the same batch, and must return an empty
/// result rather than an error when there is simply nothing to extract.
/// Errors are reserved for hard failures and should be raised as
/// [`ErrorKind::Extraction`](crate::error::ErrorKind::Extraction).
///
/// Any `Fn(Vec<T>) -> impl Future<Output = Result<R>>` closure is an
/// extractor:
///
/// ```
/// use harvest_batch::Extractor;
/// use harvest_batch::error::Result;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let double = |ids: Vec<u64>| async move { Result::Ok(ids.into_iter().map(|id| id * 2).collect::<Vec<_>>()) };
/// assert_eq!(double.extract(vec![1, 2]).await.unwrap(), vec![2, 4]);
/// # }
/// ```
///
/// Implementors can use `async fn extract(..)` as long as the returned
/// future is `Send`.
pub trait Extractor<T, R>: Send + Sync {
    fn extract(&self, batch: Vec<T>) -> impl Future<Output = Result<R>> + Send;
}

impl<T, R, F, Fut> Extractor<T, R> for F
where
    F: Fn(Vec<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R>> + Send,
{
    fn extract(&self, batch: Vec<T>) -> impl Future<Output = Result<R>> + Send {
        (self)(batch)
    }
}
