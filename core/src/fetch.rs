use crate::entity::PageInfo;
use crate::error::FetchError;
use std::future::Future;

/// Retrieves a page and extracts its title and text. Implementations apply their own timeout
/// and report it as [`FetchError::Timeout`].
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<PageInfo, FetchError>> + Send;
}
