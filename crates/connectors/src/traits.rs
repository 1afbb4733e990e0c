//! Page source trait definition

use crate::error::ConnectorError;
use crate::paginate::{Page, PageRequest};

/// A remote listing that can be fetched one page at a time
///
/// Implementations perform a single attempt per call; retry and page-token
/// threading are handled by the paginator driving them.
pub trait PageSource: Send + Sync {
    /// Item type produced by the listing
    type Item: Send;

    /// Operation name used in logs and errors (e.g., "list_org_connections")
    fn name(&self) -> &str;

    /// Fetch one page
    ///
    /// # Arguments
    /// * `request` - Page size hint and the token returned by the previous page
    fn fetch_page(
        &self,
        request: PageRequest,
    ) -> impl std::future::Future<Output = Result<Page<Self::Item>, ConnectorError>> + Send;
}
