//! Pipes - Connectors
//!
//! Table listings over the Pipes API: every listing is paginated, every page
//! fetch is retried under an exponential backoff policy, and every row is
//! streamed to the consumer as soon as its page arrives.
//!
//! # Building Blocks
//!
//! - **Pagination** - [`stream_pages`] and [`Paginator`] drive any [`PageSource`]
//! - **Retry** - [`RetryPolicy`] and [`resilience::execute_with_retry`]
//! - **Identity** - [`IdentityScope`] picks the endpoint family,
//!   [`IdentityCell`] resolves the caller once per execution
//! - **Tables** - [`Table`] and [`ExecutionContext::execute`]
//!
//! # Example
//!
//! ```ignore
//! use pipes_connectors::{ExecutionContext, Flow, PipesConfig, Query, Table};
//!
//! let ctx = ExecutionContext::from_config(&PipesConfig::default())?;
//! let stats = ctx
//!     .execute(Table::Tenant, &Query::new().with_limit(5), |row| {
//!         println!("{}", serde_json::Value::Object(row));
//!         Flow::Continue
//!     })
//!     .await?;
//! ```

mod client;
pub mod config;
mod error;
pub mod identity;
pub mod models;
mod paginate;
pub mod resilience;
mod tables;
mod traits;


// Re-exports
pub use client::{ApiListing, PipesClient};
pub use config::{PipesConfig, RetrySettings};
pub use error::ConnectorError;
pub use identity::{IdentityCell, IdentityScope};
pub use paginate::{
    API_MAX_PAGE_SIZE, Flow, ListStats, Page, PageCursor, PageRequest, Paginator, RowBudget,
    stream_pages,
};
pub use resilience::{RetryError, RetryPolicy, Retryable};
pub use tables::{ExecutionContext, Query, Row, Table, USER_ID_COLUMN};
pub use traits::PageSource;

/// Names of all available tables
pub fn available_tables() -> Vec<&'static str> {
    Table::ALL.iter().map(Table::name).collect()
}
