//! Caller identity resolution
//!
//! Decides which API sub-resource a listing targets (the caller's own
//! account, a user, an organization or the caller's tenant) and holds the
//! caller's identity for one query execution.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::ConnectorError;

/// Prefix of user ids
pub const USER_ID_PREFIX: &str = "u_";

/// Prefix of organization ids
pub const ORG_ID_PREFIX: &str = "o_";

/// Which endpoint family a listing should call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityScope {
    /// The authenticated caller's own account
    Caller,
    /// A user, by id or handle
    User(String),
    /// An organization, by id or handle
    Organization(String),
    /// The caller's tenant
    Tenant(String),
}

impl IdentityScope {
    /// Classify an identity filter against the caller's handle.
    ///
    /// Empty strings count as absent. Prefix checks are case-sensitive.
    pub fn classify(
        identity_id: Option<&str>,
        identity_handle: Option<&str>,
        caller_handle: &str,
    ) -> Self {
        let id = identity_id.filter(|s| !s.is_empty());
        let handle = identity_handle.filter(|s| !s.is_empty());

        match (id, handle) {
            (None, None) => IdentityScope::Caller,
            (Some(id), _) if id.starts_with(USER_ID_PREFIX) => IdentityScope::User(id.to_string()),
            (Some(id), _) if id.starts_with(ORG_ID_PREFIX) => {
                IdentityScope::Organization(id.to_string())
            }
            (Some(id), _) if id == caller_handle => IdentityScope::Caller,
            (_, Some(handle)) if handle == caller_handle => IdentityScope::Caller,
            (_, Some(handle)) => IdentityScope::Organization(handle.to_string()),
            (Some(id), None) => IdentityScope::Organization(id.to_string()),
        }
    }

    /// Tenant scope of the caller, None when the caller belongs to no tenant
    pub fn tenant_of(caller_tenant_id: Option<&str>) -> Option<Self> {
        caller_tenant_id
            .filter(|s| !s.is_empty())
            .map(|tenant| IdentityScope::Tenant(tenant.to_string()))
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityScope::Caller => "caller",
            IdentityScope::User(_) => "user",
            IdentityScope::Organization(_) => "org",
            IdentityScope::Tenant(_) => "tenant",
        }
    }
}

/// Single-flight slot for a value fetched at most once.
///
/// Concurrent first callers share one fetch. Success and failure are both
/// kept, so every caller sees the same value or the same error.
#[derive(Debug)]
pub struct IdentityCell<T> {
    slot: OnceCell<Result<Arc<T>, Arc<ConnectorError>>>,
}

impl<T> Default for IdentityCell<T> {
    fn default() -> Self {
        Self {
            slot: OnceCell::new(),
        }
    }
}

impl<T> IdentityCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value, running `fetch` only if nothing is cached yet
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<T>, ConnectorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>>,
    {
        let outcome = self
            .slot
            .get_or_init(|| async {
                debug!("resolving caller identity");
                fetch().await.map(Arc::new).map_err(Arc::new)
            })
            .await;

        match outcome {
            Ok(value) => Ok(Arc::clone(value)),
            Err(e) => Err(ConnectorError::Identity(Arc::clone(e))),
        }
    }

    /// Cached value without fetching
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.get().and_then(|r| r.as_ref().ok().cloned())
    }

    /// Whether a fetch has completed (successfully or not)
    pub fn is_resolved(&self) -> bool {
        self.slot.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Eq)]
    struct Caller {
        id: String,
        handle: String,
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn test_user_prefix() {
        assert_eq!(
            IdentityScope::classify(Some("u_123"), None, "alice"),
            IdentityScope::User("u_123".into())
        );
    }

    #[test]
    fn test_org_prefix() {
        assert_eq!(
            IdentityScope::classify(Some("o_456"), None, "alice"),
            IdentityScope::Organization("o_456".into())
        );
    }

    #[test]
    fn test_own_handle_is_caller() {
        assert_eq!(
            IdentityScope::classify(None, Some("alice"), "alice"),
            IdentityScope::Caller
        );
    }

    #[test]
    fn test_other_handle_is_org() {
        assert_eq!(
            IdentityScope::classify(None, Some("acme"), "alice"),
            IdentityScope::Organization("acme".into())
        );
    }

    #[test]
    fn test_no_filter_is_caller() {
        assert_eq!(IdentityScope::classify(None, None, "alice"), IdentityScope::Caller);
        assert_eq!(
            IdentityScope::classify(Some(""), Some(""), "alice"),
            IdentityScope::Caller
        );
    }

    #[test]
    fn test_id_prefix_wins_over_handle() {
        assert_eq!(
            IdentityScope::classify(Some("o_456"), Some("alice"), "alice"),
            IdentityScope::Organization("o_456".into())
        );
        assert_eq!(
            IdentityScope::classify(Some("u_1"), Some("acme"), "alice"),
            IdentityScope::User("u_1".into())
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        assert_eq!(
            IdentityScope::classify(Some("U_123"), None, "alice"),
            IdentityScope::Organization("U_123".into())
        );
    }

    #[test]
    fn test_unprefixed_id_matching_caller_handle() {
        assert_eq!(
            IdentityScope::classify(Some("alice"), None, "alice"),
            IdentityScope::Caller
        );
    }

    #[test]
    fn test_unprefixed_id_falls_back_to_handle_then_org() {
        assert_eq!(
            IdentityScope::classify(Some("x_9"), Some("alice"), "alice"),
            IdentityScope::Caller
        );
        assert_eq!(
            IdentityScope::classify(Some("x_9"), None, "alice"),
            IdentityScope::Organization("x_9".into())
        );
    }

    #[test]
    fn test_tenant_scope() {
        assert_eq!(
            IdentityScope::tenant_of(Some("t_1")),
            Some(IdentityScope::Tenant("t_1".into()))
        );
        assert_eq!(IdentityScope::tenant_of(Some("")), None);
        assert_eq!(IdentityScope::tenant_of(None), None);
    }

    // =========================================================================
    // Single-flight cell
    // =========================================================================

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let cell = Arc::new(IdentityCell::<Caller>::new());
        let fetches = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cell = Arc::clone(&cell);
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                cell.get_or_fetch(|| async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(Caller {
                        id: "u_1".into(),
                        handle: "alice".into(),
                    })
                })
                .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        for value in &results {
            assert!(Arc::ptr_eq(value, &results[0]));
            assert_eq!(value.handle, "alice");
        }
    }

    #[tokio::test]
    async fn test_later_calls_reuse_value() {
        let cell = IdentityCell::new();
        let fetches = &AtomicU32::new(0);

        for _ in 0..3 {
            let caller = cell
                .get_or_fetch(move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(Caller {
                        id: "u_1".into(),
                        handle: "alice".into(),
                    })
                })
                .await
                .unwrap();
            assert_eq!(caller.id, "u_1");
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(cell.is_resolved());
        assert!(cell.get().is_some());
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_not_refetched() {
        let cell: IdentityCell<Caller> = IdentityCell::new();
        let fetches = &AtomicU32::new(0);

        for _ in 0..2 {
            let err = cell
                .get_or_fetch(move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Err(ConnectorError::AuthFailed("expired token".into()))
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ConnectorError::Identity(_)));
            assert!(matches!(err.root_cause(), ConnectorError::AuthFailed(_)));
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(cell.is_resolved());
        assert!(cell.get().is_none());
    }

    #[test]
    fn test_new_cell_is_empty() {
        let cell: IdentityCell<Caller> = IdentityCell::new();
        assert!(!cell.is_resolved());
        assert!(cell.get().is_none());
    }
}
