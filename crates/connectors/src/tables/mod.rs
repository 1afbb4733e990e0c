//! Pipes tables
//!
//! Each table maps key-column quals to an API listing or a single-resource
//! lookup and emits JSON rows. A query execution resolves the caller once and
//! tags every row with the caller's `user_id`.
//!
//! # Example
//!
//! ```ignore
//! use pipes_connectors::{ExecutionContext, Flow, PipesConfig, Query, Table};
//!
//! let ctx = ExecutionContext::from_config(&PipesConfig::default())?;
//! let query = Query::new().with_qual("identity_handle", "acme").with_limit(10);
//! ctx.execute(Table::Connection, &query, |row| {
//!     println!("{}", serde_json::Value::Object(row));
//!     Flow::Continue
//! })
//! .await?;
//! ```

mod audit_log;
mod connection;
mod integration;
mod organization;
mod tenant;
mod tenant_member;
mod user;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::client::{PipesClient, segment};
use crate::config::PipesConfig;
use crate::error::ConnectorError;
use crate::identity::{IdentityCell, IdentityScope};
use crate::models::User;
use crate::paginate::{Flow, ListStats, RowBudget};
use crate::resilience::RetryPolicy;

/// One emitted row: column name to JSON value
pub type Row = serde_json::Map<String, Value>;

/// Column added to every row
pub const USER_ID_COLUMN: &str = "user_id";

/// Tables served by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    AuditLog,
    Connection,
    Organization,
    Tenant,
    TenantMember,
    User,
    UserIntegration,
    TenantIntegration,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::AuditLog,
        Table::Connection,
        Table::Organization,
        Table::Tenant,
        Table::TenantMember,
        Table::User,
        Table::UserIntegration,
        Table::TenantIntegration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::AuditLog => "pipes_audit_log",
            Table::Connection => "pipes_connection",
            Table::Organization => "pipes_organization",
            Table::Tenant => "pipes_tenant",
            Table::TenantMember => "pipes_tenant_member",
            Table::User => "pipes_user",
            Table::UserIntegration => "pipes_user_integration",
            Table::TenantIntegration => "pipes_tenant_integration",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Table::AuditLog => "Audit log entries of a user or organization.",
            Table::Connection => "Connections of the caller, a user or an organization.",
            Table::Organization => "Organizations the caller belongs to.",
            Table::Tenant => "Tenants visible to the caller.",
            Table::TenantMember => "Members of the caller's tenant.",
            Table::User => "The authenticated user.",
            Table::UserIntegration => "Integrations owned by the caller.",
            Table::TenantIntegration => "Integrations of the caller's tenant.",
        }
    }

    /// Optional quals that shape a listing
    pub fn list_quals(&self) -> &'static [&'static str] {
        match self {
            Table::AuditLog | Table::Connection => &["identity_handle", "identity_id"],
            _ => &[],
        }
    }

    /// Key columns that select a single row; all must be supplied
    pub fn get_keys(&self) -> &'static [&'static str] {
        match self {
            Table::Connection => &["handle", "identity_handle"],
            Table::Organization | Table::Tenant => &["handle"],
            Table::TenantMember => &["tenant_id", "user_handle"],
            Table::UserIntegration => &["id", "user_handle"],
            Table::TenantIntegration => &["id"],
            Table::AuditLog | Table::User => &[],
        }
    }

    /// Look a table up by name
    pub fn from_name(name: &str) -> Result<Self, ConnectorError> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ConnectorError::UnknownTable(name.to_string()))
    }

    /// Whether `query` selects a single row
    pub fn is_get(&self, query: &Query) -> bool {
        let keys = self.get_keys();
        !keys.is_empty() && keys.iter().all(|k| query.qual(k).is_some())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key-column quals and an optional row limit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub quals: BTreeMap<String, String>,
    pub limit: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_qual(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.quals.insert(column.into(), value.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Value of a qual, None when missing or empty
    pub fn qual(&self, column: &str) -> Option<&str> {
        self.quals
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn budget(&self) -> RowBudget {
        RowBudget::from_limit(self.limit)
    }
}

/// State shared by everything one query execution does
///
/// The caller identity is resolved at most once per context, no matter how
/// many tables or rows need it.
pub struct ExecutionContext {
    client: PipesClient,
    policy: RetryPolicy,
    caller: IdentityCell<User>,
}

impl ExecutionContext {
    pub fn new(client: PipesClient, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            caller: IdentityCell::new(),
        }
    }

    /// Build a context from config
    ///
    /// # Errors
    ///
    /// Returns error if the token, host or retry settings are invalid
    pub fn from_config(config: &PipesConfig) -> Result<Self, ConnectorError> {
        let client = PipesClient::from_config(config)?;
        let policy = config.retry_policy()?;
        Ok(Self::new(client, policy))
    }

    pub fn client(&self) -> &PipesClient {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The authenticated caller, fetched on first use
    pub async fn caller(&self) -> Result<Arc<User>, ConnectorError> {
        self.caller
            .get_or_fetch(|| self.client.fetch_caller(&self.policy))
            .await
    }

    /// Run one table query, handing rows to `emit` in API order.
    ///
    /// `emit` may return [`Flow::Stop`] to end the query early.
    pub async fn execute<F>(
        &self,
        table: Table,
        query: &Query,
        mut emit: F,
    ) -> Result<ListStats, ConnectorError>
    where
        F: FnMut(Row) -> Flow + Send,
    {
        let budget = query.budget();
        if budget.is_exhausted(0) {
            return Ok(ListStats {
                stopped_early: true,
                ..Default::default()
            });
        }

        let caller = self.caller().await?;
        let get = table.is_get(query);
        debug!(
            connector = "pipes",
            table = %table,
            mode = if get { "get" } else { "list" },
            limit = ?query.limit,
            "executing query"
        );

        let mut sink = RowSink::new(&mut emit, &caller.id, budget);
        let stats = match table {
            Table::AuditLog => audit_log::list(self, &caller, query, &mut sink).await,
            Table::Connection if get => connection::get(self, &caller, query, &mut sink).await,
            Table::Connection => connection::list(self, &caller, query, &mut sink).await,
            Table::Organization if get => organization::get(self, query, &mut sink).await,
            Table::Organization => organization::list(self, query, &mut sink).await,
            Table::Tenant if get => tenant::get(self, query, &mut sink).await,
            Table::Tenant => tenant::list(self, query, &mut sink).await,
            Table::TenantMember if get => tenant_member::get(self, query, &mut sink).await,
            Table::TenantMember => tenant_member::list(self, &caller, query, &mut sink).await,
            Table::User => user::list(&caller, &mut sink),
            Table::UserIntegration if get => integration::get_user(self, query, &mut sink).await,
            Table::UserIntegration => integration::list_user(self, &caller, query, &mut sink).await,
            Table::TenantIntegration if get => integration::get_tenant(self, query, &mut sink).await,
            Table::TenantIntegration => integration::list_tenant(self, query, &mut sink).await,
        }?;

        sink.finish(stats)
    }

    /// Fetch one resource with retry; None when it does not exist
    pub(crate) async fn fetch_optional<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
    ) -> Result<Option<T>, ConnectorError> {
        match self.client.get_with_retry(&self.policy, operation, path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                debug!(connector = "pipes", operation, path, "resource not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// API path of the account a scope points at
pub(crate) fn owner_path(scope: &IdentityScope, caller: &User) -> String {
    match scope {
        IdentityScope::Caller => format!("/user/{}", segment(&caller.handle)),
        IdentityScope::User(user) => format!("/user/{}", segment(user)),
        IdentityScope::Organization(org) => format!("/org/{}", segment(org)),
        IdentityScope::Tenant(tenant) => format!("/tenant/{}", segment(tenant)),
    }
}

/// Serialize a model into a row
pub(crate) fn to_row<T: Serialize>(item: &T) -> Result<Row, ConnectorError> {
    match serde_json::to_value(item)? {
        Value::Object(row) => Ok(row),
        other => Err(ConnectorError::InvalidRequest(format!(
            "expected an object row, got {}",
            other
        ))),
    }
}

/// Row consumer for one execution
///
/// Adds the `user_id` column, counts rows against the budget and keeps the
/// first row-building error so it can be returned once the listing stops.
pub(crate) struct RowSink<'a> {
    emit: &'a mut (dyn FnMut(Row) -> Flow + Send),
    user_id: &'a str,
    budget: RowBudget,
    rows: u64,
    stopped: bool,
    error: Option<ConnectorError>,
}

impl<'a> RowSink<'a> {
    pub(crate) fn new(
        emit: &'a mut (dyn FnMut(Row) -> Flow + Send),
        user_id: &'a str,
        budget: RowBudget,
    ) -> Self {
        Self {
            emit,
            user_id,
            budget,
            rows: 0,
            stopped: false,
            error: None,
        }
    }

    /// Emit a prepared row
    pub(crate) fn push_row(&mut self, mut row: Row) -> Flow {
        if self.stopped {
            return Flow::Stop;
        }
        row.insert(
            USER_ID_COLUMN.to_string(),
            Value::String(self.user_id.to_string()),
        );
        self.rows += 1;
        if (self.emit)(row) == Flow::Stop || self.budget.is_exhausted(self.rows) {
            self.stopped = true;
            return Flow::Stop;
        }
        Flow::Continue
    }

    /// Serialize and emit a model
    pub(crate) fn push<T: Serialize>(&mut self, item: &T) -> Flow {
        self.push_with(item, |_| {})
    }

    /// Serialize a model, let `extend` add columns, then emit it
    pub(crate) fn push_with<T: Serialize>(&mut self, item: &T, extend: impl FnOnce(&mut Row)) -> Flow {
        match to_row(item) {
            Ok(mut row) => {
                extend(&mut row);
                self.push_row(row)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Record an error and stop
    pub(crate) fn fail(&mut self, error: ConnectorError) -> Flow {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.stopped = true;
        Flow::Stop
    }

    /// Stats for rows emitted without paging
    pub(crate) fn stats(&self) -> ListStats {
        ListStats {
            pages: 0,
            rows: self.rows,
            stopped_early: self.stopped,
        }
    }

    /// Emit at most one row
    pub(crate) fn single<T: Serialize>(&mut self, item: Option<&T>) -> ListStats {
        if let Some(item) = item {
            self.push(item);
        }
        self.stats()
    }

    /// Final stats for an execution; `rows` counts only rows that reached `emit`
    fn finish(self, stats: ListStats) -> Result<ListStats, ConnectorError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(ListStats {
                rows: self.rows,
                ..stats
            }),
        }
    }
}
