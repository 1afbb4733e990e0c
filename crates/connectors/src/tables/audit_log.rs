//! pipes_audit_log

use tracing::debug;

use super::{ExecutionContext, Query, RowSink, owner_path};
use crate::error::ConnectorError;
use crate::identity::IdentityScope;
use crate::models::{AuditLog, User};
use crate::paginate::{ListStats, stream_pages};

/// List the audit log of the identity named by `identity_id` or `identity_handle`.
///
/// Without either qual there is no log to read and no rows are produced.
pub(super) async fn list(
    ctx: &ExecutionContext,
    caller: &User,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let identity_id = query.qual("identity_id");
    let identity_handle = query.qual("identity_handle");
    if identity_id.is_none() && identity_handle.is_none() {
        debug!(
            connector = "pipes",
            table = "pipes_audit_log",
            "no identity_handle or identity_id qual, skipping"
        );
        return Ok(ListStats::default());
    }

    let scope = IdentityScope::classify(identity_id, identity_handle, &caller.handle);
    let listing = ctx.client().listing::<AuditLog>(
        format!("list_{}_audit_logs", owner_kind(&scope)),
        format!("{}/audit_log", owner_path(&scope, caller)),
    );

    stream_pages(&listing, ctx.policy(), query.budget(), |entry| sink.push(&entry)).await
}

// The caller's own log lives under their user handle
fn owner_kind(scope: &IdentityScope) -> &'static str {
    match scope {
        IdentityScope::Caller => "user",
        other => other.kind(),
    }
}
