//! pipes_tenant_member

use serde_json::Value;
use tracing::debug;

use super::{ExecutionContext, Query, Row, RowSink};
use crate::client::segment;
use crate::error::ConnectorError;
use crate::identity::IdentityScope;
use crate::models::{TenantUser, User};
use crate::paginate::{ListStats, stream_pages};

/// Members of the caller's tenant; nothing when the caller has no tenant
pub(super) async fn list(
    ctx: &ExecutionContext,
    caller: &User,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let Some(IdentityScope::Tenant(tenant_id)) =
        IdentityScope::tenant_of(caller.tenant_id.as_deref())
    else {
        debug!(
            connector = "pipes",
            user = %caller.handle,
            "caller belongs to no tenant"
        );
        return Ok(ListStats::default());
    };

    let listing = ctx.client().listing::<TenantUser>(
        "list_tenant_members",
        format!("/tenant/{}/member", segment(&tenant_id)),
    );
    stream_pages(&listing, ctx.policy(), query.budget(), |member| {
        sink.push_with(&member, |row| add_user_handle(row, &member))
    })
    .await
}

pub(super) async fn get(
    ctx: &ExecutionContext,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let tenant_id = query.qual("tenant_id").unwrap_or_default();
    let user_handle = query.qual("user_handle").unwrap_or_default();
    let path = format!(
        "/tenant/{}/member/{}",
        segment(tenant_id),
        segment(user_handle)
    );

    let member: Option<TenantUser> = ctx.fetch_optional("get_tenant_member", &path).await?;
    if let Some(ref member) = member {
        sink.push_with(member, |row| add_user_handle(row, member));
    }
    Ok(sink.stats())
}

fn add_user_handle(row: &mut Row, member: &TenantUser) {
    let handle = member
        .user
        .as_ref()
        .and_then(|user| user.get("handle"))
        .cloned()
        .unwrap_or(Value::Null);
    row.insert("user_handle".to_string(), handle);
}
