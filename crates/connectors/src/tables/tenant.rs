//! pipes_tenant

use super::{ExecutionContext, Query, RowSink};
use crate::client::segment;
use crate::error::ConnectorError;
use crate::models::Tenant;
use crate::paginate::{ListStats, stream_pages};

pub(super) async fn list(
    ctx: &ExecutionContext,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let listing = ctx.client().listing::<Tenant>("list_tenants", "/tenant");
    stream_pages(&listing, ctx.policy(), query.budget(), |tenant| sink.push(&tenant)).await
}

pub(super) async fn get(
    ctx: &ExecutionContext,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let handle = query.qual("handle").unwrap_or_default();
    let tenant: Option<Tenant> = ctx
        .fetch_optional("get_tenant", &format!("/tenant/{}", segment(handle)))
        .await?;
    Ok(sink.single(tenant.as_ref()))
}
