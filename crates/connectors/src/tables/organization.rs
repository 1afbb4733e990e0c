//! pipes_organization

use super::{ExecutionContext, Query, RowSink};
use crate::client::segment;
use crate::error::ConnectorError;
use crate::models::{Org, UserOrg};
use crate::paginate::{ListStats, stream_pages};

/// Organizations the caller is a member of
pub(super) async fn list(
    ctx: &ExecutionContext,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let listing = ctx.client().listing::<UserOrg>("list_actor_orgs", "/actor/org");
    stream_pages(&listing, ctx.policy(), query.budget(), |membership| {
        sink.push(&membership.org)
    })
    .await
}

pub(super) async fn get(
    ctx: &ExecutionContext,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let handle = query.qual("handle").unwrap_or_default();
    let org: Option<Org> = ctx
        .fetch_optional("get_org", &format!("/org/{}", segment(handle)))
        .await?;
    Ok(sink.single(org.as_ref()))
}
