//! pipes_user_integration and pipes_tenant_integration

use serde_json::Value;

use super::{ExecutionContext, Query, RowSink};
use crate::client::segment;
use crate::error::ConnectorError;
use crate::models::{Integration, User};
use crate::paginate::{Flow, ListStats, stream_pages};

/// Integrations owned by the caller
pub(super) async fn list_user(
    ctx: &ExecutionContext,
    caller: &User,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let listing = ctx.client().listing::<Integration>(
        "list_user_integrations",
        format!("/user/{}/integration", segment(&caller.handle)),
    );
    stream_pages(&listing, ctx.policy(), query.budget(), |integration| {
        push_user_integration(sink, &integration, &caller.handle)
    })
    .await
}

pub(super) async fn get_user(
    ctx: &ExecutionContext,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let id = query.qual("id").unwrap_or_default();
    let user_handle = query.qual("user_handle").unwrap_or_default();
    let path = format!("/user/{}/integration/{}", segment(user_handle), segment(id));

    let integration: Option<Integration> =
        ctx.fetch_optional("get_user_integration", &path).await?;
    if let Some(ref integration) = integration {
        push_user_integration(sink, integration, user_handle);
    }
    Ok(sink.stats())
}

pub(super) async fn list_tenant(
    ctx: &ExecutionContext,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let listing = ctx
        .client()
        .listing::<Integration>("list_tenant_integrations", "/tenant/integration");
    stream_pages(&listing, ctx.policy(), query.budget(), |integration| {
        sink.push(&integration)
    })
    .await
}

pub(super) async fn get_tenant(
    ctx: &ExecutionContext,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let id = query.qual("id").unwrap_or_default();
    let integration: Option<Integration> = ctx
        .fetch_optional(
            "get_tenant_integration",
            &format!("/tenant/integration/{}", segment(id)),
        )
        .await?;
    Ok(sink.single(integration.as_ref()))
}

// user_handle comes from the embedded identity, else the handle the row was listed under
fn push_user_integration(
    sink: &mut RowSink<'_>,
    integration: &Integration,
    listed_under: &str,
) -> Flow {
    let handle = integration
        .identity
        .as_ref()
        .map(|identity| identity.handle.as_str())
        .unwrap_or(listed_under);
    sink.push_with(integration, |row| {
        row.insert("user_handle".to_string(), Value::String(handle.to_string()));
    })
}
