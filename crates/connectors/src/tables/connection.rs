//! pipes_connection
//!
//! Connection rows carry the owning identity's handle and type, looked up
//! through `/identity/{id}`. Lookups are memoized for the listing, and the
//! caller's own identity is known up front.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::{ExecutionContext, Query, Row, RowSink, owner_path};
use crate::client::segment;
use crate::error::ConnectorError;
use crate::identity::IdentityScope;
use crate::models::{Connection, Identity, User};
use crate::paginate::{API_MAX_PAGE_SIZE, Flow, ListStats, Paginator};

pub(super) async fn list(
    ctx: &ExecutionContext,
    caller: &User,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let identity_id = query.qual("identity_id");
    let identity_handle = query.qual("identity_handle");

    // The actor listing spans every identity the caller can see, so it only
    // serves an unfiltered query
    let listing = if identity_id.is_none() && identity_handle.is_none() {
        ctx.client()
            .listing::<Connection>("list_actor_connections", "/actor/connection")
    } else {
        let scope = IdentityScope::classify(identity_id, identity_handle, &caller.handle);
        let kind = match scope {
            IdentityScope::Caller => "user",
            ref other => other.kind(),
        };
        ctx.client().listing::<Connection>(
            format!("list_{}_connections", kind),
            format!("{}/connection", owner_path(&scope, caller)),
        )
    };

    let page_size = query.budget().page_size(API_MAX_PAGE_SIZE);
    let mut paginator = Paginator::new(&listing, ctx.policy(), page_size);
    let mut identities = IdentityLookup::new(caller);
    let mut stats = ListStats::default();

    while let Some(connections) = paginator.next_page().await? {
        stats.pages = paginator.pages();
        for connection in connections {
            let identity = identities.resolve(ctx, connection.identity_id.as_deref()).await?;
            stats.rows += 1;
            if sink.push_with(&connection, |row| hydrate(row, identity.as_ref())) == Flow::Stop {
                stats.stopped_early = true;
                return Ok(stats);
            }
        }
    }

    Ok(stats)
}

pub(super) async fn get(
    ctx: &ExecutionContext,
    caller: &User,
    query: &Query,
    sink: &mut RowSink<'_>,
) -> Result<ListStats, ConnectorError> {
    let handle = query.qual("handle").unwrap_or_default();
    let scope = IdentityScope::classify(None, query.qual("identity_handle"), &caller.handle);
    let path = format!("{}/connection/{}", owner_path(&scope, caller), segment(handle));

    let Some(connection) = ctx
        .fetch_optional::<Connection>("get_connection", &path)
        .await?
    else {
        return Ok(sink.single::<Connection>(None));
    };

    let identity = IdentityLookup::new(caller)
        .resolve(ctx, connection.identity_id.as_deref())
        .await?;
    sink.push_with(&connection, |row| hydrate(row, identity.as_ref()));

    Ok(sink.stats())
}

fn hydrate(row: &mut Row, identity: Option<&Identity>) {
    let handle = identity.map(|i| Value::String(i.handle.clone()));
    let kind = identity
        .and_then(|i| i.identity_type.clone())
        .map(Value::String);
    row.insert("identity_handle".to_string(), handle.unwrap_or(Value::Null));
    row.insert("identity_type".to_string(), kind.unwrap_or(Value::Null));
}

/// Identity lookups memoized by id
struct IdentityLookup {
    cache: HashMap<String, Option<Identity>>,
}

impl IdentityLookup {
    fn new(caller: &User) -> Self {
        let mut cache = HashMap::new();
        cache.insert(
            caller.id.clone(),
            Some(Identity {
                id: Some(caller.id.clone()),
                handle: caller.handle.clone(),
                identity_type: Some("user".to_string()),
            }),
        );
        Self { cache }
    }

    async fn resolve(
        &mut self,
        ctx: &ExecutionContext,
        identity_id: Option<&str>,
    ) -> Result<Option<Identity>, ConnectorError> {
        let Some(id) = identity_id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        if let Some(cached) = self.cache.get(id) {
            return Ok(cached.clone());
        }

        debug!(connector = "pipes", identity_id = %id, "looking up identity");
        let identity: Option<Identity> = ctx
            .fetch_optional("get_identity", &format!("/identity/{}", segment(id)))
            .await?;
        self.cache.insert(id.to_string(), identity.clone());
        Ok(identity)
    }
}
