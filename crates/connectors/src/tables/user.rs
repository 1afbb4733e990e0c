//! pipes_user

use super::RowSink;
use crate::error::ConnectorError;
use crate::models::User;
use crate::paginate::ListStats;

/// The caller is the only row; it is already resolved for the execution.
pub(super) fn list(caller: &User, sink: &mut RowSink<'_>) -> Result<ListStats, ConnectorError> {
    Ok(sink.single(Some(caller)))
}
