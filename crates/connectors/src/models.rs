//! API response types
//!
//! Field names follow the API's snake_case JSON. Every type serializes back to
//! the same names, which become the table's column names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A user account (also the shape of the authenticated actor)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub status: Option<String>,
    pub url: Option<String>,
    pub avatar_url: Option<String>,
    pub tenant_id: Option<String>,
    pub preview_access_mode: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Org {
    pub id: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<String>,
    pub created_by: Option<Value>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by_id: Option<String>,
    pub updated_by: Option<Value>,
    pub version_id: Option<i64>,
}

/// Membership entry returned by the caller's organization listing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserOrg {
    pub org: Org,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tenant {
    pub id: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub state: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by_id: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by_id: Option<String>,
    pub version_id: Option<i64>,
    pub usage_compute_action: Option<String>,
    pub usage_compute_threshold: Option<i64>,
    pub usage_storage_action: Option<String>,
    pub usage_storage_threshold: Option<i64>,
    pub usage_user_action: Option<String>,
    pub usage_user_threshold: Option<i64>,
}

/// Membership of a user in a tenant
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TenantUser {
    pub id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub user: Option<Value>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by_id: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub version_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Connection {
    pub id: String,
    pub handle: String,
    pub identity_id: Option<String>,
    #[serde(rename = "type")]
    pub connection_type: Option<String>,
    pub plugin: Option<String>,
    pub config: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<String>,
    pub created_by: Option<Value>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by_id: Option<String>,
    pub updated_by: Option<Value>,
    pub version_id: Option<i64>,
}

/// A user or organization, as returned by the identity lookup
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Identity {
    pub id: Option<String>,
    pub handle: String,
    #[serde(rename = "type")]
    pub identity_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuditLog {
    pub id: String,
    pub identity_id: Option<String>,
    pub identity_handle: Option<String>,
    pub action_type: Option<String>,
    pub actor_avatar_url: Option<String>,
    pub actor_display_name: Option<String>,
    pub actor_handle: Option<String>,
    pub actor_id: Option<String>,
    pub actor_ip: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub target_handle: Option<String>,
    pub target_id: Option<String>,
    pub data: Option<Value>,
    pub process_id: Option<String>,
}

/// A user or tenant integration (e.g., a GitHub installation)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Integration {
    pub id: String,
    pub handle: Option<String>,
    pub tenant_id: Option<String>,
    pub identity_id: Option<String>,
    #[serde(skip_serializing)]
    pub identity: Option<Identity>,
    #[serde(rename = "type")]
    pub integration_type: Option<String>,
    pub state: Option<String>,
    pub state_reason: Option<String>,
    pub config: Option<Value>,
    pub github_installation_id: Option<i64>,
    pub pipeline_id: Option<String>,
    pub pipeline: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<String>,
    pub created_by: Option<Value>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by_id: Option<String>,
    pub updated_by: Option<Value>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by_id: Option<String>,
    pub deleted_by: Option<Value>,
    pub version_id: Option<i64>,
}
