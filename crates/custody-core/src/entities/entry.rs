use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::enums::{ActionKind, AuditScope, Sensitivity};

/// The `prev_hash` of the first entry in every chain.
///
/// 32 zero bytes in lowercase hex. It does not depend on the tenant, so a
/// verifier needs no per-chain anchor to start a walk.
pub const SENTINEL_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One immutable fact about a privileged or system-initiated action.
///
/// `hash` commits to `prev_hash` and every other field, so any change to a
/// persisted entry is detectable by the chain verifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub entry_id: String,
    /// `None` places the entry on the global (system) chain.
    pub tenant_id: Option<String>,
    pub scope: AuditScope,
    pub action: String,
    pub action_kind: ActionKind,
    pub sensitivity_level: Sensitivity,
    pub actor_id: String,
    pub actor_role: String,
    pub auth_method: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub context: Option<serde_json::Value>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEntry {
    /// The chain this entry belongs to.
    #[must_use]
    pub fn chain_scope(&self) -> ChainScope {
        ChainScope::from_tenant(self.tenant_id.as_deref())
    }
}

/// Identity of one hash chain: a tenant, or the global system chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChainScope {
    Global,
    Tenant(String),
}

impl ChainScope {
    #[must_use]
    pub fn from_tenant(tenant_id: Option<&str>) -> Self {
        tenant_id.map_or(Self::Global, |t| Self::Tenant(t.to_string()))
    }

    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Tenant(t) => Some(t),
        }
    }
}

impl fmt::Display for ChainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Tenant(t) => write!(f, "tenant:{t}"),
        }
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: String,
    pub auth_method: String,
}

impl Actor {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        auth_method: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            auth_method: auth_method.into(),
        }
    }

    /// The platform itself, used for scheduler- and system-initiated actions.
    #[must_use]
    pub fn system() -> Self {
        Self::new("system", "system", "internal")
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.id == "system" && self.role == "system"
    }
}

/// What was done: the action key plus its classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionSpec {
    pub key: String,
    pub scope: AuditScope,
    pub kind: ActionKind,
    pub sensitivity: Sensitivity,
}

impl ActionSpec {
    /// Build an action with `medium` sensitivity.
    #[must_use]
    pub fn new(key: impl Into<String>, scope: AuditScope, kind: ActionKind) -> Self {
        Self {
            key: key.into(),
            scope,
            kind,
            sensitivity: Sensitivity::Medium,
        }
    }

    #[must_use]
    pub const fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }
}

/// Entry metadata needed by the retention engine and the verifier.
///
/// Loaded instead of the full entry so batch scans do not pull payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryStub {
    pub entry_id: String,
    pub tenant_id: Option<String>,
    pub scope: AuditScope,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl From<&AuditEntry> for EntryStub {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            entry_id: entry.entry_id.clone(),
            tenant_id: entry.tenant_id.clone(),
            scope: entry.scope,
            created_at: entry.created_at,
            prev_hash: entry.prev_hash.clone(),
            hash: entry.hash.clone(),
        }
    }
}

/// Input for one append: everything except the fields the writer assigns
/// (`entry_id`, `created_at`, `prev_hash`, `hash`).
///
/// Payload setters accept any `Serialize` value. A value that cannot be
/// represented as JSON is remembered and reported when the entry is
/// appended, so call sites stay a single builder chain.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub tenant_id: Option<String>,
    pub actor: Actor,
    pub action: ActionSpec,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub context: Option<serde_json::Value>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    payload_errors: Vec<String>,
}

impl NewEntry {
    /// An entry on `tenant_id`'s chain.
    #[must_use]
    pub fn for_tenant(
        tenant_id: impl Into<String>,
        actor: Actor,
        action: ActionSpec,
        resource_type: impl Into<String>,
    ) -> Self {
        Self::on_chain(Some(tenant_id.into()), actor, action, resource_type)
    }

    /// An entry on the global chain.
    #[must_use]
    pub fn global(actor: Actor, action: ActionSpec, resource_type: impl Into<String>) -> Self {
        Self::on_chain(None, actor, action, resource_type)
    }

    #[must_use]
    pub fn on_chain(
        tenant_id: Option<String>,
        actor: Actor,
        action: ActionSpec,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            actor,
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            context: None,
            before: None,
            after: None,
            payload_errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn context<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.context = self.capture("context", value);
        self
    }

    #[must_use]
    pub fn before<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.before = self.capture("before", value);
        self
    }

    #[must_use]
    pub fn after<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.after = self.capture("after", value);
        self
    }

    /// Serialization failures collected by the payload setters.
    #[must_use]
    pub fn payload_errors(&self) -> &[String] {
        &self.payload_errors
    }

    fn capture<T: Serialize + ?Sized>(
        &mut self,
        field: &str,
        value: &T,
    ) -> Option<serde_json::Value> {
        match serde_json::to_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                self.payload_errors.push(format!("{field}: {e}"));
                None
            }
        }
    }
}
