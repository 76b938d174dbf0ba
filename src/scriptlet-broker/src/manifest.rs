use crate::types::Capability;

/// Tables that are never reachable through the capability broker, regardless
/// of any tenant manifest. These back the platform itself; a tenant script
/// that could read or write them could escalate out of its own tenancy.
pub const ALWAYS_DENIED_TABLES: &[&str] = &[
    "scripts",
    "script_execution_logs",
    "clients",
    "migrations",
    "sessions",
    "password_resets",
    "failed_jobs",
];

/// Event name prefixes a script may never dispatch under, even if the exact
/// name would otherwise match the tenant's allowlist. `script.custom.*` is
/// the one carve-out: tenants may dispatch their own namespaced events.
pub const FORBIDDEN_EVENT_PREFIXES: &[&str] = &["system.", "auth.", "security."];

/// The one `script.*` sub-namespace scripts are allowed to dispatch under.
pub const ALLOWED_SCRIPT_EVENT_PREFIX: &str = "script.custom.";

/// Per-tenant capability policy, supplied by the orchestrator for each
/// execution it admits.
#[derive(Debug, Clone)]
pub struct TenantManifest {
    pub tenant_id: String,
    pub capabilities: Vec<Capability>,
    pub allowed_tables: Vec<String>,
    pub enable_write_operations: bool,
    pub max_query_results: usize,
    pub allowed_http_hosts: Vec<String>,
    pub allow_private_networks: bool,
    pub max_http_body_bytes: usize,
    pub http_timeout_ms: u64,
    pub max_http_redirects: u8,
    pub allowed_event_names: Vec<String>,
}

impl TenantManifest {
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    #[must_use]
    pub fn allows_table(&self, table: &str) -> bool {
        self.allowed_tables.iter().any(|allowed| allowed == table)
    }

    #[must_use]
    pub fn allows_event(&self, name: &str) -> bool {
        if FORBIDDEN_EVENT_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            return false;
        }
        if name.starts_with("script.") && !name.starts_with(ALLOWED_SCRIPT_EVENT_PREFIX) {
            return false;
        }
        self.allowed_event_names.iter().any(|allowed| allowed == name)
    }
}

/// The capability set a single script is allowed to use, independent of
/// what its tenant's manifest grants. A tenant manifest scopes what the
/// tenant as a whole may reach; a script manifest additionally scopes what
/// *this particular script* was configured to use — a script with no
/// declared need for `http` is denied it even if its tenant has the
/// capability. Supplied by the orchestrator alongside the tenant manifest
/// when an execution begins.
#[derive(Debug, Clone, Default)]
pub struct ScriptManifest {
    pub capabilities: Vec<Capability>,
}

impl ScriptManifest {
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> TenantManifest {
        TenantManifest {
            tenant_id: "tenant-1".to_string(),
            capabilities: vec![Capability::Events],
            allowed_tables: vec![],
            enable_write_operations: false,
            max_query_results: 100,
            allowed_http_hosts: vec![],
            allow_private_networks: false,
            max_http_body_bytes: 0,
            http_timeout_ms: 0,
            max_http_redirects: 0,
            allowed_event_names: vec!["script.custom.order_created".to_string(), "billing.invoiced".to_string()],
        }
    }

    #[test]
    fn script_custom_events_are_allowed_when_listed() {
        assert!(manifest().allows_event("script.custom.order_created"));
    }

    #[test]
    fn other_script_prefixed_events_are_always_denied() {
        let mut m = manifest();
        m.allowed_event_names.push("script.internal.whatever".to_string());
        assert!(!m.allows_event("script.internal.whatever"));
    }

    #[test]
    fn forbidden_prefixes_are_denied_even_if_listed() {
        let mut m = manifest();
        m.allowed_event_names.push("system.reboot".to_string());
        assert!(!m.allows_event("system.reboot"));
    }

    #[test]
    fn unlisted_events_are_denied() {
        assert!(!manifest().allows_event("billing.refunded"));
    }

    #[test]
    fn script_manifest_only_grants_its_own_declared_capabilities() {
        let script = ScriptManifest { capabilities: vec![Capability::Events] };
        assert!(script.has_capability(Capability::Events));
        assert!(!script.has_capability(Capability::Http));
        assert!(!script.has_capability(Capability::Database));
    }
}
