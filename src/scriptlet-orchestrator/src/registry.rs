use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::types::ScriptRecord;
use scriptlet_broker::TenantManifest;

/// Looks up scripts by id. The orchestrator never stores script source
/// itself — this trait is the seam to whatever the platform's own script
/// storage looks like.
#[async_trait]
pub trait ScriptRegistry: Send + Sync {
    async fn lookup(&self, script_id: &str) -> Result<Option<ScriptRecord>, OrchestratorError>;
}

/// Reserves a unit of a tenant's execution quota for a new run. Returning
/// `Err(QuotaExceeded)` denies admission; the reservation itself (how quota
/// is tracked, windowed, or refunded on failure) is entirely up to the
/// implementation.
#[async_trait]
pub trait QuotaLimiter: Send + Sync {
    async fn check_and_reserve(&self, tenant_id: &str) -> Result<(), OrchestratorError>;
}

/// Supplies the per-tenant capability policy the broker enforces. The
/// orchestrator has no opinion on where tenant manifests live — this is the
/// seam to whatever the platform's tenant administration surface is.
#[async_trait]
pub trait TenantManifestProvider: Send + Sync {
    async fn manifest_for(&self, tenant_id: &str) -> Result<TenantManifest, OrchestratorError>;
}

/// An in-memory [`ScriptRegistry`] and unconditionally-granting
/// [`QuotaLimiter`], useful for the CLI's single-script mode and for tests.
pub mod fixtures {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{
        async_trait, OrchestratorError, QuotaLimiter, ScriptRecord, ScriptRegistry, TenantManifest,
        TenantManifestProvider,
    };

    #[derive(Default)]
    pub struct StaticScriptRegistry {
        scripts: Mutex<HashMap<String, ScriptRecord>>,
    }

    impl StaticScriptRegistry {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, record: ScriptRecord) {
            self.scripts.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(record.script_id.clone(), record);
        }
    }

    #[async_trait]
    impl ScriptRegistry for StaticScriptRegistry {
        async fn lookup(&self, script_id: &str) -> Result<Option<ScriptRecord>, OrchestratorError> {
            Ok(self
                .scripts
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(script_id)
                .cloned())
        }
    }

    /// Always grants quota. Suitable for the CLI and for tests that aren't
    /// exercising quota enforcement.
    #[derive(Default)]
    pub struct UnlimitedQuota;

    #[async_trait]
    impl QuotaLimiter for UnlimitedQuota {
        async fn check_and_reserve(&self, _tenant_id: &str) -> Result<(), OrchestratorError> {
            Ok(())
        }
    }

    /// Hands back a fixed manifest for every tenant. Suitable for the CLI's
    /// single-script mode and for tests that aren't exercising per-tenant
    /// policy variation.
    pub struct StaticManifest(pub TenantManifest);

    #[async_trait]
    impl TenantManifestProvider for StaticManifest {
        async fn manifest_for(&self, _tenant_id: &str) -> Result<TenantManifest, OrchestratorError> {
            Ok(self.0.clone())
        }
    }
}
