//! Provisioner registry
//!
//! Maps resource kinds to provisioners and lookup kinds to lookup providers.
//! It is filled once at startup and then shared read-only behind an `Arc`,
//! so resolution needs no locking.

use crate::action::ApplyResult;
use crate::error::{ProvisionError, Result};
use crate::policy::CallPolicy;
use crate::provisioner::{LookupProvider, ResourceProvisioner, teardown};
use crate::resource::{Lookup, Resource};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased destroy-all for one registered resource kind
#[async_trait]
pub(crate) trait Teardown: Send + Sync {
    async fn destroy_all(&self, policy: &CallPolicy) -> Result<ApplyResult>;
}

struct KindTeardown<R: Resource>(Arc<dyn ResourceProvisioner<R>>);

#[async_trait]
impl<R: Resource> Teardown for KindTeardown<R> {
    async fn destroy_all(&self, policy: &CallPolicy) -> Result<ApplyResult> {
        teardown(self.0.as_ref(), policy).await
    }
}

struct ProvisionerEntry {
    // Arc<dyn ResourceProvisioner<R>> for the registered R
    handle: Box<dyn Any + Send + Sync>,
    teardown: Arc<dyn Teardown>,
}

/// Catalog of provisioners and lookup providers, keyed by kind
#[derive(Default)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<&'static str, ProvisionerEntry>,
    order: Vec<&'static str>,
    lookup_providers: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the provisioner for resource kind `R::KIND`
    pub fn register_provisioner<R, P>(&mut self, provisioner: Arc<P>) -> Result<()>
    where
        R: Resource,
        P: ResourceProvisioner<R> + 'static,
    {
        if self.provisioners.contains_key(R::KIND) {
            return Err(ProvisionError::DuplicateRegistration {
                namespace: "provisioner",
                kind: R::KIND.to_string(),
            });
        }

        let handle: Arc<dyn ResourceProvisioner<R>> = provisioner;
        self.provisioners.insert(
            R::KIND,
            ProvisionerEntry {
                teardown: Arc::new(KindTeardown(handle.clone())),
                handle: Box::new(handle),
            },
        );
        self.order.push(R::KIND);

        tracing::debug!("Registered provisioner for '{}'", R::KIND);
        Ok(())
    }

    /// Register the lookup provider for lookup kind `L::KIND`
    pub fn register_lookup_provider<L, P>(&mut self, provider: Arc<P>) -> Result<()>
    where
        L: Lookup,
        P: LookupProvider<L> + 'static,
    {
        if self.lookup_providers.contains_key(L::KIND) {
            return Err(ProvisionError::DuplicateRegistration {
                namespace: "lookup provider",
                kind: L::KIND.to_string(),
            });
        }

        let handle: Arc<dyn LookupProvider<L>> = provider;
        self.lookup_providers.insert(L::KIND, Box::new(handle));

        tracing::debug!("Registered lookup provider for '{}'", L::KIND);
        Ok(())
    }

    /// Register a backend that provisions `R` and also serves lookups of
    /// `R::Lookup`
    pub fn register<R, P>(&mut self, backend: Arc<P>) -> Result<()>
    where
        R: Resource,
        P: ResourceProvisioner<R> + LookupProvider<R::Lookup> + 'static,
    {
        self.register_provisioner::<R, P>(backend.clone())?;
        self.register_lookup_provider::<R::Lookup, P>(backend)
    }

    pub fn resolve_provisioner<R: Resource>(&self) -> Result<Arc<dyn ResourceProvisioner<R>>> {
        let entry = self
            .provisioners
            .get(R::KIND)
            .ok_or_else(|| ProvisionError::UnknownResourceKind(R::KIND.to_string()))?;

        entry
            .handle
            .downcast_ref::<Arc<dyn ResourceProvisioner<R>>>()
            .cloned()
            .ok_or_else(|| ProvisionError::KindMismatch {
                kind: R::KIND.to_string(),
                expected: std::any::type_name::<R>(),
            })
    }

    pub fn resolve_lookup_provider<L: Lookup>(&self) -> Result<Arc<dyn LookupProvider<L>>> {
        let handle = self
            .lookup_providers
            .get(L::KIND)
            .ok_or_else(|| ProvisionError::UnknownLookupKind(L::KIND.to_string()))?;

        handle
            .downcast_ref::<Arc<dyn LookupProvider<L>>>()
            .cloned()
            .ok_or_else(|| ProvisionError::KindMismatch {
                kind: L::KIND.to_string(),
                expected: std::any::type_name::<L>(),
            })
    }

    /// Registered resource kinds, in registration order
    pub fn kinds(&self) -> &[&'static str] {
        &self.order
    }

    pub fn has_provisioner(&self, kind: &str) -> bool {
        self.provisioners.contains_key(kind)
    }

    pub fn has_lookup_provider(&self, kind: &str) -> bool {
        self.lookup_providers.contains_key(kind)
    }

    pub(crate) fn teardowns(&self) -> impl Iterator<Item = Arc<dyn Teardown>> + '_ {
        self.order
            .iter()
            .filter_map(|kind| self.provisioners.get(kind))
            .map(|entry| entry.teardown.clone())
    }
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut lookups: Vec<&&'static str> = self.lookup_providers.keys().collect();
        lookups.sort();
        f.debug_struct("ProvisionerRegistry")
            .field("provisioners", &self.order)
            .field("lookup_providers", &lookups)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ResourceDiffItem;
    use crate::resource::{Observed, Runtime};

    #[derive(Debug, Clone)]
    struct DiskRuntime(String);

    impl Observed for DiskRuntime {
        fn native_id(&self) -> &str {
            &self.0
        }
    }

    #[derive(Debug)]
    struct DiskLookup(String);

    impl Lookup for DiskLookup {
        const KIND: &'static str = "disk";
        type Runtime = DiskRuntime;

        fn id(&self) -> &str {
            &self.0
        }
    }

    #[derive(Debug)]
    struct Disk(String);

    impl Resource for Disk {
        const KIND: &'static str = "disk";
        type Lookup = DiskLookup;

        fn id(&self) -> &str {
            &self.0
        }

        fn lookup(&self) -> DiskLookup {
            DiskLookup(self.0.clone())
        }
    }

    // Same kind tag as Disk, different type
    #[derive(Debug)]
    struct Impostor(String);

    impl Resource for Impostor {
        const KIND: &'static str = "disk";
        type Lookup = DiskLookup;

        fn id(&self) -> &str {
            &self.0
        }

        fn lookup(&self) -> DiskLookup {
            DiskLookup(self.0.clone())
        }
    }

    struct NullDisks;

    #[async_trait]
    impl LookupProvider<DiskLookup> for NullDisks {
        async fn lookup(&self, _lookup: &DiskLookup) -> Result<Option<DiskRuntime>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl ResourceProvisioner<Disk> for NullDisks {
        async fn lookup(&self, _lookup: &DiskLookup) -> Result<Option<Runtime<Disk>>> {
            Ok(None)
        }

        fn compare(&self, _resource: &Disk, _runtime: &DiskRuntime) -> Vec<ResourceDiffItem> {
            Vec::new()
        }

        async fn apply(&self, _resource: &Disk) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _runtime: &DiskRuntime) -> Result<()> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<DiskRuntime>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProvisionerRegistry::new();
        registry.register::<Disk, _>(Arc::new(NullDisks)).unwrap();

        assert!(registry.resolve_provisioner::<Disk>().is_ok());
        assert!(registry.resolve_lookup_provider::<DiskLookup>().is_ok());
        assert_eq!(registry.kinds(), &["disk"]);
        assert!(registry.has_provisioner("disk"));
        assert!(registry.has_lookup_provider("disk"));
    }

    #[test]
    fn test_duplicate_provisioner_is_rejected() {
        let mut registry = ProvisionerRegistry::new();
        registry
            .register_provisioner::<Disk, _>(Arc::new(NullDisks))
            .unwrap();

        let err = registry
            .register_provisioner::<Disk, _>(Arc::new(NullDisks))
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::DuplicateRegistration {
                namespace: "provisioner",
                ..
            }
        ));
        assert!(err.is_registration());
    }

    #[test]
    fn test_lookup_namespace_is_independent() {
        let mut registry = ProvisionerRegistry::new();
        registry
            .register_provisioner::<Disk, _>(Arc::new(NullDisks))
            .unwrap();

        // Same kind string, different namespace
        registry
            .register_lookup_provider::<DiskLookup, _>(Arc::new(NullDisks))
            .unwrap();

        let err = registry
            .register_lookup_provider::<DiskLookup, _>(Arc::new(NullDisks))
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::DuplicateRegistration {
                namespace: "lookup provider",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_kinds() {
        let registry = ProvisionerRegistry::new();

        assert!(matches!(
            registry.resolve_provisioner::<Disk>(),
            Err(ProvisionError::UnknownResourceKind(kind)) if kind == "disk"
        ));
        assert!(matches!(
            registry.resolve_lookup_provider::<DiskLookup>(),
            Err(ProvisionError::UnknownLookupKind(kind)) if kind == "disk"
        ));
    }

    #[test]
    fn test_kind_collision_is_reported() {
        let mut registry = ProvisionerRegistry::new();
        registry
            .register_provisioner::<Disk, _>(Arc::new(NullDisks))
            .unwrap();

        assert!(matches!(
            registry.resolve_provisioner::<Impostor>(),
            Err(ProvisionError::KindMismatch { .. })
        ));
    }
}
