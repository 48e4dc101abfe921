//! Provisioner traits and the orchestration engine

use crate::action::{Action, ApplyResult, Plan};
use crate::diff::{ResourceDiff, ResourceDiffItem};
use crate::error::Result;
use crate::policy::CallPolicy;
use crate::registry::ProvisionerRegistry;
use crate::resource::{Lookup, Observed, Resource, ResourceRef, Runtime};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Finds observed state for a lookup kind
#[async_trait]
pub trait LookupProvider<L: Lookup>: Send + Sync {
    /// Returns `Ok(None)` when nothing matches the natural id.
    async fn lookup(&self, lookup: &L) -> Result<Option<L::Runtime>>;
}

/// Backend-specific logic for one resource kind
///
/// Implementations must keep the contract the engine relies on:
///
/// - `lookup` is safe before the resource exists and returns `Ok(None)`;
/// - `apply` is an upsert: applying an unchanged resource twice leaves the
///   backend unchanged and succeeds both times;
/// - `delete` receives a runtime obtained from a prior lookup or listing.
#[async_trait]
pub trait ResourceProvisioner<R: Resource>: Send + Sync {
    /// Look up the observed state of a resource
    async fn lookup(&self, lookup: &R::Lookup) -> Result<Option<Runtime<R>>>;

    /// Compare every comparable field of `resource` with `runtime`
    fn compare(&self, resource: &R, runtime: &Runtime<R>) -> Vec<ResourceDiffItem>;

    /// Create or update the resource
    async fn apply(&self, resource: &R) -> Result<()>;

    /// Delete an existing object by its backend-native identity
    async fn delete(&self, runtime: &Runtime<R>) -> Result<()>;

    /// Every object of this kind known to the backend's API, not only the
    /// ones created by this system
    async fn list(&self) -> Result<Vec<Runtime<R>>>;
}

/// Orchestration engine
///
/// Resolves the provisioner for a resource's kind from the registry and
/// drives the plan/apply/destroy protocol for one resource per call.
#[derive(Clone)]
pub struct Provisioner {
    registry: Arc<ProvisionerRegistry>,
    policy: CallPolicy,
}

impl Provisioner {
    pub fn new(registry: Arc<ProvisionerRegistry>) -> Self {
        Self {
            registry,
            policy: CallPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &ProvisionerRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Look up observed state through the lookup provider for `L`'s kind
    pub async fn lookup<L: Lookup>(&self, lookup: &L) -> Result<Option<L::Runtime>> {
        let provider = self.registry.resolve_lookup_provider::<L>()?;
        let target = format!("{} '{}'", L::KIND, lookup.id());
        self.policy
            .run("lookup", &target, provider.lookup(lookup))
            .await
    }

    /// Compare desired and observed state without touching the backend
    pub async fn diff<R: Resource>(&self, resource: &R) -> Result<ResourceDiff> {
        let provisioner = self.registry.resolve_provisioner::<R>()?;
        let reference = resource.reference();
        let target = reference.to_string();

        let runtime = self
            .policy
            .run("lookup", &target, provisioner.lookup(&resource.lookup()))
            .await?;

        let diff = match runtime {
            None => ResourceDiff::missing(reference),
            Some(runtime) => ResourceDiff::new(reference, provisioner.compare(resource, &runtime)),
        };

        debug!("Diff: {}", diff);
        Ok(diff)
    }

    /// Create or update a resource
    pub async fn apply<R: Resource>(&self, resource: &R) -> Result<()> {
        let provisioner = self.registry.resolve_provisioner::<R>()?;
        let target = resource.reference().to_string();

        info!("Applying {}", target);
        self.policy
            .run("apply", &target, provisioner.apply(resource))
            .await
    }

    /// Diff, then apply only if the diff calls for a write
    ///
    /// Returns the diff that was acted on.
    pub async fn ensure<R: Resource>(&self, resource: &R) -> Result<ResourceDiff> {
        let diff = self.diff(resource).await?;
        if diff.needs_apply() {
            self.apply(resource).await?;
        } else {
            debug!("{} is up to date, skipping apply", diff.resource);
        }
        Ok(diff)
    }

    /// Destroy a resource
    ///
    /// Returns `Ok(false)` without any delete call when the resource does not
    /// exist, `Ok(true)` when it was deleted.
    pub async fn destroy<R: Resource>(&self, resource: &R) -> Result<bool> {
        let provisioner = self.registry.resolve_provisioner::<R>()?;
        let target = resource.reference().to_string();

        let runtime = self
            .policy
            .run("lookup", &target, provisioner.lookup(&resource.lookup()))
            .await?;

        match runtime {
            None => {
                debug!("{} does not exist, nothing to destroy", target);
                Ok(false)
            }
            Some(runtime) => {
                info!("Destroying {} (id {})", target, runtime.native_id());
                self.policy
                    .run("delete", &target, provisioner.delete(&runtime))
                    .await?;
                Ok(true)
            }
        }
    }

    /// Destroy every object of kind `R` the backend knows about
    ///
    /// This is backend-global: it is not limited to objects created through
    /// this engine. Deletions run in listing order and continue after a
    /// failure; the report is only successful if every deletion succeeded.
    pub async fn destroy_all<R: Resource>(&self) -> Result<ApplyResult> {
        let provisioner = self.registry.resolve_provisioner::<R>()?;
        teardown(provisioner.as_ref(), &self.policy).await
    }

    /// Run [`Provisioner::destroy_all`] for every registered kind, in
    /// registration order
    pub async fn destroy_all_kinds(&self) -> Result<ApplyResult> {
        let mut result = ApplyResult::new();
        for teardown in self.registry.teardowns() {
            result.merge(teardown.destroy_all(&self.policy).await?);
        }
        Ok(result)
    }

    /// Turn diffs into a plan
    pub fn plan(&self, diffs: &[ResourceDiff]) -> Plan {
        Plan::from_diffs(diffs)
    }

    /// Delete actions [`Provisioner::destroy_all`] would run for kind `R`,
    /// without deleting anything
    pub async fn plan_destroy_all<R: Resource>(&self) -> Result<Plan> {
        let provisioner = self.registry.resolve_provisioner::<R>()?;
        let runtimes = self.policy.run("list", R::KIND, provisioner.list()).await?;
        Ok(Plan::new(runtimes.iter().map(delete_action::<R>).collect()))
    }
}

fn delete_action<R: Resource>(runtime: &Runtime<R>) -> Action {
    Action::delete(ResourceRef::new(R::KIND, runtime.name()), runtime.native_id())
}

pub(crate) async fn teardown<R: Resource>(
    provisioner: &dyn ResourceProvisioner<R>,
    policy: &CallPolicy,
) -> Result<ApplyResult> {
    let mut result = ApplyResult::new();
    let start = Instant::now();

    info!("Destroying all {} resources", R::KIND);
    let runtimes = policy.run("list", R::KIND, provisioner.list()).await?;

    for runtime in runtimes {
        let action = delete_action::<R>(&runtime);
        info!("Destroying {}", action.resource);

        match policy
            .run("delete", &action.id, provisioner.delete(&runtime))
            .await
        {
            Ok(()) => {
                result.add_success(action.id, format!("Deleted {}", action.resource));
            }
            Err(e) => {
                warn!("Failed to destroy {}: {}", action.resource, e);
                result.add_failure(action.id, e.to_string());
            }
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}
