//! infrablocks provisioning core
//!
//! This crate provides the generic resource-provisioning engine: a typed
//! registry binding resource kinds to backend provisioners, and the
//! orchestration logic that looks up observed state, computes diffs and
//! applies or destroys resources.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    caller                        │
//! │        (builds Resource values, orders them)     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │             infrablocks-provision                │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │      Provisioner (orchestration engine)   │   │
//! │  │  diff / apply / destroy / destroy_all     │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────────┐  ┌──────────────┐         │
//! │  │ ProvisionerRegistry│ │  Diff model  │         │
//! │  └──────────────────┘  └──────────────┘         │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │    hetzner    │ │     vault     │
//! │  provisioner  │ │  provisioner  │
//! └───────────────┘ └───────────────┘
//! ```
//!
//! Ordering between resources of different kinds is the caller's job; the
//! engine processes one resource per call.

pub mod action;
pub mod diff;
pub mod error;
pub mod policy;
pub mod provisioner;
pub mod registry;
pub mod resource;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use diff::{ResourceDiff, ResourceDiffItem};
pub use error::{ProvisionError, Result};
pub use policy::CallPolicy;
pub use provisioner::{LookupProvider, Provisioner, ResourceProvisioner};
pub use registry::ProvisionerRegistry;
pub use resource::{Lookup, Observed, Resource, ResourceRef, Runtime};
