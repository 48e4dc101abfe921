//! infrablocks application layer
//!
//! Loads [`Settings`] from the discovered `infrablocks.yaml` and builds an
//! [`ApplicationContext`] for one environment: the configuration store, the
//! Vault bootstrap client and a [`Provisioner`](infrablocks_provision::Provisioner)
//! whose registry knows every resource kind the environment can use.

pub mod context;
pub mod settings;

pub use context::{ApplicationContext, Backends};
pub use settings::{
    CONFIG_PATH_ENV, EnvironmentSettings, HetznerSettings, Settings, VaultSettings,
    find_settings_file,
};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `verbose`. Calling this twice is harmless.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
