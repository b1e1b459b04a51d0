pub mod simple_oracle;
pub mod user_lock;

pub use simple_oracle::{SimpleOracle, SIMPLE_ORACLE_NAME};
pub use user_lock::{UserLock, USER_LOCK_NAME};

use quorum_core::application::AppRegistry;
use quorum_core::foundation::ThresholdError;

/// Deployment app plus the apps this node serves.
pub fn service_registry() -> Result<AppRegistry, ThresholdError> {
    let mut registry = AppRegistry::with_deployment()?;
    registry.register(SimpleOracle)?;
    registry.register(UserLock)?;
    Ok(registry)
}
