pub mod lifecycle;
pub mod model;

pub use lifecycle::ensure_forward;
pub use model::{AppContext, ContextStatus, DeploymentInfo, KeyShare, Party, SealedKeyShare};
