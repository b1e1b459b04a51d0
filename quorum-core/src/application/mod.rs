//! Application layer: request flow and key lifecycle across domain logic and infrastructure I/O.

pub mod apps;
pub mod coordinator;
pub mod lifecycle;
pub mod node;
pub mod partner;
pub mod party_manager;

pub use apps::{App, AppCallContext, AppModule, AppRegistry, DeploymentApp, DeploymentMethod};
pub use coordinator::{RequestCoordinator, Submission};
pub use lifecycle::{CompositeObserver, LifecycleObserver, NoopObserver};
pub use node::{NodeDeps, NodeHandler, NodeServices, NodeSettings};
pub use partner::RequestPartner;
pub use party_manager::{DkgInit, PartyManager};
