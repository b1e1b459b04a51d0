pub mod app;
pub mod context;
pub mod party;
pub mod quorum;
pub mod request;
pub mod scheduler;
pub mod signing;

pub use app::{AppMethod, ConfirmAudience, MemWrite, TypedValue};
pub use context::{AppContext, ContextStatus, KeyShare, Party};
pub use request::{AppRequest, RequestMode, RequestSignature, RequestStatus};
