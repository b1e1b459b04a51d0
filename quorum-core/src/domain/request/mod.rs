pub mod hashing;
pub mod model;
pub mod state_machine;

pub use hashing::compute_request_id;
pub use model::{AppRequest, RequestData, RequestMode, RequestSignature};
pub use state_machine::{RequestProgress, RequestStatus};
