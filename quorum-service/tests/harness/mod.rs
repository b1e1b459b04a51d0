pub mod gateway;
pub mod network;

#[allow(unused_imports)]
pub use gateway::*;
#[allow(unused_imports)]
pub use network::*;
