pub mod leader;

pub use leader::{leader_of, LeaderSchedule};
