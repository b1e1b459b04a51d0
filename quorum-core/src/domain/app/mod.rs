//! App-facing domain types: method tables, typed sign params, confirm side effects.

pub mod typed;

pub use typed::{sign_hash, TypedValue};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Closed set of methods an app answers.
///
/// Implementors list every variant in `ALL`; dispatch parses the wire name through this table so an
/// unknown name is rejected before any app code runs.
pub trait AppMethod: Copy + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(raw: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|method| method.as_str() == raw)
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|method| method.as_str()).collect()
    }
}

/// Who receives the confirmed request and runs the confirm hooks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmAudience {
    /// Partners of the signing context.
    Party,
    /// Every node of the network.
    Network,
}

/// Shared-memory write requested by an app after confirmation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemWrite {
    pub key: String,
    pub data: Value,
    #[serde(default, with = "ttl_secs")]
    pub ttl: Option<Duration>,
}

mod ttl_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(ttl: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ttl {
            Some(ttl) => serializer.serialize_some(&ttl.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
