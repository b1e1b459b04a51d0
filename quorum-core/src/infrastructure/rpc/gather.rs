//! Fan-in of concurrent peer calls.

use crate::foundation::{NodeId, PartnerFailure, ThresholdError};
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::debug;
use std::future::Future;
use std::time::Duration;

/// What to do when the deadline passes before enough calls succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Fail with `QuorumTimeout`.
    Reject,
    /// Return whatever arrived.
    ResolvePartial,
}

#[derive(Debug)]
pub struct Gathered<T> {
    /// Successful answers in arrival order.
    pub values: Vec<(NodeId, T)>,
    pub failures: Vec<PartnerFailure>,
    pub timed_out: bool,
}

/// Polls `calls` concurrently until `want` of them succeed, all of them finish, or `deadline`
/// passes. Calls still running at that point are dropped.
pub async fn gather<T, F>(calls: Vec<(NodeId, F)>, want: usize, deadline: Duration, policy: TimeoutPolicy) -> Result<Gathered<T>, ThresholdError>
where
    F: Future<Output = Result<T, ThresholdError>>,
{
    let total = calls.len();
    let mut outstanding: Vec<NodeId> = calls.iter().map(|(peer, _)| peer.clone()).collect();
    let mut pending: FuturesUnordered<_> = calls.into_iter().map(|(peer, fut)| async move { (peer, fut.await) }).collect();
    let mut out = Gathered { values: Vec::new(), failures: Vec::new(), timed_out: false };
    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    while out.values.len() < want {
        tokio::select! {
            next = pending.next() => match next {
                Some((peer, result)) => {
                    outstanding.retain(|p| p != &peer);
                    match result {
                        Ok(value) => out.values.push((peer, value)),
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => out.failures.push(PartnerFailure::new(peer.to_string(), err.to_string())),
                    }
                }
                None => break,
            },
            _ = &mut sleep => {
                out.timed_out = true;
                break;
            }
        }
    }

    if out.timed_out {
        let reason = format!("no answer within {}ms", deadline.as_millis());
        out.failures.extend(outstanding.iter().map(|peer| PartnerFailure::new(peer.to_string(), reason.clone())));
    }
    debug!(
        "gather finished total={} want={} ok={} failed={} timed_out={}",
        total,
        want,
        out.values.len(),
        out.failures.len(),
        out.timed_out
    );
    if out.values.len() < want && policy == TimeoutPolicy::Reject {
        return Err(ThresholdError::QuorumTimeout { required: want, received: out.values.len(), failures: out.failures });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn answer(delay_ms: u64, value: u32) -> Result<u32, ThresholdError> {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(value)
    }

    fn peer(id: &str) -> NodeId {
        NodeId::from(id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_enough_successes() {
        let calls = vec![(peer("a"), answer(10, 1)), (peer("b"), answer(20, 2)), (peer("c"), answer(10_000, 3))];
        let out = gather(calls, 2, Duration::from_secs(60), TimeoutPolicy::Reject).await.expect("gather");
        assert_eq!(out.values.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!out.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_policy_reports_failures() {
        let calls: Vec<(NodeId, std::pin::Pin<Box<dyn Future<Output = Result<u32, ThresholdError>> + Send>>)> = vec![
            (peer("a"), Box::pin(answer(10, 1))),
            (peer("b"), Box::pin(async { Err(ThresholdError::PeerTimeout { peer: "b".into(), timeout_ms: 5 }) })),
            (peer("c"), Box::pin(answer(10_000, 3))),
        ];
        let err = gather(calls, 2, Duration::from_millis(100), TimeoutPolicy::Reject).await.expect_err("timeout");
        match err {
            ThresholdError::QuorumTimeout { required, received, failures } => {
                assert_eq!((required, received), (2, 1));
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].partner, "b");
                assert!(failures[1].reason.contains("no answer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_partial_returns_what_arrived() {
        let calls = vec![(peer("a"), answer(10, 1)), (peer("b"), answer(10_000, 2))];
        let out = gather(calls, 2, Duration::from_millis(100), TimeoutPolicy::ResolvePartial).await.expect("partial");
        assert_eq!(out.values.len(), 1);
        assert!(out.timed_out);
    }
}
