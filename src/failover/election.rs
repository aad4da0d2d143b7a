//! Successor election
//!
//! Eligible standbys are ranked by replication lag, lowest first. A standby
//! that never reported lag ranks after every standby that did. Equal lag
//! falls back to the lexicographically smaller id, so the outcome never
//! depends on probe timing.

use std::cmp::Ordering;

use serde::Serialize;

use crate::cluster::Node;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub node_id: String,
    pub lag_seconds: Option<f64>,
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    let by_lag = match (a.lag_seconds, b.lag_seconds) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_lag.then_with(|| a.node_id.cmp(&b.node_id))
}

/// Every eligible standby, best first.
///
/// `excluded` filters out nodes that are otherwise eligible (promotion
/// backoff).
pub fn rank_candidates<'a, I, F>(nodes: I, excluded: F) -> Vec<Candidate>
where
    I: IntoIterator<Item = &'a Node>,
    F: Fn(&str) -> bool,
{
    let mut candidates: Vec<Candidate> = nodes
        .into_iter()
        .filter(|n| n.is_eligible_standby() && !excluded(&n.id))
        .map(|n| Candidate {
            node_id: n.id.clone(),
            lag_seconds: n.replication_lag_seconds,
        })
        .collect();
    candidates.sort_by(rank);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{HealthStatus, NodeRole};

    fn standby(id: &str, lag: Option<f64>) -> Node {
        let mut node = Node::new(id, "r", format!("{}:5432", id), NodeRole::Standby);
        node.health = HealthStatus::Healthy;
        node.replication_lag_seconds = lag;
        node
    }

    #[test]
    fn test_lowest_lag_wins() {
        let nodes = vec![standby("a", Some(2.0)), standby("b", Some(0.5))];
        let best = rank_candidates(&nodes, |_| false).remove(0);
        assert_eq!(best.node_id, "b");
        assert_eq!(best.lag_seconds, Some(0.5));
    }

    #[test]
    fn test_tie_broken_by_id() {
        let nodes = vec![
            standby("standby-us-east-1", Some(0.0)),
            standby("standby-eu-west-1", Some(0.0)),
        ];
        assert_eq!(
            rank_candidates(&nodes, |_| false)[0].node_id,
            "standby-eu-west-1"
        );
    }

    #[test]
    fn test_unknown_lag_ranks_last() {
        let nodes = vec![standby("a", None), standby("b", Some(25.0))];
        let ranked = rank_candidates(&nodes, |_| false);
        assert_eq!(ranked[0].node_id, "b");
        assert_eq!(ranked[1].node_id, "a");
    }

    #[test]
    fn test_ineligible_nodes_skipped() {
        let mut suspect = standby("a", Some(0.0));
        suspect.health = HealthStatus::Suspect;
        let mut fenced = standby("b", Some(0.0));
        fenced.fenced = true;
        let mut primary = standby("c", Some(0.0));
        primary.role = NodeRole::Primary;
        let backed_off = standby("d", Some(0.0));
        let ok = standby("e", Some(9.0));

        let nodes = vec![suspect, fenced, primary, backed_off, ok];
        let ranked = rank_candidates(&nodes, |id| id == "d");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].node_id, "e");
    }

    #[test]
    fn test_no_candidates() {
        let mut down = standby("a", Some(0.0));
        down.health = HealthStatus::Unhealthy;
        assert!(rank_candidates(&[down], |_| false).is_empty());
    }
}
