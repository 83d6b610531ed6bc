//! Graph success policies
//!
//! A policy turns the tracker's per-node outcomes into one boolean at
//! termination. Configured at runner construction; not mutable per run.

use crate::tracker::ExecutionTracker;
use std::sync::Arc;

/// Plug-in policy function receiving the full tracker
pub type PolicyFn = Arc<dyn Fn(&ExecutionTracker) -> bool + Send + Sync>;

/// How graph-level success is derived from node outcomes
#[derive(Clone, Default)]
pub enum SuccessPolicy {
    /// Every executed node succeeded
    #[default]
    AllNodes,
    /// The last executed node succeeded
    FinalNode,
    /// Every execution of each named node succeeded; a named node that
    /// never ran is a failure
    CriticalNodes(Vec<String>),
    /// Custom policy function
    Custom(PolicyFn),
}

impl SuccessPolicy {
    /// Evaluate against a finished (or suspended) tracker
    pub fn evaluate(&self, tracker: &ExecutionTracker) -> bool {
        match self {
            Self::AllNodes => tracker
                .node_executions
                .iter()
                .all(|e| e.success == Some(true)),
            Self::FinalNode => tracker
                .node_executions
                .last()
                .map(|e| e.success == Some(true))
                .unwrap_or(false),
            Self::CriticalNodes(names) => names.iter().all(|name| {
                let mut ran = false;
                let all_ok = tracker
                    .node_executions
                    .iter()
                    .filter(|e| &e.node_name == name)
                    .inspect(|_| ran = true)
                    .all(|e| e.success == Some(true));
                ran && all_ok
            }),
            Self::Custom(policy) => policy(tracker),
        }
    }

    /// Parse a policy name from configuration; `critical:a,b` names the
    /// critical nodes inline
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "all_nodes" => Some(Self::AllNodes),
            "final_node" => Some(Self::FinalNode),
            _ => raw.strip_prefix("critical:").map(|names| {
                Self::CriticalNodes(
                    names
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(String::from)
                        .collect(),
                )
            }),
        }
    }
}

impl std::fmt::Debug for SuccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllNodes => write!(f, "AllNodes"),
            Self::FinalNode => write!(f, "FinalNode"),
            Self::CriticalNodes(names) => f.debug_tuple("CriticalNodes").field(names).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExecutionState;

    fn tracker_with(results: &[(&str, bool)]) -> ExecutionTracker {
        let mut tracker = ExecutionTracker::new("t", "G");
        for (name, success) in results {
            let idx = tracker.record_node_start(*name, ExecutionState::new());
            tracker.record_node_end(idx, *success, None, None);
        }
        tracker
    }

    #[test]
    fn all_nodes_policy() {
        assert!(SuccessPolicy::AllNodes.evaluate(&tracker_with(&[("A", true), ("B", true)])));
        assert!(!SuccessPolicy::AllNodes.evaluate(&tracker_with(&[("A", true), ("B", false)])));
    }

    #[test]
    fn final_node_policy() {
        assert!(SuccessPolicy::FinalNode.evaluate(&tracker_with(&[("A", false), ("B", true)])));
        assert!(!SuccessPolicy::FinalNode.evaluate(&tracker_with(&[("A", true), ("B", false)])));
        assert!(!SuccessPolicy::FinalNode.evaluate(&tracker_with(&[])));
    }

    #[test]
    fn critical_nodes_policy() {
        let policy = SuccessPolicy::CriticalNodes(vec!["B".into()]);
        assert!(policy.evaluate(&tracker_with(&[("A", false), ("B", true)])));
        assert!(!policy.evaluate(&tracker_with(&[("A", true), ("B", false)])));
        // Absent critical node is a failure
        assert!(!policy.evaluate(&tracker_with(&[("A", true)])));
    }

    #[test]
    fn custom_policy() {
        let policy = SuccessPolicy::Custom(Arc::new(|tracker: &ExecutionTracker| {
            tracker.node_executions.len() >= 2
        }));
        assert!(policy.evaluate(&tracker_with(&[("A", false), ("B", false)])));
        assert!(!policy.evaluate(&tracker_with(&[("A", true)])));
    }

    #[test]
    fn parse_policy_names() {
        assert!(matches!(
            SuccessPolicy::parse("all_nodes"),
            Some(SuccessPolicy::AllNodes)
        ));
        assert!(matches!(
            SuccessPolicy::parse("FINAL_NODE"),
            Some(SuccessPolicy::FinalNode)
        ));
        match SuccessPolicy::parse("critical:A, B") {
            Some(SuccessPolicy::CriticalNodes(names)) => {
                assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
        assert!(SuccessPolicy::parse("bogus").is_none());
    }
}
