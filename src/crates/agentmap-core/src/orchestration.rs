//! Node selection for orchestration-capable agents
//!
//! [`OrchestratorService`] scores candidate nodes against an input text and
//! picks the best target. The `algorithm` strategy is pure keyword
//! overlap; `tiered` applies a confidence threshold and falls back to a
//! default target below it. Candidate keywords come from explicit keyword
//! lists plus the node description and name.

use std::collections::BTreeMap;

/// Candidate node metadata offered to the matcher
#[derive(Debug, Clone, Default)]
pub struct CandidateNode {
    pub description: String,
    /// Explicit keywords, already split
    pub keywords: Vec<String>,
}

/// Matching strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// Keyword overlap only; best score wins regardless of confidence
    Algorithm,
    /// Keyword overlap with a confidence floor and a fallback target
    #[default]
    Tiered,
}

impl MatchStrategy {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "algorithm" => Self::Algorithm,
            _ => Self::Tiered,
        }
    }
}

/// Outcome of a node selection
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub node: String,
    pub confidence: f64,
}

/// Service selecting the best next node for an input
#[derive(Debug, Default)]
pub struct OrchestratorService;

impl OrchestratorService {
    pub fn new() -> Self {
        Self
    }

    /// Select the best matching node.
    ///
    /// `default_target` is used when no candidate clears the threshold
    /// under the tiered strategy, or when there are no candidates at all.
    pub fn select_best_node(
        &self,
        input_text: &str,
        candidates: &BTreeMap<String, CandidateNode>,
        strategy: MatchStrategy,
        confidence_threshold: f64,
        default_target: Option<&str>,
    ) -> Option<Selection> {
        if candidates.is_empty() {
            return default_target.map(|node| Selection {
                node: node.to_string(),
                confidence: 0.0,
            });
        }

        let input_tokens = tokenize(input_text);
        let mut best: Option<Selection> = None;

        for (name, candidate) in candidates {
            let confidence = score(&input_tokens, name, candidate);
            let better = match &best {
                Some(current) => confidence > current.confidence,
                None => true,
            };
            if better {
                best = Some(Selection {
                    node: name.clone(),
                    confidence,
                });
            }
        }

        let best = best?;
        match strategy {
            MatchStrategy::Algorithm => Some(best),
            MatchStrategy::Tiered => {
                if best.confidence >= confidence_threshold {
                    Some(best)
                } else if let Some(fallback) = default_target {
                    tracing::debug!(
                        best = %best.node,
                        confidence = best.confidence,
                        threshold = confidence_threshold,
                        fallback = %fallback,
                        "confidence below threshold, using fallback target"
                    );
                    Some(Selection {
                        node: fallback.to_string(),
                        confidence: best.confidence,
                    })
                } else {
                    Some(best)
                }
            }
        }
    }
}

/// Fraction of a candidate's keywords present in the input
fn score(input_tokens: &[String], name: &str, candidate: &CandidateNode) -> f64 {
    let mut keywords: Vec<String> = candidate
        .keywords
        .iter()
        .map(|k| k.to_ascii_lowercase())
        .collect();
    keywords.extend(tokenize(&candidate.description));
    keywords.push(name.to_ascii_lowercase());
    keywords.sort();
    keywords.dedup();

    if keywords.is_empty() {
        return 0.0;
    }
    let matched = keywords
        .iter()
        .filter(|k| input_tokens.contains(k))
        .count();
    matched as f64 / keywords.len() as f64
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> BTreeMap<String, CandidateNode> {
        BTreeMap::from([
            (
                "Weather".to_string(),
                CandidateNode {
                    description: "forecast and temperature".to_string(),
                    keywords: vec!["weather".to_string(), "rain".to_string()],
                },
            ),
            (
                "Billing".to_string(),
                CandidateNode {
                    description: "invoices and payments".to_string(),
                    keywords: vec!["invoice".to_string(), "payment".to_string()],
                },
            ),
        ])
    }

    #[test]
    fn algorithm_picks_best_overlap() {
        let service = OrchestratorService::new();
        let selection = service
            .select_best_node(
                "will it rain tomorrow, what is the weather",
                &candidates(),
                MatchStrategy::Algorithm,
                0.8,
                None,
            )
            .unwrap();
        assert_eq!(selection.node, "Weather");
        assert!(selection.confidence > 0.0);
    }

    #[test]
    fn tiered_falls_back_below_threshold() {
        let service = OrchestratorService::new();
        let selection = service
            .select_best_node(
                "completely unrelated request",
                &candidates(),
                MatchStrategy::Tiered,
                0.5,
                Some("Helpdesk"),
            )
            .unwrap();
        assert_eq!(selection.node, "Helpdesk");
    }

    #[test]
    fn tiered_without_fallback_returns_best() {
        let service = OrchestratorService::new();
        let selection = service
            .select_best_node(
                "unrelated",
                &candidates(),
                MatchStrategy::Tiered,
                0.9,
                None,
            )
            .unwrap();
        assert!(["Weather", "Billing"].contains(&selection.node.as_str()));
    }

    #[test]
    fn empty_candidates_use_default() {
        let service = OrchestratorService::new();
        let selection = service.select_best_node(
            "anything",
            &BTreeMap::new(),
            MatchStrategy::Tiered,
            0.5,
            Some("Fallback"),
        );
        assert_eq!(selection.unwrap().node, "Fallback");
        assert!(service
            .select_best_node("anything", &BTreeMap::new(), MatchStrategy::Tiered, 0.5, None)
            .is_none());
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!(MatchStrategy::parse("algorithm"), MatchStrategy::Algorithm);
        assert_eq!(MatchStrategy::parse("tiered"), MatchStrategy::Tiered);
        assert_eq!(MatchStrategy::parse("anything"), MatchStrategy::Tiered);
    }
}
