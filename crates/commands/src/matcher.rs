//! Ranking tools against a task.
//!
//! A candidate's confidence is 100 × its best cosine similarity over its
//! example embeddings, clamped to [0, 100]. Candidates are visited in
//! registration order and only a strictly higher confidence displaces the
//! current best or runner-up, so ties go to the tool registered first.

use daisy_core::error::ProviderError;
use daisy_core::provider::EmbeddingProvider;
use daisy_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::debug;

use crate::modules::ExampleIndex;
use crate::similarity::cosine_similarity;

/// A tool as the matcher sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCandidate {
    pub name: String,
    pub description: String,
    pub argument_format: String,
    pub example_embeddings: Vec<Vec<f32>>,
}

impl CommandCandidate {
    /// Confidence in [0, 100]; 0 when the candidate has no examples.
    pub fn confidence(&self, task_embedding: &[f32]) -> f32 {
        let best = self
            .example_embeddings
            .iter()
            .map(|example| cosine_similarity(task_embedding, example))
            .fold(0.0f32, f32::max);
        (best * 100.0).clamp(0.0, 100.0)
    }

    /// Snapshot every registered tool, in registration order, paired with
    /// its recorded examples.
    pub fn from_registry(registry: &ToolRegistry, index: &ExampleIndex) -> Vec<Self> {
        registry
            .list_tools()
            .into_iter()
            .map(|tool| Self {
                example_embeddings: index.embeddings_for(&tool.name),
                name: tool.name,
                description: tool.description,
                argument_format: tool.argument_format,
            })
            .collect()
    }

    fn ranked(&self, confidence: f32) -> RankedCommand {
        RankedCommand {
            name: self.name.clone(),
            description: self.description.clone(),
            argument_format: self.argument_format.clone(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCommand {
    pub name: String,
    pub description: String,
    pub argument_format: String,
    pub confidence: f32,
}

/// Best and runner-up. `best.confidence >= second.confidence` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub best: RankedCommand,
    /// Empty when only one candidate exists
    pub second: Option<RankedCommand>,
}

impl MatchResult {
    pub fn second_confidence(&self) -> f32 {
        self.second.as_ref().map_or(0.0, |s| s.confidence)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(MatchResult),
    NoCommands,
    /// The best candidate fell short of the threshold; kept for diagnostics.
    BelowThreshold(MatchResult),
}

impl MatchOutcome {
    /// The result regardless of threshold, if there were candidates at all.
    pub fn result(&self) -> Option<&MatchResult> {
        match self {
            Self::Matched(r) | Self::BelowThreshold(r) => Some(r),
            Self::NoCommands => None,
        }
    }

    pub fn matched(&self) -> Option<&MatchResult> {
        match self {
            Self::Matched(r) => Some(r),
            _ => None,
        }
    }
}

/// Rank `candidates` against a task embedding.
pub fn match_command(
    task_embedding: &[f32],
    candidates: &[CommandCandidate],
    threshold: f32,
) -> MatchOutcome {
    let mut best: Option<RankedCommand> = None;
    let mut second: Option<RankedCommand> = None;

    for candidate in candidates {
        let confidence = candidate.confidence(task_embedding);
        debug!(command = %candidate.name, confidence, "Scored command");

        match &best {
            Some(b) if confidence <= b.confidence => {
                if second.as_ref().is_none_or(|s| confidence > s.confidence) {
                    second = Some(candidate.ranked(confidence));
                }
            }
            _ => {
                second = best.take();
                best = Some(candidate.ranked(confidence));
            }
        }
    }

    let Some(best) = best else {
        return MatchOutcome::NoCommands;
    };

    let result = MatchResult { best, second };
    if result.best.confidence < threshold {
        MatchOutcome::BelowThreshold(result)
    } else {
        MatchOutcome::Matched(result)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Failed to embed task: {0}")]
    Embedding(#[from] ProviderError),
}

/// Embeds tasks and matches them against a fixed candidate snapshot.
pub struct CommandMatcher {
    embedder: Arc<dyn EmbeddingProvider>,
    candidates: Vec<CommandCandidate>,
    threshold: f32,
}

impl CommandMatcher {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        candidates: Vec<CommandCandidate>,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            candidates,
            threshold,
        }
    }

    pub fn candidates(&self) -> &[CommandCandidate] {
        &self.candidates
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Embed `task` and rank the candidates against it.
    pub async fn determine_command(&self, task: &str) -> Result<MatchOutcome, MatchError> {
        if self.candidates.is_empty() {
            return Ok(MatchOutcome::NoCommands);
        }
        let embedding = self.embedder.embed(task).await?;
        Ok(match_command(&embedding, &self.candidates, self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use daisy_core::error::ToolError;
    use daisy_core::tool::Tool;
    use tokio_util::sync::CancellationToken;

    fn candidate(name: &str, examples: Vec<Vec<f32>>) -> CommandCandidate {
        CommandCandidate {
            name: name.into(),
            description: format!("{name} tool"),
            argument_format: "<arg>".into(),
            example_embeddings: examples,
        }
    }

    /// Axis 0 = weather-ish, axis 1 = arithmetic-ish, axis 2 = time-ish.
    fn catalog() -> Vec<CommandCandidate> {
        vec![
            candidate("Weather", vec![vec![1.0, 0.1, 0.0], vec![0.9, 0.0, 0.2]]),
            candidate("Calculator", vec![vec![0.0, 1.0, 0.0], vec![0.1, 0.9, 0.1]]),
        ]
    }

    #[test]
    fn weather_task_prefers_weather() {
        let outcome = match_command(&[0.95, 0.05, 0.05], &catalog(), 50.0);
        let result = outcome.matched().unwrap();
        assert_eq!(result.best.name, "Weather");
        assert_eq!(result.second.as_ref().unwrap().name, "Calculator");
        assert!(result.best.confidence > result.second_confidence());
        assert!(result.best.confidence <= 100.0);
    }

    /// Small linear congruential generator so the sweep is reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn below(&mut self, n: u64) -> usize {
            (self.next() % n) as usize
        }

        fn vector(&mut self, dim: usize) -> Vec<f32> {
            (0..dim).map(|_| (self.next() % 2001) as f32 / 1000.0 - 1.0).collect()
        }
    }

    #[test]
    fn ranking_holds_across_generated_catalogs() {
        let mut rng = Lcg(0x5eed);
        for round in 0..500 {
            let count = 1 + rng.below(6);
            let candidates: Vec<CommandCandidate> = (0..count)
                .map(|i| {
                    let examples = (0..rng.below(4)).map(|_| rng.vector(4)).collect();
                    candidate(&format!("c{i}"), examples)
                })
                .collect();
            let task = rng.vector(4);

            let outcome = match_command(&task, &candidates, 50.0);
            let result = outcome.result().unwrap();

            let mut scores: Vec<f32> = candidates.iter().map(|c| c.confidence(&task)).collect();
            let first_best = scores
                .iter()
                .position(|s| *s == result.best.confidence)
                .unwrap();
            scores.sort_by(|a, b| b.total_cmp(a));

            assert!(result.best.confidence >= result.second_confidence(), "round {round}");
            assert!((0.0..=100.0).contains(&result.best.confidence), "round {round}");
            assert!((0.0..=100.0).contains(&result.second_confidence()), "round {round}");
            assert_eq!(result.best.confidence, scores[0], "round {round}");
            assert_eq!(result.best.name, format!("c{first_best}"), "round {round}");
            match &result.second {
                Some(second) => assert_eq!(second.confidence, scores[1], "round {round}"),
                None => assert_eq!(count, 1, "round {round}"),
            }
            assert_eq!(outcome.matched().is_some(), result.best.confidence >= 50.0, "round {round}");
        }
    }

    #[test]
    fn confidence_is_max_over_examples() {
        let c = candidate("Weather", vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        assert!((c.confidence(&[1.0, 0.0]) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn confidence_clamped_to_zero() {
        let c = candidate("Opposite", vec![vec![-1.0, 0.0]]);
        assert_eq!(c.confidence(&[1.0, 0.0]), 0.0);
        assert_eq!(candidate("Empty", vec![]).confidence(&[1.0, 0.0]), 0.0);
    }

    #[test]
    fn ties_go_to_first_registered() {
        let same = vec![vec![1.0, 0.0]];
        let candidates = vec![
            candidate("First", same.clone()),
            candidate("Second", same.clone()),
            candidate("Third", same),
        ];
        let outcome = match_command(&[1.0, 0.0], &candidates, 0.0);
        let result = outcome.matched().unwrap();
        assert_eq!(result.best.name, "First");
        assert_eq!(result.second.as_ref().unwrap().name, "Second");
    }

    #[test]
    fn later_better_candidate_demotes_best() {
        let candidates = vec![
            candidate("Meh", vec![vec![0.5, 0.5]]),
            candidate("Good", vec![vec![1.0, 0.0]]),
            candidate("Worse", vec![vec![0.0, 1.0]]),
        ];
        let result = match_command(&[1.0, 0.0], &candidates, 0.0);
        let result = result.matched().unwrap();
        assert_eq!(result.best.name, "Good");
        assert_eq!(result.second.as_ref().unwrap().name, "Meh");
    }

    #[test]
    fn single_candidate_has_empty_second() {
        let candidates = vec![candidate("Only", vec![vec![1.0, 0.0]])];
        let outcome = match_command(&[1.0, 0.0], &candidates, 10.0);
        let result = outcome.matched().unwrap();
        assert!(result.second.is_none());
        assert_eq!(result.second_confidence(), 0.0);
    }

    #[test]
    fn no_candidates() {
        assert_eq!(match_command(&[1.0], &[], 0.0), MatchOutcome::NoCommands);
    }

    #[test]
    fn below_threshold_keeps_result() {
        let outcome = match_command(&[0.0, 0.0, 1.0], &catalog(), 50.0);
        match outcome {
            MatchOutcome::BelowThreshold(result) => {
                assert_eq!(result.best.name, "Weather");
                assert!(result.best.confidence < 50.0);
            }
            other => panic!("expected BelowThreshold, got {other:?}"),
        }
    }

    #[test]
    fn all_zero_still_names_a_best() {
        let outcome = match_command(&[0.0, 0.0, 1.0], &[candidate("A", vec![]), candidate("B", vec![])], 0.0);
        let result = outcome.matched().unwrap();
        assert_eq!(result.best.name, "A");
        assert_eq!(result.best.confidence, 0.0);
    }

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn argument_format(&self) -> &str {
            "<x>"
        }
        async fn execute(&self, _: &str, _: &CancellationToken) -> Result<String, ToolError> {
            Ok(String::new())
        }
    }

    #[test]
    fn candidates_follow_registry_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Named("Weather")));
        registry.register(Arc::new(Named("Calculator")));

        let mut index = ExampleIndex::new();
        index.insert(crate::modules::ModuleFile {
            module: crate::modules::ModuleInfo {
                name: "Calculator".into(),
                description: "ignored".into(),
                argument: "ignored".into(),
            },
            embeddings: vec![crate::modules::ModuleExample {
                text: "add".into(),
                embedding: vec![0.0, 1.0],
            }],
        });

        let candidates = CommandCandidate::from_registry(&registry, &index);
        assert_eq!(candidates[0].name, "Weather");
        assert!(candidates[0].example_embeddings.is_empty());
        assert_eq!(candidates[1].example_embeddings, vec![vec![0.0, 1.0]]);
        assert_eq!(candidates[1].description, "test tool");
    }

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn name(&self) -> &str {
            "keyword"
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            if text.is_empty() {
                return Err(ProviderError::InvalidRequest("empty".into()));
            }
            let t = text.to_lowercase();
            Ok(vec![
                if t.contains("weather") || t.contains("rain") { 1.0 } else { 0.0 },
                if t.contains("plus") || t.contains('+') { 1.0 } else { 0.0 },
                0.1,
            ])
        }
    }

    #[tokio::test]
    async fn determine_command_embeds_then_matches() {
        let matcher = CommandMatcher::new(Arc::new(KeywordEmbedder), catalog(), 50.0);
        let outcome = matcher.determine_command("what is 2 plus 2").await.unwrap();
        assert_eq!(outcome.matched().unwrap().best.name, "Calculator");
    }

    #[tokio::test]
    async fn determine_command_surfaces_embedding_failure() {
        let matcher = CommandMatcher::new(Arc::new(KeywordEmbedder), catalog(), 50.0);
        let err = matcher.determine_command("").await.unwrap_err();
        assert!(matches!(err, MatchError::Embedding(ProviderError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn determine_command_without_candidates_skips_embedding() {
        let matcher = CommandMatcher::new(Arc::new(KeywordEmbedder), vec![], 50.0);
        assert_eq!(matcher.determine_command("").await.unwrap(), MatchOutcome::NoCommands);
    }
}
