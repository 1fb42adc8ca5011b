//! Per-segment risk scoring fan-out.

use tracing::warn;

use super::Scorer;
use crate::core::{Finding, Segment};
use crate::errors::{ClauseflowError, Result};

/// Scores every segment, replacing per-item failures with an
/// "Assessment Failed" finding.
///
/// Returns the findings in segment order plus one warning per recovered
/// item. Only a batch-level error fails the stage. No segments means no
/// collaborator call.
pub async fn score_segments(
    scorer: &dyn Scorer,
    segments: &[Segment],
) -> Result<(Vec<Finding>, Vec<String>)> {
    if segments.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let results = scorer.score_all(segments).await?;
    if results.len() != segments.len() {
        return Err(ClauseflowError::Scoring(format!(
            "scorer returned {} results for {} segments",
            results.len(),
            segments.len()
        )));
    }

    let mut warnings = Vec::new();
    let findings = segments
        .iter()
        .zip(results)
        .map(|(segment, result)| match result {
            Ok(finding) => finding,
            Err(e) => {
                warn!(segment_id = %segment.id, error = %e, "Segment assessment failed");
                warnings.push(format!("segment {}: {e}", segment.id));
                Finding::assessment_failed(&segment.id, &e)
            }
        })
        .collect();

    Ok((findings, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use crate::testing::{segment, RuleScorer};
    use async_trait::async_trait;

    #[tokio::test]
    async fn test_per_item_failure_degrades_to_placeholder() {
        let scorer = RuleScorer::default().failing_on("c2");
        let segments = vec![
            segment("c1", "Liability shall be unlimited."),
            segment("c2", "Anything."),
            segment("c3", "Either party may terminate without notice."),
        ];

        let (findings, warnings) = score_segments(&scorer, &segments).await.unwrap();
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[1].finding_type, "Assessment Failed");
        assert_eq!(findings[1].severity, Severity::Low);
        assert_eq!(findings[2].severity, Severity::Medium);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("segment c2"));
    }

    #[tokio::test]
    async fn test_empty_segments_skip_collaborator() {
        let scorer = RuleScorer::default();
        let (findings, warnings) = score_segments(&scorer, &[]).await.unwrap();
        assert!(findings.is_empty() && warnings.is_empty());
        assert_eq!(scorer.calls(), 0);
    }

    struct BatchDown;

    #[async_trait]
    impl Scorer for BatchDown {
        async fn score_segment(&self, _segment: &Segment) -> Result<Finding> {
            unreachable!("batch call fails first")
        }

        async fn score_all(&self, _segments: &[Segment]) -> Result<Vec<Result<Finding>>> {
            Err(ClauseflowError::transient("scoring service unavailable"))
        }
    }

    #[tokio::test]
    async fn test_batch_error_fails_stage() {
        let err = score_segments(&BatchDown, &[segment("c1", "x")])
            .await
            .unwrap_err();
        assert_eq!(err, ClauseflowError::transient("scoring service unavailable"));
    }

    struct ShortBatch;

    #[async_trait]
    impl Scorer for ShortBatch {
        async fn score_segment(&self, segment: &Segment) -> Result<Finding> {
            Ok(Finding::assessment_failed(&segment.id, "n/a"))
        }

        async fn score_all(&self, _segments: &[Segment]) -> Result<Vec<Result<Finding>>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_result_count_mismatch_is_scoring_error() {
        let err = score_segments(&ShortBatch, &[segment("c1", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, ClauseflowError::Scoring(_)));
    }
}
