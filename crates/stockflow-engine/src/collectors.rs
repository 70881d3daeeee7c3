//! Built-in collector steps and the score aggregator.
//!
//! The collectors here return reference payloads so the binary and the
//! integration tests have a complete workflow to run without live
//! market-data providers; production deployments register their own
//! [`Step`] implementations instead. The aggregator is the real one.

use async_trait::async_trait;
use chrono::Utc;
use stockflow_types::{StepContext, StepName};

use crate::step::Step;

/// Technical indicator snapshot for the subject.
pub struct TechnicalCollector;

#[async_trait]
impl Step for TechnicalCollector {
    fn name(&self) -> StepName {
        StepName::new("technical")
    }

    async fn execute(&self, ctx: StepContext) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({
            "symbol": ctx.subject,
            "rsi": 65.5,
            "macd": "bullish",
            "trend": "uptrend",
            "score": 7.5,
        }))
    }
}

/// Fundamental ratios for the subject.
pub struct FundamentalsCollector;

#[async_trait]
impl Step for FundamentalsCollector {
    fn name(&self) -> StepName {
        StepName::new("fundamentals")
    }

    async fn execute(&self, ctx: StepContext) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({
            "symbol": ctx.subject,
            "pe_ratio": 28.5,
            "revenue_growth": 15.2,
            "profit_margin": 25.8,
            "score": 8.0,
        }))
    }
}

/// Recent news sentiment for the subject.
pub struct NewsCollector;

#[async_trait]
impl Step for NewsCollector {
    fn name(&self) -> StepName {
        StepName::new("news")
    }

    async fn execute(&self, ctx: StepContext) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({
            "symbol": ctx.subject,
            "sentiment": "positive",
            "sentiment_score": 0.75,
            "recent_news_count": 12,
            "score": 7.0,
        }))
    }
}

/// Reduces all successful collector payloads into one synthesized
/// recommendation.
///
/// Receives the full result mapping as `prior_results`; failed steps
/// contribute nothing but lower the confidence. Fails when no step
/// succeeded (the router never routes here in that case).
pub struct ScoreAggregator;

const BUY_THRESHOLD: f64 = 7.0;
const HOLD_THRESHOLD: f64 = 4.0;

#[async_trait]
impl Step for ScoreAggregator {
    fn name(&self) -> StepName {
        StepName::new("aggregate")
    }

    async fn execute(&self, ctx: StepContext) -> anyhow::Result<serde_json::Value> {
        let mut sources = serde_json::Map::new();
        let mut scores = Vec::new();
        let mut failed = 0usize;

        for (name, outcome) in &ctx.prior_results {
            if !outcome.is_success() {
                failed += 1;
                continue;
            }
            let Some(payload) = &outcome.payload else {
                continue;
            };
            if let Some(score) = payload.get("score").and_then(serde_json::Value::as_f64) {
                scores.push(score);
            }
            sources.insert(name.to_string(), payload.clone());
        }

        if sources.is_empty() {
            anyhow::bail!("no successful step results to aggregate");
        }

        #[allow(clippy::cast_precision_loss)]
        let overall_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };
        let recommendation = overall_score.map(|score| {
            if score >= BUY_THRESHOLD {
                "BUY"
            } else if score >= HOLD_THRESHOLD {
                "HOLD"
            } else {
                "SELL"
            }
        });
        #[allow(clippy::cast_precision_loss)]
        let confidence = sources.len() as f64 / (sources.len() + failed) as f64;

        Ok(serde_json::json!({
            "symbol": ctx.subject,
            "analyzed_at": Utc::now().to_rfc3339(),
            "overall_score": overall_score,
            "recommendation": recommendation,
            "confidence": confidence,
            "sources": sources,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use stockflow_types::{RunId, StepOutcome};

    fn ctx(results: Vec<(&str, StepOutcome)>) -> StepContext {
        let mut prior_results = BTreeMap::new();
        for (name, outcome) in results {
            prior_results.insert(StepName::new(name), outcome);
        }
        StepContext {
            run_id: RunId::new("r1"),
            subject: "AAPL".into(),
            prior_results,
        }
    }

    fn success(payload: serde_json::Value) -> StepOutcome {
        StepOutcome::success(Some(payload), Utc::now().to_rfc3339())
    }

    #[tokio::test]
    async fn technical_payload_includes_subject_and_score() {
        let payload = TechnicalCollector.execute(ctx(vec![])).await.unwrap();
        assert_eq!(payload["symbol"], "AAPL");
        assert!(payload["score"].as_f64().is_some());
    }

    #[tokio::test]
    async fn aggregator_averages_scores() {
        let payload = ScoreAggregator
            .execute(ctx(vec![
                ("technical", success(serde_json::json!({"score": 7.5}))),
                ("fundamentals", success(serde_json::json!({"score": 8.0}))),
            ]))
            .await
            .unwrap();

        let overall = payload["overall_score"].as_f64().unwrap();
        assert!((overall - 7.75).abs() < 1e-9);
        assert_eq!(payload["recommendation"], "BUY");
        assert!((payload["confidence"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn aggregator_skips_failures_and_lowers_confidence() {
        let payload = ScoreAggregator
            .execute(ctx(vec![
                ("technical", success(serde_json::json!({"score": 5.0}))),
                (
                    "news",
                    StepOutcome::failure("feed unavailable", Utc::now().to_rfc3339()),
                ),
            ]))
            .await
            .unwrap();

        assert_eq!(payload["recommendation"], "HOLD");
        assert!((payload["confidence"].as_f64().unwrap() - 0.5).abs() < 1e-9);
        assert!(payload["sources"].get("news").is_none());
    }

    #[tokio::test]
    async fn aggregator_fails_with_no_successes() {
        let err = ScoreAggregator
            .execute(ctx(vec![(
                "news",
                StepOutcome::failure("down", Utc::now().to_rfc3339()),
            )]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no successful"));
    }

    #[tokio::test]
    async fn low_scores_recommend_sell() {
        let payload = ScoreAggregator
            .execute(ctx(vec![(
                "technical",
                success(serde_json::json!({"score": 2.0})),
            )]))
            .await
            .unwrap();
        assert_eq!(payload["recommendation"], "SELL");
    }
}
