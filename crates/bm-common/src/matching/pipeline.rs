use std::time::Instant;

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::{
    ranking::{DEFAULT_RESULT_LIMIT, RankedCandidate, rank_candidates},
    similarity::{Candidate, build_candidate},
    tags::{TagSet, aggregate_tags, aggregate_tags_by_user},
};
use crate::store::{ProfileStore, StoreError};

pub const DEFAULT_CANDIDATE_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum MatchError {
    /// Recoverable: the caller should retry (e.g. pull-to-refresh).
    #[error("profile store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingConfig {
    /// Upper bound on profiles pulled from the store per request.
    pub candidate_limit: usize,
    /// Page size of the ranked result.
    pub result_limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

fn parse_limit(raw: Option<String>, default: usize) -> usize {
    raw.and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

impl MatchingConfig {
    pub fn from_env() -> Self {
        Self {
            candidate_limit: parse_limit(
                std::env::var("BM_MATCH_CANDIDATE_LIMIT").ok(),
                DEFAULT_CANDIDATE_LIMIT,
            ),
            result_limit: parse_limit(
                std::env::var("BM_MATCH_RESULT_LIMIT").ok(),
                DEFAULT_RESULT_LIMIT,
            ),
        }
    }
}

/// Fetches inputs in two batched phases, joins them in memory and ranks the result.
#[derive(Debug, Clone, Default)]
pub struct MatchingEngine {
    config: MatchingConfig,
}

impl MatchingEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// リクエストユーザーに対する候補者ランキング（最大 result_limit 件）
    ///
    /// An empty list is the normal "no matches" state. Only store failures are errors.
    #[instrument(skip(self, store))]
    pub async fn rank_matches<S>(
        &self,
        store: &S,
        requester_id: &str,
    ) -> Result<Vec<RankedCandidate>, MatchError>
    where
        S: ProfileStore + ?Sized,
    {
        let started = Instant::now();
        let result = self.collect_and_rank(store, requester_id).await;
        let elapsed = started.elapsed();

        let outcome = match &result {
            Ok(ranked) if ranked.is_empty() => "empty",
            Ok(_) => "ok",
            Err(_) => "store_unavailable",
        };
        metrics::counter!("bookmatch_rank_requests_total", "outcome" => outcome).increment(1);
        metrics::histogram!("bookmatch_rank_duration_seconds").record(elapsed.as_secs_f64());

        if let Err(err) = &result {
            warn!(error = %err, "ranking aborted; returning retryable error");
        }

        result
    }

    async fn collect_and_rank<S>(
        &self,
        store: &S,
        requester_id: &str,
    ) -> Result<Vec<RankedCandidate>, MatchError>
    where
        S: ProfileStore + ?Sized,
    {
        // Phase 1: requester snapshot + candidate profiles.
        let (requester_stats, requester_logs) = tokio::try_join!(
            store.get_skill_vector(requester_id),
            store.get_activity_logs(requester_id),
        )?;
        let requester_tags = aggregate_tags(&requester_logs);

        let mut profiles = store
            .list_visible_profiles(requester_id, self.config.candidate_limit)
            .await?;
        profiles.retain(|profile| profile.is_visible && profile.id != requester_id);

        if profiles.is_empty() {
            info!(candidates = 0, "no visible candidates");
            return Ok(Vec::new());
        }

        // Phase 2: one batched read per table, then join by user id.
        let candidate_ids: Vec<String> = profiles.iter().map(|p| p.id.clone()).collect();
        let (stats_by_user, candidate_logs) = tokio::try_join!(
            store.get_skill_vectors(&candidate_ids),
            store.get_activity_logs_for_users(&candidate_ids),
        )?;
        let tags_by_user = aggregate_tags_by_user(&candidate_logs);

        let no_tags = TagSet::new();
        let candidates: Vec<Candidate> = profiles
            .into_iter()
            .map(|profile| {
                let candidate_stats = stats_by_user.get(&profile.id).copied();
                let candidate_tags = tags_by_user.get(&profile.id).unwrap_or(&no_tags);
                build_candidate(
                    profile,
                    requester_stats.as_ref(),
                    candidate_stats.as_ref(),
                    &requester_tags,
                    candidate_tags,
                )
            })
            .collect();

        let candidate_count = candidates.len();
        let ranked = rank_candidates(candidates, self.config.result_limit);

        info!(
            candidates = candidate_count,
            results = ranked.len(),
            requester_has_stats = requester_stats.is_some(),
            requester_tags = requester_tags.len(),
            "ranked matches"
        );

        Ok(ranked)
    }
}
