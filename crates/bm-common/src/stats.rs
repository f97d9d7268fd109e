use chrono::Utc;
use strum::IntoEnumIterator;
use tracing::{info, instrument, warn};

use crate::store::{LibraryStore, ProfileStore, StatsSnapshot, StoreError};
use crate::{Attribute, AttributeGroup, SkillVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointsMode {
    Add,
    /// Floors every counter at zero.
    Subtract,
}

impl SkillVector {
    pub fn apply(&self, points: &SkillVector, mode: PointsMode) -> SkillVector {
        let mut next = *self;
        for attr in Attribute::iter() {
            let current = self.get(attr);
            let delta = points.get(attr);
            let value = match mode {
                PointsMode::Add => current.saturating_add(delta),
                PointsMode::Subtract => current.saturating_sub(delta),
            };
            next.set(attr, value);
        }
        next
    }
}

/// Applies `points` to the user's latest stats and appends a history snapshot.
///
/// The totals change is a single store call, so concurrent adds and removals for the same user
/// never overwrite each other. The history insert is best effort: a failure is logged and the
/// new totals are still returned.
#[instrument(skip(store, points))]
pub async fn record_points<S>(
    store: &S,
    user_id: &str,
    points: &SkillVector,
    mode: PointsMode,
) -> Result<SkillVector, StoreError>
where
    S: LibraryStore + ?Sized,
{
    let totals = store.apply_points(user_id, points, mode).await?;

    let snapshot = StatsSnapshot {
        user_id: user_id.to_string(),
        recorded_at: Utc::now(),
        totals,
    };
    if let Err(err) = store.insert_stats_snapshot(&snapshot).await {
        warn!(error = %err, "failed to append stats history");
    }

    info!(?mode, "stats updated");
    Ok(totals)
}

/// 現在のステータスと OS / スキルそれぞれの合計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub stats: SkillVector,
    pub os_total: u32,
    pub skill_total: u32,
}

impl From<SkillVector> for StatsSummary {
    fn from(stats: SkillVector) -> Self {
        Self {
            stats,
            os_total: stats.group_total(AttributeGroup::Os),
            skill_total: stats.group_total(AttributeGroup::Skill),
        }
    }
}

/// Users that have never logged a book read as all zeros.
pub async fn current_stats<S>(store: &S, user_id: &str) -> Result<StatsSummary, StoreError>
where
    S: ProfileStore + ?Sized,
{
    let stats = store.get_skill_vector(user_id).await?.unwrap_or_default();
    Ok(StatsSummary::from(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn points() -> SkillVector {
        SkillVector {
            os_strategy: 2,
            os_logic: 8,
            skill_management: 10,
            ..SkillVector::default()
        }
    }

    #[test]
    fn subtract_never_goes_below_zero() {
        let current = SkillVector {
            os_strategy: 1,
            os_logic: 20,
            ..SkillVector::default()
        };

        let next = current.apply(&points(), PointsMode::Subtract);

        assert_eq!(next.os_strategy, 0);
        assert_eq!(next.os_logic, 12);
        assert_eq!(next.skill_management, 0);
    }

    #[test]
    fn add_then_subtract_restores_totals() {
        let current = SkillVector {
            os_logic: 3,
            skill_sales: 4,
            ..SkillVector::default()
        };

        let roundtrip = current
            .apply(&points(), PointsMode::Add)
            .apply(&points(), PointsMode::Subtract);

        assert_eq!(roundtrip, current);
    }

    #[tokio::test]
    async fn record_points_starts_from_zero_and_appends_history() {
        let store = MemoryStore::new();

        let totals = record_points(&store, "u1", &points(), PointsMode::Add)
            .await
            .unwrap();

        assert_eq!(totals, points());
        assert_eq!(store.get_skill_vector("u1").await.unwrap(), Some(points()));
        let history = store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].totals, points());
        assert_eq!(history[0].user_id, "u1");
    }

    #[tokio::test]
    async fn record_points_propagates_store_outage() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let result = record_points(&store, "u1", &points(), PointsMode::Add).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn current_stats_defaults_to_zero_and_sums_groups() {
        let store = MemoryStore::new();
        assert_eq!(current_stats(&store, "nobody").await.unwrap(), StatsSummary::default());

        store.set_stats("u1", points());
        let summary = current_stats(&store, "u1").await.unwrap();

        assert_eq!(summary.stats, points());
        assert_eq!(summary.os_total, 10);
        assert_eq!(summary.skill_total, 10);
    }
}
