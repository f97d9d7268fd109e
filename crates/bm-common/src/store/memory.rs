use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{LibraryStore, ProfileStore, StatsSnapshot, StoreError};
use crate::stats::PointsMode;
use crate::{ActivityLog, NewActivityLog, SkillVector, UserProfile};

#[derive(Default)]
struct Tables {
    profiles: Vec<UserProfile>,
    stats: HashMap<String, SkillVector>,
    logs: Vec<ActivityLog>,
    history: Vec<StatsSnapshot>,
    follows: HashSet<(String, String)>,
}

/// In-process store used by tests and local demos.
///
/// Every trait call counts as one round trip (see [`MemoryStore::call_count`]), and
/// [`MemoryStore::set_unavailable`] makes every call fail as if the backend were down.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
    next_log_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: UserProfile) {
        if let Ok(mut tables) = self.tables.write() {
            tables.profiles.retain(|existing| existing.id != profile.id);
            tables.profiles.push(profile);
        }
    }

    pub fn set_stats(&self, user_id: &str, stats: SkillVector) {
        if let Ok(mut tables) = self.tables.write() {
            tables.stats.insert(user_id.to_string(), stats);
        }
    }

    pub fn push_log(&self, log: ActivityLog) {
        if let Ok(mut tables) = self.tables.write() {
            tables.logs.push(log);
        }
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.profiles.iter().find(|p| p.id == user_id).cloned())
    }

    pub fn logs(&self) -> Vec<ActivityLog> {
        self.tables
            .read()
            .map(|tables| tables.logs.clone())
            .unwrap_or_default()
    }

    pub fn history(&self) -> Vec<StatsSnapshot> {
        self.tables
            .read()
            .map(|tables| tables.history.clone())
            .unwrap_or_default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_call_count(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.enter()?;
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.enter()?;
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let tables = self.read()?;
        Ok(tables.profiles.iter().find(|p| p.id == user_id).cloned())
    }

    async fn list_visible_profiles(
        &self,
        excluding: &str,
        limit: usize,
    ) -> Result<Vec<UserProfile>, StoreError> {
        let tables = self.read()?;
        let mut visible: Vec<UserProfile> = tables
            .profiles
            .iter()
            .filter(|p| p.is_visible && p.id != excluding)
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.id.cmp(&b.id));
        visible.truncate(limit);
        Ok(visible)
    }

    async fn get_skill_vector(&self, user_id: &str) -> Result<Option<SkillVector>, StoreError> {
        let tables = self.read()?;
        Ok(tables.stats.get(user_id).copied())
    }

    async fn get_skill_vectors(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, SkillVector>, StoreError> {
        let tables = self.read()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.stats.get(id).map(|stats| (id.clone(), *stats)))
            .collect())
    }

    async fn get_activity_logs(&self, user_id: &str) -> Result<Vec<ActivityLog>, StoreError> {
        let tables = self.read()?;
        // 挿入順の逆 = 新しい順（created_at が同時刻でも安定）
        Ok(tables
            .logs
            .iter()
            .rev()
            .filter(|log| log.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_activity_logs_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<ActivityLog>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .logs
            .iter()
            .filter(|log| user_ids.contains(&log.user_id))
            .cloned()
            .collect())
    }

    async fn follower_count(&self, user_id: &str) -> Result<u64, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .follows
            .iter()
            .filter(|(_, following)| following == user_id)
            .count() as u64)
    }

    async fn is_following(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<bool, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .follows
            .contains(&(follower_id.to_string(), following_id.to_string())))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter()
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn insert_activity_log(&self, log: &NewActivityLog) -> Result<ActivityLog, StoreError> {
        let mut tables = self.write()?;
        let id = self.next_log_id.fetch_add(1, Ordering::SeqCst) + 1;

        let stored = ActivityLog {
            id: format!("log-{id}"),
            user_id: log.user_id.clone(),
            book_title: log.book_title.clone(),
            author: log.author.clone(),
            summary: log.summary.clone(),
            tags: Some(log.tags.clone()),
            gained_points: log.gained_points,
            memo: log.memo.clone(),
            created_at: Some(Utc::now()),
        };
        tables.logs.push(stored.clone());
        Ok(stored)
    }

    async fn get_activity_log(&self, log_id: &str) -> Result<Option<ActivityLog>, StoreError> {
        let tables = self.read()?;
        Ok(tables.logs.iter().find(|log| log.id == log_id).cloned())
    }

    async fn update_activity_log(
        &self,
        log: &ActivityLog,
    ) -> Result<Option<ActivityLog>, StoreError> {
        let mut tables = self.write()?;
        let Some(stored) = tables.logs.iter_mut().find(|stored| stored.id == log.id) else {
            return Ok(None);
        };
        stored.book_title = log.book_title.clone();
        stored.author = log.author.clone();
        stored.summary = log.summary.clone();
        stored.tags = log.tags.clone();
        stored.memo = log.memo.clone();
        Ok(Some(stored.clone()))
    }

    async fn delete_activity_log(&self, log_id: &str) -> Result<Option<ActivityLog>, StoreError> {
        let mut tables = self.write()?;
        let position = tables.logs.iter().position(|log| log.id == log_id);
        Ok(position.map(|index| tables.logs.remove(index)))
    }

    async fn apply_points(
        &self,
        user_id: &str,
        points: &SkillVector,
        mode: PointsMode,
    ) -> Result<SkillVector, StoreError> {
        let mut tables = self.write()?;
        let current = tables.stats.get(user_id).copied().unwrap_or_default();
        let totals = current.apply(points, mode);
        tables.stats.insert(user_id.to_string(), totals);
        Ok(totals)
    }

    async fn insert_stats_snapshot(&self, snapshot: &StatsSnapshot) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables.history.push(snapshot.clone());
        Ok(())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError> {
        let mut tables = self.write()?;
        tables.profiles.retain(|existing| existing.id != profile.id);
        tables.profiles.push(profile.clone());
        Ok(profile.clone())
    }

    async fn follow(&self, follower_id: &str, following_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        Ok(tables
            .follows
            .insert((follower_id.to_string(), following_id.to_string())))
    }

    async fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        Ok(tables
            .follows
            .remove(&(follower_id.to_string(), following_id.to_string())))
    }
}
