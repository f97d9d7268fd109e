use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::ActivityLog;

/// Deduplicated, case-sensitive tag set. Ordered so that iteration is deterministic.
pub type TagSet = BTreeSet<String>;

/// ユーザー1人分の読書ログからタグ集合を作る
pub fn aggregate_tags<'a, I>(logs: I) -> TagSet
where
    I: IntoIterator<Item = &'a ActivityLog>,
{
    logs.into_iter()
        .filter_map(|log| log.tags.as_ref())
        .flatten()
        .cloned()
        .collect()
}

/// Joins a batched log list (spanning many users) into one tag set per owner.
/// Users without any tagged log are absent from the map.
pub fn aggregate_tags_by_user<'a, I>(logs: I) -> HashMap<String, TagSet>
where
    I: IntoIterator<Item = &'a ActivityLog>,
{
    let mut by_user: HashMap<String, TagSet> = HashMap::new();

    for log in logs {
        let Some(tags) = log.tags.as_ref().filter(|tags| !tags.is_empty()) else {
            continue;
        };

        by_user
            .entry(log.user_id.clone())
            .or_default()
            .extend(tags.iter().cloned());
    }

    by_user
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFrequency {
    pub tag: String,
    pub count: usize,
}

/// Counts how many logs carry each tag, most frequent first (ties by tag name).
pub fn tag_frequencies<'a, I>(logs: I, limit: usize) -> Vec<TagFrequency>
where
    I: IntoIterator<Item = &'a ActivityLog>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in logs.into_iter().filter_map(|log| log.tags.as_ref()).flatten() {
        *counts.entry(tag.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<TagFrequency> = counts
        .into_iter()
        .map(|(tag, count)| TagFrequency {
            tag: tag.to_string(),
            count,
        })
        .collect();

    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    ranked.truncate(limit);
    ranked
}
