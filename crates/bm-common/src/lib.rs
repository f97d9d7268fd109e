pub mod analysis;
pub mod api;
pub mod library;
pub mod logging;
pub mod matching;
pub mod profile;
pub mod queue;
pub mod run_id;
pub mod stats;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, IntoEnumIterator};

// Commonly used data models for matching and library functions.

/// Profile row as owned by the backing store. Read-only to the matching engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_ref: Option<String>,
    pub career: Option<String>,
    pub education: Option<String>,
    pub is_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeGroup {
    Os,
    Skill,
}

/// The ten counters of a [`SkillVector`]. `as_ref()` yields the storage column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Attribute {
    OsStrategy,
    OsExecution,
    OsLogic,
    OsHumanity,
    OsLiberalArts,
    SkillSales,
    SkillMarketing,
    SkillTechnology,
    SkillFinance,
    SkillManagement,
}

impl Attribute {
    pub fn group(self) -> AttributeGroup {
        match self {
            Attribute::OsStrategy
            | Attribute::OsExecution
            | Attribute::OsLogic
            | Attribute::OsHumanity
            | Attribute::OsLiberalArts => AttributeGroup::Os,
            _ => AttributeGroup::Skill,
        }
    }

    pub fn in_group(group: AttributeGroup) -> impl Iterator<Item = Attribute> {
        Attribute::iter().filter(move |attr| attr.group() == group)
    }
}

/// Per-user competency counters. Also used as the point delta a single book grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillVector {
    pub os_strategy: u32,
    pub os_execution: u32,
    pub os_logic: u32,
    pub os_humanity: u32,
    pub os_liberal_arts: u32,
    pub skill_sales: u32,
    pub skill_marketing: u32,
    pub skill_technology: u32,
    pub skill_finance: u32,
    pub skill_management: u32,
}

impl SkillVector {
    pub fn get(&self, attr: Attribute) -> u32 {
        match attr {
            Attribute::OsStrategy => self.os_strategy,
            Attribute::OsExecution => self.os_execution,
            Attribute::OsLogic => self.os_logic,
            Attribute::OsHumanity => self.os_humanity,
            Attribute::OsLiberalArts => self.os_liberal_arts,
            Attribute::SkillSales => self.skill_sales,
            Attribute::SkillMarketing => self.skill_marketing,
            Attribute::SkillTechnology => self.skill_technology,
            Attribute::SkillFinance => self.skill_finance,
            Attribute::SkillManagement => self.skill_management,
        }
    }

    pub fn set(&mut self, attr: Attribute, value: u32) {
        let slot = match attr {
            Attribute::OsStrategy => &mut self.os_strategy,
            Attribute::OsExecution => &mut self.os_execution,
            Attribute::OsLogic => &mut self.os_logic,
            Attribute::OsHumanity => &mut self.os_humanity,
            Attribute::OsLiberalArts => &mut self.os_liberal_arts,
            Attribute::SkillSales => &mut self.skill_sales,
            Attribute::SkillMarketing => &mut self.skill_marketing,
            Attribute::SkillTechnology => &mut self.skill_technology,
            Attribute::SkillFinance => &mut self.skill_finance,
            Attribute::SkillManagement => &mut self.skill_management,
        };
        *slot = value;
    }

    pub fn is_zero(&self) -> bool {
        Attribute::iter().all(|attr| self.get(attr) == 0)
    }

    pub fn group_total(&self, group: AttributeGroup) -> u32 {
        Attribute::in_group(group).fold(0u32, |acc, attr| acc.saturating_add(self.get(attr)))
    }
}

/// One logged book. `gained_points` is the delta the book added to the owner's stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: String,
    pub user_id: String,
    pub book_title: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub gained_points: SkillVector,
    pub memo: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new [`ActivityLog`]; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewActivityLog {
    pub user_id: String,
    pub book_title: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub gained_points: SkillVector,
    pub memo: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_split_into_two_groups_of_five() {
        assert_eq!(Attribute::in_group(AttributeGroup::Os).count(), 5);
        assert_eq!(Attribute::in_group(AttributeGroup::Skill).count(), 5);
    }

    #[test]
    fn attribute_names_match_storage_columns() {
        assert_eq!(Attribute::OsLiberalArts.as_ref(), "os_liberal_arts");
        assert_eq!(Attribute::SkillManagement.as_ref(), "skill_management");
    }

    #[test]
    fn set_then_get_touches_only_one_counter() {
        let mut vector = SkillVector::default();
        vector.set(Attribute::SkillFinance, 7);

        assert_eq!(vector.get(Attribute::SkillFinance), 7);
        assert_eq!(
            Attribute::iter().map(|attr| vector.get(attr)).sum::<u32>(),
            7
        );
        assert!(!vector.is_zero());
    }

    #[test]
    fn group_totals_sum_only_their_own_counters() {
        let vector = SkillVector {
            os_strategy: 2,
            os_liberal_arts: 3,
            skill_sales: 10,
            ..SkillVector::default()
        };

        assert_eq!(vector.group_total(AttributeGroup::Os), 5);
        assert_eq!(vector.group_total(AttributeGroup::Skill), 10);
    }

    #[test]
    fn missing_fields_deserialize_as_zero() {
        let vector: SkillVector = serde_json::from_str(r#"{"os_logic": 8}"#).unwrap();
        assert_eq!(vector.os_logic, 8);
        assert_eq!(vector.skill_sales, 0);
    }
}
