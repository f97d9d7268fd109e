pub mod pipeline;
pub mod ranking;
pub mod similarity;
pub mod tags;

pub use pipeline::{MatchError, MatchingConfig, MatchingEngine};
pub use ranking::{RankedCandidate, compare_candidates, rank_candidates, similarity_percent};
pub use similarity::{Candidate, UNKNOWN_DIFF, build_candidate, common_tags, score_pair};
pub use tags::{TagFrequency, TagSet, aggregate_tags, aggregate_tags_by_user, tag_frequencies};
