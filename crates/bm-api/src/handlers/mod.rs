pub mod books;
pub mod health;
pub mod matches;
pub mod profiles;
pub mod queue;
pub mod stats;
pub mod tags;
