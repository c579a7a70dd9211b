//! Concurrency stress tests

mod concurrent_races;
