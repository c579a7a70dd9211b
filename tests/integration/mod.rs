//! Integration scenarios grouped by area

mod match_lifecycle;
mod verdicts;
