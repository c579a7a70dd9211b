//! Competition provider traits and implementations
//!
//! This module defines the interface for looking up competition types and
//! drawing tasks from their prompt pools, along with the static
//! implementation backed by configuration.

use crate::config::{time_limit_in_range, CompetitionSettings, MAX_TIME_LIMIT_SECONDS};
use crate::error::{ArenaError, Result};
use crate::types::Prompt;
use crate::utils::display_title;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// A task drawn from a prompt pool, ready to be stored on a match
#[derive(Debug, Clone, PartialEq)]
pub struct TaskAssignment {
    pub task_description: String,
    /// Full URL of the start article
    pub start_location: String,
    /// Target article title
    pub target: String,
    pub time_limit_seconds: u64,
}

impl TaskAssignment {
    /// Build the assignment for a prompt
    pub fn from_prompt(prompt: &Prompt, wiki_base_url: &str, time_limit_seconds: u64) -> Self {
        let start_title = display_title(&prompt.start_article);
        let start_path = if prompt.start_article.starts_with("/wiki/") {
            prompt.start_article.clone()
        } else {
            format!("/wiki/{}", prompt.start_article.replace(' ', "_"))
        };

        Self {
            task_description: format!(
                "Wikipedia Speedrun: Navigate from \"{}\" to \"{}\" by clicking article links only. \
                 No search, no back button.",
                start_title, prompt.target_article
            ),
            start_location: format!("{}{}", wiki_base_url.trim_end_matches('/'), start_path),
            target: prompt.target_article.clone(),
            time_limit_seconds,
        }
    }
}

/// Trait for providing competition types
pub trait CompetitionProvider: Send + Sync {
    /// Get an active competition by slug
    fn get_competition(&self, slug: &str) -> Result<CompetitionSettings>;

    /// Get all active competitions
    fn available_competitions(&self) -> Vec<CompetitionSettings>;

    /// Validate a competition definition
    fn validate_competition(&self, competition: &CompetitionSettings) -> Result<()>;

    /// Draw a task uniformly at random from the competition's prompt pool
    fn draw_task(&self, competition: &CompetitionSettings) -> Result<TaskAssignment>;
}

/// Competition provider backed by static configuration
#[derive(Debug, Clone)]
pub struct StaticCompetitionProvider {
    competitions: Vec<CompetitionSettings>,
    wiki_base_url: String,
}

impl StaticCompetitionProvider {
    /// Create a provider from configured competitions
    pub fn new(competitions: Vec<CompetitionSettings>, wiki_base_url: impl Into<String>) -> Result<Self> {
        let provider = Self {
            competitions,
            wiki_base_url: wiki_base_url.into(),
        };

        let mut seen = HashSet::new();
        for competition in &provider.competitions {
            provider.validate_competition(competition)?;
            if !seen.insert(competition.slug.as_str()) {
                return Err(ArenaError::Configuration {
                    message: format!("Duplicate competition slug '{}'", competition.slug),
                }
                .into());
            }
        }

        Ok(provider)
    }
}

impl Default for StaticCompetitionProvider {
    fn default() -> Self {
        Self {
            competitions: vec![CompetitionSettings::wikipedia_speedrun()],
            wiki_base_url: "https://en.wikipedia.org".to_string(),
        }
    }
}

impl CompetitionProvider for StaticCompetitionProvider {
    fn get_competition(&self, slug: &str) -> Result<CompetitionSettings> {
        self.competitions
            .iter()
            .find(|c| c.slug == slug && c.active)
            .cloned()
            .ok_or_else(|| {
                ArenaError::Validation {
                    reason: format!("Unknown or inactive competition type '{}'", slug),
                }
                .into()
            })
    }

    fn available_competitions(&self) -> Vec<CompetitionSettings> {
        self.competitions
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect()
    }

    fn validate_competition(&self, competition: &CompetitionSettings) -> Result<()> {
        if competition.slug.trim().is_empty() {
            return Err(ArenaError::Configuration {
                message: "Competition slug cannot be empty".to_string(),
            }
            .into());
        }

        if !time_limit_in_range(competition.time_limit_seconds) {
            return Err(ArenaError::Configuration {
                message: format!(
                    "Competition '{}' time limit must be between 1 and {} seconds",
                    competition.slug, MAX_TIME_LIMIT_SECONDS
                ),
            }
            .into());
        }

        if let Some(prompt) = competition
            .prompts
            .iter()
            .find(|p| p.start_article.trim().is_empty() || p.target_article.trim().is_empty())
        {
            return Err(ArenaError::Configuration {
                message: format!(
                    "Competition '{}' has an incomplete prompt: {:?}",
                    competition.slug, prompt
                ),
            }
            .into());
        }

        Ok(())
    }

    fn draw_task(&self, competition: &CompetitionSettings) -> Result<TaskAssignment> {
        let prompt = competition
            .prompts
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| ArenaError::Configuration {
                message: format!("Competition '{}' has no prompts", competition.slug),
            })?;

        Ok(TaskAssignment::from_prompt(
            prompt,
            &self.wiki_base_url,
            competition.time_limit_seconds,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_provider_has_speedrun() {
        let provider = StaticCompetitionProvider::default();
        let competitions = provider.available_competitions();
        assert_eq!(competitions.len(), 1);
        assert!(provider.get_competition("wikipedia-speedrun").is_ok());
    }

    #[test]
    fn test_unknown_and_inactive_rejected() {
        let mut inactive = CompetitionSettings::wikipedia_speedrun();
        inactive.slug = "retired".to_string();
        inactive.active = false;
        let provider = StaticCompetitionProvider::new(
            vec![CompetitionSettings::wikipedia_speedrun(), inactive],
            "https://en.wikipedia.org",
        )
        .unwrap();

        for slug in ["retired", "nope"] {
            let err = provider.get_competition(slug).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<ArenaError>(),
                Some(ArenaError::Validation { .. })
            ));
        }
        assert_eq!(provider.available_competitions().len(), 1);
    }

    #[test]
    fn test_duplicate_slugs_rejected() {
        let result = StaticCompetitionProvider::new(
            vec![
                CompetitionSettings::wikipedia_speedrun(),
                CompetitionSettings::wikipedia_speedrun(),
            ],
            "https://en.wikipedia.org",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_pool_is_configuration_error() {
        let provider = StaticCompetitionProvider::default();
        let mut competition = CompetitionSettings::wikipedia_speedrun();
        competition.prompts.clear();

        let err = provider.draw_task(&competition).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArenaError>(),
            Some(ArenaError::Configuration { .. })
        ));
    }

    #[test]
    fn test_draw_task_comes_from_pool() {
        let provider = StaticCompetitionProvider::default();
        let competition = CompetitionSettings::wikipedia_speedrun();
        let targets: Vec<&str> = competition
            .prompts
            .iter()
            .map(|p| p.target_article.as_str())
            .collect();

        for _ in 0..20 {
            let task = provider.draw_task(&competition).unwrap();
            assert!(targets.contains(&task.target.as_str()));
            assert_eq!(task.time_limit_seconds, 120);
        }
    }

    #[test]
    fn test_task_assignment_format() {
        let task = TaskAssignment::from_prompt(
            &Prompt {
                start_article: "/wiki/New_York_City".to_string(),
                target_article: "Jazz".to_string(),
            },
            "https://en.wikipedia.org/",
            90,
        );

        assert_eq!(
            task.task_description,
            "Wikipedia Speedrun: Navigate from \"New York City\" to \"Jazz\" by clicking \
             article links only. No search, no back button."
        );
        assert_eq!(
            task.start_location,
            "https://en.wikipedia.org/wiki/New_York_City"
        );
    }
}
