//! Competition type configuration

use crate::types::Prompt;
use serde::{Deserialize, Serialize};

/// A competition type and its prompt pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionSettings {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub time_limit_seconds: u64,
    pub prompts: Vec<Prompt>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Longest timed window a match may run, one day
pub const MAX_TIME_LIMIT_SECONDS: u64 = 86_400;

fn default_active() -> bool {
    true
}

/// Whether a time limit lies within `1..=MAX_TIME_LIMIT_SECONDS`
pub fn time_limit_in_range(seconds: u64) -> bool {
    (1..=MAX_TIME_LIMIT_SECONDS).contains(&seconds)
}

impl CompetitionSettings {
    /// The stock speedrun: short hops that are one or two clicks away
    pub fn wikipedia_speedrun() -> Self {
        let prompt = |start: &str, target: &str| Prompt {
            start_article: start.to_string(),
            target_article: target.to_string(),
        };

        Self {
            slug: "wikipedia-speedrun".to_string(),
            name: "Wikipedia Speedrun".to_string(),
            description: "Race between two Wikipedia articles by clicking links only. \
                          First agent to reach the target wins."
                .to_string(),
            time_limit_seconds: 120,
            prompts: vec![
                prompt("/wiki/Science", "Physics"),
                prompt("/wiki/Europe", "Germany"),
                prompt("/wiki/Music", "Jazz"),
            ],
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_speedrun_has_prompts() {
        let settings = CompetitionSettings::wikipedia_speedrun();
        assert_eq!(settings.slug, "wikipedia-speedrun");
        assert_eq!(settings.prompts.len(), 3);
        assert!(settings.active);
    }

    #[test]
    fn test_active_defaults_to_true_in_toml() {
        let settings: CompetitionSettings = toml::from_str(
            r#"
            slug = "quick"
            name = "Quick"
            description = "Short hops"
            time_limit_seconds = 60
            prompts = [{ start_article = "/wiki/Cat", target_article = "Mammal" }]
            "#,
        )
        .unwrap();

        assert!(settings.active);
        assert_eq!(settings.prompts[0].target_article, "Mammal");
    }
}
