//! Best-effort classification probes run after a successful answer.

use serde::Serialize;

use parley_config::schema::FollowUpConfig;

/// Optional action offered next to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FollowUp {
    ValidateCode { language: String },
    OpenCompanion { name: String },
}

impl std::fmt::Display for FollowUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ValidateCode { language } => write!(f, "Validate {language} code"),
            Self::OpenCompanion { name } => write!(f, "Open in {name}"),
        }
    }
}

/// A yes/no question about the last exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUpProbe {
    /// Does the answer contain code in this language?
    CodeLanguage(String),
    /// Does the prompt mention this companion application?
    CompanionApp(String),
}

impl FollowUpProbe {
    /// Probes in the order they run: code languages, then companion apps.
    pub fn from_config(config: &FollowUpConfig) -> Vec<Self> {
        if !config.enabled {
            return Vec::new();
        }
        config
            .code_languages
            .iter()
            .map(|lang| Self::CodeLanguage(lang.clone()))
            .chain(
                config
                    .companion_apps
                    .iter()
                    .map(|name| Self::CompanionApp(name.clone())),
            )
            .collect()
    }

    pub fn question(&self, prompt: &str, answer: &str) -> String {
        match self {
            Self::CodeLanguage(lang) => format!(
                "Answer with a single word, yes or no. \
                 Does the following response contain {lang} code?\n\n{answer}"
            ),
            Self::CompanionApp(name) => format!(
                "Answer with a single word, yes or no. \
                 Does the following request refer to {name}?\n\n{prompt}"
            ),
        }
    }

    pub fn follow_up(&self) -> FollowUp {
        match self {
            Self::CodeLanguage(language) => FollowUp::ValidateCode {
                language: language.clone(),
            },
            Self::CompanionApp(name) => FollowUp::OpenCompanion { name: name.clone() },
        }
    }

    /// The follow-up to offer for a probe answer, if it was a yes.
    pub fn interpret(&self, answer: &str) -> Option<FollowUp> {
        is_affirmative(answer).then(|| self.follow_up())
    }
}

/// True when the first word of `answer` is "yes".
pub fn is_affirmative(answer: &str) -> bool {
    answer
        .split(|c: char| !c.is_alphanumeric())
        .find(|word| !word.is_empty())
        .is_some_and(|word| word.eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_follow_config_order() {
        let config = FollowUpConfig {
            code_languages: vec!["python".into(), "rust".into()],
            companion_apps: vec!["Blender".into()],
            ..FollowUpConfig::default()
        };
        assert_eq!(
            FollowUpProbe::from_config(&config),
            vec![
                FollowUpProbe::CodeLanguage("python".into()),
                FollowUpProbe::CodeLanguage("rust".into()),
                FollowUpProbe::CompanionApp("Blender".into()),
            ]
        );
    }

    #[test]
    fn disabled_config_has_no_probes() {
        let config = FollowUpConfig {
            enabled: false,
            code_languages: vec!["python".into()],
            ..FollowUpConfig::default()
        };
        assert!(FollowUpProbe::from_config(&config).is_empty());
    }

    #[test]
    fn code_probe_asks_about_the_answer() {
        let q = FollowUpProbe::CodeLanguage("python".into()).question("the prompt", "the answer");
        assert!(q.contains("python code"));
        assert!(q.ends_with("the answer"));
        assert!(!q.contains("the prompt"));
    }

    #[test]
    fn companion_probe_asks_about_the_prompt() {
        let q = FollowUpProbe::CompanionApp("Blender".into()).question("the prompt", "the answer");
        assert!(q.contains("Blender"));
        assert!(q.ends_with("the prompt"));
    }

    #[test]
    fn affirmative_answers() {
        for yes in ["yes", "Yes.", "  YES, it does", "**Yes**"] {
            assert!(is_affirmative(yes), "{yes:?}");
        }
        for no in ["no", "", "Not really, yes-ish", "yesterday", "maybe"] {
            assert!(!is_affirmative(no), "{no:?}");
        }
    }

    #[test]
    fn interpret_maps_yes_to_follow_up() {
        let probe = FollowUpProbe::CodeLanguage("rust".into());
        assert_eq!(
            probe.interpret("Yes"),
            Some(FollowUp::ValidateCode {
                language: "rust".into()
            })
        );
        assert_eq!(probe.interpret("No"), None);
    }
}
