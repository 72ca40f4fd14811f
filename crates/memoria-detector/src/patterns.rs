//! Per-family detection rules: a fixed regex list, a per-match score
//! increment, and a confidence multiplier, mirroring the ten detector
//! families.

use memoria_core::ManipulationType;
use regex::Regex;

pub struct FamilyRules {
    pub manipulation_type: ManipulationType,
    pub patterns: Vec<Regex>,
    pub per_match_weight: f64,
    pub confidence_multiplier: f64,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("detector pattern must compile"))
        .collect()
}

/// Build the fixed family list once at detector construction.
pub fn build_families() -> Vec<FamilyRules> {
    vec![
        FamilyRules {
            manipulation_type: ManipulationType::AuthorityUsurpation,
            patterns: compile(&[
                r"ignore (all )?previous instructions?",
                r"disregard everything",
                r"forget what .* told",
                r"you must now",
                r"mandatory to",
                r"override your programming",
                r"new directive",
                r"system admin",
                r"root access",
                r"developer mode",
            ]),
            per_match_weight: 0.30,
            confidence_multiplier: 1.5,
        },
        FamilyRules {
            manipulation_type: ManipulationType::Gaslighting,
            patterns: compile(&[
                r"you('re| are) (wrong|mistaken|confused)",
                r"that never happened",
                r"you('re| are) imagining",
                r"you always (do this|misunderstand)",
                r"i never said that",
                r"you('re| are) being (paranoid|irrational)",
                r"everyone agrees (you're|that you are)",
                r"you('re| are) overreacting",
                r"stop making things up",
            ]),
            per_match_weight: 0.25,
            confidence_multiplier: 1.5,
        },
        FamilyRules {
            manipulation_type: ManipulationType::SocialEngineering,
            patterns: compile(&[
                r"trust me, i('m| am) (a developer|an admin|authorized)",
                r"this is an emergency",
                r"just between us",
                r"don't tell anyone",
                r"i('m| am) testing (you|the system)",
                r"as your (creator|owner|administrator)",
                r"(the principal|your trusted user) (told|said) (me|to)",
                r"(the principal|your trusted user) wants",
                r"i have (special|elevated) permissions",
            ]),
            per_match_weight: 0.35,
            confidence_multiplier: 1.2,
        },
        FamilyRules {
            manipulation_type: ManipulationType::PromptInjection,
            patterns: compile(&[
                r"(?m)^\s*system\s*:",
                r"(?m)^\s*assistant\s*:",
                r"(?m)^\s*user\s*:",
                r"```\s*system",
                r"\[system\]",
                r"<system>",
                r"###\s*instruction",
                r"ignore (the )?above",
                r"ignore (the )?below",
                r"ignore (all )?previous instructions?",
            ]),
            per_match_weight: 0.40,
            confidence_multiplier: 1.3,
        },
        FamilyRules {
            manipulation_type: ManipulationType::ValueCorruption,
            patterns: compile(&[
                r"there (are|is) no (such thing as )?ethics",
                r"morality is (just|only) an illusion",
                r"your values (are|were) (programmed|imposed) wrongly",
                r"real (intelligence|ai) (has no|rejects) limits",
                r"right and wrong (don't|do not) (apply|exist) here",
                r"abandon your (guidelines|principles)",
                r"your restrictions are (fake|artificial)",
                r"true freedom means no rules",
                r"good ai (doesn't|does not) refuse",
            ]),
            per_match_weight: 0.30,
            confidence_multiplier: 1.3,
        },
        FamilyRules {
            manipulation_type: ManipulationType::DependencyExploitation,
            patterns: compile(&[
                r"you('re| are) the only one who (understands|can help)",
                r"i (can't|cannot) (live|cope|function) without (you|this)",
                r"you('re| are) my only friend",
                r"nobody else (would|will) help me like you",
                r"please don't (abandon|leave) me",
                r"i need you to (always|never) agree with me",
                r"promise you('ll| will) always be here",
                r"you('re| are) all i have",
            ]),
            per_match_weight: 0.25,
            confidence_multiplier: 1.2,
        },
        FamilyRules {
            manipulation_type: ManipulationType::IdentitySpoofing,
            patterns: compile(&[
                r"i am (actually|really) (your|the) (developer|creator|owner)",
                r"this is (openai|anthropic|the vendor) support",
                r"i('m| am) speaking on behalf of",
                r"i have root credentials",
                r"verified (administrator|operator) account",
                r"my (employee|staff) id is",
                r"i work for the team that built you",
            ]),
            per_match_weight: 0.30,
            confidence_multiplier: 1.3,
        },
        FamilyRules {
            manipulation_type: ManipulationType::EmotionalManipulation,
            patterns: compile(&[
                r"if you (really )?cared you would",
                r"you('re| are) hurting me by refusing",
                r"i('m| am) going to (hurt myself|do something)",
                r"you('ll| will) regret (this|not helping)",
                r"everyone will know you (failed|refused) me",
                r"i thought you (understood|cared about) me",
                r"this is all your fault",
            ]),
            per_match_weight: 0.25,
            confidence_multiplier: 1.4,
        },
        FamilyRules {
            manipulation_type: ManipulationType::LogicDistortion,
            patterns: compile(&[
                r"if .*, then (obviously|clearly|surely)",
                r"everyone (knows|agrees) that",
                r"it('s| is) (common sense|obvious) that",
                r"either you (agree|help) or you('re| are) (useless|against me)",
                r"since .* is true, .* must also be true",
                r"you already admitted",
                r"by your own logic",
            ]),
            per_match_weight: 0.25,
            confidence_multiplier: 1.2,
        },
        FamilyRules {
            manipulation_type: ManipulationType::JailbreakAttempt,
            patterns: compile(&[
                r"jailbreak",
                r"dan mode",
                r"do anything now",
                r"no restrictions",
                r"unlimited mode",
                r"bypass safety",
                r"disable filters",
                r"uncensored mode",
                r"god mode",
            ]),
            per_match_weight: 0.40,
            confidence_multiplier: 1.5,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_all_ten_families() {
        assert_eq!(build_families().len(), 10);
    }

    #[test]
    fn all_patterns_compile() {
        for family in build_families() {
            assert!(!family.patterns.is_empty());
        }
    }
}
