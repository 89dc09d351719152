//! Fact echo verification
//!
//! The model repeats the hard facts it relied on. An echo that disagrees
//! with the trusted value is a mutation; in strict mode, relying on a fact
//! without echoing it is an omission.

use super::types::{FactSet, GuardIssue, StructuredOutput};

pub fn check_facts(
    output: &StructuredOutput,
    facts: &FactSet,
    tolerance: f64,
    strict: bool,
) -> Vec<GuardIssue> {
    let speech = output.speech_content.to_lowercase();
    let mut issues = Vec::new();

    for fact in facts.iter() {
        let echoed = output.fact_echo.as_ref().and_then(|echo| {
            echo.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&fact.name))
                .map(|(_, value)| value)
        });

        match echoed {
            Some(claimed) if !fact.value.matches(claimed, tolerance) => {
                issues.push(GuardIssue::FactMutation {
                    fact: fact.name.clone(),
                    expected: fact.value.clone(),
                    claimed: claimed.clone(),
                });
            }
            Some(_) => {}
            None if strict && fact.cues.iter().any(|cue| speech.contains(cue.as_str())) => {
                issues.push(GuardIssue::FactOmission {
                    fact: fact.name.clone(),
                    expected: fact.value.clone(),
                });
            }
            None => {}
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> FactSet {
        FactSet::new().with("energy", 23.0, &["tired"])
    }

    #[test]
    fn test_matching_echo_passes() {
        let out = StructuredOutput::new("t", "My energy is 23.").with_fact("energy", 23.0);
        assert!(check_facts(&out, &facts(), 0.01, true).is_empty());

        let within = StructuredOutput::new("t", "s").with_fact("Energy", "23.004");
        assert!(check_facts(&within, &facts(), 0.01, false).is_empty());
    }

    #[test]
    fn test_mutation_detected() {
        let out = StructuredOutput::new("t", "I'm at 80 energy!").with_fact("energy", 80.0);
        let issues = check_facts(&out, &facts(), 0.01, false);
        assert_eq!(
            issues,
            vec![GuardIssue::FactMutation {
                fact: "energy".into(),
                expected: 23.0.into(),
                claimed: 80.0.into(),
            }]
        );
    }

    #[test]
    fn test_omission_only_in_strict_mode() {
        let out = StructuredOutput::new("t", "I feel so tired today");
        assert!(check_facts(&out, &facts(), 0.01, false).is_empty());
        assert!(matches!(
            check_facts(&out, &facts(), 0.01, true).as_slice(),
            [GuardIssue::FactOmission { .. }]
        ));

        let unrelated = StructuredOutput::new("t", "Nice weather");
        assert!(check_facts(&unrelated, &facts(), 0.01, true).is_empty());
    }
}
