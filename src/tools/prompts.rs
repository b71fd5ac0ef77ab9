//! Prompt templates for the plan and review tools.

/// Join non-empty sections with newlines.
fn join_sections(sections: Vec<String>) -> String {
    sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn optional_section(title: &str, body: Option<&str>) -> String {
    match body.map(str::trim).filter(|b| !b.is_empty()) {
        Some(body) => format!("## {title}\n{body}\n"),
        None => String::new(),
    }
}

pub fn plan_prompt(
    language: &str,
    requirements: &str,
    plan: &str,
    constraints: Option<&str>,
) -> String {
    join_sections(vec![
        format!("Reply in {language}."),
        "## Requirements".to_string(),
        requirements.trim().to_string(),
        String::new(),
        optional_section("Constraints", constraints),
        "## Proposed plan".to_string(),
        plan.trim().to_string(),
    ])
}

pub fn review_prompt(
    language: &str,
    change_summary: &str,
    test_results: Option<&str>,
    open_questions: Option<&str>,
) -> String {
    join_sections(vec![
        format!("Reply in {language}."),
        "## Change summary".to_string(),
        change_summary.trim().to_string(),
        String::new(),
        optional_section("Test results", test_results),
        optional_section("Open questions", open_questions),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prompt() {
        assert_eq!(
            plan_prompt("English", " ship login \n", "1. add form", Some("no new deps")),
            "Reply in English.\n## Requirements\nship login\n## Constraints\nno new deps\n\n## Proposed plan\n1. add form"
        );
        assert_eq!(
            plan_prompt("Chinese", "r", "p", None),
            "Reply in Chinese.\n## Requirements\nr\n## Proposed plan\np"
        );
        assert_eq!(
            plan_prompt("Chinese", "r", "p", Some("   ")),
            plan_prompt("Chinese", "r", "p", None)
        );
    }

    #[test]
    fn test_review_prompt() {
        assert_eq!(
            review_prompt("Chinese", "renamed foo", Some("cargo test: ok"), Some("keep alias?")),
            "Reply in Chinese.\n## Change summary\nrenamed foo\n## Test results\ncargo test: ok\n\n## Open questions\nkeep alias?\n"
        );
        assert_eq!(
            review_prompt("Chinese", "renamed foo", None, None),
            "Reply in Chinese.\n## Change summary\nrenamed foo"
        );
        assert_eq!(
            review_prompt("Chinese", "renamed foo", Some(" \n "), Some("\t")),
            review_prompt("Chinese", "renamed foo", None, None)
        );
    }
}
