//! Placeholder token resolution
//!
//! Tokens look like `[ProfName]` and are matched case-insensitively. Unknown
//! tokens are left exactly as written, since templates may use literal brackets.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::core::models::Contact;

static TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();

fn token_pattern() -> &'static Regex {
    TOKEN_PATTERN.get_or_init(|| Regex::new(r"\[([A-Za-z0-9_]+)\]").expect("valid token regex"))
}

/// Map of lowercase token name to contact value. Missing fields map to "".
pub fn contact_placeholders(contact: &Contact) -> HashMap<&'static str, String> {
    let research = contact.research_interest.clone().unwrap_or_default();

    HashMap::from([
        ("profname", contact.name.clone()),
        ("professorname", contact.name.clone()),
        ("name", contact.name.clone()),
        ("email", contact.email.clone()),
        ("university", contact.university.clone()),
        ("department", contact.department.clone().unwrap_or_default()),
        ("researchinterest", research.clone()),
        ("researchtopic", research),
        ("website", contact.website.clone().unwrap_or_default()),
    ])
}

/// Replace every known token in `text`
pub fn replace_placeholders(text: &str, values: &HashMap<&'static str, String>) -> String {
    token_pattern()
        .replace_all(text, |caps: &Captures| {
            let key = caps[1].to_lowercase();
            match values.get(key.as_str()) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Distinct token names used in `text`, in order of first appearance
pub fn extract_placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in token_pattern().captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ContactStatus;

    fn contact(name: &str, university: &str) -> Contact {
        Contact {
            id: 1,
            name: name.to_string(),
            email: "smith@mit.edu".to_string(),
            university: university.to_string(),
            department: None,
            research_interest: Some("robotics".to_string()),
            website: None,
            status: ContactStatus::New,
            last_contacted_at: None,
            follow_up_at: None,
            reply_received_at: None,
        }
    }

    #[test]
    fn test_basic_substitution() {
        let values = contact_placeholders(&contact("Smith", "MIT"));
        assert_eq!(
            replace_placeholders("Dear [ProfName], re: [University]", &values),
            "Dear Smith, re: MIT"
        );
    }

    #[test]
    fn test_case_insensitive_tokens() {
        let values = contact_placeholders(&contact("Smith", "MIT"));
        assert_eq!(
            replace_placeholders("[profname] / [UNIVERSITY] / [ResearchTopic]", &values),
            "Smith / MIT / robotics"
        );
    }

    #[test]
    fn test_missing_fields_become_empty() {
        let values = contact_placeholders(&contact("Smith", "MIT"));
        assert_eq!(
            replace_placeholders("Dept: [Department]; site: [Website].", &values),
            "Dept: ; site: ."
        );
    }

    #[test]
    fn test_unknown_tokens_left_verbatim() {
        let values = contact_placeholders(&contact("Smith", "MIT"));
        assert_eq!(
            replace_placeholders("[Greeting] [ProfName], see [1] and [ yes ]", &values),
            "[Greeting] Smith, see [1] and [ yes ]"
        );
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let values = contact_placeholders(&contact("[University]", "MIT"));
        assert_eq!(replace_placeholders("Hi [Name]", &values), "Hi [University]");
    }

    #[test]
    fn test_extract_placeholders() {
        let names = extract_placeholders("[ProfName] at [University], [ProfName] again [Custom_1]");
        assert_eq!(names, vec!["ProfName", "University", "Custom_1"]);
        assert!(extract_placeholders("no tokens here").is_empty());
    }
}
