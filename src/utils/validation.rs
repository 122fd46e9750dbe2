use validator::ValidationErrors;

/// Trimmed, lower-cased form used as the OTP and contact key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The same rule `#[validate(email)]` applies to the contact form.
pub fn validate_email(email: &str) -> bool {
    validator::validate_email(email)
}

/// Literal, case-insensitive match pattern for user supplied search text.
pub fn search_pattern(search: &str) -> Option<String> {
    let search = search.trim();
    if search.is_empty() {
        None
    } else {
        Some(regex::escape(search))
    }
}

/// Flattens `validator` output into one message per failed rule, sorted by field.
pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn email_format() {
        assert!(validate_email("someone@example.com"));
        assert!(validate_email("first.last+tag@sub.example.io"));
        assert!(!validate_email("someone@"));
        assert!(!validate_email("no-at-sign.com"));
        assert!(!validate_email(""));
    }

    #[test]
    fn otp_and_form_agree_on_email() {
        use crate::models::SubmitContactDto;
        use validator::Validate;

        for email in ["a@localhost", "a@-x.com", "ada@example.com", "a@b", "@example.com"] {
            let form = SubmitContactDto {
                name: "Ada".to_string(),
                email: email.to_string(),
                otp: String::new(),
                subject: "Project inquiry".to_string(),
                message: "I would love to work with you.".to_string(),
            };
            assert_eq!(validate_email(email), form.validate().is_ok(), "{email}");
        }
    }

    #[test]
    fn search_text_is_escaped() {
        assert_eq!(search_pattern("a.b*"), Some(r"a\.b\*".to_string()));
        assert_eq!(search_pattern("   "), None);
    }
}
