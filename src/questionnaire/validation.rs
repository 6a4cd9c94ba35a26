//! Advisory validation. Warnings are shown to the visitor but never stop a
//! merge, a save, or navigation.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::answers::Answers;
use super::model::{CONTACT_STEP, ContactInfo, Question};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+\d{1,3}[- ]?)?\d{9,10}$").expect("valid phone regex"));

/// A missing or malformed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

impl ValidationWarning {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Phone numbers may use dashes between groups (`050-1234567`).
pub fn is_valid_phone(phone: &str) -> bool {
    let phone = phone.trim();
    let compact: String = phone.chars().filter(|c| *c != '-').collect();
    PHONE_RE.is_match(phone) || PHONE_RE.is_match(&compact)
}

/// Check one page's input.
pub fn check_step(step: u8, answers: &Answers, contact: &ContactInfo) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    match step {
        1 => require(answers, Question::YearsExperience, "Years of experience is required", &mut warnings),
        2 => require(answers, Question::Motivations, "Motivations are required", &mut warnings),
        3 => {
            if let Some(email) = answers
                .get(Question::ContactEmail)
                .and_then(|v| v.as_text())
                .filter(|s| !s.trim().is_empty())
                && !is_valid_email(email)
            {
                warnings.push(ValidationWarning::new(
                    Question::ContactEmail.as_str(),
                    "Email address is not valid",
                ));
            }
        }
        CONTACT_STEP => warnings.extend(check_contact(contact)),
        _ => {}
    }
    warnings
}

/// Check the contact page.
pub fn check_contact(contact: &ContactInfo) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if !contact.has_contact_method() {
        let msg = "Provide at least one contact method (email or phone)";
        warnings.push(ValidationWarning::new("email", msg));
        warnings.push(ValidationWarning::new("phone", msg));
    } else {
        if contact.email().is_some_and(|e| !is_valid_email(e)) {
            warnings.push(ValidationWarning::new("email", "Email address is not valid"));
        }
        if contact.phone().is_some_and(|p| !is_valid_phone(p)) {
            warnings.push(ValidationWarning::new("phone", "Phone number is not valid"));
        }
    }

    if !contact.agree_to_terms {
        warnings.push(ValidationWarning::new(
            "agreeToTerms",
            "The terms of use must be accepted to continue",
        ));
    }

    warnings
}

fn require(answers: &Answers, question: Question, message: &str, out: &mut Vec<ValidationWarning>) {
    if !answers.is_answered(question) {
        out.push(ValidationWarning::new(question.as_str(), message));
    }
}
