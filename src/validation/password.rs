//! Password complexity evaluation.
//!
//! Five fixed criteria: total length, lowercase letters, uppercase letters,
//! digits, and special characters from a fixed set. Requirements express a
//! minimum count per criterion; a password passes when every criterion does.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LOWERCASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]").unwrap());
static UPPERCASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]").unwrap());
static NUMBERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]").unwrap());
static SPECIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[`~!@#$%^&*()_\-=+\\|{}\[\]'";:<.>/?,]"#).unwrap());

/// Minimum counts a password must meet. Absent keys default to 0, so an
/// empty requirements object accepts anything.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct PasswordRequirements {
    pub characters: u32,
    pub lowercase: u32,
    pub uppercase: u32,
    pub numbers: u32,
    pub special: u32,
}

/// Observed counts for the five fixed criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexityEvaluation {
    pub characters: u32,
    pub lowercase: u32,
    pub uppercase: u32,
    pub numbers: u32,
    pub special: u32,
}

/// One criterion's verdict, with a display-ready message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionOutcome {
    pub required_count: u32,
    pub actual_count: u32,
    pub valid: bool,
    pub message: String,
}

/// The full rules verdict. Serializes with camelCase keys so it can ride in
/// error `data` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordOutcome {
    pub characters: CriterionOutcome,
    pub lowercase: CriterionOutcome,
    pub uppercase: CriterionOutcome,
    pub numbers: CriterionOutcome,
    pub special: CriterionOutcome,
    pub is_valid: bool,
}

/// Count the five fixed criteria over `password`.
pub fn evaluate_complexity(password: &str) -> ComplexityEvaluation {
    ComplexityEvaluation {
        characters: password.chars().count() as u32,
        lowercase: LOWERCASE.find_iter(password).count() as u32,
        uppercase: UPPERCASE.find_iter(password).count() as u32,
        numbers: NUMBERS.find_iter(password).count() as u32,
        special: SPECIAL.find_iter(password).count() as u32,
    }
}

/// Compare an evaluation against required minimums, criterion by criterion.
pub fn password_rules(
    evaluation: &ComplexityEvaluation,
    requirements: &PasswordRequirements,
) -> PasswordOutcome {
    let characters = criterion(requirements.characters, evaluation.characters, "character(s)");
    let lowercase = criterion(
        requirements.lowercase,
        evaluation.lowercase,
        "lower-case character(s)",
    );
    let uppercase = criterion(
        requirements.uppercase,
        evaluation.uppercase,
        "upper-case character(s)",
    );
    let numbers = criterion(requirements.numbers, evaluation.numbers, "number(s)");
    let special = criterion(requirements.special, evaluation.special, "special character(s)");

    let is_valid = characters.valid
        && lowercase.valid
        && uppercase.valid
        && numbers.valid
        && special.valid;

    PasswordOutcome {
        characters,
        lowercase,
        uppercase,
        numbers,
        special,
        is_valid,
    }
}

/// Whether `password` meets `requirements`.
pub fn password(password: &str, requirements: &PasswordRequirements) -> bool {
    password_rules(&evaluate_complexity(password), requirements).is_valid
}

fn criterion(required: u32, actual: u32, description: &str) -> CriterionOutcome {
    CriterionOutcome {
        required_count: required,
        actual_count: actual,
        valid: actual >= required,
        message: format!("Requires at least {required} {description}."),
    }
}
