// src/core/redact.rs

use crate::constants::REDACT_MASK;
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

/// One kind of sensitive value and how to recognise it.
struct Detector {
    name: &'static str,
    pattern: Regex,
}

macro_rules! detector {
    ($name:expr, $pattern:expr) => {
        Detector {
            name: $name,
            pattern: Regex::new($pattern).expect("detector pattern is a valid regex"),
        }
    };
}

lazy_static! {
    static ref DETECTORS: Vec<Detector> = vec![
        detector!("jwt", r"\beyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+"),
        detector!("openai-key", r"\bsk-(?:proj-)?[A-Za-z0-9_-]{20,}"),
        detector!("github-token", r"\b(?:gh[pousr]_[A-Za-z0-9]{36,}|github_pat_[A-Za-z0-9_]{22,})"),
        detector!("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
        detector!("phone", r"\b\d{3}-\d{7,11}\b|\(\d{3}\)\s?\d{3}-\d{4}\b|\+\d{1,3}[ -]\d{3}[ -]\d{3,4}[ -]\d{4}\b"),
    ];
}

/// Replaces every recognised secret or personal value with the fixed mask.
/// Everything outside a matched span is left byte-for-byte intact.
pub fn redact(input: &str) -> String {
    let mut current = Cow::Borrowed(input);
    for detector in DETECTORS.iter() {
        if let Cow::Owned(replaced) = detector.pattern.replace_all(&current, REDACT_MASK) {
            log::trace!("Redacted {} values", detector.name);
            current = Cow::Owned(replaced);
        }
    }
    current.into_owned()
}
