//! Conference name clean-up.
//!
//! Providers report proceedings titles ("2020 IEEE 42nd International Conference on
//! Software Engineering (ICSE)"); these rules reduce them to a stable venue name so the
//! same conference groups together across years.

use regex::Regex;
use std::sync::OnceLock;

const ORDINAL_WORDS: &str = r"(?i)(first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|eleventh|twelfth|thirteenth|fourteenth|fifteenth|sixteenth|seventeenth|eighteenth|nineteenth|twentieth|twenty|thirtieth|thirty|fortieth|forty|fiftieth|fifty|sixtieth|sixty)-?";

const IEEE_RULE_PATTERNS: &[(&str, &str)] = &[
    (r"[0-9]{4}", ""),
    (r"[0-9]{1,2}(nd|th|rd|st)", ""),
    (r"Proceedings?\.?( of)?( the)?", ""),
    (r"\bs ", ""),
    (r"[\[\]]", ""),
    (ORDINAL_WORDS, ""),
    (r"\(.*\)\s*$", ""),
    (r"^\s*Annual", ""),
    (r"(ACM/IEEE|IEEE/ACM|IEEE|ACM)", ""),
    (r"(?i)^\s*The ", ""),
];

const SPRINGER_RULE_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)proceedings of the", ""),
    (r"[0-9]{1,2}(nd|th|rd|st)", ""),
    (ORDINAL_WORDS, ""),
    ("\u{2014}", ""),
    ("\u{2013}", ""),
    (r"'\d{2}", ""),
    (r"\u{2019}[0-9]+", ""),
    (r"[0-9]{4}", ""),
    (r"(?i)Part (v|iv|iii|ii|i)\b", ""),
    (r"(?i)proceedings of", ""),
    (r"(?i)volume \d+", ""),
    (r"\s[,:]\s", " "),
    (r"\s+\)", ")"),
    (r" - ", " "),
];

static IEEE_RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
static SPRINGER_RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();

const WHITESPACE_PATTERN: &str = r"\s+";

fn compile(rules: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    rules
        .iter()
        .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
            Ok(re) => Some((re, *replacement)),
            Err(e) => {
                tracing::error!("Invalid venue pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
}

fn apply(rules: &[(Regex, &'static str)], input: &str) -> String {
    let mut out = input.to_string();
    for (re, replacement) in rules {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(WHITESPACE_PATTERN).ok());
    match whitespace {
        Some(re) => re.replace_all(&out, " ").trim().to_string(),
        None => out.trim().to_string(),
    }
}

/// Normalize an IEEE Xplore proceedings title
pub fn clean_ieee_venue(title: &str) -> String {
    let rules = IEEE_RULES.get_or_init(|| compile(IEEE_RULE_PATTERNS));
    apply(rules, title)
}

/// Normalize a Springer proceedings title
pub fn clean_springer_venue(title: &str) -> String {
    let rules = SPRINGER_RULES.get_or_init(|| compile(SPRINGER_RULE_PATTERNS));
    apply(rules, title)
}
