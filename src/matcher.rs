use crate::config::MatchConfig;
use regex::Regex;
use std::sync::OnceLock;

/// Every daily summary carries this marker, whatever the configured keywords.
pub const BASE_KEYWORD: &str = "業務連絡";

const DEADLINE_WORDS: [&str; 5] = ["締切", "〆切", "締め切り", "締め切", "期限"];

fn date_like() -> &'static Regex {
    static DATE_LIKE: OnceLock<Regex> = OnceLock::new();
    DATE_LIKE.get_or_init(|| {
        Regex::new(r"\d{1,2}/\d{1,2}|\d{1,2}月\d{1,2}日").expect("date pattern is valid")
    })
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

/// Strip zero-width characters, unify newlines and trim.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !is_zero_width(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// A deadline word or a date such as `2/10` or `2月10日`.
///
/// Posts often say "2/10〆切" without "today", so the date itself is
/// checked against today by the notifier.
fn mentions_deadline(text: &str) -> bool {
    DEADLINE_WORDS.iter().any(|w| text.contains(w)) || date_like().is_match(text)
}

/// Whether `text` looks like the daily goods-deadline summary.
///
/// Fixed rules: the [`BASE_KEYWORD`] marker and a deadline mention. The
/// configured keywords add to those: every `keywords_all` entry, and one of
/// `keywords_any` when that list is not empty. Time-of-day rules are applied
/// by the notifier.
pub fn is_candidate(text: &str, cfg: &MatchConfig) -> bool {
    let text = normalize_text(text);
    if text.is_empty() || !text.contains(BASE_KEYWORD) {
        return false;
    }

    let all_present = cfg.keywords_all.iter().all(|w| text.contains(w.as_str()));
    let any_present =
        cfg.keywords_any.is_empty() || cfg.keywords_any.iter().any(|w| text.contains(w.as_str()));

    all_present && any_present && mentions_deadline(&text)
}
