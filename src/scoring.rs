//! Heuristic subject line scoring. Pure functions, no I/O.

use crate::models::Industry;

const BASE_SCORE: i32 = 50;

const URGENCY_WORDS: &[&str] = &["now", "today", "limited", "exclusive", "urgent", "act fast"];
const ACTION_WORDS: &[&str] = &["get", "grab", "claim", "unlock", "discover", "try", "start"];
const OVERUSED_PHRASES: &[&str] = &["click here", "don't miss", "act now", "limited time"];
// "hurry" is flagged as an issue but does not lower the score.
const OVERUSED_ISSUE_PHRASES: &[&str] = &["click here", "don't miss", "act now", "limited time", "hurry"];
const GENERIC_WORDS: &[&str] = &["amazing", "incredible", "fantastic", "awesome", "great"];
const PERSONAL_WORDS: &[&str] = &["you", "your", "personalized", "custom"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(&n.to_lowercase()))
}

/// Scores a subject line from 0 to 100.
pub fn calculate_score(subject: &str, industry: Industry) -> u8 {
    let lower = subject.to_lowercase();
    let len = subject.chars().count();
    let mut score = BASE_SCORE;

    // optimal length is 30-50 characters
    if len < 30 {
        score += 10;
    } else if len > 50 {
        score -= 10;
    }

    if contains_any(&lower, industry.keywords()) {
        score += 15;
    }
    if contains_any(&lower, URGENCY_WORDS) {
        score += 10;
    }
    if contains_any(&lower, ACTION_WORDS) {
        score += 10;
    }
    if contains_any(&lower, OVERUSED_PHRASES) {
        score -= 20;
    }

    score.clamp(0, 100) as u8
}

/// Lists the problems found in a subject line, in a stable order.
pub fn identify_issues(subject: &str, _industry: Industry) -> Vec<String> {
    let lower = subject.to_lowercase();
    let len = subject.chars().count();
    let mut issues = Vec::new();

    if len < 20 {
        issues.push("too short");
    }
    if len > 60 {
        issues.push("too long");
    }
    if !(30..=50).contains(&len) {
        issues.push("suboptimal length");
    }
    if contains_any(&lower, OVERUSED_ISSUE_PHRASES) {
        issues.push("overused phrase");
    }
    if contains_any(&lower, GENERIC_WORDS) {
        issues.push("too generic");
    }
    if !contains_any(&lower, PERSONAL_WORDS) {
        issues.push("lacks personalization");
    }

    issues.into_iter().map(String::from).collect()
}
