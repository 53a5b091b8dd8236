// Evidence triage - bounded truncation and relevance ranking
// Pure functions, no shared state

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path};

/// Keywords that mark a log line as worth preserving during truncation.
pub const DEFAULT_PRESERVE_KEYWORDS: &[&str] = &[
    "error", "fail", "exception", "traceback", "warn",
    "assert", "panic", "fatal", "critical", "denied",
];

/// Test-result vocabulary used when correlating evidence with test files.
const TEST_RESULT_KEYWORDS: &[&str] = &["pass", "fail", "error", "assert", "test"];

/// Compress oversized evidence text to roughly `max_lines` lines.
///
/// Content at or below the budget is returned unchanged. Otherwise lines
/// containing any of the keywords are kept (up to a third of the budget),
/// annotated with their original 1-based line numbers, followed by the
/// literal tail of the content (half the budget). A banner states the
/// original and resulting line counts. Deterministic for identical input.
pub fn compress(content: &str, max_lines: usize, keywords: &[&str]) -> String {
    let lines: Vec<&str> = content.split('\n').collect();

    if lines.len() <= max_lines {
        return content.to_string();
    }

    let keywords_lower: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut important: Vec<(usize, &str)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let line_lower = line.to_lowercase();
        if keywords_lower.iter().any(|kw| line_lower.contains(kw.as_str())) {
            important.push((i, line));
        }
    }

    // The most recent output usually carries the decisive result.
    let tail_start = lines.len().saturating_sub(max_lines / 2);
    let tail = &lines[tail_start..];

    let mut result_lines: Vec<String> = Vec::new();
    let mut seen: HashSet<usize> = HashSet::new();

    for &(i, line) in important.iter().take(max_lines / 3) {
        if seen.insert(i) {
            result_lines.push(format!("[line {}] {}", i + 1, line));
        }
    }

    if !important.is_empty() {
        let omitted = lines
            .len()
            .saturating_sub(result_lines.len() + tail.len());
        result_lines.push("...".to_string());
        result_lines.push(format!("[... {} lines omitted ...]", omitted));
        result_lines.push("...".to_string());
    }

    for (offset, line) in tail.iter().enumerate() {
        if !seen.contains(&(tail_start + offset)) {
            result_lines.push(line.to_string());
        }
    }

    let banner = format!(
        "[TRUNCATED: Original {} lines → {} lines]\n\n",
        lines.len(),
        result_lines.len()
    );
    banner + &result_lines.join("\n")
}

/// Score how strongly a piece of evidence text pertains to each changed
/// file. Advisory only: this is a keyword heuristic with no correctness
/// guarantee, never an authoritative signal.
///
/// Per file: +0.5 when the stem appears in the evidence, +0.2 per path
/// segment that appears, and for test-looking files +0.1 per test-result
/// keyword present. Clamped to [0, 1].
pub fn relevance(evidence: &str, changed_files: &[String]) -> HashMap<String, f64> {
    let evidence_lower = evidence.to_lowercase();
    let mut scores: HashMap<String, f64> = HashMap::new();

    for filename in changed_files {
        let mut score = 0.0_f64;
        let path = Path::new(filename);

        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if evidence_lower.contains(&stem.to_lowercase()) {
                score += 0.5;
            }
        }

        for component in path.components() {
            if let Component::Normal(part) = component {
                if let Some(part) = part.to_str() {
                    if evidence_lower.contains(&part.to_lowercase()) {
                        score += 0.2;
                    }
                }
            }
        }

        let filename_lower = filename.to_lowercase();
        if filename_lower.contains("test_") || filename_lower.contains("_test") {
            for kw in TEST_RESULT_KEYWORDS {
                if evidence_lower.contains(kw) {
                    score += 0.1;
                }
            }
        }

        scores.insert(filename.clone(), score.min(1.0));
    }

    scores
}
