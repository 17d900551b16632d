// src/core/document/parser.rs
use regex::Regex;
use std::sync::LazyLock;

use crate::core::identity::ExtractedFields;

/// Confidence penalty for values found by layout heuristics rather than labels.
const HEURISTIC_PENALTY: u8 = 10;

static NAME_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(?:(?:student|candidate)'?s?\s+)?name(?:\s+of\s+(?:the\s+)?(?:student|candidate))?\s*[:\-]\s*(.+?)\s*$",
    )
    .expect("name pattern is valid")
});

static NAME_CERTIFY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)certif(?:y|ied)\s+that\s+(?:(?:mr|ms|mrs|shri|smt|kumari)\.?\s+)?([a-z][a-z .'\-]{1,80}?)\s+(?:has|having|son|daughter|s/o|d/o|was|is)\b",
    )
    .expect("certify pattern is valid")
});

static INSTITUTION_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(?:name\s+of\s+(?:the\s+)?)?(?:institution|institute|university|college)(?:\s+name)?\s*[:\-]\s*(.+?)\s*$",
    )
    .expect("institution pattern is valid")
});

static INSTITUTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(university|institute|college|academy|iit|nit|iiit|bits)\b")
        .expect("institution keyword pattern is valid")
});

static PROGRAM_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:program(?:me)?|course|degree)(?:\s+name)?\s*[:\-]\s*(.+?)\s*$")
        .expect("program pattern is valid")
});

static PROGRAM_DEGREE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:bachelor|master|doctor)\s+of\s+[^\n,;]{2,80})")
        .expect("degree pattern is valid")
});

static PROGRAM_ABBREVIATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([BM]\.\s?(?:Tech|Sc|Com|A|E|Des|Arch)\b[^\n,;]{0,60})")
        .expect("abbreviated degree pattern is valid")
});

static YEARS_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(?:batch|session|academic\s+years?|duration|period(?:\s+of\s+study)?)\s*[:\-]\s*((?:19|20)\d{2})\s*(?:-|–|to)\s*((?:19|20)\d{2})",
    )
    .expect("year range pattern is valid")
});

static START_YEAR_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:year\s+of\s+(?:admission|joining|enrol+ment)|admitted\s+in|start(?:ing)?\s+year)\s*[:\-]?\s*((?:19|20)\d{2})",
    )
    .expect("start year pattern is valid")
});

static END_YEAR_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:year\s+of\s+(?:passing|graduation|completion)|passed\s+(?:out\s+)?in|graduat(?:ed|ion)\s+(?:in|year)|end\s+year)\s*[:\-]?\s*((?:19|20)\d{2})",
    )
    .expect("end year pattern is valid")
});

static YEAR_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:19|20)\d{2})\s*(?:-|–|to)\s*((?:19|20)\d{2})\b")
        .expect("year range pattern is valid")
});

/// Parses structured identity fields out of extracted document text.
///
/// `confidence` is the extractor-reported confidence for the whole text;
/// labelled fields inherit it, heuristic matches are discounted.
pub fn parse_fields(text: &str, confidence: u8) -> ExtractedFields {
    let labelled = confidence.min(100);
    let heuristic = labelled.saturating_sub(HEURISTIC_PENALTY);

    let full_name = first_capture(&NAME_LABELLED, text)
        .map(|v| (v, labelled))
        .or_else(|| first_capture(&NAME_CERTIFY, text).map(|v| (v, heuristic)));

    let institution = first_capture(&INSTITUTION_LABELLED, text)
        .map(|v| (v, labelled))
        .or_else(|| institution_line(text).map(|v| (v, heuristic)));

    let program = first_capture(&PROGRAM_LABELLED, text)
        .map(|v| (v, labelled))
        .or_else(|| {
            first_capture(&PROGRAM_DEGREE, text)
                .or_else(|| first_capture(&PROGRAM_ABBREVIATED, text))
                .map(|v| (v, heuristic))
        });

    let (mut start_year, mut end_year) = match year_pair(&YEARS_LABELLED, text) {
        Some((start, end)) => (Some((start, labelled)), Some((end, labelled))),
        None => (None, None),
    };
    if start_year.is_none() {
        start_year = first_year(&START_YEAR_LABELLED, text).map(|y| (y, labelled));
    }
    if end_year.is_none() {
        end_year = first_year(&END_YEAR_LABELLED, text).map(|y| (y, labelled));
    }
    if start_year.is_none() || end_year.is_none() {
        if let Some((start, end)) = year_pair(&YEAR_RANGE, text) {
            start_year = start_year.or(Some((start, heuristic)));
            end_year = end_year.or(Some((end, heuristic)));
        }
    }

    ExtractedFields {
        full_name,
        institution,
        program,
        start_year,
        end_year,
    }
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| clean_value(m.as_str())))
        .find(|value| !value.is_empty())
}

fn first_year(pattern: &Regex, text: &str) -> Option<i64> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn year_pair(pattern: &Regex, text: &str) -> Option<(i64, i64)> {
    pattern.captures_iter(text).find_map(|caps| {
        let start: i64 = caps.get(1)?.as_str().parse().ok()?;
        let end: i64 = caps.get(2)?.as_str().parse().ok()?;
        (start <= end).then_some((start, end))
    })
}

fn institution_line(text: &str) -> Option<String> {
    text.lines()
        .map(clean_value)
        .find(|line| !line.is_empty() && line.len() <= 120 && INSTITUTION_LINE.is_match(line))
}

fn clean_value(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '-' | '"' | '\''))
        .trim()
        .to_string()
}
