// Utility modules

use crate::{
    constants::SEARCH_RESULT_LIMIT,
    error::{AppError, Result},
};

/// Parses a numeric id from a path segment.
///
/// Anything that is not a plain `i32` (text, decimals, values past the column
/// range) yields `None`, which callers treat as "not found".
pub fn parse_resource_id(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('+') {
        return None;
    }
    trimmed.parse::<i32>().ok()
}

/// Bounds the free-text catalog search.
pub fn normalize_search_term(term: &str) -> Result<String> {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("searchTerm is required".to_string()));
    }
    if trimmed.chars().count() > 64 {
        return Err(AppError::BadRequest("searchTerm is too long".to_string()));
    }
    // LIKE wildcards from the client are matched literally
    let escaped = trimmed
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Ok(format!("%{}%", escaped))
}

pub fn search_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(SEARCH_RESULT_LIMIT)
        .clamp(1, SEARCH_RESULT_LIMIT)
}

/// Lowercase ASCII slug used in sprite filenames.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
