use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Split free text into lowercase, diacritic-free tokens.
///
/// The text is NFKD-decomposed and combining marks are dropped, so "Černá"
/// and "cerna" produce the same token. Any character that is neither
/// alphanumeric nor `+` separates tokens, which keeps "PLA+" intact while
/// splitting on whitespace, hyphens, underscores and brackets.
///
/// Example: "Prusament PLA-Black_v2 (Enhanced)" → ["prusament", "pla", "black", "v2", "enhanced"]
pub fn tokenize(text: &str) -> Vec<String> {
    let folded = fold(text);

    folded
        .split(is_separator)
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(str::to_string)
        .collect()
}

/// Lowercase and strip combining marks without splitting.
pub fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn is_separator(c: char) -> bool {
    !(c.is_alphanumeric() || c == '+')
}

/// How a query token relates to a field token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TokenMatch {
    Prefix,
    Exact,
}

/// Compare a query token with a field token.
///
/// Trailing `+` is ignored for prefix purposes, so "pla+" still finds "pla"
/// and "pla" finds "pla+", but only an identical token counts as exact.
pub fn match_token(query: &str, token: &str) -> Option<TokenMatch> {
    if query == token {
        return Some(TokenMatch::Exact);
    }
    if token.starts_with(query) {
        return Some(TokenMatch::Prefix);
    }

    let query_base = query.trim_end_matches('+');
    let token_base = token.trim_end_matches('+');
    if !query_base.is_empty() && token_base.starts_with(query_base) {
        return Some(TokenMatch::Prefix);
    }

    None
}

/// Best match of a query token against any token of a field.
pub fn best_match(query: &str, tokens: &[String]) -> Option<TokenMatch> {
    tokens.iter().filter_map(|t| match_token(query, t)).max()
}
