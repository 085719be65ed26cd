use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Primary collation key: canonical decomposition with combining marks
/// dropped and case folded, so "Çağla" files under C next to "Cagla".
fn primary_key(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Orders names the way a reader would in a Latin-script class list rather
/// than by code point. Accent and case differences only break ties.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let (ka, kb) = (primary_key(a.trim()), primary_key(b.trim()));
    ka.cmp(&kb)
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| a.cmp(b))
}
