use unicode_normalization::UnicodeNormalization;

/// Combining diacritical marks, which NFKD splits off accented letters.
const COMBINING_MARKS: std::ops::RangeInclusive<char> = '\u{0300}'..='\u{036f}';

/// Derives a URL-safe slug from a post title.
///
/// The title is NFKD-normalized with its diacritics removed, trimmed and
/// lowercased. Everything outside `[a-z0-9 -]` is dropped, and every run of
/// spaces and hyphens becomes a single hyphen.
///
/// ```text
/// "Café Déjà Vu!" -> "cafe-deja-vu"
/// ```
pub fn slugify(title: &str) -> String {
	let stripped = title
		.nfkd()
		.filter(|c| !COMBINING_MARKS.contains(c))
		.collect::<String>();

	let mut slug = String::with_capacity(stripped.len());

	for c in stripped.trim().to_lowercase().chars() {
		match c {
			'a'..='z' | '0'..='9' => slug.push(c),
			' ' | '-' => {
				if !slug.ends_with('-') {
					slug.push('-');
				}
			}
			_ => {}
		}
	}

	slug
}
