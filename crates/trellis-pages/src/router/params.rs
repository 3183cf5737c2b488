//! Query string extraction.

use std::collections::BTreeMap;

/// Query parameters. A key written without `=` maps to `None`.
pub type QueryMap = BTreeMap<String, Option<String>>;

fn decode_component(raw: &str) -> String {
	let spaced = raw.replace('+', " ");
	match urlencoding::decode(&spaced) {
		Ok(decoded) => decoded.into_owned(),
		Err(_) => spaced.clone(),
	}
}

/// Parses a query string.
///
/// One leading `?`, `#` or `&` is ignored, `+` decodes to a space and the
/// first occurrence of a key wins.
///
/// ```ignore
/// let query = parse_query("?search=one%20two&search=ignored&flag");
/// assert_eq!(query["search"].as_deref(), Some("one two"));
/// assert_eq!(query["flag"], None);
/// ```
pub fn parse_query(search: &str) -> QueryMap {
	let search = search.trim();
	let search = search
		.strip_prefix(['?', '#', '&'])
		.unwrap_or(search);

	let mut query = QueryMap::new();
	for pair in search.split('&').filter(|pair| !pair.is_empty()) {
		let (key, value) = match pair.split_once('=') {
			Some((key, value)) => (key, Some(decode_component(value))),
			None => (pair, None),
		};
		query.entry(decode_component(key)).or_insert(value);
	}
	query
}
