//! Location normalization and path templates.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::error::RouterError;

/// Splits a normalized location into its path and query parts.
pub fn split_location(location: &str) -> (&str, &str) {
	match location.split_once('?') {
		Some((path, query)) => (path, query),
		None => (location, ""),
	}
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
	path.split('/').map(str::trim).filter(|s| !s.is_empty())
}

/// Normalizes a location as written in a link, a history entry or a template.
///
/// The configured `origin` and `base` are stripped, a leading `#` is dropped,
/// empty segments and trailing slashes disappear, and the result always starts
/// with exactly one `/`. The query string is kept; a fragment after the path is
/// dropped. `base` is only stripped when it matches whole leading segments.
///
/// ```ignore
/// assert_eq!(normalize_path("http://localhost/app//serie/42/?sort=asc", "http://localhost", "/app"), "/serie/42?sort=asc");
/// assert_eq!(normalize_path("#/queue", "", ""), "/queue");
/// ```
pub fn normalize_path(location: &str, origin: &str, base: &str) -> String {
	let mut rest = location.trim();
	if !origin.is_empty()
		&& let Some(stripped) = rest.strip_prefix(origin.trim_end_matches('/'))
	{
		rest = stripped;
	}
	let rest = rest.trim_start_matches('#');
	let (path, query) = split_location(rest);
	let path = path.split('#').next().unwrap_or_default();
	let query = query.split('#').next().unwrap_or_default().trim();

	let parts: Vec<&str> = segments(path).collect();
	let prefix: Vec<&str> = segments(base).collect();
	let parts = if !prefix.is_empty() && parts.starts_with(&prefix) {
		&parts[prefix.len()..]
	} else {
		&parts[..]
	};

	let mut normalized = format!("/{}", parts.join("/"));
	if !query.is_empty() {
		normalized.push('?');
		normalized.push_str(query);
	}
	normalized
}

fn placeholder(segment: &str) -> Option<&str> {
	let name = segment.strip_prefix(':')?;
	let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
	valid.then_some(name)
}

fn decode(raw: &str) -> String {
	urlencoding::decode(raw)
		.map(|decoded| decoded.into_owned())
		.unwrap_or_else(|_| raw.to_string())
}

/// A compiled route template such as `/serie/:serieId/:sort`.
///
/// Each `:name` segment matches exactly one path segment; every other segment
/// matches literally. Matching ignores ASCII case and the query string.
#[derive(Clone)]
pub struct PathPattern {
	template: String,
	regex: Regex,
	names: Vec<String>,
}

impl fmt::Debug for PathPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PathPattern")
			.field("template", &self.template)
			.field("regex", &self.regex.as_str())
			.finish()
	}
}

impl PathPattern {
	/// Compiles `template` after normalizing it.
	pub fn compile(template: &str) -> Result<Self, RouterError> {
		let normalized = normalize_path(template, "", "");
		let (path, _) = split_location(&normalized);

		let mut names = Vec::new();
		let body: Vec<String> = segments(path)
			.map(|segment| match placeholder(segment) {
				Some(name) => {
					names.push(name.to_string());
					"([^/]+)".to_string()
				}
				None => regex::escape(segment),
			})
			.collect();

		let source = format!("(?i)^/{}$", body.join("/"));
		let regex = Regex::new(&source).map_err(|source| RouterError::InvalidPattern {
			template: template.to_string(),
			source,
		})?;

		Ok(Self {
			template: path.to_string(),
			regex,
			names,
		})
	}

	/// Normalized template.
	pub fn template(&self) -> &str {
		&self.template
	}

	/// Placeholder names in template order.
	pub fn names(&self) -> &[String] {
		&self.names
	}

	/// Returns `true` when the path part of a normalized `location` matches.
	pub fn is_match(&self, location: &str) -> bool {
		let (path, _) = split_location(location);
		self.regex.is_match(path)
	}

	/// Extracts placeholder values by segment position, percent-decoded.
	///
	/// Positions are taken from the template, so the location does not have
	/// to match the template; missing segments are simply absent.
	pub fn extract(&self, location: &str) -> BTreeMap<String, String> {
		let (path, _) = split_location(location);
		let values: Vec<&str> = segments(path).collect();

		segments(&self.template)
			.enumerate()
			.filter_map(|(index, segment)| {
				let name = placeholder(segment)?;
				let value = values.get(index)?;
				Some((name.to_string(), decode(value)))
			})
			.collect()
	}

	/// The template with every known placeholder replaced by its value.
	pub fn substitute(&self, params: &BTreeMap<String, String>) -> String {
		let parts: Vec<&str> = segments(&self.template)
			.map(|segment| {
				placeholder(segment)
					.and_then(|name| params.get(name))
					.map(String::as_str)
					.unwrap_or(segment)
			})
			.collect();
		format!("/{}", parts.join("/"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("", "/")]
	#[case("/", "/")]
	#[case("serie/42/", "/serie/42")]
	#[case("//serie//42//", "/serie/42")]
	#[case("#/queue", "/queue")]
	#[case("/search/?q=one", "/search?q=one")]
	#[case("/?q=one", "/?q=one")]
	#[case("/history#top", "/history")]
	#[case("http://localhost/login", "/login")]
	fn test_normalize_path(#[case] location: &str, #[case] expected: &str) {
		assert_eq!(normalize_path(location, "http://localhost", ""), expected);
	}

	#[rstest]
	#[case("/app/serie/1", "/serie/1")]
	#[case("/app", "/")]
	#[case("/application/serie", "/application/serie")]
	#[case("/serie/1", "/serie/1")]
	fn test_normalize_strips_base_segments(#[case] location: &str, #[case] expected: &str) {
		assert_eq!(normalize_path(location, "", "/app/"), expected);
	}

	#[rstest]
	fn test_pattern_matches_case_insensitively() {
		let pattern = PathPattern::compile("/serie/:serieId/:sort/").unwrap();

		assert_eq!(pattern.template(), "/serie/:serieId/:sort");
		assert_eq!(pattern.names(), ["serieId", "sort"]);
		assert!(pattern.is_match("/SERIE/42/asc"));
		assert!(pattern.is_match("/serie/42/asc?x=1"));
		assert!(!pattern.is_match("/serie/42"));
		assert!(!pattern.is_match("/serie/42/asc/more"));
	}

	#[rstest]
	fn test_literal_segments_are_escaped() {
		let pattern = PathPattern::compile("/file.json").unwrap();
		assert!(pattern.is_match("/file.json"));
		assert!(!pattern.is_match("/fileXjson"));
	}

	#[rstest]
	fn test_root_pattern() {
		let pattern = PathPattern::compile("/").unwrap();
		assert!(pattern.is_match("/"));
		assert!(pattern.is_match("/?q=1"));
		assert!(!pattern.is_match("/queue"));
	}

	#[rstest]
	fn test_extract_and_substitute() {
		let pattern = PathPattern::compile("/serie/:serieId/:sort").unwrap();

		let params = pattern.extract("/serie/one%20piece/asc?x=1");

		assert_eq!(params.get("serieId").map(String::as_str), Some("one piece"));
		assert_eq!(params.get("sort").map(String::as_str), Some("asc"));
		assert_eq!(pattern.substitute(&params), "/serie/one piece/asc");
		assert_eq!(pattern.substitute(&BTreeMap::new()), "/serie/:serieId/:sort");
	}

	#[rstest]
	fn test_extract_from_shorter_location() {
		let pattern = PathPattern::compile("/serie/:serieId/:sort").unwrap();
		let params = pattern.extract("/serie/7");
		assert_eq!(params.len(), 1);
	}
}
