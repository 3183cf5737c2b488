//! Markup parsing and serialization.
//!
//! Parsing delegates to `scraper` (html5ever) in fragment mode, so malformed
//! markup is repaired the way a browser would repair `innerHTML`. Serialization
//! is deterministic: attributes are emitted sorted by name and always
//! double-quoted, which makes serialized markup safe to compare as strings.

use scraper::{Html, Node as HtmlNode};

use super::document::{Document, NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
	"wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Parses `markup` and appends the resulting nodes to `parent`.
pub(crate) fn parse_into(document: &mut Document, parent: NodeId, markup: &str) {
	let fragment = Html::parse_fragment(markup);
	let root = fragment.root_element();

	let mut top: Vec<_> = root.children().collect();
	top.reverse();
	let mut stack: Vec<_> = top.into_iter().map(|child| (child, parent)).collect();

	while let Some((node, target)) = stack.pop() {
		let created = match node.value() {
			HtmlNode::Element(element) => {
				let mut attrs: Vec<(String, String)> = element
					.attrs()
					.map(|(name, value)| (name.to_string(), value.to_string()))
					.collect();
				attrs.sort_by(|a, b| a.0.cmp(&b.0));
				document.create_element_with_attrs(element.name(), attrs)
			}
			HtmlNode::Text(text) => document.create_text(text),
			HtmlNode::Comment(comment) => document.create_comment(comment),
			_ => continue,
		};
		if document.append_child(target, created).is_err() {
			continue;
		}
		let mut children: Vec<_> = node.children().collect();
		children.reverse();
		stack.extend(children.into_iter().map(|child| (child, created)));
	}
}

/// Parses and re-serializes `markup`.
///
/// Two strings normalize to the same text exactly when they produce the same tree.
pub fn normalize(markup: &str) -> String {
	let mut scratch = Document::new();
	let body = scratch.body();
	parse_into(&mut scratch, body, markup);
	scratch.inner_html(body)
}

/// Appends the serialized form of `node` to `out`.
pub(crate) fn serialize(document: &Document, node: NodeId, out: &mut String) {
	match document.data(node) {
		Some(NodeData::Document) => {
			for child in document.children(node) {
				serialize(document, *child, out);
			}
		}
		Some(NodeData::Element { tag, attrs }) => {
			out.push('<');
			out.push_str(tag);
			let mut sorted: Vec<&(String, String)> = attrs.iter().collect();
			sorted.sort_by(|a, b| a.0.cmp(&b.0));
			for (name, value) in sorted {
				out.push(' ');
				out.push_str(name);
				out.push_str("=\"");
				escape_into(value, true, out);
				out.push('"');
			}
			out.push('>');
			if VOID_ELEMENTS.contains(&tag.as_str()) {
				return;
			}
			let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str());
			for child in document.children(node) {
				match document.data(*child) {
					Some(NodeData::Text(text)) if raw => out.push_str(text),
					_ => serialize(document, *child, out),
				}
			}
			out.push_str("</");
			out.push_str(tag);
			out.push('>');
		}
		Some(NodeData::Text(text)) => escape_into(text, false, out),
		Some(NodeData::Comment(text)) => {
			out.push_str("<!--");
			out.push_str(text);
			out.push_str("-->");
		}
		None => {}
	}
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'\u{a0}' => out.push_str("&nbsp;"),
			'"' if attribute => out.push_str("&quot;"),
			'<' if !attribute => out.push_str("&lt;"),
			'>' if !attribute => out.push_str("&gt;"),
			other => out.push(other),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("<p>a</p>", "<p>a</p>")]
	#[case("<br>", "<br>")]
	#[case("<br/>", "<br>")]
	#[case("<P CLASS=x>a", r#"<p class="x">a</p>"#)]
	#[case(r#"<a title='say "hi"'>x</a>"#, r#"<a title="say &quot;hi&quot;">x</a>"#)]
	#[case("a &amp; b &lt; c", "a &amp; b &lt; c")]
	#[case("<!-- note --><i>x</i>", "<!-- note --><i>x</i>")]
	fn test_normalize(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(normalize(input), expected);
	}

	#[rstest]
	fn test_attributes_serialize_sorted() {
		assert_eq!(
			normalize(r#"<div id="a" class="b" data-view=""></div>"#),
			r#"<div class="b" data-view="" id="a"></div>"#
		);
	}

	#[rstest]
	fn test_equivalent_markup_normalizes_identically() {
		assert_eq!(
			normalize(r#"<div data-x='1' class="c">t</div>"#),
			normalize(r#"<div class=c data-x=1>t</div>"#)
		);
	}

	#[rstest]
	fn test_script_text_is_not_escaped() {
		assert_eq!(
			normalize("<script>if (a < b) {}</script>"),
			"<script>if (a < b) {}</script>"
		);
	}
}
