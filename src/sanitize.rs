//! HTML sanitization ahead of prompt construction.
//!
//! Raw element HTML is parsed as a fragment, stripped of nodes that never carry
//! addressable content (`script`, `style`, `path`) and of attributes whose
//! values are usually build-generated (`class`, `aria-labelledby`), then
//! serialized back. Parsing is best effort: the HTML5 parser recovers from any
//! input and its recoverable errors are reported, never raised.

use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use scraper::Html;
use scraper::node::Node;

/// Elements dropped together with their whole subtree.
pub const REMOVED_ELEMENTS: &[&str] = &["script", "style", "path"];

/// Attributes dropped from every remaining element.
pub const STRIPPED_ATTRIBUTES: &[&str] = &["class", "aria-labelledby"];

/// The parser swallows one newline right after these start tags, so
/// serialization has to put it back.
const LEADING_NEWLINE_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

/// Result of sanitizing a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedHtml {
    pub html: String,
    /// Recoverable parse errors reported by the HTML5 parser.
    pub parse_errors: Vec<String>,
}

impl SanitizedHtml {
    pub fn is_degraded(&self) -> bool {
        !self.parse_errors.is_empty()
    }
}

/// Sanitize `raw` and return only the serialized markup.
pub fn sanitize_html(raw: &str) -> String {
    sanitize(raw).html
}

/// Sanitize `raw`, keeping the parser's error report alongside the markup.
pub fn sanitize(raw: &str) -> SanitizedHtml {
    let mut fragment = Html::parse_fragment(raw);
    let mut parse_errors: Vec<String> = fragment.errors.iter().map(|err| err.to_string()).collect();

    let removed: Vec<_> = fragment
        .tree
        .root()
        .descendants()
        .filter(|node| {
            node.value()
                .as_element()
                .is_some_and(|element| REMOVED_ELEMENTS.contains(&element.name()))
        })
        .map(|node| node.id())
        .collect();
    for id in removed {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }

    let kept: Vec<_> = fragment.tree.root().descendants().map(|node| node.id()).collect();
    for id in kept {
        let Some(mut node) = fragment.tree.get_mut(id) else {
            continue;
        };
        let Node::Element(element) = node.value() else {
            continue;
        };
        // Namespaced attributes such as `xlink:href` are never stripped.
        element.attrs.retain(|name, _| {
            name.prefix.is_some() || !STRIPPED_ATTRIBUTES.contains(&&*name.local)
        });
        if !LEADING_NEWLINE_ELEMENTS.contains(&element.name()) {
            continue;
        }
        if let Some(mut child) = node.first_child() {
            if let Node::Text(text) = child.value() {
                if text.starts_with('\n') {
                    text.text = format!("\n{}", &*text.text).into();
                }
            }
        }
    }

    // Fragment parsing wraps the input in a synthetic <html> element. The
    // parser runs with scripting enabled, so <noscript> content is raw text
    // and must be written back unescaped.
    let opts = SerializeOpts {
        scripting_enabled: true,
        traversal_scope: TraversalScope::ChildrenOnly(None),
        create_missing_parent: false,
    };
    let mut buf = Vec::with_capacity(raw.len());
    if let Err(err) = serialize(&mut buf, &fragment.root_element(), opts) {
        parse_errors.push(format!("serialization failed: {err}"));
    }

    SanitizedHtml {
        html: String::from_utf8_lossy(&buf).into_owned(),
        parse_errors,
    }
}
