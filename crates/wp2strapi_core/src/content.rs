use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"));

/// Clean rendered WordPress HTML for the destination.
///
/// Image `src` values are passed to `resolve_image`; a returned URL replaces
/// the original, `None` leaves it untouched. Comments are dropped, as is any
/// attribute whose name starts with one of `strip_prefixes`. Returns the inner
/// HTML of the parsed body.
pub fn sanitize_html<F>(html: &str, strip_prefixes: &[String], mut resolve_image: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut document = Html::parse_document(html);
    let node_ids = document
        .tree
        .nodes()
        .map(|node| node.id())
        .collect::<Vec<_>>();

    for node_id in node_ids {
        let Some(mut node) = document.tree.get_mut(node_id) else {
            continue;
        };
        if matches!(node.value(), Node::Comment(_)) {
            node.detach();
            continue;
        }
        let Node::Element(element) = node.value() else {
            continue;
        };

        element.attrs.retain(|name, _| {
            !strip_prefixes
                .iter()
                .any(|prefix| !prefix.is_empty() && name.local.starts_with(prefix.as_str()))
        });

        if &*element.name.local != "img" {
            continue;
        }
        for (name, value) in element.attrs.iter_mut() {
            if &*name.local != "src" {
                continue;
            }
            if let Some(replacement) = resolve_image(&**value) {
                *value = replacement.into();
            }
        }
    }

    body_inner_html(&document)
}

fn body_inner_html(document: &Html) -> String {
    document
        .root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "body")
        .map(|body| body.inner_html())
        .unwrap_or_default()
}

/// Remove every `<...>` run. Entities are left as-is.
pub fn strip_tags(html: &str) -> String {
    TAG_PATTERN.replace_all(html, "").into_owned()
}

pub fn article_excerpt(html: &str, max_chars: usize) -> String {
    strip_tags(html).chars().take(max_chars).collect()
}

pub fn plain_excerpt(html: &str) -> String {
    strip_tags(html)
}
