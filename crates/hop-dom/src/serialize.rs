//! Markup serialization for debugging output and the CLI.

use crate::Element;
use crate::Node;

pub(crate) fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.tag);
    for (name, value) in &element.attrs {
        out.push(' ');
        out.push_str(name);
        if !value.is_empty() {
            out.push_str("=\"");
            escape_into(value, true, out);
            out.push('"');
        }
    }
    out.push('>');

    if is_void(&element.tag) {
        return;
    }

    let raw = is_raw_text(&element.tag);
    for child in &element.children {
        match child {
            Node::Text(text) if raw => out.push_str(text),
            _ => write_node(child, out),
        }
    }

    out.push_str("</");
    out.push_str(&element.tag);
    out.push('>');
}

pub(crate) fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(element) => write_element(element, out),
        Node::Text(text) => escape_into(text, false, out),
    }
}

fn escape_into(input: &str, attribute: bool, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

pub(crate) fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_raw_text(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

#[cfg(test)]
mod tests {
    use crate::Element;
    use crate::Node;

    #[test]
    fn escapes_text_but_not_script_bodies() {
        let element = Element::new("div")
            .with_text("a < b & c")
            .with_child(Node::Element(
                Element::new("script").with_text("if (a < b) {}"),
            ));
        assert_eq!(
            element.outer_html(),
            "<div>a &lt; b &amp; c<script>if (a < b) {}</script></div>"
        );
    }

    #[test]
    fn void_elements_have_no_end_tag() {
        let element = Element::new("link")
            .with_attr("rel", "prefetch")
            .with_attr("href", "/a?x=\"1\"");
        assert_eq!(
            element.outer_html(),
            "<link rel=\"prefetch\" href=\"/a?x=&quot;1&quot;\">"
        );
    }
}
