//! Markup parsing into the head/body document model.
//!
//! Parsing never fails: like a browser's document parser it recovers from
//! unbalanced tags and places stray content into an implied head or body.

mod tokenizer;

use hop_dom::Document;
use hop_dom::Element;
use hop_dom::Node;
use tokenizer::Token;
use tokenizer::tokenize;

/// Parses raw page markup into a [`Document`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupParser;

impl MarkupParser {
    pub fn parse(&self, input: &str) -> Document {
        let root = build_tree(tokenize(input));
        split_document(root)
    }
}

fn build_tree(tokens: Vec<Token>) -> Element {
    let mut stack = vec![Element::new("#root")];

    for token in tokens {
        match token {
            Token::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = if matches!(current.tag.as_str(), "script" | "style") {
                        text
                    } else {
                        tokenizer::decode_entities(&text)
                    };
                    current.children.push(Node::Text(text));
                }
            }
            Token::Start {
                name,
                attrs,
                self_closing,
            } => {
                let mut element = Element::new(name);
                element.attrs = attrs;

                if self_closing || is_void(&element.tag) {
                    if let Some(current) = stack.last_mut() {
                        current.children.push(Node::Element(element));
                    }
                } else {
                    stack.push(element);
                }
            }
            Token::End { name } => {
                // A stray end tag with no open counterpart is dropped instead of
                // unwinding the whole stack.
                let Some(depth) = stack.iter().rposition(|open| open.tag == name) else {
                    continue;
                };
                if depth == 0 {
                    continue;
                }
                while stack.len() > depth {
                    close_top(&mut stack);
                }
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }

    stack.pop().unwrap_or_else(|| Element::new("#root"))
}

fn close_top(stack: &mut Vec<Element>) {
    if let Some(node) = stack.pop()
        && let Some(parent) = stack.last_mut()
    {
        parent.children.push(Node::Element(node));
    }
}

/// Places parsed content into head and body. Metadata seen before any body
/// content lands in the head; everything else lands in the body. Explicit
/// `<head>`/`<body>` wrappers are unwrapped, keeping the body's attributes.
fn split_document(root: Element) -> Document {
    let mut document = Document::empty();
    let mut in_body = false;
    place_nodes(root.children, &mut document, &mut in_body);
    document
}

fn place_nodes(nodes: Vec<Node>, document: &mut Document, in_body: &mut bool) {
    for node in nodes {
        match node {
            Node::Text(text) => {
                if !*in_body && text.trim().is_empty() {
                    continue;
                }
                *in_body = true;
                document.body.children.push(Node::Text(text));
            }
            Node::Element(element) if element.tag == "html" => {
                place_nodes(element.children, document, in_body);
            }
            Node::Element(element) if element.tag == "head" && !*in_body => {
                document.head.children.extend(
                    element
                        .children
                        .into_iter()
                        .filter(|child| !matches!(child, Node::Text(text) if text.trim().is_empty())),
                );
            }
            Node::Element(element) if element.tag == "body" => {
                *in_body = true;
                for (name, value) in &element.attrs {
                    if !document.body.has_attr(name) {
                        document.body.set_attr(name, value);
                    }
                }
                document.body.children.extend(element.children);
            }
            Node::Element(element) if !*in_body && is_head_content(&element.tag) => {
                document.head.children.push(Node::Element(element));
            }
            Node::Element(element) => {
                *in_body = true;
                document.body.children.push(Node::Element(element));
            }
        }
    }
}

fn is_head_content(tag: &str) -> bool {
    matches!(
        tag,
        "title" | "meta" | "link" | "style" | "script" | "base" | "noscript" | "template"
    )
}

fn is_void(tag: &str) -> bool {
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
