//! Document tree used by the navigation pipeline.
//!
//! The tree is a plain owned structure: a [`Document`] holds a `head` and a
//! `body` element, and every element owns its children. Structural equality
//! (`PartialEq`) doubles as node equality when reconciling heads.

mod merge;
mod serialize;

pub use merge::HeadPartition;
pub use merge::merge_head;
pub use merge::partition_head;

/// Attribute that opts a head script into re-execution after a swap.
pub const RELOAD_ATTRIBUTE: &str = "data-reload";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_child(Node::Text(text.to_owned()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(key, _)| key == name)
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_owned(),
            None => self.attrs.push((name.to_owned(), value.to_owned())),
        }
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// Concatenated descendant text, raw (script bodies included).
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Depth-first, document-order walk over every descendant element.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(&self.children, &mut out);
        out
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.descendants()
            .into_iter()
            .find(|element| element.attr("id").is_some_and(|value| value.trim() == id))
    }

    /// `rel` contains the given token (case-insensitive, space separated).
    pub fn has_rel(&self, token: &str) -> bool {
        self.attr("rel").is_some_and(|value| {
            value
                .split_ascii_whitespace()
                .any(|candidate| candidate.eq_ignore_ascii_case(token))
        })
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        serialize::write_element(self, &mut out);
        out
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            serialize::write_node(child, &mut out);
        }
        out
    }
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text(_) => None,
        }
    }
}

/// A parsed or live page split into its head and body subtrees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub head: Element,
    pub body: Element,
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl Document {
    pub fn empty() -> Self {
        Self {
            head: Element::new("head"),
            body: Element::new("body"),
        }
    }

    /// First non-empty `<title>` in the head, whitespace collapsed.
    pub fn title(&self) -> Option<String> {
        self.head
            .descendants()
            .into_iter()
            .filter(|element| element.is("title"))
            .map(|element| collapse_whitespace(&element.text_content()))
            .find(|title| !title.is_empty())
    }

    /// Rewrites the first head `<title>`, creating one when absent.
    pub fn set_title(&mut self, title: &str) {
        let existing = self.head.children.iter_mut().find_map(|node| match node {
            Node::Element(element) if element.is("title") => Some(element),
            _ => None,
        });

        match existing {
            Some(element) => element.children = vec![Node::Text(title.to_owned())],
            None => self.append_to_head(Element::new("title").with_text(title)),
        }
    }

    /// Raw `href` values of every `<a>`/`<area>` in document order.
    pub fn link_hrefs(&self) -> Vec<&str> {
        self.head
            .descendants()
            .into_iter()
            .chain(self.body.descendants())
            .filter(|element| element.is("a") || element.is("area"))
            .filter_map(|element| element.attr("href"))
            .collect()
    }

    /// Scripts that must run again after this document is swapped in: every
    /// executable body script plus head scripts marked [`RELOAD_ATTRIBUTE`],
    /// head first, each in document order.
    pub fn rerunnable_scripts(&self) -> Vec<&Element> {
        let head = self
            .head
            .descendants()
            .into_iter()
            .filter(|element| element.is("script") && element.has_attr(RELOAD_ATTRIBUTE));
        let body = self
            .body
            .descendants()
            .into_iter()
            .filter(|element| element.is("script"));

        head.chain(body)
            .filter(|element| is_executable_script(element))
            .collect()
    }

    /// Replaces the body subtree wholesale.
    pub fn replace_body(&mut self, body: Element) {
        self.body = body;
    }

    pub fn append_to_head(&mut self, element: Element) {
        self.head.children.push(Node::Element(element));
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html><html>");
        serialize::write_element(&self.head, &mut out);
        serialize::write_element(&self.body, &mut out);
        out.push_str("</html>");
        out
    }
}

/// Classic and module scripts execute; data blocks (`application/json`,
/// templates, ...) do not.
pub fn is_executable_script(element: &Element) -> bool {
    let script_type = element
        .attr("type")
        .or_else(|| element.attr("language"))
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if script_type.is_empty() || script_type == "module" {
        return true;
    }

    script_type.contains("javascript")
        || script_type.contains("ecmascript")
        || script_type == "text/jscript"
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
        }
    }
}

fn collect_descendants<'a>(nodes: &'a [Node], out: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(element) = node {
            out.push(element);
            collect_descendants(&element.children, out);
        }
    }
}
