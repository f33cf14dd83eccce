//! Upstream decoders turning raw host notifications into navigation intents.

use hop_dom::Element;
use hop_net::PageUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationKind {
    Link,
    Pop,
    Programmatic,
}

impl NavigationKind {
    /// Maps the names external decoders use. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "link" => Some(Self::Link),
            "pop" | "popstate" => Some(Self::Pop),
            "programmatic" | "go" => Some(Self::Programmatic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Pop => "pop",
            Self::Programmatic => "programmatic",
        }
    }
}

impl std::fmt::Display for NavigationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested navigation, consumed by a single reconstruction cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationIntent {
    pub kind: NavigationKind,
    pub next: PageUrl,
    pub prev: PageUrl,
}

impl NavigationIntent {
    pub fn new(kind: NavigationKind, next: PageUrl, prev: PageUrl) -> Self {
        Self { kind, next, prev }
    }

    /// Targets the document already shown (fragments aside).
    pub fn is_same_document(&self) -> bool {
        self.next.same_document(&self.prev)
    }
}

/// Intent as reported by an external decoder: kind and URLs still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRecord {
    pub kind: String,
    pub next: String,
    pub prev: String,
}

/// Primary-button activation of an element, with modifier state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub target: Element,
    /// 0 is the primary button.
    pub button: u16,
    pub ctrl_key: bool,
    pub meta_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
    pub default_prevented: bool,
}

impl ClickEvent {
    /// Plain primary click on `target`.
    pub fn on(target: Element) -> Self {
        Self {
            target,
            button: 0,
            ctrl_key: false,
            meta_key: false,
            shift_key: false,
            alt_key: false,
            default_prevented: false,
        }
    }

    fn has_modifier(&self) -> bool {
        self.ctrl_key || self.meta_key || self.shift_key || self.alt_key
    }
}

/// Decides whether a click is an in-origin link activation the navigator
/// should take over. `None` leaves the click to the host's default handling.
pub fn decode_click(event: &ClickEvent, location: &PageUrl) -> Option<NavigationIntent> {
    if event.default_prevented || event.button != 0 || event.has_modifier() {
        return None;
    }

    let anchor = &event.target;
    if !(anchor.is("a") || anchor.is("area")) || anchor.has_attr("download") {
        return None;
    }

    // Any explicit browsing context other than `_self` opens elsewhere.
    if anchor
        .attr("target")
        .is_some_and(|target| !target.trim().eq_ignore_ascii_case("_self"))
    {
        return None;
    }

    let next = location.join(anchor.attr("href")?).ok()?;
    if !next.same_origin(location) {
        return None;
    }
    if next.has_fragment() && next.same_document(location) {
        return None;
    }

    Some(NavigationIntent::new(
        NavigationKind::Link,
        next,
        location.clone(),
    ))
}

/// Pop notifications carry no payload: the host has already moved to the
/// entry being restored, while `shown` is the document still on screen.
pub fn decode_pop(location: &PageUrl, shown: &PageUrl) -> NavigationIntent {
    NavigationIntent::new(NavigationKind::Pop, location.clone(), shown.clone())
}
