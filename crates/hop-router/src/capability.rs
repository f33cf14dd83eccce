use hop_core::HopResult;
use hop_net::PageUrl;

/// What the host environment can do, probed once and injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_history: bool,
    pub supports_transitions: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_history: true,
            supports_transitions: false,
        }
    }
}

/// The window the navigator drives: address bar, session history, scroll
/// position and the optional native transition.
///
/// Methods take `&self`; hosts keep their own interior mutability.
pub trait HostWindow {
    fn location(&self) -> PageUrl;

    /// Appends `url` as the new current history entry.
    fn push_history(&self, url: &PageUrl) -> HopResult<()>;

    /// Moves the history cursor back. Returns false at the oldest entry.
    /// Hosts report the resulting pop through `Navigator::handle_pop_state`.
    fn back(&self) -> bool;

    fn forward(&self) -> bool;

    fn scroll_to_top(&self);

    /// Restores the offset remembered for the current history entry.
    fn restore_scroll(&self);

    /// Runs `update` inside a native document transition.
    fn run_transition(&self, update: &mut dyn FnMut() -> HopResult<()>) -> HopResult<()> {
        update()
    }
}
