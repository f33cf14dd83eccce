//! In-memory host window: session history with per-entry scroll memory.

use crate::capability::HostWindow;
use hop_core::HopResult;
use hop_net::PageUrl;
use std::cell::Cell;
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq, Eq)]
struct HistoryEntry {
    url: PageUrl,
    scroll_y: u32,
}

impl HistoryEntry {
    fn fresh(url: PageUrl) -> Self {
        Self { url, scroll_y: 0 }
    }
}

/// Default host when no real browser is attached, and the host tests drive.
///
/// Leaving an entry (push, back, forward) stores the current scroll offset on
/// it; arriving does not restore anything until the navigator asks.
#[derive(Debug)]
pub struct HeadlessWindow {
    back: RefCell<Vec<HistoryEntry>>,
    current: RefCell<HistoryEntry>,
    /// Nearest entry last.
    forward: RefCell<Vec<HistoryEntry>>,
    scroll_y: Cell<u32>,
    transitions: Cell<usize>,
}

impl HeadlessWindow {
    pub fn new(start: PageUrl) -> Self {
        Self {
            back: RefCell::new(Vec::new()),
            current: RefCell::new(HistoryEntry::fresh(start)),
            forward: RefCell::new(Vec::new()),
            scroll_y: Cell::new(0),
            transitions: Cell::new(0),
        }
    }

    pub fn scroll_y(&self) -> u32 {
        self.scroll_y.get()
    }

    pub fn scroll_to(&self, y: u32) {
        self.scroll_y.set(y);
    }

    /// Every entry, oldest first.
    pub fn history(&self) -> Vec<PageUrl> {
        let back = self.back.borrow();
        let forward = self.forward.borrow();
        back.iter()
            .chain(std::iter::once(&*self.current.borrow()))
            .chain(forward.iter().rev())
            .map(|entry| entry.url.clone())
            .collect()
    }

    /// Position of the current entry in [`HeadlessWindow::history`].
    pub fn history_index(&self) -> usize {
        self.back.borrow().len()
    }

    pub fn can_go_back(&self) -> bool {
        !self.back.borrow().is_empty()
    }

    pub fn can_go_forward(&self) -> bool {
        !self.forward.borrow().is_empty()
    }

    /// Number of native transitions run so far.
    pub fn transitions_run(&self) -> usize {
        self.transitions.get()
    }

    /// Makes `arriving` current, parking the departing entry (with its
    /// scroll offset) on `parking`.
    fn swap_current(&self, arriving: HistoryEntry, parking: &RefCell<Vec<HistoryEntry>>) {
        let mut departing = self.current.replace(arriving);
        departing.scroll_y = self.scroll_y.get();
        parking.borrow_mut().push(departing);
    }
}

impl HostWindow for HeadlessWindow {
    fn location(&self) -> PageUrl {
        self.current.borrow().url.clone()
    }

    fn push_history(&self, url: &PageUrl) -> HopResult<()> {
        self.forward.borrow_mut().clear();
        self.swap_current(HistoryEntry::fresh(url.clone()), &self.back);
        Ok(())
    }

    fn back(&self) -> bool {
        let Some(previous) = self.back.borrow_mut().pop() else {
            return false;
        };
        self.swap_current(previous, &self.forward);
        true
    }

    fn forward(&self) -> bool {
        let Some(next) = self.forward.borrow_mut().pop() else {
            return false;
        };
        self.swap_current(next, &self.back);
        true
    }

    fn scroll_to_top(&self) {
        self.scroll_y.set(0);
    }

    fn restore_scroll(&self) {
        self.scroll_y.set(self.current.borrow().scroll_y);
    }

    fn run_transition(&self, update: &mut dyn FnMut() -> HopResult<()>) -> HopResult<()> {
        self.transitions.set(self.transitions.get() + 1);
        update()
    }
}
