//! Lifecycle notifications broadcast by the navigator.

use hop_core::HopError;
use hop_net::PageUrl;
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    /// A cycle passed eligibility and is about to fetch `url`.
    FetchStart { url: PageUrl },
    /// The document for `url` is merged and scripts have run.
    NavigationEnd { url: PageUrl },
    NavigationError { url: PageUrl, error: HopError },
}

impl NavigationEvent {
    pub fn url(&self) -> &PageUrl {
        match self {
            Self::FetchStart { url }
            | Self::NavigationEnd { url }
            | Self::NavigationError { url, .. } => url,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchStart { .. } => "fetch-start",
            Self::NavigationEnd { .. } => "navigation-end",
            Self::NavigationError { .. } => "navigation-error",
        }
    }
}

type Listener = Rc<dyn Fn(&NavigationEvent)>;

/// Fan-out to callbacks and channel subscribers. Delivery is synchronous and
/// fire-and-forget; closed channels are pruned on the next emit.
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RefCell<Vec<Listener>>,
    channels: RefCell<Vec<mpsc::UnboundedSender<NavigationEvent>>>,
}

impl EventBus {
    pub(crate) fn on_event(&self, listener: impl Fn(&NavigationEvent) + 'static) {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<NavigationEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels.borrow_mut().push(sender);
        receiver
    }

    pub(crate) fn emit(&self, event: NavigationEvent) {
        // Snapshot so a listener may register another one while running.
        let listeners: Vec<Listener> = self.listeners.borrow().clone();
        for listener in listeners {
            listener(&event);
        }

        self.channels
            .borrow_mut()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub(crate) fn channel_count(&self) -> usize {
        self.channels.borrow().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.borrow().len())
            .field("channels", &self.channels.borrow().len())
            .finish()
    }
}
