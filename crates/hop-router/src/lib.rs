//! Client-side navigation interception.
//!
//! A [`Navigator`] takes over in-origin link activations and history pops,
//! fetches the destination markup and rebuilds the live document in place:
//! the head is reconciled, the body replaced, and the new page's scripts run
//! once each. Same-origin links are prefetched after every navigation.

pub mod capability;
pub mod event;
pub mod intent;
pub mod navigator;
pub mod options;
mod prefetch;
pub mod window;

#[cfg(test)]
mod tests;

pub use capability::Capabilities;
pub use capability::HostWindow;
pub use event::NavigationEvent;
pub use intent::ClickEvent;
pub use intent::IntentRecord;
pub use intent::NavigationIntent;
pub use intent::NavigationKind;
pub use navigator::Collaborators;
pub use navigator::NavigationOutcome;
pub use navigator::Navigator;
pub use options::NavigatorOptions;
pub use window::HeadlessWindow;
