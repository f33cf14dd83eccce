use serde::Deserialize;

/// Behavior switches fixed at construction. Every field has a default, so a
/// partial TOML table deserializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NavigatorOptions {
    /// Log per-cycle timings at `debug`.
    pub verbose_logging: bool,
    /// Warm same-origin links after every settled navigation.
    pub prefetch: bool,
    /// Wrap the body swap in the host's native transition when available.
    pub use_native_transitions: bool,
    /// Only the newest cycle may merge; older ones resolve as superseded.
    pub single_flight: bool,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        Self {
            verbose_logging: false,
            prefetch: true,
            use_native_transitions: false,
            single_flight: false,
        }
    }
}
