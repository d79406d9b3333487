//! Dev-tool surface for forcing encounters.
//!
//! Both schedulers implement [`ForcedTrigger`], so an admin menu can list
//! and force events and hunts through the same code path.

/// Gate for administrative overrides, fixed at scheduler construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DevToolsGate {
    enabled: bool,
}

impl DevToolsGate {
    /// Creates a gate.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// An open gate.
    #[must_use]
    pub const fn enabled() -> Self {
        Self::new(true)
    }

    /// A closed gate.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(false)
    }

    /// Whether forced triggers are allowed.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.enabled
    }
}

/// A scheduler whose encounters can be forced by an operator.
///
/// Forcing never fails loudly: a closed gate or an unknown key yields `None`
/// and leaves the scheduler untouched.
pub trait ForcedTrigger {
    /// Definition returned on a successful force.
    type Definition;

    /// Whether the dev-tools gate is open.
    fn dev_tools_enabled(&self) -> bool;

    /// Everything that can be forced, in catalog order.
    fn forceable(&self) -> Vec<Self::Definition>;

    /// Key that [`ForcedTrigger::force`] accepts for `definition`.
    fn trigger_key(definition: &Self::Definition) -> &str;

    /// Forces the encounter identified by `key`.
    fn force(&self, key: &str) -> Option<Self::Definition>;
}

/// Forces the `index`-th forceable entry, as picked from a numbered menu.
///
/// Returns `None` when the gate is closed or the index is out of range.
pub fn force_nth<T: ForcedTrigger>(trigger: &T, index: usize) -> Option<T::Definition> {
    if !trigger.dev_tools_enabled() {
        return None;
    }
    let entries = trigger.forceable();
    let key = entries.get(index).map(|entry| T::trigger_key(entry).to_string())?;
    trigger.force(&key)
}
