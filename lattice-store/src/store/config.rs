//! Store configuration.

/// Which frame wins among frames of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// The most recently inserted frame wins.
    #[default]
    NewestFirst,
    /// The earliest inserted frame wins.
    OldestFirst,
}

/// Options for a [`ValueStore`](crate::ValueStore).
///
/// # Example
///
/// ```rust
/// use lattice_store::{StoreConfig, TieBreak};
///
/// let config = StoreConfig::builder()
///     .tie_break(TieBreak::OldestFirst)
///     .notify_source_changes(false)
///     .build();
///
/// assert_eq!(config.tie_break(), TieBreak::OldestFirst);
/// assert!(!config.notify_source_changes());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    tie_break: TieBreak,
    notify_source_changes: bool,
}

impl StoreConfig {
    /// Start from the default configuration.
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder {
            config: Self::default(),
        }
    }

    /// Tie-break policy for frames of equal priority.
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Whether the owner hears about winner changes that keep the value.
    pub fn notify_source_changes(&self) -> bool {
        self.notify_source_changes
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::NewestFirst,
            notify_source_changes: true,
        }
    }
}

/// Builder for [`StoreConfig`].
#[derive(Debug, Clone)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the tie-break policy.
    pub fn tie_break(mut self, tie_break: TieBreak) -> Self {
        self.config.tie_break = tie_break;
        self
    }

    /// Report winner changes that keep the effective value through
    /// [`PropertyOwner::effective_source_changed`](crate::PropertyOwner::effective_source_changed).
    pub fn notify_source_changes(mut self, notify: bool) -> Self {
        self.config.notify_source_changes = notify;
        self
    }

    /// Finish building.
    pub fn build(self) -> StoreConfig {
        self.config
    }
}
