use serde::Serialize;

/// Local view of a remote collection.
///
/// `Awaiting` means no snapshot has been delivered yet; `Empty` means the
/// store answered and holds nothing. Both read as an empty structure, but
/// only `Empty` counts as having heard from the store.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum RemoteState<T> {
    #[default]
    Awaiting,
    Empty,
    Loaded(T),
}

impl<T> RemoteState<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            RemoteState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self, RemoteState::Awaiting)
    }
}

impl<T: Default + Clone> RemoteState<T> {
    /// The current value, or an empty one when nothing is loaded.
    pub fn current(&self) -> T {
        self.loaded().cloned().unwrap_or_default()
    }
}
