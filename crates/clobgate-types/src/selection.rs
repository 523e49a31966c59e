//! Canonical "which entities" selector.

use serde::{Deserialize, Serialize};

/// Every known entity, or an explicit non-empty list in caller order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selection<T> {
    All,
    Only(Vec<T>),
}

impl<T> Selection<T> {
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// The explicit items, or `None` for [`Selection::All`].
    #[must_use]
    pub fn items(&self) -> Option<&[T]> {
        match self {
            Self::All => None,
            Self::Only(items) => Some(items),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Selection<U> {
        match self {
            Self::All => Selection::All,
            Self::Only(items) => Selection::Only(items.into_iter().map(f).collect()),
        }
    }
}
