use sqlx::FromRow;

/// A named collection of interchangeable items.
///
/// `id` and `created` never change after insertion. `active` only ever goes
/// from `true` to `false`; rows are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Hub {
    pub id: String,
    /// Milliseconds since the UNIX epoch.
    pub created: i64,
    pub active: bool,
}

/// One opaque payload belonging to a hub, usually a redirect target.
///
/// `count` records how many times the item was selected and never decreases.
/// `hub_id` is not checked against the hubs table: an item may reference a
/// deactivated or unknown hub.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Item {
    pub id: String,
    pub hub_id: String,
    /// Milliseconds since the UNIX epoch.
    pub added: i64,
    pub active: bool,
    pub count: i64,
    pub content: Vec<u8>,
}

impl Item {
    /// The content as text, if it is valid UTF-8.
    pub fn content_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.content).ok()
    }
}
