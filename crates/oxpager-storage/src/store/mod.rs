use rusqlite::Connection;

pub mod alert;
pub mod assignment;
pub mod escalation;
pub mod group;
pub mod maintenance;
pub mod oncall;
pub mod rate_limit;
pub mod suppression;
pub mod team;

/// Query surface over one connection or open transaction.
///
/// Every method is synchronous and scoped to the borrow handed out by
/// [`crate::PagerStore::read`] or [`crate::PagerStore::unit_of_work`].
pub struct StoreView<'c> {
    conn: &'c Connection,
}

impl<'c> StoreView<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub(crate) fn conn(&self) -> &Connection {
        self.conn
    }
}
