//! SQLite-backed persistence for hubs and items.
//!
//! [`Store`] owns every persisted row. It mints identifiers through the
//! [`IdAuthority`], stamps rows through a [`TimeSource`] and asks a
//! [`UniformSource`] for selection offsets.
//!
//! ## Selection
//!
//! [`Store::select_item`] favors least-used items: among a hub's active items
//! ordered by `count`, it picks uniformly within the first
//! `max(ceil(active / 2), 1)` rows and bumps the winner's `count`. The read
//! and the increment run in one transaction, and the increment is a single
//! `count = count + 1` statement, so concurrent selections cannot overwrite
//! each other's counts.

use core::time::Duration;
use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Hub, IdAuthority, Item, Operation, Result, SystemClock, TimeSource, UniformSource,
};

/// Default wait for a locked database before a statement fails.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS hubs (id TEXT, created INTEGER, active INTEGER)",
    "CREATE TABLE IF NOT EXISTS datas (id TEXT, hub_id TEXT, added INTEGER, active INTEGER, count INTEGER, content BLOB)",
    "CREATE INDEX IF NOT EXISTS hubs_id ON hubs (id)",
    "CREATE INDEX IF NOT EXISTS datas_id ON datas (id)",
    "CREATE INDEX IF NOT EXISTS datas_hub_active ON datas (hub_id, active, count)",
];

const ITEM_COLUMNS: &str = "id, hub_id, added, active, count, content";

/// Number of least-used rows eligible for selection out of `active` rows.
///
/// Half of the active rows rounded up, never fewer than one.
pub const fn eligible_rows(active: u32) -> u32 {
    let half = active / 2 + active % 2;
    if half == 0 { 1 } else { half }
}

/// Persistent store of hubs and items.
pub struct Store<U = Arc<IdAuthority>, C = SystemClock>
where
    U: UniformSource,
    C: TimeSource,
{
    pub(crate) pool: Pool<Sqlite>,
    ids: Arc<IdAuthority>,
    pub(crate) selector: U,
    clock: C,
}

impl Store {
    /// Opens (creating if missing) the database at `path`, using `ids` both
    /// for minting and for selection offsets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be opened or the
    /// schema cannot be created.
    pub async fn open(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
        ids: Arc<IdAuthority>,
    ) -> Result<Self> {
        let selector = Arc::clone(&ids);
        Self::open_with(path, busy_timeout, ids, selector, SystemClock).await
    }
}

impl<U, C> Store<U, C>
where
    U: UniformSource,
    C: TimeSource,
{
    /// Opens the database at `path` with an explicit selection source and
    /// clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be opened or the
    /// schema cannot be created.
    pub async fn open_with(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
        ids: Arc<IdAuthority>,
        selector: U,
        clock: C,
    ) -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout);

        // A single connection serializes every read-modify-write sequence.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(Error::storage(Operation::Migrate))?;

        let store = Self {
            pool,
            ids,
            selector,
            clock,
        };
        store.migrate().await?;

        #[cfg(feature = "tracing")]
        tracing::info!(path = %path.as_ref().display(), "store opened");

        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(Error::storage(Operation::Migrate))?;
        }
        Ok(())
    }

    /// The authority used to mint and validate identifiers.
    pub fn ids(&self) -> &IdAuthority {
        &self.ids
    }

    /// Creates a new, active hub.
    ///
    /// # Errors
    ///
    /// - [`Error::Entropy`] if an identifier cannot be minted.
    /// - [`Error::Storage`] if the insert fails.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn create_hub(&self) -> Result<Hub> {
        let hub = Hub {
            id: self.ids.mint().await?,
            created: self.clock.current_millis(),
            active: true,
        };

        sqlx::query("INSERT INTO hubs (id, created, active) VALUES (?, ?, ?)")
            .bind(&hub.id)
            .bind(hub.created)
            .bind(hub.active)
            .execute(&self.pool)
            .await
            .map_err(Error::storage(Operation::CreateHub))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(hub_id = %hub.id, "hub created");

        Ok(hub)
    }

    /// Adds an active item with `count = 0` to `hub_id`.
    ///
    /// Neither the existence of the hub nor the size of `content` is checked
    /// here; the request layer bounds the content.
    ///
    /// # Errors
    ///
    /// - [`Error::Entropy`] if an identifier cannot be minted.
    /// - [`Error::Storage`] if the insert fails.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, content), fields(len = content.len()))
    )]
    pub async fn add_item(&self, hub_id: &str, content: Vec<u8>) -> Result<Item> {
        let item = Item {
            id: self.ids.mint().await?,
            hub_id: hub_id.to_owned(),
            added: self.clock.current_millis(),
            active: true,
            count: 0,
            content,
        };

        sqlx::query(
            "INSERT INTO datas (id, hub_id, added, active, count, content) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.hub_id)
        .bind(item.added)
        .bind(item.active)
        .bind(item.count)
        .bind(&item.content)
        .execute(&self.pool)
        .await
        .map_err(Error::storage(Operation::AddItem))?;

        Ok(item)
    }

    /// Picks one of the least-used active items of `hub_id` and increments
    /// its `count`.
    ///
    /// Returns `None` when the hub has no active items. The returned item
    /// carries the `count` it had before this selection.
    ///
    /// # Errors
    ///
    /// - [`Error::Storage`] if a statement or the commit fails.
    /// - Any error from the [`UniformSource`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn select_item(&self, hub_id: &str) -> Result<Option<Item>> {
        let op = || Error::storage(Operation::SelectItem);
        let mut tx = self.pool.begin().await.map_err(op())?;

        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM datas WHERE hub_id = ? AND active = 1")
                .bind(hub_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(op())?;

        if active <= 0 {
            return Ok(None);
        }

        let window = eligible_rows(u32::try_from(active).unwrap_or(u32::MAX));
        let offset = self.selector.uniform(0, window).await?;

        let picked = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM datas WHERE hub_id = ? AND active = 1 \
             ORDER BY count ASC, added ASC LIMIT 1 OFFSET ?"
        ))
        .bind(hub_id)
        .bind(i64::from(offset))
        .fetch_optional(&mut *tx)
        .await
        .map_err(op())?;

        let Some(item) = picked else {
            return Ok(None);
        };

        sqlx::query("UPDATE datas SET count = count + 1 WHERE id = ?")
            .bind(&item.id)
            .execute(&mut *tx)
            .await
            .map_err(op())?;

        tx.commit().await.map_err(op())?;

        #[cfg(feature = "tracing")]
        tracing::debug!(item_id = %item.id, active, window, offset, "item selected");

        Ok(Some(item))
    }

    /// Marks item `id` inactive so it is never selected again.
    ///
    /// Returns `None` if no such item exists. Deactivating an inactive item is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a statement or the commit fails.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn deactivate_item(&self, id: &str) -> Result<Option<Item>> {
        let op = || Error::storage(Operation::DeactivateItem);
        let mut tx = self.pool.begin().await.map_err(op())?;

        let found = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM datas WHERE id = ? LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(op())?;

        let Some(mut item) = found else {
            return Ok(None);
        };

        if item.active {
            sqlx::query("UPDATE datas SET active = 0 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(op())?;
            item.active = false;
        }

        tx.commit().await.map_err(op())?;
        Ok(Some(item))
    }

    /// Marks hub `id` inactive.
    ///
    /// Items of the hub keep their own `active` flag: hubs and items have
    /// independent lifecycles. Returns `None` if no such hub exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a statement or the commit fails.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn deactivate_hub(&self, id: &str) -> Result<Option<Hub>> {
        let op = || Error::storage(Operation::DeactivateHub);
        let mut tx = self.pool.begin().await.map_err(op())?;

        let found = sqlx::query_as::<_, Hub>(
            "SELECT id, created, active FROM hubs WHERE id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(op())?;

        let Some(mut hub) = found else {
            return Ok(None);
        };

        if hub.active {
            sqlx::query("UPDATE hubs SET active = 0 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(op())?;
            hub.active = false;
        }

        tx.commit().await.map_err(op())?;
        Ok(Some(hub))
    }

    /// Looks up a hub without modifying it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub async fn get_hub(&self, id: &str) -> Result<Option<Hub>> {
        sqlx::query_as::<_, Hub>("SELECT id, created, active FROM hubs WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::storage(Operation::Lookup))
    }

    /// Looks up an item without modifying it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM datas WHERE id = ? LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::storage(Operation::Lookup))
    }

    /// Number of items of `hub_id` that are eligible for selection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub async fn count_active_items(&self, hub_id: &str) -> Result<u64> {
        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM datas WHERE hub_id = ? AND active = 1")
                .bind(hub_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::storage(Operation::Lookup))?;
        Ok(u64::try_from(active).unwrap_or(0))
    }

    /// Closes the underlying connection pool. Pending operations finish
    /// first; later ones fail with [`Error::Storage`].
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
