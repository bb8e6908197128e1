//! Database operations for pick-list batches
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Multi-statement writes are transactional.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared database handle used across async handlers
pub type Db = Arc<Mutex<Connection>>;

/// Result type for database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Current UTC time in the storage format used throughout the schema
pub fn utc_now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `batches` / `batch_items`: pick-list batches and their line items
/// - `events`: append-only pick/undo/missing audit log
/// - `set_reservations`: soft per-set claims within a batch
/// - `manapool_orders_cache`: last raw payload per fetched order
/// - `card_cache`: resolved Scryfall entries, keyed by id, no expiry
/// - `manapool_sync_log`: one row per sync attempt
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            source TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            source_payload TEXT
        );

        CREATE TABLE IF NOT EXISTS batch_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            game TEXT NOT NULL DEFAULT '',
            set_code TEXT NOT NULL DEFAULT '',
            card_name TEXT NOT NULL DEFAULT '',
            collector_number TEXT,
            scryfall_id TEXT,
            qty_required INTEGER NOT NULL DEFAULT 0,
            qty_picked INTEGER NOT NULL DEFAULT 0,
            condition TEXT,
            language TEXT,
            printing TEXT,
            is_missing INTEGER NOT NULL DEFAULT 0,
            missing_note TEXT,
            order_names TEXT,
            order_refs TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_batch_items_batch ON batch_items(batch_id);

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            batch_item_id INTEGER NOT NULL REFERENCES batch_items(id),
            qty INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL,
            user_session_id TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_events_item ON events(batch_item_id);

        CREATE TABLE IF NOT EXISTS set_reservations (
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            set_code TEXT NOT NULL,
            reserved_by TEXT NOT NULL,
            reserved_at TEXT NOT NULL,
            PRIMARY KEY (batch_id, set_code)
        );

        CREATE TABLE IF NOT EXISTS manapool_orders_cache (
            order_id TEXT PRIMARY KEY,
            raw_json TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS card_cache (
            scryfall_id TEXT PRIMARY KEY,
            card_name TEXT,
            set_code TEXT,
            collector_number TEXT,
            data_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS manapool_sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL,
            summary_json TEXT,
            error_text TEXT
        );
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

// ── Batches ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub source: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub source_payload: Option<String>,
}

/// An open batch plus the number of items still short of their required qty
#[derive(Debug, Clone, Serialize)]
pub struct BatchOverview {
    #[serde(flatten)]
    pub batch: Batch,
    pub remaining_count: i64,
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<Batch> {
    Ok(Batch {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        source: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        source_payload: row.get(6)?,
    })
}

pub fn insert_batch(
    conn: &Connection,
    name: &str,
    source: Option<&str>,
    source_payload: Option<&str>,
) -> DbResult<i64> {
    let now = utc_now();
    conn.execute(
        "INSERT INTO batches (name, status, source, created_at, updated_at, source_payload)
         VALUES (?1, 'open', ?2, ?3, ?3, ?4)",
        params![name, source, now, source_payload],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_batch(conn: &Connection, batch_id: i64) -> DbResult<Option<Batch>> {
    conn.query_row(
        "SELECT id, name, status, source, created_at, updated_at, source_payload
         FROM batches WHERE id = ?1",
        params![batch_id],
        batch_from_row,
    )
    .optional()
}

/// Open batches, newest first, each with its remaining-item count
pub fn list_open_batches(conn: &Connection) -> DbResult<Vec<BatchOverview>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.name, b.status, b.source, b.created_at, b.updated_at, b.source_payload,
            (SELECT COUNT(*) FROM batch_items bi
             WHERE bi.batch_id = b.id AND bi.qty_picked < bi.qty_required) AS remaining_count
         FROM batches b
         WHERE b.status = 'open'
         ORDER BY b.created_at DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(BatchOverview {
            batch: batch_from_row(row)?,
            remaining_count: row.get(7)?,
        })
    })?;
    rows.collect()
}

pub fn close_batch(conn: &Connection, batch_id: i64) -> DbResult<()> {
    conn.execute(
        "UPDATE batches SET status = 'closed', updated_at = ?1 WHERE id = ?2",
        params![utc_now(), batch_id],
    )?;
    Ok(())
}

/// Creation timestamp of the newest batch from the given source, if any
pub fn latest_batch_created_at(conn: &Connection, source: &str) -> DbResult<Option<String>> {
    conn.query_row(
        "SELECT created_at FROM batches WHERE source = ?1 ORDER BY created_at DESC LIMIT 1",
        params![source],
        |row| row.get(0),
    )
    .optional()
}

// ── Batch items ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub id: i64,
    pub batch_id: i64,
    pub game: String,
    pub set_code: String,
    pub card_name: String,
    pub collector_number: Option<String>,
    pub scryfall_id: Option<String>,
    pub qty_required: i64,
    pub qty_picked: i64,
    pub condition: Option<String>,
    pub language: Option<String>,
    pub printing: Option<String>,
    pub is_missing: bool,
    pub missing_note: Option<String>,
    pub order_names: Option<String>,
    pub order_refs: Option<String>,
    pub updated_at: String,
}

/// Fields for a new batch item; qty_picked always starts at zero
#[derive(Debug, Clone, Default)]
pub struct NewBatchItem {
    pub game: String,
    pub set_code: String,
    pub card_name: String,
    pub collector_number: Option<String>,
    pub scryfall_id: Option<String>,
    pub qty_required: i64,
    pub condition: Option<String>,
    pub language: Option<String>,
    pub printing: Option<String>,
    pub order_names: Option<String>,
    pub order_refs: Option<String>,
}

const ITEM_COLUMNS: &str = "id, batch_id, game, set_code, card_name, collector_number, \
     scryfall_id, qty_required, qty_picked, condition, language, printing, \
     is_missing, missing_note, order_names, order_refs, updated_at";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<BatchItem> {
    Ok(BatchItem {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        game: row.get(2)?,
        set_code: row.get(3)?,
        card_name: row.get(4)?,
        collector_number: row.get(5)?,
        scryfall_id: row.get(6)?,
        qty_required: row.get(7)?,
        qty_picked: row.get(8)?,
        condition: row.get(9)?,
        language: row.get(10)?,
        printing: row.get(11)?,
        is_missing: row.get::<_, i64>(12)? != 0,
        missing_note: row.get(13)?,
        order_names: row.get(14)?,
        order_refs: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

pub fn insert_batch_item(conn: &Connection, batch_id: i64, item: &NewBatchItem) -> DbResult<i64> {
    conn.execute(
        "INSERT INTO batch_items (batch_id, game, set_code, card_name, collector_number,
             scryfall_id, qty_required, qty_picked, condition, language, printing, updated_at,
             order_names, order_refs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            batch_id,
            item.game,
            item.set_code,
            item.card_name,
            item.collector_number,
            item.scryfall_id,
            item.qty_required,
            item.condition,
            item.language,
            item.printing,
            utc_now(),
            item.order_names,
            item.order_refs,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_item(conn: &Connection, item_id: i64) -> DbResult<Option<BatchItem>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM batch_items WHERE id = ?1"),
        params![item_id],
        item_from_row,
    )
    .optional()
}

/// Filters for the picker item listing; the default shows unpicked items only
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub game: Option<String>,
    pub name_like: Option<String>,
    pub show_picked: bool,
    pub show_missing: bool,
    pub show_all: bool,
}

pub fn list_batch_items(
    conn: &Connection,
    batch_id: i64,
    filter: &ItemFilter,
) -> DbResult<Vec<BatchItem>> {
    let mut sql = format!("SELECT {ITEM_COLUMNS} FROM batch_items WHERE batch_id = ?1");
    let mut args: Vec<rusqlite::types::Value> = vec![batch_id.into()];
    if let Some(game) = &filter.game {
        sql.push_str(" AND game = ?");
        args.push(game.clone().into());
    }
    if let Some(q) = &filter.name_like {
        sql.push_str(" AND card_name LIKE ?");
        args.push(format!("%{q}%").into());
    }
    if !filter.show_all {
        if !filter.show_picked {
            sql.push_str(" AND qty_picked < qty_required");
        }
        if filter.show_missing {
            sql.push_str(" AND is_missing = 1");
        }
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), item_from_row)?;
    rows.collect()
}

pub fn list_missing_items(conn: &Connection, batch_id: i64) -> DbResult<Vec<BatchItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM batch_items
         WHERE batch_id = ?1 AND is_missing = 1
         ORDER BY game, set_code, card_name"
    ))?;
    let rows = stmt.query_map(params![batch_id], item_from_row)?;
    rows.collect()
}

pub fn link_scryfall(conn: &Connection, item_id: i64, scryfall_id: &str) -> DbResult<usize> {
    conn.execute(
        "UPDATE batch_items SET scryfall_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![scryfall_id, utc_now(), item_id],
    )
}

/// Item counts shown in the picker header
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchCounts {
    pub total: i64,
    pub remaining: i64,
    pub missing: i64,
}

pub fn batch_counts(conn: &Connection, batch_id: i64) -> DbResult<BatchCounts> {
    let total = conn.query_row(
        "SELECT COUNT(*) FROM batch_items WHERE batch_id = ?1",
        params![batch_id],
        |row| row.get(0),
    )?;
    let remaining = conn.query_row(
        "SELECT COUNT(*) FROM batch_items WHERE batch_id = ?1 AND qty_picked < qty_required",
        params![batch_id],
        |row| row.get(0),
    )?;
    let missing = conn.query_row(
        "SELECT COUNT(*) FROM batch_items WHERE batch_id = ?1 AND is_missing = 1",
        params![batch_id],
        |row| row.get(0),
    )?;
    Ok(BatchCounts {
        total,
        remaining,
        missing,
    })
}

/// Counts for the close-out summary view
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchSummaryCounts {
    pub total: i64,
    pub picked: i64,
    pub missing: i64,
}

pub fn batch_summary_counts(conn: &Connection, batch_id: i64) -> DbResult<BatchSummaryCounts> {
    let total = conn.query_row(
        "SELECT COUNT(*) FROM batch_items WHERE batch_id = ?1",
        params![batch_id],
        |row| row.get(0),
    )?;
    let picked = conn.query_row(
        "SELECT COUNT(*) FROM batch_items WHERE batch_id = ?1 AND qty_picked >= qty_required",
        params![batch_id],
        |row| row.get(0),
    )?;
    let missing = conn.query_row(
        "SELECT COUNT(*) FROM batch_items WHERE batch_id = ?1 AND is_missing = 1",
        params![batch_id],
        |row| row.get(0),
    )?;
    Ok(BatchSummaryCounts {
        total,
        picked,
        missing,
    })
}

// ── Events ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub batch_item_id: i64,
    pub qty: i64,
    pub timestamp: String,
    pub user_session_id: Option<String>,
    pub card_name: String,
}

/// Append one audit-log row. Events are write-once; nothing updates them.
pub fn insert_event(
    conn: &Connection,
    event_type: &str,
    batch_item_id: i64,
    qty: i64,
    session_id: Option<&str>,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO events (type, batch_item_id, qty, timestamp, user_session_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![event_type, batch_item_id, qty, utc_now(), session_id],
    )?;
    Ok(())
}

/// Full audit trail for a batch, newest first, joined with card names
pub fn list_events(conn: &Connection, batch_id: i64) -> DbResult<Vec<EventRow>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.type, e.batch_item_id, e.qty, e.timestamp, e.user_session_id, bi.card_name
         FROM events e
         JOIN batch_items bi ON bi.id = e.batch_item_id
         WHERE bi.batch_id = ?1
         ORDER BY e.timestamp DESC, e.id DESC",
    )?;
    let rows = stmt.query_map(params![batch_id], |row| {
        Ok(EventRow {
            id: row.get(0)?,
            event_type: row.get(1)?,
            batch_item_id: row.get(2)?,
            qty: row.get(3)?,
            timestamp: row.get(4)?,
            user_session_id: row.get(5)?,
            card_name: row.get(6)?,
        })
    })?;
    rows.collect()
}

pub fn count_events_for_item(conn: &Connection, item_id: i64) -> DbResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM events WHERE batch_item_id = ?1",
        params![item_id],
        |row| row.get(0),
    )
}

// ── Set reservations ───────────────────────────────────────────────────────

/// set_code -> reserved_by for every reservation in a batch
pub fn reservation_map(conn: &Connection, batch_id: i64) -> DbResult<HashMap<String, String>> {
    let mut stmt =
        conn.prepare("SELECT set_code, reserved_by FROM set_reservations WHERE batch_id = ?1")?;
    let rows = stmt.query_map(params![batch_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect()
}

// ── ManaPool order cache ───────────────────────────────────────────────────

/// Overwrite the cached raw payload for an order
pub fn save_order_cache(conn: &Connection, order_id: &str, raw_json: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO manapool_orders_cache (order_id, raw_json, fetched_at)
         VALUES (?1, ?2, ?3)",
        params![order_id, raw_json, utc_now()],
    )?;
    Ok(())
}

pub fn load_order_cache(conn: &Connection, order_id: &str) -> DbResult<Option<String>> {
    conn.query_row(
        "SELECT raw_json FROM manapool_orders_cache WHERE order_id = ?1",
        params![order_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn list_cached_order_ids(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT order_id FROM manapool_orders_cache")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

pub fn order_cache_count(conn: &Connection) -> DbResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM manapool_orders_cache", [], |row| {
        row.get(0)
    })
}

// ── Card cache ─────────────────────────────────────────────────────────────

/// One resolved catalog entry as stored: identity columns plus the full JSON
#[derive(Debug, Clone)]
pub struct CachedCard {
    pub scryfall_id: String,
    pub card_name: Option<String>,
    pub set_code: Option<String>,
    pub collector_number: Option<String>,
    pub data_json: String,
}

pub fn save_card_cache(conn: &Connection, card: &CachedCard) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO card_cache
             (scryfall_id, card_name, set_code, collector_number, data_json, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            card.scryfall_id,
            card.card_name,
            card.set_code,
            card.collector_number,
            card.data_json,
            utc_now(),
        ],
    )?;
    Ok(())
}

/// Persist many resolved entries in one transaction
pub fn save_cards_cache_bulk(conn: &mut Connection, cards: &[CachedCard]) -> DbResult<()> {
    if cards.is_empty() {
        return Ok(());
    }
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR REPLACE INTO card_cache
                 (scryfall_id, card_name, set_code, collector_number, data_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let now = utc_now();
        for card in cards {
            stmt.execute(params![
                card.scryfall_id,
                card.card_name,
                card.set_code,
                card.collector_number,
                card.data_json,
                now,
            ])?;
        }
    }
    tx.commit()
}

pub fn load_card_cache(conn: &Connection, scryfall_id: &str) -> DbResult<Option<String>> {
    conn.query_row(
        "SELECT data_json FROM card_cache WHERE scryfall_id = ?1",
        params![scryfall_id],
        |row| row.get(0),
    )
    .optional()
}

/// Load cached entries for many ids in one query; absent ids are simply omitted
pub fn load_cards_cache(
    conn: &Connection,
    scryfall_ids: &[String],
) -> DbResult<HashMap<String, String>> {
    if scryfall_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = vec!["?"; scryfall_ids.len()].join(",");
    let mut stmt = conn.prepare(&format!(
        "SELECT scryfall_id, data_json FROM card_cache WHERE scryfall_id IN ({placeholders})"
    ))?;
    let rows = stmt.query_map(rusqlite::params_from_iter(scryfall_ids.iter()), |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    rows.collect()
}

// ── Sync log ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SyncLogRow {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub summary_json: Option<String>,
    pub error_text: Option<String>,
}

/// Open a sync-log row with status=running; finalized exactly once later
pub fn create_sync_log(conn: &Connection) -> DbResult<i64> {
    conn.execute(
        "INSERT INTO manapool_sync_log (started_at, status) VALUES (?1, 'running')",
        params![utc_now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_sync_log(
    conn: &Connection,
    log_id: i64,
    status: &str,
    summary_json: Option<&str>,
    error_text: Option<&str>,
) -> DbResult<()> {
    conn.execute(
        "UPDATE manapool_sync_log
         SET finished_at = ?1, status = ?2, summary_json = ?3, error_text = ?4
         WHERE id = ?5",
        params![utc_now(), status, summary_json, error_text, log_id],
    )?;
    Ok(())
}

pub fn last_sync_log(conn: &Connection) -> DbResult<Option<SyncLogRow>> {
    conn.query_row(
        "SELECT id, started_at, finished_at, status, summary_json, error_text
         FROM manapool_sync_log ORDER BY started_at DESC, id DESC LIMIT 1",
        [],
        |row| {
            Ok(SyncLogRow {
                id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                status: row.get(3)?,
                summary_json: row.get(4)?,
                error_text: row.get(5)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create an in-memory database for testing
    pub fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();
        for table in [
            "batches",
            "batch_items",
            "events",
            "set_reservations",
            "manapool_orders_cache",
            "card_cache",
            "manapool_sync_log",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn insert_and_list_open_batches() {
        let conn = test_db();
        let batch_id = insert_batch(&conn, "Test Batch", Some("Local"), None).unwrap();
        insert_batch_item(
            &conn,
            batch_id,
            &NewBatchItem {
                game: "Magic".to_string(),
                card_name: "Black Lotus".to_string(),
                qty_required: 2,
                ..Default::default()
            },
        )
        .unwrap();

        let batches = list_open_batches(&conn).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch.name, "Test Batch");
        assert_eq!(batches[0].remaining_count, 1);

        close_batch(&conn, batch_id).unwrap();
        assert!(list_open_batches(&conn).unwrap().is_empty());
        assert_eq!(get_batch(&conn, batch_id).unwrap().unwrap().status, "closed");
    }

    #[test]
    fn item_filter_defaults_to_unpicked_rows() {
        let conn = test_db();
        let batch_id = insert_batch(&conn, "B", None, None).unwrap();
        let done = insert_batch_item(
            &conn,
            batch_id,
            &NewBatchItem {
                card_name: "Done".to_string(),
                qty_required: 0,
                ..Default::default()
            },
        )
        .unwrap();
        insert_batch_item(
            &conn,
            batch_id,
            &NewBatchItem {
                card_name: "Open".to_string(),
                qty_required: 1,
                ..Default::default()
            },
        )
        .unwrap();

        let items = list_batch_items(&conn, batch_id, &ItemFilter::default()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].card_name, "Open");

        let all = list_batch_items(
            &conn,
            batch_id,
            &ItemFilter {
                show_all: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|i| i.id == done));
    }

    #[test]
    fn item_filter_matches_name_substring() {
        let conn = test_db();
        let batch_id = insert_batch(&conn, "B", None, None).unwrap();
        for name in ["Lightning Bolt", "Lightning Helix", "Counterspell"] {
            insert_batch_item(
                &conn,
                batch_id,
                &NewBatchItem {
                    card_name: name.to_string(),
                    qty_required: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let items = list_batch_items(
            &conn,
            batch_id,
            &ItemFilter {
                name_like: Some("Lightning".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn order_cache_overwrites_on_refetch() {
        let conn = test_db();
        save_order_cache(&conn, "ord_1", "{\"v\":1}").unwrap();
        save_order_cache(&conn, "ord_1", "{\"v\":2}").unwrap();
        assert_eq!(order_cache_count(&conn).unwrap(), 1);
        assert_eq!(
            load_order_cache(&conn, "ord_1").unwrap().as_deref(),
            Some("{\"v\":2}")
        );
    }

    #[test]
    fn card_cache_bulk_roundtrip() {
        let mut conn = test_db();
        let cards = vec![
            CachedCard {
                scryfall_id: "id-1".to_string(),
                card_name: Some("Black Lotus".to_string()),
                set_code: Some("lea".to_string()),
                collector_number: Some("232".to_string()),
                data_json: "{\"id\":\"id-1\"}".to_string(),
            },
            CachedCard {
                scryfall_id: "id-2".to_string(),
                card_name: None,
                set_code: None,
                collector_number: None,
                data_json: "{\"id\":\"id-2\"}".to_string(),
            },
        ];
        save_cards_cache_bulk(&mut conn, &cards).unwrap();

        let loaded = load_cards_cache(
            &conn,
            &[
                "id-1".to_string(),
                "id-2".to_string(),
                "id-unknown".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["id-1"], "{\"id\":\"id-1\"}");
        assert!(load_card_cache(&conn, "id-unknown").unwrap().is_none());
    }

    #[test]
    fn sync_log_lifecycle() {
        let conn = test_db();
        let log_id = create_sync_log(&conn).unwrap();
        let running = last_sync_log(&conn).unwrap().unwrap();
        assert_eq!(running.status, "running");
        assert!(running.finished_at.is_none());

        finish_sync_log(&conn, log_id, "ok", Some("{\"unique_cards\":3}"), None).unwrap();
        let done = last_sync_log(&conn).unwrap().unwrap();
        assert_eq!(done.status, "ok");
        assert!(done.finished_at.is_some());
        assert_eq!(done.summary_json.as_deref(), Some("{\"unique_cards\":3}"));
    }

    #[test]
    fn events_join_card_names() {
        let conn = test_db();
        let batch_id = insert_batch(&conn, "B", None, None).unwrap();
        let item_id = insert_batch_item(
            &conn,
            batch_id,
            &NewBatchItem {
                card_name: "Brainstorm".to_string(),
                qty_required: 1,
                ..Default::default()
            },
        )
        .unwrap();
        insert_event(&conn, "pick", item_id, 1, Some("sess-1")).unwrap();

        let events = list_events(&conn, batch_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "pick");
        assert_eq!(events[0].card_name, "Brainstorm");
        assert_eq!(events[0].user_session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn schema_is_idempotent_and_data_survives_reopen() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("picklist.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            init_schema(&conn).unwrap();
            insert_batch(&conn, "Persisted", Some("manapool"), None).unwrap();
        }

        let conn = Connection::open(&db_path).unwrap();
        // Running init again against existing tables must be harmless.
        init_schema(&conn).unwrap();
        let batches = list_open_batches(&conn).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch.name, "Persisted");
    }
}
