//! Pick state machine: per-item quantity transitions and set reservations
//!
//! Each transition is one transaction pairing a guarded UPDATE with its
//! event insert. The guard lives in the WHERE clause, so two pickers racing
//! on the same item cannot both pass the check and overshoot.

use crate::db::{self, utc_now, BatchItem};
use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Outcome of a transition: the fresh item state plus whether anything changed
#[derive(Debug)]
pub struct Transition {
    pub item: BatchItem,
    pub changed: bool,
}

fn require_item(conn: &Connection, item_id: i64) -> Result<BatchItem> {
    db::get_item(conn, item_id)?.ok_or(Error::NotFound)
}

/// Increment qty_picked by one while remaining > 0; otherwise a no-op that
/// logs nothing and leaves the item untouched.
pub fn pick_item(conn: &mut Connection, item_id: i64, session_id: Option<&str>) -> Result<Transition> {
    let tx = conn.transaction()?;
    require_item(&tx, item_id)?;
    let updated = tx.execute(
        "UPDATE batch_items SET qty_picked = qty_picked + 1, updated_at = ?1
         WHERE id = ?2 AND qty_picked < qty_required",
        params![utc_now(), item_id],
    )?;
    if updated > 0 {
        db::insert_event(&tx, "pick", item_id, 1, session_id)?;
    }
    let item = require_item(&tx, item_id)?;
    tx.commit()?;
    Ok(Transition {
        item,
        changed: updated > 0,
    })
}

/// Decrement qty_picked by one while it is positive; no-op at zero.
pub fn undo_pick(conn: &mut Connection, item_id: i64, session_id: Option<&str>) -> Result<Transition> {
    let tx = conn.transaction()?;
    require_item(&tx, item_id)?;
    let updated = tx.execute(
        "UPDATE batch_items SET qty_picked = qty_picked - 1, updated_at = ?1
         WHERE id = ?2 AND qty_picked > 0",
        params![utc_now(), item_id],
    )?;
    if updated > 0 {
        db::insert_event(&tx, "undo", item_id, 1, session_id)?;
    }
    let item = require_item(&tx, item_id)?;
    tx.commit()?;
    Ok(Transition {
        item,
        changed: updated > 0,
    })
}

/// Flag an item missing with an optional note. Always appends an event,
/// even when the flag was already set.
pub fn mark_missing(
    conn: &mut Connection,
    item_id: i64,
    note: &str,
    session_id: Option<&str>,
) -> Result<Transition> {
    let tx = conn.transaction()?;
    require_item(&tx, item_id)?;
    tx.execute(
        "UPDATE batch_items SET is_missing = 1, missing_note = ?1, updated_at = ?2 WHERE id = ?3",
        params![note, utc_now(), item_id],
    )?;
    db::insert_event(&tx, "missing", item_id, 0, session_id)?;
    let item = require_item(&tx, item_id)?;
    tx.commit()?;
    Ok(Transition {
        item,
        changed: true,
    })
}

/// Clear the missing flag and note. Always appends an event.
pub fn unmark_missing(
    conn: &mut Connection,
    item_id: i64,
    session_id: Option<&str>,
) -> Result<Transition> {
    let tx = conn.transaction()?;
    require_item(&tx, item_id)?;
    tx.execute(
        "UPDATE batch_items SET is_missing = 0, missing_note = NULL, updated_at = ?1 WHERE id = ?2",
        params![utc_now(), item_id],
    )?;
    db::insert_event(&tx, "unmissing", item_id, 0, session_id)?;
    let item = require_item(&tx, item_id)?;
    tx.commit()?;
    Ok(Transition {
        item,
        changed: true,
    })
}

/// Toggle a soft claim on a set code within a batch.
///
/// The same claimant re-submitting releases the reservation; anyone else
/// overwrites it. Returns the new holder, None after a release. No expiry.
pub fn toggle_reservation(
    conn: &mut Connection,
    batch_id: i64,
    set_code: &str,
    reserved_by: &str,
) -> Result<Option<String>> {
    let set_code = set_code.to_lowercase();
    let reserved_by = {
        let trimmed = reserved_by.trim();
        if trimmed.is_empty() {
            "anonymous"
        } else {
            trimmed
        }
    };
    let tx = conn.transaction()?;
    let existing: Option<String> = tx
        .query_row(
            "SELECT reserved_by FROM set_reservations WHERE batch_id = ?1 AND set_code = ?2",
            params![batch_id, set_code],
            |row| row.get(0),
        )
        .optional()?;
    let holder = if existing.as_deref() == Some(reserved_by) {
        tx.execute(
            "DELETE FROM set_reservations WHERE batch_id = ?1 AND set_code = ?2",
            params![batch_id, set_code],
        )?;
        None
    } else {
        tx.execute(
            "INSERT OR REPLACE INTO set_reservations (batch_id, set_code, reserved_by, reserved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![batch_id, set_code, reserved_by, utc_now()],
        )?;
        Some(reserved_by.to_string())
    };
    tx.commit()?;
    Ok(holder)
}
