//! ManaPool sync pipeline
//!
//! A sync lists unfulfilled orders, fans out detail fetches in a bounded
//! pool, aggregates line items per card identity, and materializes the
//! result as a new batch in one transaction. Per-order failures are
//! collected, never fatal; the sync log row is finalized on every path.

use crate::db::{self, utc_now, Db};
use crate::error::{Error, Result};
use crate::logic::{map_condition, map_finish};
use crate::manapool::model::{Order, OrderEnvelope};
use crate::manapool::{FetchedOrder, ManapoolClient, Single};
use crate::scryfall::{ScryfallCard, ScryfallClient};
use futures::StreamExt;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const BATCH_SOURCE: &str = "manapool";

/// What a sync attempt did, persisted as the sync log's summary_json
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    pub batch_id: i64,
    pub batch_name: String,
    pub orders_scanned: usize,
    pub line_items: i64,
    pub unique_cards: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub recent_warning: Option<String>,
}

/// One marketplace line item that carries a resolvable card identity
#[derive(Debug, Clone)]
pub struct RawLineItem {
    pub scryfall_id: String,
    pub quantity: i64,
    pub single: Single,
    pub ship_name: Option<String>,
    pub order_ref: Option<String>,
}

/// Per-card-identity rollup across all scanned orders
#[derive(Debug, Clone, Default)]
pub struct AggregatedCard {
    pub quantity: i64,
    /// Raw fields from the first line item seen, the fallback when the
    /// catalog cannot resolve the id
    pub single: Option<Single>,
    pub buyer_names: BTreeSet<String>,
    pub order_refs: BTreeSet<String>,
}

/// Pull the usable line items out of one fetched order.
///
/// Items without a scryfall_id surface as one warning each and are excluded;
/// the returned total still counts their quantity.
pub fn collect_line_items(
    order_id: &str,
    order: &Order,
    warnings: &mut Vec<String>,
) -> (Vec<RawLineItem>, i64) {
    let ship_name = order
        .shipping_address
        .as_ref()
        .and_then(|addr| addr.name.clone());
    let mut items = Vec::new();
    let mut total_qty = 0i64;
    for line in &order.items {
        let qty = match line.quantity {
            Some(q) if q != 0 => q,
            _ => 1,
        };
        total_qty += qty;
        let single = line.product.as_ref().and_then(|p| p.single.clone());
        let scryfall_id = single
            .as_ref()
            .and_then(|s| s.scryfall_id.clone())
            .filter(|id| !id.is_empty());
        let Some(scryfall_id) = scryfall_id else {
            warnings.push(format!("Order {order_id}: missing scryfall_id"));
            continue;
        };
        let order_ref = match (&ship_name, &order.label) {
            (Some(name), Some(label)) => Some(format!("{name}, #{label}")),
            _ => None,
        };
        items.push(RawLineItem {
            scryfall_id,
            quantity: qty,
            single: single.unwrap_or_default(),
            ship_name: ship_name.clone(),
            order_ref,
        });
    }
    (items, total_qty)
}

/// Collapse line items into per-card required quantities. Commutative:
/// input order never changes the result.
pub fn aggregate(items: &[RawLineItem]) -> BTreeMap<String, AggregatedCard> {
    let mut aggregated: BTreeMap<String, AggregatedCard> = BTreeMap::new();
    for item in items {
        let entry = aggregated.entry(item.scryfall_id.clone()).or_default();
        entry.quantity += item.quantity;
        if entry.single.is_none() {
            entry.single = Some(item.single.clone());
        }
        if let Some(name) = &item.ship_name {
            entry.buyer_names.insert(name.clone());
        }
        if let Some(order_ref) = &item.order_ref {
            entry.order_refs.insert(order_ref.clone());
        }
    }
    aggregated
}

fn join_nonempty(values: &BTreeSet<String>, separator: &str) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(separator),
    )
}

/// Persist an aggregated result as one new open batch, all or nothing.
///
/// Display metadata comes from the resolved card when available, else from
/// the raw line-item fields. An error on any row rolls the batch back.
pub fn materialize_batch(
    conn: &mut Connection,
    name: &str,
    aggregated: &BTreeMap<String, AggregatedCard>,
    cards: &HashMap<String, ScryfallCard>,
    source_payload: &str,
) -> Result<i64> {
    let tx = conn.transaction()?;
    let batch_id = db::insert_batch(&tx, name, Some(BATCH_SOURCE), Some(source_payload))?;
    for (scryfall_id, info) in aggregated {
        let single = info.single.clone().unwrap_or_default();
        let card = cards.get(scryfall_id);
        let card_name = card
            .and_then(|c| c.name.clone())
            .or_else(|| single.name.clone())
            .unwrap_or_default();
        let set_code = card
            .and_then(|c| c.set.clone())
            .or_else(|| single.set.clone())
            .unwrap_or_default()
            .to_lowercase();
        let collector_number = card
            .and_then(|c| c.collector_number.clone())
            .or_else(|| single.number.clone());
        db::insert_batch_item(
            &tx,
            batch_id,
            &db::NewBatchItem {
                game: "Magic".to_string(),
                set_code,
                card_name,
                collector_number,
                scryfall_id: Some(scryfall_id.clone()),
                qty_required: info.quantity,
                condition: single
                    .condition_id
                    .as_deref()
                    .and_then(map_condition)
                    .map(String::from),
                language: single.language_id.clone(),
                printing: single
                    .finish_id
                    .as_deref()
                    .and_then(map_finish)
                    .map(String::from),
                order_names: join_nonempty(&info.buyer_names, ", "),
                order_refs: join_nonempty(&info.order_refs, "; "),
            },
        )?;
    }
    tx.commit()?;
    Ok(batch_id)
}

/// Advisory warning when another batch from the same source is younger than
/// the recency window. Never blocks the sync.
pub fn latest_batch_warning(conn: &Connection, recent_minutes: i64) -> Result<Option<String>> {
    let Some(created_at) = db::latest_batch_created_at(conn, BATCH_SOURCE)? else {
        return Ok(None);
    };
    let Ok(ts) = chrono::NaiveDateTime::parse_from_str(&created_at, "%Y-%m-%d %H:%M:%S") else {
        return Ok(None);
    };
    let age = chrono::Utc::now().naive_utc() - ts;
    if age < chrono::Duration::minutes(recent_minutes) {
        return Ok(Some(format!(
            "A ManaPool batch was generated at {created_at} (within {recent_minutes} minutes)."
        )));
    }
    Ok(None)
}

/// Extract the upstream order ids recorded in a batch's source payload
pub fn order_ids_from_payload(payload: Option<&str>) -> Vec<String> {
    let Some(payload) = payload else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return Vec::new();
    };
    value
        .get("order_ids")
        .and_then(|ids| ids.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Human-facing labels for a batch's source orders, resolved from the order
/// cache. Orders whose label is absent surface under their raw id.
pub fn order_labels_from_cache(conn: &Connection, payload: Option<&str>) -> Vec<String> {
    let mut labels = Vec::new();
    for order_id in order_ids_from_payload(payload) {
        let Ok(Some(raw)) = db::load_order_cache(conn, &order_id) else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<OrderEnvelope>(&raw) else {
            continue;
        };
        labels.push(
            envelope
                .order
                .and_then(|o| o.label)
                .unwrap_or(order_id),
        );
    }
    labels
}

/// Fill empty provenance columns on a batch's items from cached raw orders.
///
/// Older batches predate provenance capture; the order cache usually still
/// has everything needed to reconstruct it. Only fills, never overwrites.
pub fn backfill_order_names(
    conn: &Connection,
    batch_id: i64,
    order_ids: &[String],
) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, scryfall_id FROM batch_items
         WHERE batch_id = ?1
           AND ((order_names IS NULL OR order_names = '')
             OR (order_refs IS NULL OR order_refs = ''))",
    )?;
    let rows: Vec<(i64, Option<String>)> = stmt
        .query_map(params![batch_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    if rows.is_empty() {
        return Ok(());
    }

    let order_ids = if order_ids.is_empty() {
        db::list_cached_order_ids(conn)?
    } else {
        order_ids.to_vec()
    };
    if order_ids.is_empty() {
        return Ok(());
    }

    let mut name_map: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut ref_map: HashMap<String, BTreeSet<String>> = HashMap::new();
    for order_id in &order_ids {
        let Some(raw) = db::load_order_cache(conn, order_id)? else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<OrderEnvelope>(&raw) else {
            continue;
        };
        let Some(order) = envelope.order else {
            continue;
        };
        let Some(ship_name) = order
            .shipping_address
            .as_ref()
            .and_then(|addr| addr.name.clone())
        else {
            continue;
        };
        let order_ref = match &order.label {
            Some(label) => format!("{ship_name}, #{label}"),
            None => ship_name.clone(),
        };
        for line in &order.items {
            let Some(scryfall_id) = line
                .product
                .as_ref()
                .and_then(|p| p.single.as_ref())
                .and_then(|s| s.scryfall_id.clone())
            else {
                continue;
            };
            name_map
                .entry(scryfall_id.clone())
                .or_default()
                .insert(ship_name.clone());
            ref_map.entry(scryfall_id).or_default().insert(order_ref.clone());
        }
    }

    for (item_id, scryfall_id) in rows {
        let Some(scryfall_id) = scryfall_id else {
            continue;
        };
        let names = name_map.get(&scryfall_id).and_then(|n| join_nonempty(n, ", "));
        let refs = ref_map.get(&scryfall_id).and_then(|r| join_nonempty(r, "; "));
        if names.is_some() || refs.is_some() {
            conn.execute(
                "UPDATE batch_items
                 SET order_names = COALESCE(?1, order_names),
                     order_refs = COALESCE(?2, order_refs)
                 WHERE id = ?3",
                params![names, refs, item_id],
            )?;
        }
    }
    Ok(())
}

/// Run one sync attempt end to end. Returns the summary; the sync log row
/// is finalized exactly once whichever way this exits.
pub async fn run_sync(
    db: &Db,
    manapool: &ManapoolClient,
    scryfall: &ScryfallClient,
    max_workers: usize,
    recent_minutes: i64,
) -> Result<SyncSummary> {
    let log_id = {
        let conn = db.lock().unwrap();
        db::create_sync_log(&conn)?
    };

    if !manapool.is_configured() {
        let conn = db.lock().unwrap();
        db::finish_sync_log(&conn, log_id, "error", None, Some("ManaPool not configured"))?;
        return Err(Error::NotConfigured);
    }

    // Advisory only; a failure here must not leave the log row running.
    let recent_warning = {
        let conn = db.lock().unwrap();
        latest_batch_warning(&conn, recent_minutes).unwrap_or_else(|e| {
            log::warn!("Recent-batch check failed: {e}");
            None
        })
    };

    let orders = match manapool.list_unfulfilled_orders().await {
        Ok(orders) => orders,
        Err(e) => {
            let conn = db.lock().unwrap();
            db::finish_sync_log(&conn, log_id, "error", None, Some(&e.to_string()))?;
            return Err(e);
        }
    };
    let order_ids: Vec<String> = orders
        .iter()
        .filter_map(|o| o.id.clone())
        .filter(|id| !id.is_empty())
        .collect();
    log::info!("Syncing {} unfulfilled orders", order_ids.len());

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut raw_items = Vec::new();
    let mut line_items_total = 0i64;

    // Bounded fan-out; completion order is irrelevant to aggregation.
    let results: Vec<(String, Result<FetchedOrder>)> =
        futures::stream::iter(order_ids.iter().cloned().map(|order_id| async move {
            let result = manapool.fetch_order(&order_id).await;
            (order_id, result)
        }))
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await;

    for (order_id, result) in results {
        match result {
            Err(e) => errors.push(format!("Order {order_id}: {e}")),
            Ok(fetched) => {
                // Cache the raw payload right away so it survives any
                // failure later in the pipeline.
                {
                    let conn = db.lock().unwrap();
                    if let Err(e) = db::save_order_cache(&conn, &order_id, &fetched.raw_json) {
                        log::warn!("Failed to cache order {order_id}: {e}");
                    }
                }
                let order = fetched.envelope.order.unwrap_or_default();
                let (items, qty) = collect_line_items(&order_id, &order, &mut warnings);
                line_items_total += qty;
                raw_items.extend(items);
            }
        }
    }

    let aggregated = aggregate(&raw_items);
    let ids: Vec<String> = aggregated.keys().cloned().collect();
    let cards = scryfall.fetch_cards_by_ids(db, &ids).await;

    let batch_name = format!(
        "ManaPool Unfulfilled - {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M")
    );
    let source_payload = serde_json::json!({
        "order_ids": order_ids,
        "generated_at": utc_now(),
        "orders_scanned": order_ids.len(),
        "line_items": line_items_total,
        "unique_cards": aggregated.len(),
    })
    .to_string();

    let batch_id = {
        let mut conn = db.lock().unwrap();
        match materialize_batch(&mut conn, &batch_name, &aggregated, &cards, &source_payload) {
            Ok(id) => id,
            Err(e) => {
                db::finish_sync_log(&conn, log_id, "error", None, Some(&e.to_string()))?;
                return Err(e);
            }
        }
    };

    let summary = SyncSummary {
        batch_id,
        batch_name,
        orders_scanned: order_ids.len(),
        line_items: line_items_total,
        unique_cards: aggregated.len(),
        warnings,
        errors,
        recent_warning,
    };
    let status = if summary.errors.is_empty() { "ok" } else { "partial" };
    {
        let conn = db.lock().unwrap();
        let summary_json = serde_json::to_string(&summary).unwrap_or_else(|e| {
            log::warn!("Failed to serialize sync summary: {e}");
            "{}".to_string()
        });
        let error_text = if summary.errors.is_empty() {
            None
        } else {
            Some(summary.errors.join("; "))
        };
        db::finish_sync_log(&conn, log_id, status, Some(&summary_json), error_text.as_deref())?;
    }
    log::info!(
        "Sync finished ({status}): batch {} with {} unique cards, {} warnings, {} errors",
        summary.batch_id,
        summary.unique_cards,
        summary.warnings.len(),
        summary.errors.len()
    );
    Ok(summary)
}
