//! Pure pick-list helpers: sorting, remaining quantities, marketplace code maps

use crate::db::BatchItem;

/// Sort rank for a game name: Magic first, then other games, then blank
pub fn game_sort_key(game: &str) -> (u8, String) {
    if game.is_empty() {
        return (2, String::new());
    }
    if game.to_lowercase().starts_with("magic") {
        return (0, game.to_string());
    }
    (1, game.to_string())
}

/// Sort items for the picker view: game, then items with a set code before
/// those without, then set code, then card name.
pub fn sort_items(items: &mut [BatchItem]) {
    items.sort_by(|a, b| {
        let ka = (
            game_sort_key(&a.game),
            u8::from(a.set_code.trim().is_empty()),
            a.set_code.clone(),
            a.card_name.clone(),
        );
        let kb = (
            game_sort_key(&b.game),
            u8::from(b.set_code.trim().is_empty()),
            b.set_code.clone(),
            b.card_name.clone(),
        );
        ka.cmp(&kb)
    });
}

/// Derived remaining quantity, clamped at zero. Never stored.
pub fn remaining_qty(qty_required: i64, qty_picked: i64) -> i64 {
    (qty_required - qty_picked).max(0)
}

/// Map a ManaPool finish code to a display printing
pub fn map_finish(finish_id: &str) -> Option<&'static str> {
    match finish_id {
        "NF" => Some("Normal"),
        "FO" => Some("Foil"),
        "EF" => Some("Etched"),
        _ => None,
    }
}

/// Map a ManaPool condition code; the known grades pass through unchanged
pub fn map_condition(condition_id: &str) -> Option<&'static str> {
    match condition_id {
        "NM" => Some("NM"),
        "LP" => Some("LP"),
        "MP" => Some("MP"),
        "HP" => Some("HP"),
        "DMG" => Some("DMG"),
        _ => None,
    }
}
