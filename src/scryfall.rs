//! Scryfall catalog resolver
//!
//! Resolves loose card references (id, set+number, fuzzy name) against the
//! Scryfall API, backed by the durable `card_cache` table. Upstream failures
//! are swallowed at this layer; callers see `None` and degrade to whatever
//! raw data they already have.

use crate::db::{self, CachedCard, Db};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const USER_AGENT: &str = "picklist/1.0";

/// Scryfall card response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScryfallCard {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub set: Option<String>,
    #[serde(default)]
    pub collector_number: Option<String>,
    #[serde(default)]
    pub image_uris: Option<ImageUris>,
    /// For double-faced cards, images are in card_faces
    #[serde(default)]
    pub card_faces: Option<Vec<CardFace>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUris {
    pub small: Option<String>,
    pub normal: Option<String>,
    pub large: Option<String>,
    #[serde(default)]
    pub png: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardFace {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_uris: Option<ImageUris>,
}

impl ImageUris {
    fn by_size(&self, size: &str) -> Option<&str> {
        match size {
            "small" => self.small.as_deref(),
            "normal" => self.normal.as_deref(),
            "large" => self.large.as_deref(),
            "png" => self.png.as_deref(),
            _ => None,
        }
    }
}

impl ScryfallCard {
    /// Get the image URL for a size, preferring direct image_uris and
    /// falling back to the front face of a double-faced card
    pub fn image_url(&self, size: &str) -> Option<&str> {
        if let Some(ref uris) = self.image_uris {
            return uris.by_size(size);
        }
        if let Some(face) = self.card_faces.as_ref().and_then(|faces| faces.first()) {
            if let Some(ref uris) = face.image_uris {
                return uris.by_size(size);
            }
        }
        None
    }
}

/// Search response wrapper for /cards/search
#[derive(Debug, Deserialize)]
struct SearchList {
    #[serde(default)]
    data: Vec<ScryfallCard>,
}

/// A loose card reference carrying whatever identity the source had
#[derive(Debug, Clone, Default)]
pub struct CardRef {
    pub scryfall_id: Option<String>,
    pub set_code: Option<String>,
    pub collector_number: Option<String>,
    pub card_name: Option<String>,
}

impl CardRef {
    /// Build a reference from a stored batch item, dropping empty fields
    pub fn from_item(item: &crate::db::BatchItem) -> Self {
        let non_empty = |s: &str| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };
        Self {
            scryfall_id: item.scryfall_id.as_deref().and_then(non_empty),
            set_code: non_empty(&item.set_code),
            collector_number: item.collector_number.as_deref().and_then(non_empty),
            card_name: non_empty(&item.card_name),
        }
    }
}

/// Which lookup in the fallback chain produced the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveStrategy {
    Id,
    Set,
    Fuzzy,
}

#[derive(Debug, Clone)]
pub struct ScryfallConfig {
    pub base_url: String,
    pub max_workers: usize,
    pub timeout_seconds: u64,
}

impl Default for ScryfallConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.scryfall.com".to_string(),
            max_workers: 8,
            timeout_seconds: 15,
        }
    }
}

impl ScryfallConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("SCRYFALL_BASE_URL").unwrap_or(defaults.base_url),
            max_workers: std::env::var("SCRYFALL_MAX_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_workers),
            timeout_seconds: defaults.timeout_seconds,
        }
    }
}

/// Scryfall API client with a durable local cache
pub struct ScryfallClient {
    config: ScryfallConfig,
    http: reqwest::Client,
}

impl ScryfallClient {
    pub fn new(config: ScryfallConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// GET a card-shaped response; any transport error or non-200 becomes None
    async fn get_card(&self, url: &str, query: &[(&str, &str)]) -> Option<ScryfallCard> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            log::debug!("Scryfall returned {} for {}", resp.status(), url);
            return None;
        }
        resp.json::<ScryfallCard>().await.ok()
    }

    fn save(&self, db: &Db, card: &ScryfallCard) {
        let cached = match to_cached(card) {
            Some(c) => c,
            None => return,
        };
        let conn = db.lock().unwrap();
        if let Err(e) = db::save_card_cache(&conn, &cached) {
            log::warn!("Failed to cache card {}: {}", card.id, e);
        }
    }

    /// Fetch a card by Scryfall id, cache-first
    pub async fn fetch_card_by_id(&self, db: &Db, scryfall_id: &str) -> Option<ScryfallCard> {
        let cached = {
            let conn = db.lock().unwrap();
            db::load_card_cache(&conn, scryfall_id).ok().flatten()
        };
        if let Some(json) = cached {
            if let Ok(card) = serde_json::from_str(&json) {
                return Some(card);
            }
        }
        let url = format!("{}/cards/{}", self.config.base_url, scryfall_id);
        let card = self.get_card(&url, &[]).await?;
        self.save(db, &card);
        Some(card)
    }

    /// Fetch a card by set code and collector number. The result is cached
    /// under its Scryfall id only, never under the compound key.
    pub async fn fetch_card_by_set(
        &self,
        db: &Db,
        set_code: &str,
        collector_number: &str,
    ) -> Option<ScryfallCard> {
        let url = format!(
            "{}/cards/{}/{}",
            self.config.base_url,
            set_code.to_lowercase(),
            collector_number
        );
        let card = self.get_card(&url, &[]).await?;
        self.save(db, &card);
        Some(card)
    }

    /// Fuzzy-name lookup
    pub async fn fetch_card_fuzzy(&self, db: &Db, name: &str) -> Option<ScryfallCard> {
        let url = format!("{}/cards/named", self.config.base_url);
        let card = self.get_card(&url, &[("fuzzy", name)]).await?;
        self.save(db, &card);
        Some(card)
    }

    /// Name search for manual card linking, newest printings first
    pub async fn search_cards(&self, name: &str, limit: usize) -> Vec<ScryfallCard> {
        let url = format!("{}/cards/search", self.config.base_url);
        let resp = match self
            .http
            .get(&url)
            .query(&[("q", name), ("order", "released")])
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return Vec::new(),
        };
        match resp.json::<SearchList>().await {
            Ok(list) => list.data.into_iter().take(limit).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Resolve a loose reference through the fallback chain:
    /// id, then set+number, then fuzzy name. First hit wins.
    pub async fn resolve(
        &self,
        db: &Db,
        reference: &CardRef,
    ) -> (Option<ScryfallCard>, Option<ResolveStrategy>) {
        if let Some(id) = &reference.scryfall_id {
            if let Some(card) = self.fetch_card_by_id(db, id).await {
                return (Some(card), Some(ResolveStrategy::Id));
            }
        }
        if let (Some(set_code), Some(number)) = (&reference.set_code, &reference.collector_number)
        {
            if let Some(card) = self.fetch_card_by_set(db, set_code, number).await {
                return (Some(card), Some(ResolveStrategy::Set));
            }
        }
        if let Some(name) = &reference.card_name {
            if let Some(card) = self.fetch_card_fuzzy(db, name).await {
                return (Some(card), Some(ResolveStrategy::Fuzzy));
            }
        }
        (None, None)
    }

    /// Batch lookup by id: one cache read, bounded concurrent fetch of the
    /// misses, one bulk cache write. Unresolvable ids are omitted.
    pub async fn fetch_cards_by_ids(
        &self,
        db: &Db,
        scryfall_ids: &[String],
    ) -> HashMap<String, ScryfallCard> {
        let mut ids: Vec<String> = Vec::new();
        for id in scryfall_ids {
            if !id.is_empty() && !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        if ids.is_empty() {
            return HashMap::new();
        }

        let cached_json = {
            let conn = db.lock().unwrap();
            db::load_cards_cache(&conn, &ids).unwrap_or_default()
        };
        let mut cards: HashMap<String, ScryfallCard> = cached_json
            .into_iter()
            .filter_map(|(id, json)| Some((id, serde_json::from_str(&json).ok()?)))
            .collect();

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !cards.contains_key(*id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return cards;
        }

        let workers = self.config.max_workers.clamp(1, missing.len());
        log::debug!(
            "Fetching {} uncached cards from Scryfall ({} workers)",
            missing.len(),
            workers
        );
        let fetched: Vec<(String, Option<ScryfallCard>)> =
            futures::stream::iter(missing.into_iter().map(|id| async move {
                let url = format!("{}/cards/{}", self.config.base_url, id);
                let card = self.get_card(&url, &[]).await;
                (id, card)
            }))
            .buffer_unordered(workers)
            .collect()
            .await;

        let new_cards: Vec<ScryfallCard> =
            fetched.into_iter().filter_map(|(_, card)| card).collect();
        let to_save: Vec<CachedCard> = new_cards.iter().filter_map(to_cached).collect();
        if !to_save.is_empty() {
            let mut conn = db.lock().unwrap();
            if let Err(e) = db::save_cards_cache_bulk(&mut conn, &to_save) {
                log::warn!("Failed to bulk-cache {} cards: {}", to_save.len(), e);
            }
        }
        for card in new_cards {
            cards.insert(card.id.clone(), card);
        }
        cards
    }
}

fn to_cached(card: &ScryfallCard) -> Option<CachedCard> {
    let data_json = serde_json::to_string(card).ok()?;
    Some(CachedCard {
        scryfall_id: card.id.clone(),
        card_name: card.name.clone(),
        set_code: card.set.clone(),
        collector_number: card.collector_number.clone(),
        data_json,
    })
}

#[cfg(test)]
#[path = "scryfall_tests.rs"]
mod tests;
