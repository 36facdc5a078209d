//! SmartMatch recommendations
//!
//! Ranks available listings for a user with a weighted sum over interaction
//! counters kept in their preferences record:
//!
//! | component | weight | input                                      |
//! |-----------|--------|--------------------------------------------|
//! | category  | 0.40   | `category_*` counters and browsing history |
//! | brand     | 0.25   | `brand_*` counters                         |
//! | size      | 0.20   | size preferences (clothing only)           |
//! | search    | 0.10   | search terms found in the item's text      |
//! | condition | 0.05   | fixed condition ladder                     |
//!
//! Every component is capped at 10, so a total never exceeds 10.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog;
use crate::db::{Database, DbError, Item, ItemWithOwner, PreferencesUpdate, UserPreferences};

const CATEGORY_WEIGHT: f64 = 0.4;
const BRAND_WEIGHT: f64 = 0.25;
const SIZE_WEIGHT: f64 = 0.2;
const SEARCH_WEIGHT: f64 = 0.1;
const CONDITION_WEIGHT: f64 = 0.05;

const COMPONENT_CAP: f64 = 10.0;

/// Size component for items where size doesn't matter
const NEUTRAL_SIZE_SCORE: f64 = 5.0;
const EXACT_SIZE_SCORE: f64 = 10.0;
const CLOSE_SIZE_SCORE: f64 = 7.0;

// ==========================================
// Activity tracking
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Search,
    Browse,
    View,
    Wishlist,
    Trade,
}

/// One user interaction worth learning from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: Option<ActivityKind>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub search_term: Option<String>,
}

impl Activity {
    /// Browsing the listing page, optionally narrowed to a category/subcategory
    pub fn browse(category: Option<&str>, subcategory: Option<&str>) -> Self {
        Self {
            kind: Some(ActivityKind::Browse),
            category: category.map(str::to_string),
            subcategory: subcategory.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn search(term: &str) -> Self {
        Self {
            kind: Some(ActivityKind::Search),
            search_term: Some(term.to_string()),
            ..Default::default()
        }
    }

    /// Interaction with a specific item
    pub fn with_item(kind: ActivityKind, item: &Item) -> Self {
        Self {
            kind: Some(kind),
            category: Some(item.category.clone()),
            subcategory: item.subcategory.clone(),
            brand: Some(item.brand.clone()),
            size: Some(item.size.clone()).filter(|s| !s.is_empty()),
            search_term: None,
        }
    }
}

fn bump(counters: &mut HashMap<String, i64>, key: String) {
    *counters.entry(key).or_insert(0) += 1;
}

/// Fold one activity into the user's counters
pub fn record_activity(prefs: &mut UserPreferences, activity: &Activity) {
    let now = Utc::now();
    prefs.updated_at = Some(now);
    prefs.last_recommendation_update = Some(now);

    match activity.kind {
        Some(ActivityKind::Search) => {
            if let Some(term) = activity.search_term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                bump(&mut prefs.search_history, term.to_lowercase());
            }
        }
        Some(ActivityKind::Browse) | Some(ActivityKind::View) => {
            let key = format!(
                "{}_{}",
                activity.category.as_deref().unwrap_or("all"),
                activity.subcategory.as_deref().unwrap_or("all")
            );
            bump(&mut prefs.browsing_history, key);
        }
        _ => {}
    }

    if let Some(category) = &activity.category {
        bump(&mut prefs.ai_preferences, format!("category_{}", category));
    }
    if let Some(brand) = &activity.brand {
        bump(&mut prefs.ai_preferences, format!("brand_{}", brand));
    }
    if let Some(size) = &activity.size {
        bump(&mut prefs.ai_preferences, format!("size_{}", size));
    }
}

/// Replace the explicit favorites that the update names
fn apply_favorites(prefs: &mut UserPreferences, update: PreferencesUpdate) {
    if let Some(categories) = update.favorite_categories {
        prefs.favorite_categories = categories;
    }
    if let Some(brands) = update.favorite_brands {
        prefs.favorite_brands = brands;
    }
    if let Some(sizes) = update.preferred_sizes {
        prefs.preferred_sizes = sizes;
    }
    let now = Utc::now();
    prefs.updated_at = Some(now);
    prefs.last_recommendation_update = Some(now);
}

// ==========================================
// Scoring
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchScore {
    pub total: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredItem {
    pub item: ItemWithOwner,
    pub score: f64,
    pub reasons: Vec<String>,
}

fn counter(map: &HashMap<String, i64>, key: &str) -> f64 {
    map.get(key).copied().unwrap_or(0) as f64
}

fn category_score(item: &Item, prefs: &UserPreferences) -> f64 {
    // Items without a subcategory only draw on the category-wide browse counter
    let subcategory_views = item
        .subcategory
        .as_deref()
        .map(|sub| counter(&prefs.browsing_history, &format!("{}_{}", item.category, sub)))
        .unwrap_or(0.0);
    let score = counter(&prefs.ai_preferences, &format!("category_{}", item.category)) * 0.5
        + subcategory_views * 0.3
        + counter(&prefs.browsing_history, &format!("{}_all", item.category)) * 0.2;
    score.min(COMPONENT_CAP)
}

fn brand_score(item: &Item, prefs: &UserPreferences) -> f64 {
    (counter(&prefs.ai_preferences, &format!("brand_{}", item.brand)) * 2.0).min(COMPONENT_CAP)
}

fn size_score(item: &Item, prefs: &UserPreferences) -> f64 {
    if !catalog::is_clothing(&item.category) {
        return NEUTRAL_SIZE_SCORE;
    }

    let preferred = item
        .subcategory
        .as_ref()
        .and_then(|sub| prefs.size_preferences.get(sub))
        .or_else(|| prefs.size_preferences.get(&item.category));

    let preferred = match preferred {
        Some(sizes) => sizes,
        None => return 0.0,
    };

    if preferred.iter().any(|s| *s == item.size) {
        return EXACT_SIZE_SCORE;
    }

    // Neighbouring letter sizes count as a close match; N/A and unknown sizes never do
    let close = catalog::size_rank(&item.size).is_some_and(|rank| {
        preferred
            .iter()
            .filter_map(|s| catalog::size_rank(s))
            .any(|p| rank.abs_diff(p) <= 1)
    });

    if close {
        CLOSE_SIZE_SCORE
    } else {
        0.0
    }
}

fn search_score(item: &Item, prefs: &UserPreferences) -> f64 {
    let text = format!(
        "{} {} {} {} {}",
        item.name,
        item.brand,
        item.category,
        item.subcategory.as_deref().unwrap_or(""),
        item.description
    )
    .to_lowercase();

    let score: f64 = prefs
        .search_history
        .iter()
        .filter(|(term, _)| !term.is_empty() && text.contains(term.to_lowercase().as_str()))
        .map(|(_, count)| *count as f64 * 2.0)
        .sum();

    score.min(COMPONENT_CAP)
}

fn condition_score(condition: &str) -> f64 {
    match condition {
        "Excellent" => 10.0,
        "Decent" => 7.0,
        "So-so" => 4.0,
        "Poor" => 1.0,
        _ => 5.0,
    }
}

/// Weighted relevance of `item` for a user, rounded to two decimals
pub fn score_item(item: &Item, prefs: Option<&UserPreferences>) -> MatchScore {
    let prefs = match prefs {
        Some(p) => p,
        None => {
            return MatchScore {
                total: 0.0,
                reasons: vec!["No preferences set".to_string()],
            }
        }
    };

    let mut total = 0.0;
    let mut reasons = Vec::new();

    let category = category_score(item, prefs);
    total += category * CATEGORY_WEIGHT;
    if category > 0.0 {
        reasons.push(format!("Matches your interest in {}", item.category));
    }

    let brand = brand_score(item, prefs);
    total += brand * BRAND_WEIGHT;
    if brand > 0.0 {
        reasons.push(format!("Brand {} matches your preferences", item.brand));
    }

    let size = size_score(item, prefs);
    total += size * SIZE_WEIGHT;
    if size > 0.0 {
        reasons.push(format!("Size {} matches your preferences", item.size));
    }

    let search = search_score(item, prefs);
    total += search * SEARCH_WEIGHT;
    if search > 0.0 {
        reasons.push("Matches your recent searches".to_string());
    }

    let condition = condition_score(&item.condition);
    total += condition * CONDITION_WEIGHT;
    if condition > 0.0 {
        reasons.push(format!("Excellent condition ({})", item.condition));
    }

    MatchScore {
        total: (total * 100.0).round() / 100.0,
        reasons,
    }
}

/// Score, sort best-first, keep `limit`, then drop non-positive scores
pub fn rank(candidates: Vec<ItemWithOwner>, prefs: Option<&UserPreferences>, limit: usize) -> Vec<ScoredItem> {
    let mut scored: Vec<ScoredItem> = candidates
        .into_iter()
        .map(|item| {
            let score = score_item(&item.item, prefs);
            ScoredItem {
                item,
                score: score.total,
                reasons: score.reasons,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored.retain(|s| s.score > 0.0);
    scored
}

// ==========================================
// Service
// ==========================================

/// SmartMatch operations against the database
#[derive(Clone)]
pub struct SmartMatch {
    db: Database,
    candidate_limit: i64,
}

impl SmartMatch {
    pub fn new(db: Database, candidate_limit: i64) -> Self {
        Self { db, candidate_limit }
    }

    pub async fn track(&self, user_id: Uuid, activity: &Activity) -> Result<UserPreferences, DbError> {
        self.db
            .modify_preferences(user_id, |prefs| record_activity(prefs, activity))
            .await
    }

    /// Tracking triggered by browsing must never break the request that caused it
    pub async fn track_best_effort(&self, user_id: Uuid, activity: Activity) {
        if let Err(e) = self.track(user_id, &activity).await {
            warn!("Failed to track {:?} activity for {}: {}", activity.kind, user_id, e);
        }
    }

    pub async fn recommend(&self, user_id: Uuid, limit: usize) -> Result<Vec<ScoredItem>, DbError> {
        let prefs = self.db.get_preferences(user_id).await?;
        let candidates = self
            .db
            .recommendation_candidates(user_id, self.candidate_limit)
            .await?;

        let candidate_count = candidates.len();
        let ranked = rank(candidates, prefs.as_ref(), limit);
        debug!(
            "SmartMatch for {}: {} candidates, {} recommended",
            user_id,
            candidate_count,
            ranked.len()
        );
        Ok(ranked)
    }

    /// Stored preferences, or an empty record for users with no history yet
    pub async fn preferences(&self, user_id: Uuid) -> Result<UserPreferences, DbError> {
        Ok(self
            .db
            .get_preferences(user_id)
            .await?
            .unwrap_or_else(|| UserPreferences::empty(user_id)))
    }

    pub async fn update_favorites(&self, user_id: Uuid, update: PreferencesUpdate) -> Result<UserPreferences, DbError> {
        self.db
            .modify_preferences(user_id, move |prefs| apply_favorites(prefs, update))
            .await
    }

    pub async fn update_sizes(
        &self,
        user_id: Uuid,
        sizes: HashMap<String, Vec<String>>,
    ) -> Result<UserPreferences, DbError> {
        self.db.update_size_preferences(user_id, sizes).await
    }

    /// Newest items matching the user's explicit favorites
    pub async fn favorites(&self, user_id: Uuid, limit: i64) -> Result<Vec<ItemWithOwner>, DbError> {
        let prefs = self.preferences(user_id).await?;
        self.db.favorite_matches(user_id, &prefs, limit).await
    }
}
