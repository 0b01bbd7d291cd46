use chrono::{DateTime, Duration, Utc};
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::FeedConfig;
use crate::database::stores::{ActivityStore, CatalogStore};
use crate::database::Stores;
use crate::errors::{AppError, Result};
use crate::models::{
    activity::{Activity, ActivityType},
    product::Product,
};

/// Bonus for products in the user's first, second and third strongest category.
const CATEGORY_BONUS: [f64; 3] = [30.0, 20.0, 10.0];
const PRODUCT_AFFINITY_FACTOR: f64 = 2.0;
const RECENCY_WINDOW_DAYS: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct ScoredProduct {
    pub product: Product,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub kind: ActivityType,
    pub product_id: Option<ObjectId>,
    pub category: Option<String>,
    pub search_query: Option<String>,
}

pub struct FeedService {
    catalog: Arc<dyn CatalogStore>,
    activities: Arc<dyn ActivityStore>,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(stores: &Stores, config: FeedConfig) -> Self {
        FeedService {
            catalog: stores.catalog.clone(),
            activities: stores.activities.clone(),
            config,
        }
    }

    pub async fn record(&self, user_id: ObjectId, activity: NewActivity) -> Result<Activity> {
        let mut category = activity.category.filter(|c| !c.trim().is_empty());
        if let Some(product_id) = &activity.product_id {
            let product = self
                .catalog
                .find_product(product_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Product {}", product_id.to_hex())))?;
            category.get_or_insert(product.category);
        } else if activity.kind != ActivityType::Search && category.is_none() {
            return Err(AppError::invalid_data("Activity needs a product or a category"));
        }

        let activity = Activity::new(user_id, activity.kind, activity.product_id, category, activity.search_query);
        self.activities.record(activity).await
    }

    /// Products ranked for `user`; anonymous users and users without recent
    /// activity get the newest products instead.
    pub async fn feed(&self, user: Option<ObjectId>, limit: usize) -> Result<Vec<ScoredProduct>> {
        let now = Utc::now();
        let activities = match user {
            Some(user_id) => {
                let since = now - Duration::days(self.config.retention_days);
                self.activities
                    .recent_for_user(&user_id, since, self.config.activity_window)
                    .await?
            }
            None => Vec::new(),
        };

        if activities.is_empty() {
            let newest = self.catalog.newest_products(limit).await?;
            return Ok(newest
                .into_iter()
                .map(|product| ScoredProduct { product, score: 0.0 })
                .collect());
        }

        let candidates = self.catalog.newest_products(self.config.candidate_pool).await?;
        let mut ranked = rank_products(&activities, candidates, now);
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[derive(Debug, Default)]
struct Signals {
    categories: HashMap<String, f64>,
    products: HashMap<ObjectId, f64>,
}

impl Signals {
    fn from_activities(activities: &[Activity]) -> Self {
        let mut signals = Signals::default();
        for activity in activities {
            let weight = f64::from(activity.weight);
            if let Some(category) = &activity.category {
                *signals.categories.entry(category.clone()).or_default() += weight;
            }
            if let Some(product_id) = activity.product_id {
                *signals.products.entry(product_id).or_default() += weight;
            }
        }
        signals
    }

    fn top_categories(&self) -> Vec<&str> {
        let mut ranked: Vec<(&str, f64)> = self
            .categories
            .iter()
            .map(|(category, weight)| (category.as_str(), *weight))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(CATEGORY_BONUS.len()).map(|(c, _)| c).collect()
    }
}

/// Scores candidates against the activity signals and sorts them best first.
/// The sort is stable, so equal scores keep the candidate order.
pub fn rank_products(activities: &[Activity], candidates: Vec<Product>, now: DateTime<Utc>) -> Vec<ScoredProduct> {
    let signals = Signals::from_activities(activities);
    let top = signals.top_categories();

    let mut scored: Vec<ScoredProduct> = candidates
        .into_iter()
        .map(|product| {
            let category_bonus = top
                .iter()
                .position(|category| *category == product.category)
                .map(|rank| CATEGORY_BONUS[rank])
                .unwrap_or(0.0);
            let affinity = product
                .id
                .and_then(|id| signals.products.get(&id).copied())
                .unwrap_or(0.0)
                * PRODUCT_AFFINITY_FACTOR;
            let age_days = (now - product.created_at).num_days() as f64;
            let recency = (RECENCY_WINDOW_DAYS - age_days).max(0.0);

            ScoredProduct {
                score: category_bonus + affinity + recency,
                product,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(category: &str, age_days: i64, now: DateTime<Utc>) -> Product {
        let mut product = Product::new(ObjectId::new(), format!("{} item", category), 100.0, category);
        product.id = Some(ObjectId::new());
        product.created_at = now - Duration::days(age_days);
        product
    }

    fn activity(kind: ActivityType, product: Option<&Product>, category: &str) -> Activity {
        Activity::new(
            ObjectId::new(),
            kind,
            product.and_then(|p| p.id),
            Some(category.to_string()),
            None,
        )
    }

    #[test]
    fn category_ranks_and_recency_combine() {
        let now = Utc::now();
        let shoes = product("shoes", 5, now);
        let bags = product("bags", 5, now);
        let hats = product("hats", 5, now);
        let other = product("books", 5, now);

        let activities = vec![
            activity(ActivityType::Purchase, None, "shoes"),
            activity(ActivityType::Cart, None, "bags"),
            activity(ActivityType::View, None, "hats"),
        ];
        let ranked = rank_products(&activities, vec![other, hats, bags, shoes], now);
        let scores: Vec<(String, f64)> = ranked
            .iter()
            .map(|s| (s.product.category.clone(), s.score))
            .collect();

        assert_eq!(
            scores,
            vec![
                ("shoes".to_string(), 45.0),
                ("bags".to_string(), 35.0),
                ("hats".to_string(), 25.0),
                ("books".to_string(), 15.0),
            ]
        );
    }

    #[test]
    fn product_affinity_counts_double() {
        let now = Utc::now();
        let liked = product("toys", 30, now);
        let activities = vec![
            activity(ActivityType::Wishlist, Some(&liked), "toys"),
            activity(ActivityType::Click, Some(&liked), "toys"),
        ];
        let ranked = rank_products(&activities, vec![liked], now);
        // 30 for the top category, 2 x (5 + 2) affinity, no recency past 20 days.
        assert_eq!(ranked[0].score, 44.0);
    }

    #[test]
    fn only_three_categories_earn_a_bonus() {
        let now = Utc::now();
        let fourth = product("d", 40, now);
        let activities = vec![
            activity(ActivityType::Purchase, None, "a"),
            activity(ActivityType::Cart, None, "b"),
            activity(ActivityType::Wishlist, None, "c"),
            activity(ActivityType::View, None, "d"),
        ];
        let ranked = rank_products(&activities, vec![fourth], now);
        assert_eq!(ranked[0].score, 0.0);
    }
}
