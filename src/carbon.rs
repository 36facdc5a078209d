//! Carbon impact estimates for second-hand trades

use serde::Serialize;

use crate::db::{CarbonFootprint, CarbonSaving, SavingsType};

/// Used when no reference footprint exists for a category
pub const DEFAULT_CO2_KG: f64 = 20.0;
pub const DEFAULT_WATER_LITERS: f64 = 2000.0;
/// Share of the item's CO2 counted as diverted waste
pub const WASTE_DIVERSION_RATIO: f64 = 0.8;

pub const RECENT_SAVINGS_LIMIT: usize = 10;

/// Savings credited to each participant of a completed trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ItemSavings {
    pub co2_saved_kg: f64,
    pub water_saved_liters: f64,
    pub waste_diverted_kg: f64,
}

impl ItemSavings {
    pub fn from_footprint(footprint: Option<&CarbonFootprint>) -> Self {
        match footprint {
            Some(f) => Self {
                co2_saved_kg: f.kg_co2_per_item,
                water_saved_liters: f
                    .water_usage_liters
                    .filter(|w| *w > 0.0)
                    .unwrap_or(DEFAULT_WATER_LITERS),
                waste_diverted_kg: f.kg_co2_per_item * WASTE_DIVERSION_RATIO,
            },
            None => Self {
                co2_saved_kg: DEFAULT_CO2_KG,
                water_saved_liters: DEFAULT_WATER_LITERS,
                waste_diverted_kg: DEFAULT_CO2_KG * WASTE_DIVERSION_RATIO,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCarbonSummary {
    pub total_co2_saved: f64,
    pub total_water_saved: f64,
    pub total_waste_diverted: f64,
    pub total_trades: usize,
    pub recent_savings: Vec<CarbonSaving>,
    pub formatted: FormattedSavings,
}

/// Totals over a user's savings records (expected newest first)
pub fn summarize(savings: Vec<CarbonSaving>) -> UserCarbonSummary {
    let total_co2_saved: f64 = savings.iter().map(|s| s.co2_saved_kg).sum();
    let total_water_saved = savings.iter().filter_map(|s| s.water_saved_liters).sum();
    let total_waste_diverted = savings.iter().filter_map(|s| s.waste_diverted_kg).sum();
    let total_trades = savings
        .iter()
        .filter(|s| s.savings_type == SavingsType::TradeCompleted)
        .count();

    let mut recent_savings = savings;
    recent_savings.truncate(RECENT_SAVINGS_LIMIT);

    UserCarbonSummary {
        total_co2_saved,
        total_water_saved,
        total_waste_diverted,
        total_trades,
        recent_savings,
        formatted: format_savings(total_co2_saved),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedSavings {
    pub display: String,
    pub description: &'static str,
    pub equivalent: &'static str,
}

pub fn format_savings(co2_kg: f64) -> FormattedSavings {
    let rounded = (co2_kg * 10.0).round() / 10.0;

    let (description, equivalent) = if co2_kg < 1.0 {
        ("Small impact", "≈ 1 tree planted")
    } else if co2_kg < 5.0 {
        ("Good impact", "≈ 2-3 trees planted")
    } else if co2_kg < 15.0 {
        ("Great impact", "≈ 5-7 trees planted")
    } else if co2_kg < 30.0 {
        ("Excellent impact", "≈ 10-15 trees planted")
    } else {
        ("Outstanding impact", "≈ 15+ trees planted")
    };

    FormattedSavings {
        display: format!("{} kg CO₂", rounded),
        description,
        equivalent,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryAverage {
    pub category: &'static str,
    pub avg_co2: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FootprintComparison {
    pub new_item_co2: f64,
    pub used_item_co2: f64,
    pub categories: Vec<CategoryAverage>,
}

/// Published estimates for buying new versus trading used
pub fn comparison() -> FootprintComparison {
    let categories = [
        ("Clothing", 30.2),
        ("Electronics", 150.0),
        ("Books", 4.7),
        ("Dorm Items", 35.0),
        ("School Supplies", 8.5),
        ("Sports & Recreation", 25.0),
    ]
    .into_iter()
    .map(|(category, avg_co2)| CategoryAverage { category, avg_co2 })
    .collect();

    FootprintComparison {
        new_item_co2: 25.0,
        used_item_co2: 5.0,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn saving(co2: f64, kind: SavingsType) -> CarbonSaving {
        CarbonSaving {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            trade_id: None,
            co2_saved_kg: co2,
            water_saved_liters: Some(100.0),
            waste_diverted_kg: None,
            savings_type: kind,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_footprint_uses_defaults() {
        let s = ItemSavings::from_footprint(None);
        assert_eq!(s.co2_saved_kg, 20.0);
        assert_eq!(s.water_saved_liters, 2000.0);
        assert_eq!(s.waste_diverted_kg, 16.0);
    }

    #[test]
    fn test_footprint_derives_waste_and_water_fallback() {
        let footprint = CarbonFootprint {
            category: "Books".to_string(),
            subcategory: Some("Textbooks".to_string()),
            kg_co2_per_item: 5.0,
            manufacturing_emissions: 3.0,
            transportation_emissions: 1.0,
            disposal_emissions: 1.0,
            water_usage_liters: None,
            description: None,
        };
        let s = ItemSavings::from_footprint(Some(&footprint));
        assert_eq!(s.co2_saved_kg, 5.0);
        assert_eq!(s.waste_diverted_kg, 4.0);
        assert_eq!(s.water_saved_liters, DEFAULT_WATER_LITERS);
    }

    #[test]
    fn test_format_tiers() {
        assert_eq!(format_savings(0.44).description, "Small impact");
        assert_eq!(format_savings(0.44).display, "0.4 kg CO₂");
        assert_eq!(format_savings(1.0).description, "Good impact");
        assert_eq!(format_savings(14.96).description, "Great impact");
        assert_eq!(format_savings(14.96).display, "15 kg CO₂");
        assert_eq!(format_savings(29.9).equivalent, "≈ 10-15 trees planted");
        assert_eq!(format_savings(30.0).description, "Outstanding impact");
    }

    #[test]
    fn test_summary_counts_only_completed_trades() {
        let mut records = vec![
            saving(20.0, SavingsType::TradeCompleted),
            saving(5.5, SavingsType::TradeCompleted),
            saving(1.0, SavingsType::ItemListed),
        ];
        for _ in 0..10 {
            records.push(saving(0.5, SavingsType::WishlistAdded));
        }

        let summary = summarize(records);
        assert_eq!(summary.total_trades, 2);
        assert!((summary.total_co2_saved - 31.5).abs() < 1e-9);
        assert!((summary.total_water_saved - 1300.0).abs() < 1e-9);
        assert_eq!(summary.total_waste_diverted, 0.0);
        assert_eq!(summary.recent_savings.len(), RECENT_SAVINGS_LIMIT);
        assert_eq!(summary.formatted.description, "Outstanding impact");
    }

    #[test]
    fn test_comparison_favors_used_items() {
        let c = comparison();
        assert!(c.used_item_co2 < c.new_item_co2);
        assert_eq!(c.categories.len(), 6);
    }
}
