//! Marketplace vocabulary
//!
//! Categories, conditions, sizes and campus meetup spots shared by
//! listing validation, trade requests and SmartMatch scoring.

/// Category -> subcategories
pub const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Clothing",
        &[
            "Tops",
            "Bottoms",
            "Dresses",
            "Outerwear",
            "Shoes",
            "Accessories",
            "Athletic Wear",
            "Formal Wear",
        ],
    ),
    (
        "Books",
        &[
            "Textbooks",
            "Fiction",
            "Non-Fiction",
            "Reference",
            "Study Guides",
            "Academic Journals",
        ],
    ),
    (
        "Electronics",
        &[
            "Computers",
            "Phones",
            "Audio",
            "Gaming",
            "Accessories",
            "Cables & Chargers",
        ],
    ),
    (
        "Dorm Items",
        &[
            "Storage",
            "Decor",
            "Bedding",
            "Kitchen",
            "Cleaning Supplies",
            "Furniture",
        ],
    ),
    (
        "School Supplies",
        &[
            "Writing Tools",
            "Notebooks",
            "Bags",
            "Calculators",
            "Art Supplies",
            "Lab Equipment",
        ],
    ),
    (
        "Sports & Recreation",
        &[
            "Equipment",
            "Clothing",
            "Shoes",
            "Accessories",
            "Games",
            "Outdoor Gear",
        ],
    ),
    (
        "Other",
        &[
            "Miscellaneous",
            "Gifts",
            "Collectibles",
            "Tools",
            "Health & Beauty",
        ],
    ),
];

/// Categories where a size is mandatory and SmartMatch size scoring applies
pub const CLOTHING_CATEGORIES: &[&str] = &["Clothing"];

/// Ordered best -> worst
pub const CONDITIONS: &[&str] = &["Excellent", "Decent", "So-so", "Poor"];

pub const SIZES: &[&str] = &["XXS", "XS", "S", "M", "L", "XL", "XXL", "XXXL", "N/A"];

/// Letter sizes in ascending order, used for "close match" scoring
pub const SIZE_HIERARCHY: &[&str] = &["XXS", "XS", "S", "M", "L", "XL", "XXL", "XXXL"];

pub const CAMPUS_LOCATIONS: &[&str] = &[
    "Bothin Stairs",
    "Keck Lab",
    "Lower Booth",
    "Upper Booth",
    "Day Student Lounge",
    "Old Gym",
    "New Gym",
    "Pars",
    "High House",
    "Schoolhouse",
    "Kirby Quad",
    "CHE",
    "CHW",
    "Bothin",
    "CoLab",
    "McBean",
    "Johnson Library",
    "Theater",
    "Senior Lawn",
    "Pizza Lawn",
];

pub fn subcategories(category: &str) -> Option<&'static [&'static str]> {
    CATEGORIES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, subs)| *subs)
}

pub fn is_valid_category(category: &str) -> bool {
    subcategories(category).is_some()
}

pub fn is_valid_subcategory(category: &str, subcategory: &str) -> bool {
    subcategories(category)
        .map(|subs| subs.contains(&subcategory))
        .unwrap_or(false)
}

pub fn is_clothing(category: &str) -> bool {
    CLOTHING_CATEGORIES.contains(&category)
}

pub fn is_valid_condition(condition: &str) -> bool {
    CONDITIONS.contains(&condition)
}

pub fn is_valid_size(size: &str) -> bool {
    SIZES.contains(&size)
}

pub fn is_campus_location(location: &str) -> bool {
    CAMPUS_LOCATIONS.contains(&location)
}

/// Position of a letter size in [`SIZE_HIERARCHY`]; `None` for N/A and unknown sizes
pub fn size_rank(size: &str) -> Option<usize> {
    SIZE_HIERARCHY.iter().position(|s| *s == size)
}

/// Serializable snapshot for the `/api/catalog` endpoint
pub fn as_json() -> serde_json::Value {
    let categories: serde_json::Map<String, serde_json::Value> = CATEGORIES
        .iter()
        .map(|(name, subs)| (name.to_string(), serde_json::json!(subs)))
        .collect();

    serde_json::json!({
        "categories": categories,
        "clothing_categories": CLOTHING_CATEGORIES,
        "conditions": CONDITIONS,
        "sizes": SIZES,
        "campus_locations": CAMPUS_LOCATIONS,
        "item_status": {
            "available": "Available",
            "pending": "Pending Trade",
            "traded": "Traded"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcategory_belongs_to_category() {
        assert!(is_valid_subcategory("Books", "Textbooks"));
        assert!(is_valid_subcategory("Sports & Recreation", "Shoes"));
        assert!(!is_valid_subcategory("Books", "Shoes"));
        assert!(!is_valid_subcategory("Furniture", "Storage"));
    }

    #[test]
    fn test_size_rank_ignores_not_applicable() {
        assert_eq!(size_rank("XXS"), Some(0));
        assert_eq!(size_rank("M"), Some(3));
        assert_eq!(size_rank("N/A"), None);
        assert!(is_valid_size("N/A"));
    }

    #[test]
    fn test_only_clothing_requires_size() {
        assert!(is_clothing("Clothing"));
        assert!(!is_clothing("Sports & Recreation"));
    }

    #[test]
    fn test_catalog_json_lists_every_category() {
        let json = as_json();
        let categories = json["categories"].as_object().unwrap();
        assert_eq!(categories.len(), CATEGORIES.len());
        assert_eq!(json["campus_locations"].as_array().unwrap().len(), 20);
    }
}
