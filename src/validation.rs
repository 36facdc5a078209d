//! Request bodies and their validation
//!
//! Field-level limits are declared with `validator`; rules that span fields
//! or consult the catalog are checked by hand afterwards.

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::catalog;
use crate::db::{Item, NewItemRecord, NewTradeRecord};

pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .map(|e| match &e.message {
                Some(message) => message.to_string(),
                None => e.code.to_string(),
            })
            .collect();
        messages.sort();
        ValidationError(messages.join("; "))
    }
}

/// Trimmed value, or an error naming the field when blank
fn required(value: &str, field: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ==========================================
// Items
// ==========================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewItem {
    #[validate(length(max = 100, message = "name must be at most 100 characters"))]
    pub name: String,
    pub brand: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub condition: String,
    #[serde(default)]
    pub size: Option<String>,
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: String,
    #[validate(length(min = 1, max = 4, message = "between 1 and 4 images are required"))]
    pub images: Vec<String>,
}

impl NewItem {
    /// Validate and normalize into an insertable record
    pub fn into_record(self, user_id: Uuid) -> Result<NewItemRecord, ValidationError> {
        self.validate()?;

        let name = required(&self.name, "name")?;
        let brand = required(&self.brand, "brand")?;
        let condition = required(&self.condition, "condition")?;
        let description = required(&self.description, "description")?;
        let category = required(&self.category, "category")?;

        if !catalog::is_valid_category(&category) {
            return Err(ValidationError::new(format!("unknown category: {}", category)));
        }

        let subcategory = optional(self.subcategory);
        if let Some(sub) = &subcategory {
            if !catalog::is_valid_subcategory(&category, sub) {
                return Err(ValidationError::new(format!(
                    "subcategory {} does not belong to {}",
                    sub, category
                )));
            }
        }

        if !catalog::is_valid_condition(&condition) {
            return Err(ValidationError::new(format!("unknown condition: {}", condition)));
        }

        let size = optional(self.size);
        match &size {
            Some(s) if !catalog::is_valid_size(s) => {
                return Err(ValidationError::new(format!("unknown size: {}", s)));
            }
            None if catalog::is_clothing(&category) => {
                return Err(ValidationError::new("size is required for clothing"));
            }
            _ => {}
        }

        let images: Vec<String> = self
            .images
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if images.is_empty() {
            return Err(ValidationError::new("between 1 and 4 images are required"));
        }

        Ok(NewItemRecord {
            user_id,
            name,
            brand,
            category,
            subcategory,
            condition,
            size: size.unwrap_or_default(),
            description,
            images,
        })
    }
}

/// Partial item edit; absent fields keep their stored value.
/// An empty `subcategory` or `size` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub condition: Option<String>,
    pub size: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
}

impl ItemUpdate {
    /// Overlay onto the stored item and revalidate the whole result
    pub fn merge(self, existing: &Item) -> Result<NewItemRecord, ValidationError> {
        let merged = NewItem {
            name: self.name.unwrap_or_else(|| existing.name.clone()),
            brand: self.brand.unwrap_or_else(|| existing.brand.clone()),
            category: self.category.unwrap_or_else(|| existing.category.clone()),
            subcategory: self.subcategory.or_else(|| existing.subcategory.clone()),
            condition: self.condition.unwrap_or_else(|| existing.condition.clone()),
            size: self.size.or_else(|| Some(existing.size.clone())),
            description: self.description.unwrap_or_else(|| existing.description.clone()),
            images: self.images.unwrap_or_else(|| existing.images.clone()),
        };
        merged.into_record(existing.user_id)
    }
}

// ==========================================
// Trades & Messages
// ==========================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTradeRequest {
    pub item_id: Uuid,
    #[validate(length(max = 500, message = "message must be at most 500 characters"))]
    pub message: Option<String>,
    pub meeting_location: Option<String>,
}

impl NewTradeRequest {
    pub fn into_record(self, from_user_id: Uuid, to_user_id: Uuid) -> Result<NewTradeRecord, ValidationError> {
        self.validate()?;

        let meeting_location = optional(self.meeting_location);
        if let Some(location) = &meeting_location {
            if !catalog::is_campus_location(location) {
                return Err(ValidationError::new(format!("unknown meeting location: {}", location)));
            }
        }

        Ok(NewTradeRecord {
            from_user_id,
            to_user_id,
            item_id: self.item_id,
            message: optional(self.message),
            meeting_location,
        })
    }
}

/// Trimmed message text of 1 to 2000 characters
pub fn message_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("message cannot be empty"));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::new("message must be at most 2000 characters"));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageBody {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectMessageBody {
    pub recipient_id: Uuid,
    #[serde(default)]
    pub item_id: Option<Uuid>,
    pub message: String,
}

// ==========================================
// Profiles
// ==========================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 3, max = 30, message = "username must be 3-30 characters"))]
    pub username: String,
    pub full_name: Option<String>,
    #[validate(url(message = "avatar_url must be a valid URL"))]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    /// Username plus trimmed optional fields
    pub fn normalized(self) -> Result<(String, Option<String>, Option<String>), ValidationError> {
        let username = self.username.trim().to_string();
        let candidate = ProfileUpdate {
            username: username.clone(),
            ..self
        };
        candidate.validate()?;

        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(ValidationError::new(
                "username may only contain letters, numbers, underscores and dots",
            ));
        }

        Ok((username, optional(candidate.full_name), optional(candidate.avatar_url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ItemStatus;
    use chrono::Utc;

    fn jacket() -> NewItem {
        NewItem {
            name: " Rain Jacket ".to_string(),
            brand: "Patagonia".to_string(),
            category: "Clothing".to_string(),
            subcategory: Some("Outerwear".to_string()),
            condition: "Excellent".to_string(),
            size: Some("M".to_string()),
            description: "Worn twice".to_string(),
            images: vec!["https://img.example/jacket.jpg".to_string()],
        }
    }

    #[test]
    fn test_valid_item_is_trimmed() {
        let owner = Uuid::new_v4();
        let record = jacket().into_record(owner).unwrap();
        assert_eq!(record.name, "Rain Jacket");
        assert_eq!(record.user_id, owner);
        assert_eq!(record.size, "M");
    }

    #[test]
    fn test_blank_required_fields_rejected() {
        let mut item = jacket();
        item.brand = "   ".to_string();
        assert_eq!(
            item.into_record(Uuid::new_v4()).unwrap_err().to_string(),
            "brand is required"
        );
    }

    #[test]
    fn test_catalog_rules() {
        let mut item = jacket();
        item.category = "Furniture".to_string();
        assert!(item.into_record(Uuid::new_v4()).is_err());

        let mut item = jacket();
        item.subcategory = Some("Textbooks".to_string());
        assert!(item.into_record(Uuid::new_v4()).is_err());

        let mut item = jacket();
        item.condition = "Mint".to_string();
        assert!(item.into_record(Uuid::new_v4()).is_err());

        let mut item = jacket();
        item.size = Some("Huge".to_string());
        assert!(item.into_record(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_size_required_only_for_clothing() {
        let mut item = jacket();
        item.size = None;
        assert_eq!(
            item.into_record(Uuid::new_v4()).unwrap_err().to_string(),
            "size is required for clothing"
        );

        let mut book = jacket();
        book.category = "Books".to_string();
        book.subcategory = None;
        book.size = Some(" ".to_string());
        assert_eq!(book.into_record(Uuid::new_v4()).unwrap().size, "");
    }

    #[test]
    fn test_image_count_and_lengths() {
        let mut item = jacket();
        item.images = vec![];
        assert!(item.into_record(Uuid::new_v4()).is_err());

        let mut item = jacket();
        item.images = vec!["u".to_string(); 5];
        assert!(item.into_record(Uuid::new_v4()).is_err());

        let mut item = jacket();
        item.name = "x".repeat(101);
        assert_eq!(
            item.into_record(Uuid::new_v4()).unwrap_err().to_string(),
            "name must be at most 100 characters"
        );

        let mut item = jacket();
        item.description = "y".repeat(2001);
        assert!(item.into_record(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_update_merges_and_revalidates() {
        let stored = Item {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Desk Lamp".to_string(),
            brand: "IKEA".to_string(),
            category: "Dorm Items".to_string(),
            subcategory: None,
            condition: "Decent".to_string(),
            size: String::new(),
            description: "Warm light".to_string(),
            images: vec!["https://img.example/lamp.jpg".to_string()],
            status: ItemStatus::Available,
            is_traded: false,
            traded_at: None,
            traded_to_user_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let update = ItemUpdate {
            condition: Some("So-so".to_string()),
            ..Default::default()
        };
        let record = update.merge(&stored).unwrap();
        assert_eq!(record.condition, "So-so");
        assert_eq!(record.name, "Desk Lamp");
        assert_eq!(record.user_id, stored.user_id);

        // moving into clothing without a size fails the merged check
        let update = ItemUpdate {
            category: Some("Clothing".to_string()),
            ..Default::default()
        };
        assert!(update.merge(&stored).is_err());
    }

    #[test]
    fn test_trade_request_rules() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let ok = NewTradeRequest {
            item_id: Uuid::new_v4(),
            message: Some("  Is Friday ok? ".to_string()),
            meeting_location: Some("Kirby Quad".to_string()),
        };
        let record = ok.into_record(from, to).unwrap();
        assert_eq!(record.message.as_deref(), Some("Is Friday ok?"));

        let far = NewTradeRequest {
            item_id: Uuid::new_v4(),
            message: None,
            meeting_location: Some("My Apartment".to_string()),
        };
        assert!(far.into_record(from, to).is_err());

        let long = NewTradeRequest {
            item_id: Uuid::new_v4(),
            message: Some("z".repeat(501)),
            meeting_location: None,
        };
        assert!(long.into_record(from, to).is_err());
    }

    #[test]
    fn test_message_text_bounds() {
        assert_eq!(message_text("  hi  ").unwrap(), "hi");
        assert!(message_text("   ").is_err());
        assert!(message_text(&"m".repeat(2000)).is_ok());
        assert!(message_text(&"m".repeat(2001)).is_err());
    }

    #[test]
    fn test_username_rules() {
        let update = |name: &str| ProfileUpdate {
            username: name.to_string(),
            full_name: Some("  ".to_string()),
            avatar_url: None,
        };

        let (username, full_name, _) = update(" jane.doe_1 ").normalized().unwrap();
        assert_eq!(username, "jane.doe_1");
        assert_eq!(full_name, None);

        assert!(update("ab").normalized().is_err());
        assert!(update(&"a".repeat(31)).normalized().is_err());
        assert!(update("jane doe").normalized().is_err());
        assert!(update("jane-doe").normalized().is_err());
    }
}
