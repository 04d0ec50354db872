use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{CategoryId, DomainError, ItemId};

/// Unit of measure used when an item is created without one.
pub const DEFAULT_UNIT: &str = "unit";

const MAX_NAME_LEN: usize = 180;
const MAX_UNIT_LEN: usize = 32;

/// Catalog category. Items hold a non-owning reference to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(id: CategoryId, name: &str, created_at: DateTime<Utc>) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            name: normalize_name(name, "category name")?,
            created_at,
        })
    }

    pub fn rename(&mut self, name: &str) -> Result<(), DomainError> {
        self.name = normalize_name(name, "category name")?;
        Ok(())
    }
}

/// Caller-supplied item attributes (create and edit share the same shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reorder_threshold: i64,
}

/// A stocked item. On-hand quantity is not stored here; it is the sum of the
/// item's lots' remaining quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category_id: CategoryId,
    pub unit: String,
    pub reorder_threshold: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn create(id: ItemId, draft: &ItemDraft, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let (name, unit) = validate_draft(draft)?;
        Ok(Self {
            id,
            name,
            category_id: draft.category_id,
            unit,
            reorder_threshold: draft.reorder_threshold,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn revise(&mut self, draft: &ItemDraft, now: DateTime<Utc>) -> Result<(), DomainError> {
        let (name, unit) = validate_draft(draft)?;
        self.name = name;
        self.category_id = draft.category_id;
        self.unit = unit;
        self.reorder_threshold = draft.reorder_threshold;
        self.updated_at = now;
        Ok(())
    }
}

/// Uniqueness key for a catalog name: trimmed, Unicode-lowercased.
///
/// Every store compares names through this key (Postgres keeps it in a
/// `name_key` column) so no backend relies on its own collation.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Catalog names are unique ignoring case.
pub fn names_collide(a: &str, b: &str) -> bool {
    name_key(a) == name_key(b)
}

fn validate_draft(draft: &ItemDraft) -> Result<(String, String), DomainError> {
    let name = normalize_name(&draft.name, "item name")?;

    let unit = match draft.unit.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_UNIT.to_string(),
        Some(u) if u.chars().count() > MAX_UNIT_LEN => {
            return Err(DomainError::validation(format!(
                "unit cannot exceed {MAX_UNIT_LEN} characters"
            )));
        }
        Some(u) => u.to_string(),
    };

    if draft.reorder_threshold < 0 {
        return Err(DomainError::validation("reorder threshold cannot be negative"));
    }

    Ok((name, unit))
}

fn normalize_name(raw: &str, what: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation(format!("{what} cannot be empty")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "{what} cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            category_id: CategoryId::new(),
            unit: None,
            reorder_threshold: 0,
        }
    }

    #[test]
    fn create_trims_name_and_defaults_unit() {
        let item = Item::create(ItemId::new(), &draft("  Gauze pads "), Utc::now()).unwrap();
        assert_eq!(item.name, "Gauze pads");
        assert_eq!(item.unit, DEFAULT_UNIT);
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Item::create(ItemId::new(), &draft("   "), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_reorder_threshold_is_rejected() {
        let mut d = draft("Syringe");
        d.reorder_threshold = -1;
        assert!(Item::create(ItemId::new(), &d, Utc::now()).is_err());
    }

    #[test]
    fn revise_bumps_updated_at_only() {
        let created = Utc::now();
        let mut item = Item::create(ItemId::new(), &draft("Syringe"), created).unwrap();
        let later = created + chrono::Duration::minutes(5);

        let mut d = draft("Syringe 5ml");
        d.unit = Some("box".to_string());
        item.revise(&d, later).unwrap();

        assert_eq!(item.name, "Syringe 5ml");
        assert_eq!(item.unit, "box");
        assert_eq!(item.created_at, created);
        assert_eq!(item.updated_at, later);
    }

    #[test]
    fn name_collision_ignores_case_and_padding() {
        assert!(names_collide("Gloves", " gLOVES "));
        assert!(!names_collide("Gloves", "Glove"));
    }

    #[test]
    fn name_key_folds_non_ascii_case() {
        assert_eq!(name_key("  ÖLFILTER "), "ölfilter");
        assert!(names_collide("Éponge", "éPONGE"));
        assert_eq!(name_key("Ölfilter"), name_key("ÖLFILTER"));
    }

    #[test]
    fn category_rename_validates() {
        let mut c = Category::new(CategoryId::new(), "Medical", Utc::now()).unwrap();
        assert!(c.rename("").is_err());
        c.rename("Medical supplies").unwrap();
        assert_eq!(c.name, "Medical supplies");
    }
}
