//! Category reconciliation
//!
//! Maps the model's category suggestion onto a stored category. An existing
//! name always wins (ignoring case and surrounding whitespace); a new category
//! is created only when the model flagged it as new.

use serde::Serialize;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::NewCategory;

/// The category an extracted invoice was filed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledCategory {
    pub id: i64,
    pub name: String,
    /// True when this call created the category
    pub created: bool,
}

/// Resolve a suggested category name to a category id
///
/// Returns `None` for a blank name, or for an unknown name the model did not
/// mark as new.
pub fn reconcile(
    db: &Database,
    extracted_name: Option<&str>,
    is_new_hint: bool,
    company_name: Option<&str>,
) -> Result<Option<ReconciledCategory>> {
    let Some(name) = extracted_name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if let Some(existing) = db.find_category_by_name(name)? {
        debug!(category = %existing.name, "Matched existing category");
        return Ok(Some(ReconciledCategory {
            id: existing.id,
            name: existing.name,
            created: false,
        }));
    }

    if !is_new_hint {
        debug!(category = %name, "Unknown category without new-category hint, leaving uncategorized");
        return Ok(None);
    }

    let description = match company_name.map(str::trim).filter(|c| !c.is_empty()) {
        Some(company) => format!("auto-created from invoice: {}", company),
        None => "auto-created from invoice".to_string(),
    };

    let new_category = NewCategory {
        name: name.to_string(),
        description: Some(description),
        budget_limit: None,
    };

    match db.create_category(&new_category) {
        Ok(id) => {
            info!(category = %name, id, "Created category from invoice");
            Ok(Some(ReconciledCategory {
                id,
                name: name.to_string(),
                created: true,
            }))
        }
        // Another request created it between our lookup and insert
        Err(Error::Conflict(_)) => {
            let existing = db
                .find_category_by_name(name)?
                .ok_or_else(|| Error::NotFound(format!("category '{}'", name)))?;
            Ok(Some(ReconciledCategory {
                id: existing.id,
                name: existing.name,
                created: false,
            }))
        }
        Err(e) => Err(e),
    }
}
