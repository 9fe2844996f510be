//! Category operations

use rusqlite::{params, OptionalExtension};

use super::{is_unique_violation, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Category, CategorySpending, CategorySummary, NewCategory, SpendingSummary};

/// Lookup key for a category name
///
/// Unicode lowercase of the trimmed name. SQLite's NOCASE only folds ASCII.
pub fn category_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Database {
    /// Create a category
    ///
    /// Names are unique case-insensitively; a clash returns `Error::Conflict`.
    pub fn create_category(&self, category: &NewCategory) -> Result<i64> {
        let name = category.name.trim();
        if name.is_empty() {
            return Err(Error::validation("name", "category name is required"));
        }
        if let Some(budget) = category.budget_limit {
            if !budget.is_finite() || budget < 0.0 {
                return Err(Error::validation(
                    "budget_limit",
                    "budget must be a non-negative number",
                ));
            }
        }

        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO categories (name, name_key, description, budget_limit) VALUES (?, ?, ?, ?)",
            params![
                name,
                category_key(name),
                category.description,
                category.budget_limit
            ],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
                "Category '{}' already exists",
                name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a category by ID
    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, name, description, budget_limit, created_at FROM categories WHERE id = ?",
                params![id],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// Find a category by name, ignoring case and surrounding whitespace
    pub fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, name, description, budget_limit, created_at FROM categories
                 WHERE name_key = ?",
                params![category_key(name)],
                Self::row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// List all categories, newest first
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, budget_limit, created_at FROM categories
             ORDER BY created_at DESC, id DESC",
        )?;

        let categories = stmt
            .query_map([], Self::row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    /// Category names, used as the vocabulary for extraction
    pub fn category_names(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM categories ORDER BY name_key")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// List categories with the total of their paid expenses
    pub fn list_categories_with_spending(&self) -> Result<Vec<CategorySpending>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.name, c.description, c.budget_limit, c.created_at,
                   COALESCE(SUM(e.amount), 0) AS total_spent,
                   COUNT(e.id) AS expense_count
            FROM categories c
            LEFT JOIN expenses e ON e.category_id = c.id AND e.status = 'paid'
            GROUP BY c.id
            ORDER BY c.created_at DESC, c.id DESC
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(CategorySpending {
                    category: Self::row_to_category(row)?,
                    total_spent: row.get(5)?,
                    expense_count: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Paid spending overall and per category, largest first
    pub fn spending_summary(&self) -> Result<SpendingSummary> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.name, c.budget_limit,
                   COALESCE(SUM(e.amount), 0) AS total_spent,
                   COUNT(e.id) AS expense_count
            FROM categories c
            LEFT JOIN expenses e ON e.category_id = c.id AND e.status = 'paid'
            GROUP BY c.id
            ORDER BY total_spent DESC, c.name
            "#,
        )?;

        let by_category = stmt
            .query_map([], |row| {
                Ok(CategorySummary {
                    category: row.get(0)?,
                    budget: row.get(1)?,
                    total_spent: row.get(2)?,
                    expense_count: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Includes uncategorized paid expenses
        let total_spending: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM expenses WHERE status = 'paid'",
            [],
            |row| row.get(0),
        )?;

        Ok(SpendingSummary {
            total_spending,
            by_category,
        })
    }

    /// Delete a category; its expenses become uncategorized
    pub fn delete_category(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM categories WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Column order: id, name, description, budget_limit, created_at
    fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
        let created_at_str: String = row.get(4)?;
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            budget_limit: row.get(3)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
