use anyhow::{bail, Result};

use crate::context::ViewContext;
use crate::db::Database;
use crate::models::DEFAULT_CATEGORY_COLOR;

/// Accepts `#RGB` or `#RRGGBB`.
pub fn validate_color(color: &str) -> bool {
    let Some(hex) = color.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn add(db: &Database, ctx: &ViewContext, name: &str, color: Option<&str>) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Category name cannot be empty");
    }
    let color = color.unwrap_or(DEFAULT_CATEGORY_COLOR);
    if !validate_color(color) {
        bail!("Invalid color '{}'. Use a hex value such as #D1D5DB", color);
    }

    let id = db.create_category(ctx, name, color)?;
    println!("Created category #{}: {}", id, name);
    Ok(id)
}

pub fn list(db: &Database, ctx: &ViewContext) -> Result<()> {
    let categories = db.list_categories(ctx)?;

    if categories.is_empty() {
        println!("No categories.");
        return Ok(());
    }

    for category in categories {
        println!("#{:<4} {:<8} {}", category.id, category.color, category.name);
    }
    Ok(())
}

pub fn edit(
    db: &Database,
    ctx: &ViewContext,
    id: i64,
    name: Option<&str>,
    color: Option<&str>,
) -> Result<()> {
    if name.is_none() && color.is_none() {
        bail!("Nothing to update. Use --name or --color");
    }
    let name = name.map(str::trim);
    if name.is_some_and(str::is_empty) {
        bail!("Category name cannot be empty");
    }
    if let Some(c) = color {
        if !validate_color(c) {
            bail!("Invalid color '{}'. Use a hex value such as #D1D5DB", c);
        }
    }

    if db.update_category(ctx, id, name, color)? {
        println!("Updated category #{}", id);
    } else {
        bail!("Category #{} not found", id);
    }
    Ok(())
}

/// Remove a category. Tasks filed under it keep the name as plain text.
pub fn delete(db: &Database, ctx: &ViewContext, id: i64) -> Result<()> {
    if db.delete_category(ctx, id)? {
        println!("Deleted category #{}", id);
    } else {
        bail!("Category #{} not found", id);
    }
    Ok(())
}
