use anyhow::{bail, Result};
use tracing::info;

use crate::commands::resolve_context;
use crate::context::ViewContext;
use crate::db::Database;
use crate::models::{Role, User};

/// Register a user. New accounts always start with the normal role.
pub fn add(
    db: &Database,
    name: &str,
    email: &str,
    sector: Option<&str>,
    position: Option<&str>,
) -> Result<i64> {
    let name = name.trim();
    let email = email.trim();
    if name.is_empty() {
        bail!("User name cannot be empty");
    }
    if !email.contains('@') {
        bail!("Invalid email '{}'", email);
    }
    if db.get_user_by_email(email)?.is_some() {
        bail!("User '{}' already exists", email);
    }

    let id = db.create_user(
        name,
        email,
        Role::Normal,
        sector.unwrap_or("N/A"),
        position.unwrap_or("N/A"),
    )?;
    info!(id, email, "user registered");
    println!("Created user #{}: {} <{}>", id, name, email);
    Ok(id)
}

pub fn list(db: &Database, ctx: &ViewContext) -> Result<()> {
    ctx.require_master()?;
    let users = db.list_users()?;

    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }

    for user in users {
        println!(
            "#{:<4} {:<24} {:<30} {:<7} {} / {}",
            user.id,
            user.name,
            user.email,
            user.role.as_str(),
            user.sector,
            user.position
        );
    }
    Ok(())
}

pub fn show(ctx: &ViewContext) -> Result<()> {
    let user = ctx.subject();
    println!("User #{}: {}", user.id, user.name);
    println!("Email: {}", user.email);
    println!("Role: {}", user.role.as_str());
    println!("Sector: {}", user.sector);
    println!("Position: {}", user.position);
    if let Some(created) = user.created_at {
        println!("Registered: {}", created.format("%Y-%m-%d"));
    }
    Ok(())
}

pub fn edit(
    db: &Database,
    ctx: &ViewContext,
    name: Option<&str>,
    sector: Option<&str>,
    position: Option<&str>,
) -> Result<()> {
    if name.is_none() && sector.is_none() && position.is_none() {
        bail!("Nothing to update. Use --name, --sector or --position");
    }
    if name.is_some_and(|n| n.trim().is_empty()) {
        bail!("User name cannot be empty");
    }
    db.update_user(ctx.subject_id(), name.map(str::trim), sector, position)?;
    println!("Updated user {}", ctx.subject().email);
    Ok(())
}

/// Change a user's role. Needs a master, except while no master exists
/// yet so the first one can be appointed.
pub fn set_role(
    db: &Database,
    actor_email: Option<&str>,
    target_email: &str,
    role: Role,
) -> Result<()> {
    let users = db.list_users()?;
    if users.iter().any(User::is_master) {
        resolve_context(db, actor_email, None)?.require_master()?;
    }

    let Some(target) = users.iter().find(|u| u.email == target_email) else {
        bail!("User '{}' not found", target_email);
    };
    db.set_role(target.id, role)?;
    info!(email = target_email, role = role.as_str(), "role changed");
    println!("{} is now {}", target_email, role.as_str());
    Ok(())
}
