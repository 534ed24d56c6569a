use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::{CONFIG_FILE, DB_FILE, WORKSPACE_DIR};
use crate::db::Database;

// Embed the config template at compile time
const DEFAULT_CONFIG_JSON: &str = include_str!("../../resources/default-config.json");

pub fn run(path: &Path, force: bool) -> Result<()> {
    let workspace = path.join(WORKSPACE_DIR);
    let config_path = workspace.join(CONFIG_FILE);

    // Check if already initialized
    let workspace_exists = workspace.exists();
    let config_exists = config_path.exists();

    if workspace_exists && config_exists && !force {
        println!("Already initialized at {}", path.display());
        println!("Use --force to reset config.json to the defaults.");
        return Ok(());
    }

    // Create workspace directory and database
    fs::create_dir_all(&workspace).context("Failed to create .taskmap directory")?;
    Database::open(&workspace.join(DB_FILE))?;
    if !workspace_exists {
        println!("Created {}", workspace.display());
    }

    // Create or reset config
    if !config_exists || force {
        fs::write(&config_path, DEFAULT_CONFIG_JSON)
            .with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

        if force && config_exists {
            println!("Reset {} to defaults", config_path.display());
        } else {
            println!("Created {}", config_path.display());
        }
    }

    println!("taskmap initialized successfully!");
    println!("\nNext steps:");
    println!("  taskmap user add \"Name\" you@example.com   # Register yourself");
    println!("  taskmap --user you@example.com task add \"Task\"");

    Ok(())
}
