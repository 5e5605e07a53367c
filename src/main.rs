//! prevue: a hot-reload preview host for script projects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use prevue::config::Settings;
use prevue::engine::Engine;
use prevue::registry::{SharedRegistry, shorten_preview_names};
use prevue::{log_event, logging};

#[derive(Parser)]
#[command(name = "prevue")]
#[command(version, about = "Hot-reload preview host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use a specific config file instead of the workspace one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Config,

    /// Watch a project and keep its previews in sync
    Run {
        /// Project to open; defaults to the configured current project
        path: Option<PathBuf>,
    },

    /// Load a project once and list its previews
    List {
        /// Project to load; defaults to the configured current project
        path: Option<PathBuf>,

        /// Restrict the listing to one group
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Load a project once and render one preview as JSON
    Show {
        /// Preview key or shortened display name
        name: String,

        /// Project to load; defaults to the configured current project
        path: Option<PathBuf>,
    },

    /// Manage known project roots
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Remember a project root
    Add { path: PathBuf },
    /// Select the current project
    Use { path: PathBuf },
    /// List known project roots
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = &cli.command {
        let path = Settings::init_config_file(*force)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        println!("Created {}", path.display());
        return Ok(());
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Settings::load().context("failed to load configuration")?,
    };
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Config => {
            let rendered = toml::to_string_pretty(&settings)?;
            print!("{rendered}");
            Ok(())
        }
        Commands::Run { path } => run(settings, path),
        Commands::List { path, group } => list(settings, path, group.as_deref()),
        Commands::Show { name, path } => show(settings, path, &name, cli.config.as_deref()),
        Commands::Project { command } => project(settings, command, cli.config.as_deref()),
    }
}

/// Project given on the command line, or the configured current one.
fn resolve_project(settings: &Settings, path: Option<PathBuf>) -> Result<PathBuf> {
    match path.or_else(|| settings.current_project.clone()) {
        Some(path) => Ok(path),
        None => bail!(
            "no project selected; pass a path or run 'prevue project use <path>'"
        ),
    }
}

fn run(settings: Settings, path: Option<PathBuf>) -> Result<()> {
    let project = resolve_project(&settings, path)?;
    let poll = Duration::from_millis(settings.watcher.poll_ms);
    if let Some(theme) = &settings.theme {
        log_event!("engine", "theme", "{theme}");
    }

    let mut engine = Engine::new(settings);
    let summary = engine.set_project(&project)?;
    log_event!(
        "engine",
        "ready",
        "{} units loaded, {} failed",
        summary.loaded,
        summary.failed
    );
    print_catalog(engine.registry(), None);

    loop {
        let handled = engine.step()?;
        if handled > 0 {
            print_catalog(engine.registry(), None);
        }
        std::thread::sleep(poll);
    }
}

fn list(settings: Settings, path: Option<PathBuf>, group: Option<&str>) -> Result<()> {
    let project = resolve_project(&settings, path)?;
    let mut engine = Engine::new(settings);
    engine.load_once(&project)?;
    print_catalog(engine.registry(), group);
    Ok(())
}

fn show(
    settings: Settings,
    path: Option<PathBuf>,
    name: &str,
    config_path: Option<&Path>,
) -> Result<()> {
    let project = resolve_project(&settings, path)?;
    let mut engine = Engine::new(settings);
    engine.load_once(&project)?;

    let registry = engine.registry().read();
    let keys = registry.list_keys(None);
    let aliases = shorten_preview_names(&keys);
    let key = keys
        .iter()
        .zip(&aliases)
        .find(|(key, alias)| key.as_str() == name || alias.as_str() == name)
        .map(|(key, _)| key.clone());
    let Some(key) = key else {
        bail!("no preview named '{name}'; run 'prevue list' to see what is available");
    };

    let preview = registry
        .get(&key)
        .context("preview vanished between listing and lookup")?;
    let layout = match preview.produce() {
        Ok(layout) => layout,
        Err(e) => e.to_layout(),
    };
    println!("{}", serde_json::to_string_pretty(&layout.0)?);
    drop(registry);

    remember_selection(&key, config_path);
    Ok(())
}

/// Persist the selection so the next session restores it. Skipped when
/// no config file exists yet.
fn remember_selection(key: &str, config_path: Option<&Path>) {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => Settings::config_path(),
    };
    if !path.exists() {
        return;
    }
    let Ok(mut settings) = Settings::load_from(&path) else {
        return;
    };
    settings.last_preview_key = Some(key.to_string());
    if let Err(e) = settings.save(&path) {
        tracing::warn!("[config] could not persist selection: {e}");
    }
}

fn project(mut settings: Settings, command: ProjectCommands, config_path: Option<&Path>) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::config_path);

    match command {
        ProjectCommands::Add { path: root } => {
            let root = root
                .canonicalize()
                .with_context(|| format!("cannot resolve {}", root.display()))?;
            if !settings.projects.contains(&root) {
                settings.projects.push(root.clone());
            }
            settings
                .save(&path)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Added {}", root.display());
        }
        ProjectCommands::Use { path: root } => {
            let root = root
                .canonicalize()
                .with_context(|| format!("cannot resolve {}", root.display()))?;
            if !settings.projects.contains(&root) {
                settings.projects.push(root.clone());
            }
            settings.current_project = Some(root.clone());
            settings
                .save(&path)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Using {}", root.display());
        }
        ProjectCommands::List => {
            if settings.projects.is_empty() {
                println!("No known projects. Add one with 'prevue project add <path>'.");
            }
            for root in &settings.projects {
                let marker = if Some(root) == settings.current_project.as_ref() {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}", root.display());
            }
        }
    }
    Ok(())
}

/// Print the catalog: shortened names, full keys, and group membership.
fn print_catalog(registry: &SharedRegistry, group: Option<&str>) {
    let registry = registry.read();
    let keys = registry.list_keys(group);
    if keys.is_empty() {
        match group {
            Some(g) => println!("No previews in group '{g}'."),
            None => println!("No previews registered."),
        }
        return;
    }

    let aliases = shorten_preview_names(&keys);
    println!("Previews ({}):", keys.len());
    for (key, alias) in keys.iter().zip(&aliases) {
        let group_note = registry
            .get(key)
            .and_then(|p| p.group.clone())
            .map(|g| format!("  [{g}]"))
            .unwrap_or_default();
        println!("  {alias:<24} {key}{group_note}");
    }
    let groups = registry.groups();
    if group.is_none() && !groups.is_empty() {
        println!("Groups: {}", groups.join(", "));
    }
}
