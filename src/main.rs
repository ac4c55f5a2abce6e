use clap::{Parser, Subcommand};
use skinvault::config::Config;
use skinvault::logging::init_logging;
use skinvault::skins::SkinVariant;
use skinvault::state::{AppState, SharedState};
use skinvault::utils::paths::get_data_dir;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "skinvault")]
#[command(author, version, about = "Resolve, cache and store Minecraft player skins")]
struct Args {
    /// Data directory holding config.json, logs and file storage
    #[arg(long, env = "SKINVAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Change or inspect a player's skin
    #[command(subcommand)]
    Skin(SkinCommand),

    /// Manage named custom skins
    #[command(subcommand)]
    Custom(CustomCommand),

    /// Probe Mojang and MineSkin once
    Health,

    /// Preload default skins and run housekeeping until Ctrl-C
    Serve,
}

#[derive(Subcommand, Debug)]
enum SkinCommand {
    /// Generate a skin from an image URL
    Url {
        player: Uuid,
        url: String,
        /// classic or slim, detected when omitted
        #[arg(long)]
        variant: Option<String>,
        #[arg(long)]
        bypass_cooldown: bool,
    },
    /// Copy the skin of a premium account
    Player {
        player: Uuid,
        name: String,
        #[arg(long)]
        bypass_cooldown: bool,
    },
    /// Use a custom skin
    Custom {
        player: Uuid,
        name: String,
        #[arg(long)]
        bypass_cooldown: bool,
    },
    /// Print the texture a player currently has
    Show { player: Uuid },
    /// Forget a player's skin
    Clear { player: Uuid },
}

#[derive(Subcommand, Debug)]
enum CustomCommand {
    /// Generate a custom skin from an image URL
    Create {
        name: String,
        url: String,
        #[arg(long)]
        variant: Option<String>,
    },
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Remove { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => get_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)?;

    let config = Config::load(&data_dir)?;
    let _guard = init_logging(&data_dir, &config.log_level)?;

    info!("skinvault {} starting in {}", env!("CARGO_PKG_VERSION"), data_dir.display());

    let state: SharedState = Arc::new(AppState::new(config).await?);

    if let Err(e) = run(args.command, state).await {
        error!("{}", e);
        return Err(e);
    }
    Ok(())
}

fn parse_variant(variant: Option<String>) -> Option<SkinVariant> {
    variant.map(|v| SkinVariant::parse(&v))
}

async fn run(command: Command, state: SharedState) -> anyhow::Result<()> {
    match command {
        Command::Skin(command) => run_skin(command, &state).await?,
        Command::Custom(command) => run_custom(command, &state).await?,
        Command::Health => {
            let report = state.health.check_all().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_online() {
                anyhow::bail!("Mojang lookups are unavailable");
            }
        }
        Command::Serve => {
            state.preload_default_skins().await;

            let cleanup = state.spawn_cleanup();
            let health = state.spawn_health_checks();

            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C detected, shutting down");

            cleanup.abort();
            if let Some(health) = health {
                health.abort();
            }
        }
    }
    Ok(())
}

async fn run_skin(command: SkinCommand, state: &AppState) -> anyhow::Result<()> {
    let skins = &state.skins;
    match command {
        SkinCommand::Url {
            player,
            url,
            variant,
            bypass_cooldown,
        } => {
            let record = skins
                .set_skin_from_url(player, &url, parse_variant(variant), bypass_cooldown)
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        SkinCommand::Player {
            player,
            name,
            bypass_cooldown,
        } => {
            let record = skins.set_skin_from_player(player, &name, bypass_cooldown).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        SkinCommand::Custom {
            player,
            name,
            bypass_cooldown,
        } => {
            let record = skins.apply_custom_skin(player, &name, bypass_cooldown).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        SkinCommand::Show { player } => match skins.get_skin(player).await? {
            Some(property) => println!("{}", serde_json::to_string_pretty(&property)?),
            None => println!("{} has no skin set", player),
        },
        SkinCommand::Clear { player } => {
            if skins.clear_skin(player).await? {
                println!("Cleared skin of {}", player);
            } else {
                println!("{} had no skin set", player);
            }
        }
    }
    Ok(())
}

async fn run_custom(command: CustomCommand, state: &AppState) -> anyhow::Result<()> {
    let skins = &state.skins;
    match command {
        CustomCommand::Create { name, url, variant } => {
            let skin = skins
                .create_custom_skin(&name, &url, parse_variant(variant))
                .await?;
            println!("{}", serde_json::to_string_pretty(&skin)?);
        }
        CustomCommand::List { offset, limit } => {
            let page = skins.store().list_custom_skins(offset, limit).await?;
            for skin in &page.skins {
                println!("{} ({})", skin.name, skin.property.variant());
            }
            if page.has_more {
                println!("... more after offset {}", offset + page.skins.len());
            }
        }
        CustomCommand::Remove { name } => {
            if skins.store().remove_custom_skin(&name).await? {
                println!("Removed custom skin '{}'", name);
            } else {
                println!("No custom skin named '{}'", name);
            }
        }
    }
    Ok(())
}
