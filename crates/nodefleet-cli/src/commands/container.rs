use clap::{Args, Subcommand};

use nodefleet_core::{NodeContainerConfig, RestartPolicy};

use super::App;

#[derive(Subcommand)]
pub enum ContainerAction {
    /// Add a node container configuration.
    ///
    /// Without --pool the configuration is the default for every pool;
    /// with --pool it only carries overrides and may not set an image.
    Add(ContainerArgs),
    /// Merge settings into an existing configuration.
    Update(ContainerArgs),
    /// Remove a configuration from a pool (or the default).
    Remove {
        name: String,
        #[arg(short, long, default_value = "")]
        pool: String,
    },
    /// Show the stored per-pool documents of a configuration.
    Info { name: String },
    /// List every configuration.
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Forget the pinned image so the next recreate pulls the tag again.
    ResetImage { name: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ContainerArgs {
    pub name: String,
    /// Pool the settings apply to (default scope if omitted).
    #[arg(short, long, default_value = "")]
    pub pool: String,
    #[arg(long)]
    pub image: Option<String>,
    /// Environment variable, KEY=VALUE (repeatable).
    #[arg(short, long = "env")]
    pub env: Vec<String>,
    /// Volume bind, host:container[:mode] (repeatable).
    #[arg(short = 'v', long = "volume")]
    pub binds: Vec<String>,
    #[arg(long)]
    pub network_mode: Option<String>,
    #[arg(long)]
    pub privileged: bool,
    /// Restart policy name, e.g. always or unless-stopped.
    #[arg(long)]
    pub restart: Option<String>,
    /// Command to run, after `--`.
    #[arg(last = true)]
    pub cmd: Vec<String>,
}

impl ContainerArgs {
    pub fn to_config(&self) -> NodeContainerConfig {
        let mut config = NodeContainerConfig::new(&self.name);
        config.config.image = self.image.clone();
        config.config.env = self.env.clone();
        config.config.cmd = self.cmd.clone();
        config.host_config.binds = self.binds.clone();
        config.host_config.network_mode = self.network_mode.clone();
        config.host_config.privileged = self.privileged.then_some(true);
        config.host_config.restart_policy = self.restart.clone().map(|name| RestartPolicy {
            name,
            maximum_retry_count: None,
        });
        config
    }
}

pub fn run(app: &App, action: ContainerAction) -> anyhow::Result<()> {
    match action {
        ContainerAction::Add(args) => {
            app.registry.add(&args.pool, &args.to_config())?;
            println!("✓ Added node container {}{}", args.name, scope_label(&args.pool));
        }
        ContainerAction::Update(args) => {
            app.registry.update(&args.pool, &args.to_config())?;
            println!("✓ Updated node container {}{}", args.name, scope_label(&args.pool));
        }
        ContainerAction::Remove { name, pool } => {
            app.registry.remove(&pool, &name)?;
            println!("✓ Removed node container {name}{}", scope_label(&pool));
        }
        ContainerAction::Info { name } => {
            let pools = app.registry.load_all_for_pools(&name, false)?;
            if pools.is_empty() {
                anyhow::bail!("node container not found: {name}");
            }
            println!("{}", serde_json::to_string_pretty(&pools)?);
        }
        ContainerAction::List { format } => {
            let groups = app.registry.list_all()?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&groups)?);
                return Ok(());
            }
            if groups.is_empty() {
                println!("No node containers.");
            }
            for group in groups {
                for (pool, config) in &group.config_pools {
                    let image = config
                        .pinned_image
                        .as_deref()
                        .or(config.config.image.as_deref())
                        .unwrap_or("-");
                    let pool = if pool.is_empty() { "<default>" } else { pool };
                    println!("{:<24} {:<16} {}", group.name, pool, image);
                }
            }
        }
        ContainerAction::ResetImage { name } => {
            app.registry.reset_image(&name)?;
            println!("✓ Reset pinned image of {name}");
        }
    }
    Ok(())
}

fn scope_label(pool: &str) -> String {
    if pool.is_empty() {
        String::new()
    } else {
        format!(" in pool {pool}")
    }
}
