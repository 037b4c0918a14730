use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use events::{Event, EventBus};
use forge_core::{ProjectKind, ProjectSpec};
use orchestrator::{find_tool, Orchestrator};

const FORGE_DIR: &str = ".plugforge";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_SCRIPT_NAME: &str = "cmake/GeneratePlugin.cmake";

#[derive(Parser)]
#[command(name = "plugforge")]
#[command(about = "Generate, configure and open plugin projects with CMake", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the CMake binary; discovered from PATH when omitted
    #[arg(long, global = true)]
    tool: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init,
    /// Probe the tool and print its version and generators
    Capabilities,
    /// Generate, configure and open a new plugin project
    Create {
        /// Plugin name; also the bundle name
        #[arg(long)]
        name: String,

        /// Bundle identifier, e.g. com.example.myplugin
        #[arg(long)]
        bundle_id: String,

        /// Directory the project is created in
        #[arg(long)]
        output: PathBuf,

        /// Plugin SDK root (config default when omitted)
        #[arg(long)]
        sdk: Option<PathBuf>,

        /// Generation script (defaults to the SDK's bundled script)
        #[arg(long)]
        script: Option<PathBuf>,

        /// Plugin kind: effect or instrument
        #[arg(long, default_value = "effect")]
        kind: String,

        /// Processor class name (derived from the plugin name when omitted)
        #[arg(long)]
        class_name: Option<String>,

        /// Prefix for generated file names
        #[arg(long, default_value = "")]
        filename_prefix: String,

        #[arg(long)]
        vendor: Option<String>,

        #[arg(long)]
        vendor_email: Option<String>,

        #[arg(long)]
        vendor_homepage: Option<String>,

        #[arg(long)]
        vendor_namespace: Option<String>,

        /// Generator to configure with (first reported one when omitted)
        #[arg(long)]
        generator: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct ForgeConfig {
    tool: ToolConfig,
    vendor: VendorConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct ToolConfig {
    path: Option<PathBuf>,
    generator: Option<String>,
    sdk_dir: Option<PathBuf>,
    script_path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct VendorConfig {
    name: String,
    email: String,
    homepage: String,
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config().await?;

    match cli.command {
        Commands::Init => init_config().await,
        Commands::Capabilities => capabilities(cli.tool, config).await,
        Commands::Create {
            name,
            bundle_id,
            output,
            sdk,
            script,
            kind,
            class_name,
            filename_prefix,
            vendor,
            vendor_email,
            vendor_homepage,
            vendor_namespace,
            generator,
        } => {
            let Some(kind) = ProjectKind::parse(&kind) else {
                bail!("unknown plugin kind '{kind}' (expected 'effect' or 'instrument')");
            };
            let sdk_dir = sdk
                .or(config.tool.sdk_dir.clone())
                .context("no SDK directory; pass --sdk or set tool.sdk_dir in config")?;
            let script_path = script
                .or(config.tool.script_path.clone())
                .unwrap_or_else(|| sdk_dir.join(DEFAULT_SCRIPT_NAME));

            let spec = ProjectSpec {
                vendor_name: vendor.unwrap_or_else(|| config.vendor.name.clone()),
                vendor_email: vendor_email.unwrap_or_else(|| config.vendor.email.clone()),
                vendor_homepage: vendor_homepage
                    .unwrap_or_else(|| config.vendor.homepage.clone()),
                vendor_namespace: vendor_namespace.or_else(|| config.vendor.namespace.clone()),
                plugin_name: name,
                class_name,
                bundle_identifier: bundle_id,
                filename_prefix,
                kind,
                sdk_dir,
                output_dir: output,
                script_path,
            };
            let generator = generator.or_else(|| config.tool.generator.clone());
            create(cli.tool, config, spec, generator).await
        }
    }
}

async fn init_config() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let forge_dir = cwd.join(FORGE_DIR);
    let config_path = forge_dir.join(CONFIG_FILE);

    if config_path.exists() {
        println!("Configuration already exists at {}", config_path.display());
        return Ok(());
    }

    tokio::fs::create_dir_all(&forge_dir).await?;

    let config = ForgeConfig {
        tool: ToolConfig {
            path: find_tool(None),
            ..Default::default()
        },
        ..Default::default()
    };
    let content = toml::to_string_pretty(&config)?;
    tokio::fs::write(&config_path, content).await?;

    println!("Initialized Plugin Forge in {}", cwd.display());
    println!();
    println!("Created:");
    println!("  {}/", FORGE_DIR);
    println!("  └── {}", CONFIG_FILE);
    println!();
    println!("Fill in your vendor identity and SDK path, then run");
    println!("'plugforge capabilities' to verify the tool is found.");

    Ok(())
}

async fn capabilities(tool_flag: Option<PathBuf>, config: ForgeConfig) -> Result<()> {
    let tool = resolve_tool(tool_flag, &config)?;
    let mut session = Orchestrator::new(&tool);

    session.probe_capabilities().await?;

    let Some(info) = session.capabilities() else {
        bail!("could not read capabilities from {}", tool.display());
    };

    println!();
    println!("Tool:    {}", tool.display());
    println!("Version: {}", info.version_string());
    println!();
    if info.generators.is_empty() {
        println!("No generators reported.");
    } else {
        println!("Generators:");
        for name in &info.generators {
            println!("  {name}");
        }
    }

    Ok(())
}

async fn create(
    tool_flag: Option<PathBuf>,
    config: ForgeConfig,
    spec: ProjectSpec,
    generator: Option<String>,
) -> Result<()> {
    let tool = resolve_tool(tool_flag, &config)?;

    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let printer = tokio::spawn(async move {
        // The capability probe runs first; its JSON blob is not part of
        // the project output, so suppress chunks until it is done.
        let mut probing = false;
        loop {
            match rx.recv().await {
                Ok(envelope) => match envelope.event {
                    Event::StepStarted { step } => {
                        probing = step == "probing_capabilities";
                        tracing::info!(step = %step, "Step started");
                    }
                    Event::OutputChunk { text } => {
                        if !probing {
                            print!("{text}");
                        }
                    }
                    Event::Advisory { message } => eprintln!("warning: {message}"),
                    _ => {}
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut session = Orchestrator::new(&tool).with_event_bus(bus);
    if let Some(name) = generator {
        session.select_generator(name);
    }

    session.probe_capabilities().await?;
    let result = session.create_project(&spec).await;

    // Dropping the session closes the bus, which ends the printer.
    drop(session);
    let _ = printer.await;

    match result {
        Ok(()) => {
            println!();
            println!("Project created in {}", spec.project_dir().display());
            Ok(())
        }
        Err(e) => {
            // The session log already streamed to the terminal; the
            // error itself is the summary.
            bail!("{e}");
        }
    }
}

fn resolve_tool(tool_flag: Option<PathBuf>, config: &ForgeConfig) -> Result<PathBuf> {
    let configured = tool_flag.or_else(|| config.tool.path.clone());
    find_tool(configured.as_deref()).context(
        "CMake not found; install it or point --tool (or tool.path in config) at the binary",
    )
}

async fn load_config() -> Result<ForgeConfig> {
    let cwd = std::env::current_dir()?;
    let config_path = cwd.join(FORGE_DIR).join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(ForgeConfig::default());
    }

    let content = tokio::fs::read_to_string(&config_path).await?;
    toml::from_str(&content)
        .with_context(|| format!("invalid configuration at {}", config_path.display()))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plugforge=info,orchestrator=warn".into()),
        )
        .init();
}
