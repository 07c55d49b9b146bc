use crate::cli::{Commands, CredentialCommands, ServiceCommands};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use typeswap_core::storage::{CredentialStore, ShortcutStore};
use typeswap_core::{
    Config, InputClassifier, JsonStore, NativePlatform, Result, Store, TypeswapError,
};
use typeswap_daemon::{AppContext, Engine, PipelineEvent};

/// How often `run` looks for edits made to the store by another process.
const STORE_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub fn handle_command(command: Commands) -> Result<()> {
    let config = Config::load()?;
    match command {
        Commands::Run => run_engine(config),
        Commands::Config => print_config(&config),
        command => {
            let store = open_store(&config)?;
            handle_store_command(command, &store)
        }
    }
}

fn open_store(config: &Config) -> Result<JsonStore> {
    Ok(JsonStore::open_default()?.with_classifier(InputClassifier::from_config(config)))
}

/// Commands that only edit or query the store.
pub fn handle_store_command(command: Commands, store: &dyn Store) -> Result<()> {
    match command {
        Commands::Add {
            shortcut,
            replacement,
        } => {
            if store.shortcut(&shortcut)?.is_some() {
                return Err(TypeswapError::Store(format!(
                    "shortcut '{}' already exists, use update to change it",
                    shortcut
                )));
            }
            store
                .save_shortcut(&shortcut, &replacement)
                .map(|_| println!("Shortcut added successfully"))
        }
        Commands::Update {
            shortcut,
            replacement,
        } => {
            if store.shortcut(&shortcut)?.is_none() {
                return Err(TypeswapError::NotFound(format!("shortcut '{}'", shortcut)));
            }
            store
                .save_shortcut(&shortcut, &replacement)
                .map(|_| println!("Shortcut updated successfully"))
        }
        Commands::Delete { shortcut } => store
            .delete_shortcut(&shortcut)
            .map(|_| println!("Shortcut deleted successfully")),
        Commands::List => list_shortcuts(store),
        Commands::Service(command) => handle_service_command(command, store),
        Commands::Credential(command) => handle_credential_command(command, store),
        Commands::Run | Commands::Config => Err(TypeswapError::InvalidConfig(
            "command does not operate on the store".to_string(),
        )),
    }
}

fn list_shortcuts(store: &dyn Store) -> Result<()> {
    let entries = store.list_shortcuts()?;
    if entries.is_empty() {
        println!("No shortcuts defined. Add one with 'typeswap add -s <keyword> -c <text>'.");
        return Ok(());
    }

    let width = entries
        .iter()
        .map(|e| e.keyword.chars().count())
        .max()
        .unwrap_or(0);
    for entry in entries {
        println!(
            "{:<width$}  {}  ({})",
            entry.keyword,
            preview(&entry.replacement, 60),
            entry.formatted_time(),
            width = width
        );
    }
    Ok(())
}

fn handle_service_command(command: ServiceCommands, store: &dyn Store) -> Result<()> {
    match command {
        ServiceCommands::Add {
            code,
            name,
            shortcut,
        } => store.add_service(&code, &name, &shortcut).map(|service| {
            println!(
                "Service '{}' added; type {} to expand its next credential",
                service.name, service.shortcut
            )
        }),
        ServiceCommands::List => {
            let services = store.services()?;
            if services.is_empty() {
                println!("No services defined.");
            }
            for service in services {
                let count = store.credentials(&service.code)?.len();
                println!(
                    "{}  {}  {}  ({} credentials)",
                    service.code, service.name, service.shortcut, count
                );
            }
            Ok(())
        }
    }
}

fn handle_credential_command(command: CredentialCommands, store: &dyn Store) -> Result<()> {
    match command {
        CredentialCommands::Add { service, content } => store
            .add_credential(&service, &content)
            .map(|entry| println!("Credential added at position {}", entry.position)),
        CredentialCommands::Import { service, file } => {
            let lines = read_lines(&file)?;
            let summary = store.import_credentials(&service, &lines)?;
            println!(
                "Imported {} credentials ({} duplicates skipped)",
                summary.imported, summary.skipped
            );
            Ok(())
        }
        CredentialCommands::List { service } => {
            for entry in store.credentials(&service)? {
                println!(
                    "{:>4}  {}  {}",
                    entry.position,
                    entry.content,
                    entry.formatted_last_used()
                );
            }
            Ok(())
        }
        CredentialCommands::Next { shortcut } => match store.get_next_credential(&shortcut)? {
            Some(content) => {
                println!("{}", content);
                Ok(())
            }
            None => Err(TypeswapError::NotFound(format!(
                "credentials for '{}'",
                shortcut
            ))),
        },
        CredentialCommands::Reset { service } => store
            .reset_credential_usage(service.as_deref())
            .map(|count| println!("Reset {} credentials", count)),
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content.lines().map(str::to_string).collect())
}

fn preview(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', "\\n");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let cut: String = single_line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn print_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Run the engine until Ctrl-C, reloading whenever the store file changes.
fn run_engine(config: Config) -> Result<()> {
    let store = Arc::new(open_store(&config)?);
    let ctx = AppContext::new(
        config,
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::new(NativePlatform::new()),
    );
    let engine = Engine::new(ctx)?;
    engine.on_event(|event| match event {
        PipelineEvent::StatusChanged { running } => info!(running, "Status changed"),
        PipelineEvent::Replaced { typed, replacement } => {
            info!(chars = replacement.chars().count(), "Expanded shortcut");
            debug!(typed = %typed, "Expanded shortcut details");
        }
    });

    engine.start()?;
    println!("typeswap is running. Press Ctrl-C to stop.");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(watch_store(&engine, &store));

    engine.stop();
    println!("typeswap stopped.");
    result
}

async fn watch_store(engine: &Engine, store: &JsonStore) -> Result<()> {
    let mut ticker = tokio::time::interval(STORE_POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                info!("Interrupt received, shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                match store.take_external_changes() {
                    Ok(true) => {
                        info!("Store changed on disk, reloading replacements");
                        if let Err(e) = engine.reload_replacements(false) {
                            error!("Failed to reload replacements: {}", e);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => error!("Failed to check the store for changes: {}", e),
                }
                if !engine.is_running() {
                    warn!("Pipeline is no longer running");
                    return Err(TypeswapError::Startup(
                        "pipeline stopped and could not be restarted".to_string(),
                    ));
                }
            }
        }
    }
}
