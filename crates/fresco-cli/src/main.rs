use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use fresco::adapter::{Mounter, Props};
use fresco::bus::EventBus;
use fresco::cart::CartStore;
use fresco::loader::Loader;
use fresco::platform::native::{DirFetcher, FileStorage, HeadlessAnchor};
use fresco::products::{ProductId, mock_products};
use fresco::registry::RemoteRegistry;

#[derive(ClapParser)]
#[command(name = "fresco")]
#[command(about = "Fresco federation inspector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a registry configuration file
    Validate {
        /// Path to registry JSON
        registry: PathBuf,
    },
    /// Dry-run a remote/exposed resolution against manifest files
    Resolve {
        /// Path to registry JSON
        registry: PathBuf,
        /// Remote name
        remote: String,
        /// Exposed component name
        exposed: String,
        /// Directory holding <remote>.remote.json manifests (defaults to the registry's directory)
        #[arg(long)]
        manifests: Option<PathBuf>,
    },
    /// Operate on a cart persisted in a state directory
    Cart {
        /// State directory holding cart.json
        dir: PathBuf,
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Add one unit of a bundled catalog product
    Add {
        /// Product id
        id: u64,
    },
    /// Remove one unit
    Remove {
        /// Product id
        id: u64,
    },
    /// Set the exact quantity (0 deletes the entry)
    Set {
        /// Product id
        id: u64,
        /// New quantity
        quantity: u64,
    },
    /// Empty the cart
    Clear,
    /// Print the cart as JSON
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { registry } => {
            validate(&registry);
        }
        Commands::Resolve {
            registry,
            remote,
            exposed,
            manifests,
        } => {
            resolve(&registry, &remote, &exposed, manifests).await;
        }
        Commands::Cart { dir, action } => {
            run_cart_action(&dir, action);
        }
    }
}

fn load_registry(path: &PathBuf) -> RemoteRegistry {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => {
            eprintln!("Error reading {}: {}", path.display(), error);
            process::exit(1);
        }
    };
    match RemoteRegistry::from_json(&text) {
        Ok(registry) => registry,
        Err(error) => {
            eprintln!("Invalid registry: {error}");
            process::exit(1);
        }
    }
}

fn validate(path: &PathBuf) {
    let registry = load_registry(path);

    eprintln!("Registry OK: host '{}'", registry.host());
    for dependency in registry.shared() {
        eprintln!(
            "  shared {} {} ({}{})",
            dependency.name,
            dependency.version,
            dependency.requirement,
            if dependency.singleton { ", singleton" } else { "" },
        );
    }
    for descriptor in registry.remotes() {
        let exports = if descriptor.exposes.is_empty() {
            "exports undisclosed".to_owned()
        } else {
            format!("{} exports", descriptor.exposes.len())
        };
        eprintln!(
            "  remote {} -> {} ({exports})",
            descriptor.name, descriptor.manifest_url
        );
    }
}

/// Resolve and mount one exposed component against manifest-file remotes,
/// then print the negotiated scope.
async fn resolve(path: &PathBuf, remote: &str, exposed: &str, manifests: Option<PathBuf>) {
    let registry = load_registry(path);
    let manifest_dir = manifests.unwrap_or_else(|| {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let loader = Loader::new(Rc::new(registry), Rc::new(DirFetcher::new(manifest_dir)));
    let factory = match loader.resolve(remote, exposed).await {
        Ok(factory) => factory,
        Err(error) => {
            eprintln!("Resolution failed: {error}");
            process::exit(1);
        }
    };

    let mounter = Mounter::new();
    let anchor = HeadlessAnchor::new();
    let handle = match mounter.mount(&factory, &anchor, &Props::new()).await {
        Ok(handle) => handle,
        Err(error) => {
            eprintln!("Mount failed: {error}");
            process::exit(1);
        }
    };

    let scope = loader.scope().borrow();
    let negotiated: serde_json::Map<String, serde_json::Value> = scope
        .iter()
        .map(|(library, entry)| {
            (
                library.to_owned(),
                serde_json::json!({
                    "version": entry.version.to_string(),
                    "singleton": entry.singleton,
                    "provider": entry.provider,
                }),
            )
        })
        .collect();
    let warnings: Vec<String> = scope
        .warnings()
        .iter()
        .map(|warning| warning.to_string())
        .collect();

    let report = serde_json::json!({
        "status": "ok",
        "remote": remote,
        "exposed": exposed,
        "mount": {
            "anchor": handle.anchor().to_string(),
            "mounted": mounter.is_mounted(handle),
        },
        "scope": negotiated,
        "warnings": warnings,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{text}"),
        Err(error) => {
            eprintln!("Failed to encode the report: {error}");
            process::exit(1);
        }
    }
}

fn run_cart_action(dir: &PathBuf, action: CartAction) {
    let store = CartStore::new(Rc::new(FileStorage::new(dir)), EventBus::new());

    match action {
        CartAction::Add { id } => {
            let Some(product) = mock_products()
                .into_iter()
                .find(|product| product.id == ProductId(id))
            else {
                eprintln!("No product {id} in the bundled catalog");
                process::exit(1);
            };
            store.add(&product);
        }
        CartAction::Remove { id } => {
            store.remove(ProductId(id));
        }
        CartAction::Set { id, quantity } => {
            store.set_quantity(ProductId(id), quantity);
        }
        CartAction::Clear => {
            store.clear();
        }
        CartAction::Show => {}
    }

    let report = serde_json::json!({
        "items": store.item_count(),
        "total": store.total(),
        "cart": store.get(),
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{text}"),
        Err(error) => {
            eprintln!("Failed to encode the cart: {error}");
            process::exit(1);
        }
    }
}
