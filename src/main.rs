use anyhow::Context;
use clap::Parser;
use edge_ip_sync::utils::{logger, validation::Validate};
use edge_ip_sync::{
    CliArgs, LocalStorage, NginxControl, SyncConfig, SyncEngine, SyncError, SyncOptions,
    SyncPipeline, UfwFirewall,
};
use std::path::Path;

const DEFAULT_CONFIG: &str = "edge-ip-sync.toml";

fn load_config(path: &Path) -> edge_ip_sync::Result<SyncConfig> {
    // Only the default location may be absent; an explicit path must exist.
    if path == Path::new(DEFAULT_CONFIG) {
        SyncConfig::from_file_or_default(path)
    } else {
        SyncConfig::from_file(path)
    }
}

fn report_error(e: &SyncError) -> ! {
    tracing::error!(
        "❌ Sync failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code());
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::debug!("CLI args: {:?}", args);

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config file '{}'", args.config.display());
            report_error(&e);
        }
    };

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    if let Err(e) = config.validate() {
        report_error(&e);
    }

    if args.validate {
        tracing::info!("✅ Configuration is valid");
        println!("✅ Configuration is valid");
        return Ok(());
    }

    let options = SyncOptions {
        dry_run: args.dry_run,
        skip_firewall: args.skip_firewall,
        skip_reload: args.skip_reload,
    };
    if options.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written or executed");
    }

    let firewall = UfwFirewall::new(
        config.firewall.binary.clone(),
        config.firewall.ipv6_config_path.clone(),
    );
    let proxy = NginxControl::from_config(&config.nginx);
    let pipeline = SyncPipeline::new(LocalStorage::new(), firewall, proxy, config, options)
        .context("failed to initialise HTTP client")?;

    let engine = SyncEngine::new(pipeline);
    match engine.run().await {
        Ok(report) => {
            if args.json_logs {
                println!("{}", serde_json::to_string(&report)?);
                return Ok(());
            }
            if report.config_changed() && !report.dry_run {
                for path in &report.changed_files {
                    println!("📁 Updated {}", path.display());
                }
            }
            let verb = if report.dry_run { "checked" } else { "in sync" };
            println!(
                "✅ {} IPv4 / {} IPv6 ranges {} (firewall +{}/-{}, reloaded: {})",
                report.ipv4_ranges,
                report.ipv6_ranges,
                verb,
                report.firewall.added,
                report.firewall.deleted,
                report.reloaded
            );
            Ok(())
        }
        Err(e) => report_error(&e),
    }
}
