//! `zonesignerd`: runs the online DNSSEC zone signer daemon (`spec.md` §6).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use zonesigner::config::Config;
use zonesigner::crypto::soft::SoftCryptoModule;
use zonesigner::crypto::CryptoModule;
use zonesigner::daemon::Daemon;

#[derive(Parser, Debug)]
#[command(name = "zonesignerd", about = "Online DNSSEC zone signer daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let text = match std::fs::read_to_string(&args.config) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(path = %args.config.display(), error = %e, "failed to read config");
            std::process::exit(1);
        }
    };
    let config = match Config::from_toml_str(&text) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse config");
            std::process::exit(1);
        }
    };

    // Key loading into the crypto module is out of scope here (`spec.md`
    // §1 Non-goals: private-key generation/storage internals); a real
    // deployment loads keys into `SoftCryptoModule` (or a PKCS#11 module)
    // before handing it to the daemon.
    let crypto: Arc<dyn CryptoModule> = Arc::new(SoftCryptoModule::new());

    let daemon = match Daemon::new(config, crypto) {
        Ok(d) => d,
        Err(e) => {
            // A corrupt journal at startup is fatal (`spec.md` §7).
            tracing::error!(error = %e, "failed to start daemon");
            std::process::exit(1);
        }
    };

    if let Err(e) = daemon.run().await {
        tracing::error!(error = %e, "daemon exited with error");
        std::process::exit(1);
    }
}
