mod config;

use chrono::Utc;
use clap::Parser;
use config::{config_path, get_default_config_toml, load_config, Config};
use libwhois_sweep::{
    create_http_client, fetch_iana_tlds, Package, PackageManifest, RegistryPublisher, Sweeper,
};
use std::{path::PathBuf, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "whisbot")]
#[command(about = "Resolve the WHOIS server of every IANA TLD and package the table", long_about = None)]
struct Args {
    /// Comma-separated list of TLDs to resolve instead of the IANA list (e.g., COM,IO,NO)
    #[arg(long, value_delimiter = ',')]
    tlds: Option<Vec<String>>,

    /// Write the package tarball to this path
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,

    /// Print the resolved table as JSON to stdout
    #[arg(long, short = 'j')]
    json: bool,

    /// Publish the package to the registry (token from NPM_TOKEN)
    #[arg(long)]
    publish: bool,

    /// Maximum number of TLDs resolved at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Give up on unresolved TLDs after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Print the default config to stdout and exit
    #[arg(long)]
    print_default_config: bool,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn clean_tlds(tlds: Vec<String>) -> Vec<String> {
    tlds.into_iter()
        .map(|tld| tld.trim().to_string())
        .filter(|tld| !tld.is_empty())
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_default_config {
        println!("{}", get_default_config_toml());
        return Ok(());
    }

    if args.write_default_config {
        if let Some(path) = args.config.clone().or_else(config_path) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, get_default_config_toml())?;
            println!("Default config written to: {}", path.display());
        } else {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
        return Ok(());
    }

    setup_logging(args.verbose);
    let config = load_config(args.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args, config))
}

async fn run(args: Args, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let token = if args.publish {
        Some(std::env::var("NPM_TOKEN").map_err(|_| "NPM_TOKEN must be set to publish")?)
    } else {
        None
    };

    let client = create_http_client(HTTP_TIMEOUT)?;
    let tlds = match args.tlds {
        Some(tlds) => clean_tlds(tlds),
        None => fetch_iana_tlds(&client).await?,
    };

    let mut sweep_config = config.resolver.to_sweep_config();
    if let Some(concurrency) = args.concurrency {
        sweep_config.concurrency_ceiling = concurrency;
    }
    if let Some(secs) = args.deadline {
        sweep_config.batch_deadline = Some(Duration::from_secs(secs));
    }

    let sweeper = Sweeper::with_config(sweep_config)?;
    let table = sweeper.sweep(tlds).await;

    let packaging = args.out.is_some() || args.publish;
    if args.json || !packaging {
        println!("{}", table.to_json()?);
    }
    if !packaging {
        return Ok(());
    }

    if table.is_empty() {
        return Err("no WHOIS servers resolved, refusing to package an empty table".into());
    }

    let manifest = PackageManifest::new(&config.package.settings(), Utc::now().date_naive());
    let package = Package::build(manifest, &table)?;

    if let Some(path) = &args.out {
        std::fs::write(path, &package.tarball)?;
        info!(path = %path.display(), version = %package.manifest.version, "package written");
    }

    if let Some(token) = token {
        RegistryPublisher::new(client, config.package.registry.as_str(), token)
            .publish(&package)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tld_flag_is_trimmed_and_split() {
        let args = Args::parse_from(["whisbot", "--tlds", "COM, IO,,NO"]);
        assert_eq!(clean_tlds(args.tlds.unwrap()), vec!["COM", "IO", "NO"]);
    }

    #[test]
    fn overrides_parse() {
        let args = Args::parse_from([
            "whisbot",
            "--concurrency",
            "4",
            "--deadline",
            "900",
            "-o",
            "whis-data.tgz",
        ]);
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.deadline, Some(900));
        assert_eq!(args.out, Some(PathBuf::from("whis-data.tgz")));
        assert!(!args.publish);
    }
}
