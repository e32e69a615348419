use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use vcap_router::server;

#[derive(Parser)]
#[command(name = "vcap-router", about = "Reverse-proxy dispatch core for a dynamic backend fleet")]
struct Cli {
    /// Path to a router config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
    }))
}
