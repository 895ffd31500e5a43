use anyhow::Result;
use clap::Parser;

use chorus::{cli::Cli, runtime::Launcher};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let code = Launcher::new(cli)?.run().await?;

    // Exit with appropriate code
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}
