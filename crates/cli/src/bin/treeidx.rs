use anyhow::Result;
use clap::Parser;
use treeidx_cli::Cli;

fn main() -> Result<()> {
    // Log level comes from RUST_LOG, quiet by default
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let cli = Cli::parse();
    cli.run()?;

    Ok(())
}
