use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // stdout is the wire; all diagnostics go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let db_path = std::env::var("DATACHAT_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("company_data.db"));

    datachat_core::toolhost::serve(&db_path)
}
