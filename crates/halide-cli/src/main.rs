//! halide - cluster bootstrap and node registry tool

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    halide_cli::run().await
}
