#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = proctor_rust::run_worker().await {
        eprintln!("proctor-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
