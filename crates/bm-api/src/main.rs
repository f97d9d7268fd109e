#[tokio::main]
async fn main() {
    if let Err(err) = bm_api::run().await {
        tracing::error!(error = %err, "bm-api exited with error");
        eprintln!("bm-api: {err}");
        std::process::exit(1);
    }
}
