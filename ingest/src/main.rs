#[tokio::main]
async fn main() {
    ingest::start_server().await;
}
