#[tokio::main]
async fn main() {
    edge::start_server().await;
}
