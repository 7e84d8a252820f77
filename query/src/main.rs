#[tokio::main]
async fn main() {
    query::start_server().await;
}
