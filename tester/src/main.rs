//! Manual end-to-end driver for the query service: ping, one totals
//! snapshot, then a bounded subscription window. Run it against a live
//! stack while submitting votes through the ingest API.
use std::time::Duration;

use clap::Parser;
use proto::result::v1::{
    GetTotalsRequest, PingRequest, SubscribeTotalsRequest,
    result_service_client::ResultServiceClient,
};
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Query service endpoint.
    #[arg(long, default_value = "http://localhost:50051")]
    target: String,

    /// How long to watch the subscription stream before exiting.
    #[arg(long, default_value_t = 25)]
    watch_secs: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut client = ResultServiceClient::connect(args.target.clone())
        .await
        .unwrap();

    let ping = client.ping(PingRequest {}).await.unwrap().into_inner();
    println!("Ping: {}", ping.message);

    let totals = client
        .get_totals(GetTotalsRequest {})
        .await
        .unwrap()
        .into_inner();
    println!("GetTotals: {:?} {}", totals.totals, totals.updated_at);

    let mut stream = client
        .subscribe_totals(SubscribeTotalsRequest {
            tenant: "default".to_string(),
        })
        .await
        .unwrap()
        .into_inner();

    let watch = Duration::from_secs(args.watch_secs);
    let watched = timeout(watch, async {
        loop {
            match stream.message().await {
                Ok(Some(snapshot)) => {
                    println!(
                        "SubscribeTotals: {:?} {}",
                        snapshot.totals, snapshot.updated_at
                    );
                }
                Ok(None) => {
                    println!("stream end");
                    break;
                }
                Err(status) => {
                    println!("stream error: {status}");
                    break;
                }
            }
        }
    })
    .await;

    if watched.is_err() {
        println!("watch window elapsed");
    }
}
