use std::sync::Arc;

use proto::result::v1::result_service_client::ResultServiceClient;
use tonic::transport::{Channel, Endpoint};

use super::config::Config;

pub struct State {
    pub config: Config,
    pub client: ResultServiceClient<Channel>,
}

impl State {
    /// The channel connects lazily; the query service may come up after the
    /// edge does.
    pub fn new() -> Arc<Self> {
        let config = Config::load();

        let channel = Endpoint::from_shared(config.query_addr.clone())
            .expect("Invalid QUERY_ADDR!")
            .connect_lazy();

        Arc::new(Self {
            config,
            client: ResultServiceClient::new(channel),
        })
    }
}
