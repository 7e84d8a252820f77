use settings::{normalize_addr, try_load};

pub struct Config {
    pub http_addr: String,
    pub query_addr: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            http_addr: try_load("HTTP_ADDR", ":8080"),
            query_addr: try_load("QUERY_ADDR", "http://localhost:50051"),
        }
    }

    pub fn listen_addr(&self) -> String {
        normalize_addr(&self.http_addr)
    }
}
