use std::time::Duration;

fn user_agent() -> String {
    format!("ava-server/{}", env!("CARGO_PKG_VERSION"))
}

/// Base client builder shared by the record store and completion clients.
pub fn builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(Duration::from_secs(3))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
}

/// Client with a whole-request timeout; a timeout surfaces as a transport error.
pub fn client_with_timeout(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    builder().timeout(timeout).build()
}
