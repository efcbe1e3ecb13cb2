use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;
use crate::error::RxDigestError;

const USER_AGENT: &str = concat!("rxdigest/", env!("CARGO_PKG_VERSION"), " (preprint digest)");

/// An HTTP client that only talks to approved preprint hosts.
///
/// Every source adapter goes through this client, so a misconfigured
/// base URL cannot send traffic anywhere outside the allowlist.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default allowlist and a 30 s request timeout.
    pub fn new() -> Result<Self, RxDigestError> {
        let domains = [
            "export.arxiv.org", // arXiv query API
            "arxiv.org",        // arXiv abs/pdf links
            "api.biorxiv.org",  // bioRxiv + medRxiv details API
            "www.biorxiv.org",
            "www.medrxiv.org",
            "localhost",
            "127.0.0.1",
        ];
        let allowlist = domains.iter().map(|d| d.to_string()).collect();

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RxDigestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        // Exact match or a subdomain of an allowed domain
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    /// GET request builder, refused for hosts outside the allowlist.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, RxDigestError> {
        if !self.is_allowed(url) {
            debug!(url, "blocked by sandbox allowlist");
            return Err(RxDigestError::Sandbox(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }
}
