/// Versioned base URL of the registration service. The path component pins
/// the API revision the mobile client speaks.
pub const DEFAULT_API_BASE: &str = "https://api.cloudflareclient.com/v0a884";

/// Options for constructing the relay API client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the registration service, including the version prefix.
    pub api_base: String,
    /// When false, TLS certificates are not verified. Used to sniff the
    /// registration traffic through an intercepting proxy.
    pub verify_tls: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            verify_tls: true,
        }
    }
}
