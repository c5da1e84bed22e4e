use crate::api::RelayConfiguration;
use crate::identity::AccountIdentity;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("I/O error writing profile: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders the standard two-section WireGuard configuration.
///
/// The endpoint is the hostname form, not an IP; the relay routes on the
/// host server-side.
pub fn render(identity: &AccountIdentity, config: &RelayConfiguration) -> String {
    format!(
        "[Interface]\n\
         PrivateKey = {}\n\
         DNS = 1.1.1.1\n\
         Address = {}\n\
         Address = {}\n\
         \n\
         [Peer]\n\
         PublicKey = {}\n\
         AllowedIPs = 0.0.0.0/0\n\
         AllowedIPs = ::/0\n\
         Endpoint = {}\n",
        identity.private_key.to_base64(),
        config.local_address_v4,
        config.local_address_v6,
        config.peer_public_key,
        config.endpoint_host,
    )
}

/// Writes the rendered profile with temp-file-then-rename semantics so a
/// failed write never leaves a truncated profile behind.
pub struct ProfileWriter {
    path: PathBuf,
}

impl ProfileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn write(
        &self,
        identity: &AccountIdentity,
        config: &RelayConfiguration,
    ) -> Result<(), ProfileError> {
        let rendered = render(identity, config);
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, rendered.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
