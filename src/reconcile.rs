use crate::api::{AccountType, ApiError, RelayApiClient, RelayConfiguration};
use crate::identity::{AccountIdentity, IdentityStore, StoreError};
use crate::keys::{self, KeyError};
use crate::timestamp;
use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("this device is not registered to the account; delete the identity file to re-register")]
    DeviceNotRegistered,
}

/// Asked whether an inactive Warp+ device should be activated. The decision
/// belongs to the caller; the reconciler only establishes that activation is
/// relevant.
pub trait ActivationPrompt: Send + Sync {
    fn confirm_activation(&self) -> bool;
}

/// The converged state handed to the profile writer and the summary output.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub identity: AccountIdentity,
    pub config: RelayConfiguration,
    pub device_active: bool,
    pub activation_recommended: bool,
}

/// Drives the account/entitlement workflow to convergence:
/// identity creation, license-key convergence, device-activation state and
/// the WARP routing flag.
///
/// Every step is either idempotent or guarded by a precondition, so an
/// aborted run is safe to repeat from scratch, and a repeat run against
/// unchanged server state issues no mutating calls at all.
pub struct EntitlementReconciler<'a> {
    api: &'a RelayApiClient,
    store: &'a IdentityStore,
    prompt: &'a dyn ActivationPrompt,
}

impl<'a> EntitlementReconciler<'a> {
    pub fn new(
        api: &'a RelayApiClient,
        store: &'a IdentityStore,
        prompt: &'a dyn ActivationPrompt,
    ) -> Self {
        Self { api, store, prompt }
    }

    pub async fn run(&self) -> Result<ReconcileOutcome, ReconcileError> {
        let mut identity = match self.store.load().await? {
            Some(identity) => {
                debug!("loaded existing identity {}", identity.account_id);
                identity
            }
            None => self.register_new_identity().await?,
        };

        // Entitlement state is server-authoritative and may have changed out
        // of band, so this fetch happens even for a fresh identity.
        let config = self.api.fetch_configuration(&identity).await?;
        let mut config = self.reconcile_license(&mut identity, config).await?;

        let device_state = self.api.list_device_activation(&identity).await?;
        let mut device_active = device_state.ok_or(ReconcileError::DeviceNotRegistered)?;

        // Activation only matters when Warp+ entitlement exists.
        let mut activation_recommended = false;
        if config.warp_plus_enabled && !device_active {
            activation_recommended = true;
            if self.prompt.confirm_activation() {
                info!("activating device");
                device_active = self.api.set_device_activation(&identity, true).await?;
            }
        }

        if !config.warp_enabled {
            info!("enabling WARP");
            self.api.set_warp_enabled(&identity, true).await?;
            // The echo assertion in set_warp_enabled is ground truth; no
            // refetch needed.
            config.warp_enabled = true;
        }

        Ok(ReconcileOutcome {
            identity,
            config,
            device_active,
            activation_recommended,
        })
    }

    async fn register_new_identity(&self) -> Result<AccountIdentity, ReconcileError> {
        info!("creating new identity");
        let private_key = keys::generate_private_key()?;
        let public_key = keys::derive_public_key(&private_key);
        let result = self
            .api
            .register(&public_key, &timestamp::tos_timestamp())
            .await?;
        let identity = AccountIdentity {
            account_id: result.account_id,
            access_token: result.access_token,
            private_key,
            license_key: result.license_key,
        };
        // Persist before any further call so a crash mid-workflow cannot
        // orphan the registration.
        self.store.save(&identity).await?;
        Ok(identity)
    }

    /// Converges the local license key with the server's record.
    ///
    /// When stale, the local key is pushed (free accounts with a non-empty
    /// key only; unlimited accounts short-circuit inside the API client) and
    /// the configuration is refetched, since a license change can flip the
    /// account tier and Warp+ flag. Whatever the server reports afterwards
    /// becomes the stored value.
    async fn reconcile_license(
        &self,
        identity: &mut AccountIdentity,
        mut config: RelayConfiguration,
    ) -> Result<RelayConfiguration, ReconcileError> {
        if !config.license_key_stale {
            return Ok(config);
        }

        let should_push = match config.account_type {
            AccountType::Unlimited => true,
            AccountType::Free => !identity.license_key.trim().is_empty(),
            AccountType::Limited => false,
        };
        if should_push {
            info!("license key changed, updating account");
            let warp_plus = self
                .api
                .update_license_key(identity, config.account_type)
                .await?;
            if warp_plus {
                config = self.api.fetch_configuration(identity).await?;
            }
        }

        if let Some(license) = config.account_license.clone() {
            if license.trim() != identity.license_key.trim() {
                debug!("adopting server license key");
                identity.license_key = license;
                self.store.save(identity).await?;
            }
        }
        Ok(config)
    }
}
