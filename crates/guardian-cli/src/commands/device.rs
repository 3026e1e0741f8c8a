use clap::Subcommand;
use guardian_core::{is_authorized, Config, IdentityManager};

use super::{open_store, CmdResult};

#[derive(Subcommand)]
pub enum DeviceAction {
    /// Print this installation's device id (created on first use)
    Id,
    /// Whether this device passes the admin allow-list
    Authorized,
    /// Add this device to the admin allow-list
    Trust,
}

pub async fn run(action: DeviceAction) -> CmdResult {
    let identity = IdentityManager::new(open_store()?);

    match action {
        DeviceAction::Id => {
            println!("{}", identity.ensure_identity().await?);
        }
        DeviceAction::Authorized => {
            let config = Config::load()?;
            let device_id = identity.ensure_identity().await?;
            let authorized = is_authorized(&device_id, &config.auth_config());
            println!("{}", if authorized { "yes" } else { "no" });
        }
        DeviceAction::Trust => {
            let mut config = Config::load()?;
            if identity
                .trust_current_device(&mut config.admin.device_ids)
                .await?
            {
                config.save()?;
                println!("device added to allow-list");
            } else {
                println!("device already trusted");
            }
        }
    }
    Ok(())
}
