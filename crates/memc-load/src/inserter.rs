//! 📬 The insert path: one record, one destination, one boolean.
//!
//! Builds the `UserApps` payload, keys it `"<dev_type>:<dev_id>"`, and either writes it
//! through the [`ConnectionCache`] (retries included) or, in dry-run mode, just says what it
//! would have written. Whatever goes wrong in here is logged and becomes `false`. Nothing
//! escapes to take the worker down with it.

use tracing::{debug, error};

use crate::backends::ConnectionCache;
use crate::common::AppsInstalled;

/// 🎯 `true` = stored (or would have been, in dry-run). `false` = counted as an error.
pub(crate) async fn insert_appsinstalled(
    connections: &ConnectionCache,
    address: &str,
    record: &AppsInstalled,
    dry_run: bool,
) -> bool {
    let user_apps = record.to_user_apps();
    let key = record.key();

    if dry_run {
        debug!("🧪 {} - {} -> {:?}", address, key, user_apps);
        return true;
    }

    let packed = user_apps.to_bytes();
    match connections.write(address, &key, &packed).await {
        Ok(()) => true,
        Err(err) => {
            error!(address, key = %key, "💀 Cannot write to memc {}: {:#}", address, err);
            false
        }
    }
}
