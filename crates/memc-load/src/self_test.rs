//! 🧪 `--test`: the smoke alarm button. Press it, hear a beep, go back to bed.
//!
//! Decodes two known-good lines, packs each into a `UserApps`, unpacks it again, and
//! insists that nothing got lost on the way. No files, no sockets, no workers.

use anyhow::{Result, bail};
use tracing::info;

use crate::common::UserApps;
use crate::decoder::parse_appsinstalled;

const SAMPLE_LINES: [&str; 2] = [
    "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23",
    "gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424",
];

/// 🔁 decode → encode → decode, for every sample line. `Err` on the first mismatch.
pub fn run_self_test() -> Result<()> {
    for line in SAMPLE_LINES {
        let Some(record) = parse_appsinstalled(line) else {
            bail!("💀 Self-test sample would not decode: `{}`", line);
        };
        let user_apps = record.to_user_apps();
        let unpacked = UserApps::from_bytes(&user_apps.to_bytes())?;
        if unpacked != user_apps {
            bail!(
                "💀 Self-test round trip mismatch for {}: sent {:?}, got back {:?}",
                record.key(),
                user_apps,
                unpacked
            );
        }
        info!("✅ {} survived the round trip", record.key());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_smoke_alarm_stays_quiet() -> Result<()> {
        run_self_test()
    }

    #[test]
    fn the_one_where_the_samples_carry_what_they_claim() {
        let record = parse_appsinstalled(SAMPLE_LINES[1]).expect("💀 sample line should decode");
        assert_eq!(record.key(), "gaid:7rfw452y52g2gq4g");
        assert_eq!(record.apps, vec![7423, 424]);
    }
}
