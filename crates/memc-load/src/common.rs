//! 📦 Common data structures, the building blocks of memc-load.
//!
//! 🎬 COLD OPEN. INT. LOG ARCHIVE. 3:47 AM.
//!
//! A gzip file sits on disk. Inside: millions of tab-separated lines, each one a
//! phone confessing which apps it has installed and roughly where it is standing.
//! Someone has to carry those confessions into memcached. That someone is an
//! [`AppsInstalled`], and the envelope it travels in is a [`UserApps`] protobuf.
//!
//! 🦆

use anyhow::{Context, Result};
use prost::Message;

/// 🎯 One decoded input line. Immutable once born, consumed exactly once by the write path.
///
/// `dev_type` + `dev_id` are guaranteed non-empty by the decoder. Coordinates are
/// best-effort: an unparseable coordinate arrives here as `NaN`, not as a rejection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppsInstalled {
    pub dev_type: String,
    pub dev_id: String,
    pub lat: f64,
    pub lon: f64,
    pub apps: Vec<u32>,
}

impl AppsInstalled {
    /// 🔑 `"<dev_type>:<dev_id>"`, the memcached key. Two strings and a colon walk into a bar.
    pub(crate) fn key(&self) -> String {
        format!("{}:{}", self.dev_type, self.dev_id)
    }

    /// 📬 Pack the payload fields into the wire message. The key is not part of it.
    pub(crate) fn to_user_apps(&self) -> UserApps {
        UserApps {
            apps: self.apps.clone(),
            lat: Some(self.lat),
            lon: Some(self.lon),
        }
    }
}

/// 🧬 The wire contract:
///
/// ```text
/// message UserApps {
///     repeated uint32 apps = 1;
///     optional double lat = 2;
///     optional double lon = 3;
/// }
/// ```
///
/// proto2 semantics, so `apps` is written unpacked. Readers of the cache that were built
/// against the `.proto` file decode these bytes without knowing Rust was ever involved.
#[derive(Clone, PartialEq, Message)]
pub(crate) struct UserApps {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub apps: Vec<u32>,
    #[prost(double, optional, tag = "2")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub lon: Option<f64>,
}

impl UserApps {
    /// 📦 Serialize. Deterministic for a given message, which is all the cache asks of us.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// 📭 Parse bytes that came out of [`UserApps::to_bytes`] (or out of memcached).
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        UserApps::decode(bytes)
            .context("💀 The UserApps payload would not decode. The bytes were there. The protobuf was not.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn the_usual_suspect() -> AppsInstalled {
        AppsInstalled {
            dev_type: "idfa".to_string(),
            dev_id: "1rfw452y52g2gq4g".to_string(),
            lat: 55.55,
            lon: 42.42,
            apps: vec![1423, 43, 567, 3, 7, 23],
        }
    }

    #[test]
    fn the_one_where_the_key_is_type_colon_id() {
        assert_eq!(the_usual_suspect().key(), "idfa:1rfw452y52g2gq4g");
    }

    #[test]
    fn the_one_where_the_payload_survives_the_wire() -> Result<()> {
        let user_apps = the_usual_suspect().to_user_apps();
        let unpacked = UserApps::from_bytes(&user_apps.to_bytes())?;
        assert_eq!(unpacked, user_apps);
        assert_eq!(unpacked.lat, Some(55.55));
        assert_eq!(unpacked.apps, vec![1423, 43, 567, 3, 7, 23]);
        Ok(())
    }

    #[test]
    fn the_one_where_apps_are_written_unpacked_like_proto2_expects() {
        let user_apps = UserApps {
            apps: vec![1, 2],
            lat: None,
            lon: None,
        };
        // 🧪 field 1, wire type 0 (varint), once per element: 0x08 0x01 0x08 0x02
        assert_eq!(user_apps.to_bytes(), vec![0x08, 0x01, 0x08, 0x02]);
    }

    #[test]
    fn the_one_where_garbage_bytes_do_not_decode() {
        assert!(UserApps::from_bytes(&[0xFF, 0xFF, 0xFF]).is_err());
    }
}
