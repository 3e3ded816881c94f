use keyward_core::models::Asset;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

/// Partial update for one asset in a bulk request. Absent fields are left
/// alone; `cluster`/`admin_user` set to `null` clear the link.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AssetPatch {
    pub id: Uuid,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "present")]
    pub cluster: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "present")]
    pub admin_user: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
    pub comment: Option<String>,
}

impl AssetPatch {
    pub fn apply(&self, asset: &mut Asset) {
        if let Some(ip) = &self.ip {
            asset.ip = ip.clone();
        }
        if let Some(hostname) = &self.hostname {
            asset.hostname = hostname.clone();
        }
        if let Some(port) = self.port {
            asset.port = port;
        }
        if let Some(cluster) = self.cluster {
            asset.cluster = cluster;
        }
        if let Some(admin_user) = self.admin_user {
            asset.admin_user = admin_user;
        }
        if let Some(is_active) = self.is_active {
            asset.is_active = is_active;
        }
        if let Some(comment) = &self.comment {
            asset.comment = comment.clone();
        }
    }
}

/// Distinguishes an explicit `null` from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_clears_and_missing_keeps() {
        let mut asset = Asset::new("10.0.0.1", "web-1");
        asset.cluster = Some(Uuid::new_v4());
        asset.admin_user = Some(Uuid::new_v4());
        let admin = asset.admin_user;

        let patch: AssetPatch = serde_json::from_str(&format!(
            r#"{{"id": "{}", "cluster": null, "port": 2222}}"#,
            asset.id
        ))
        .expect("parse");
        patch.apply(&mut asset);

        assert_eq!(asset.cluster, None);
        assert_eq!(asset.admin_user, admin);
        assert_eq!(asset.port, 2222);
        assert_eq!(asset.hostname, "web-1");
    }
}
