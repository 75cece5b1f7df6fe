//! Request/response bodies exchanged between processes over the bus.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Realm, RealmSlug, RegionName};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusRequest {
    pub region_name: RegionName,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    pub realms: Vec<Realm>,
}

/// Snapshots ready for ingestion: region → slug → snapshot timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntakeRequest {
    pub region_realm_timestamps: BTreeMap<RegionName, BTreeMap<RealmSlug, i64>>,
}

impl IntakeRequest {
    pub fn insert(&mut self, region: &str, slug: &str, target_time: i64) {
        self.region_realm_timestamps
            .entry(region.to_string())
            .or_default()
            .insert(slug.to_string(), target_time);
    }

    pub fn is_empty(&self) -> bool {
        self.region_realm_timestamps.values().all(BTreeMap::is_empty)
    }

    /// `(region, slug, target_time)` triples in region, slug order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, i64)> {
        self.region_realm_timestamps.iter().flat_map(|(region, realms)| {
            realms.iter().map(move |(slug, ts)| (region.as_str(), slug.as_str(), *ts))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intake_wire_shape() {
        let mut req = IntakeRequest::default();
        assert!(req.is_empty());
        req.insert("us", "earthen-ring", 1700000000);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"region_realm_timestamps":{"us":{"earthen-ring":1700000000}}}"#);
        assert_eq!(req.entries().collect::<Vec<_>>(), vec![("us", "earthen-ring", 1700000000)]);
    }

    #[test]
    fn realm_status_uses_last_modified() {
        let realm = Realm { last_downloaded: 5, ..Realm::new("us", "a", "A") };
        let json = serde_json::to_value(StatusResponse { realms: vec![realm] }).unwrap();
        assert_eq!(json["realms"][0]["last_modified"], 5);
    }
}
