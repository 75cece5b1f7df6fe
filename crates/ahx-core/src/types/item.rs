//! Item records as fetched from upstream and as stored in the catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ItemId;
use crate::names::normalize_name;

/// Upstream item JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamItem {
    pub id: ItemId,
    pub name: String,
    pub quality: i64,
    pub icon: String,
    pub item_level: i64,
    pub item_class: i64,
    pub item_sub_class: i64,
    pub inventory_type: i64,
    pub item_bind: i64,
    pub required_level: i64,
    pub armor: i64,
    pub max_durability: i64,
    pub sell_price: i64,
    pub item_spells: Vec<serde_json::Value>,
    pub equippable: bool,
    pub stackable: i64,
    pub weapon_info: Option<serde_json::Value>,
    pub bonus_stats: Vec<serde_json::Value>,
    pub description: String,
}

/// Stored item record: the upstream fields plus derived search/icon fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub normalized_name: String,
    pub quality: i64,
    pub icon: String,
    pub icon_url: Option<String>,
    pub item_level: i64,
    pub item_class: i64,
    pub item_sub_class: i64,
    pub inventory_type: i64,
    pub item_bind: i64,
    pub required_level: i64,
    pub armor: i64,
    pub max_durability: i64,
    pub sell_price: i64,
    pub item_spells: Vec<serde_json::Value>,
    pub equippable: bool,
    pub stackable: i64,
    pub weapon_info: Option<serde_json::Value>,
    pub bonus_stats: Vec<serde_json::Value>,
    pub description: String,
}

impl Item {
    pub fn needs_icon(&self) -> bool {
        self.icon_url.is_none() && !self.icon.is_empty()
    }
}

impl From<UpstreamItem> for Item {
    fn from(u: UpstreamItem) -> Self {
        Self {
            id: u.id,
            normalized_name: normalize_name(&u.name),
            name: u.name,
            quality: u.quality,
            icon: u.icon,
            icon_url: None,
            item_level: u.item_level,
            item_class: u.item_class,
            item_sub_class: u.item_sub_class,
            inventory_type: u.inventory_type,
            item_bind: u.item_bind,
            required_level: u.required_level,
            armor: u.armor,
            max_durability: u.max_durability,
            sell_price: u.sell_price,
            item_spells: u.item_spells,
            equippable: u.equippable,
            stackable: u.stackable,
            weapon_info: u.weapon_info,
            bonus_stats: u.bonus_stats,
            description: u.description,
        }
    }
}

/// `{item_id → item}`.
pub type ItemsMap = BTreeMap<ItemId, Item>;

/// Group items lacking an icon URL by icon key.
pub fn icon_groups<'a>(items: impl IntoIterator<Item = &'a Item>) -> BTreeMap<String, Vec<ItemId>> {
    let mut groups: BTreeMap<String, Vec<ItemId>> = BTreeMap::new();
    for item in items.into_iter().filter(|i| i.needs_icon()) {
        groups.entry(item.icon.clone()).or_default().push(item.id);
    }
    groups
}
