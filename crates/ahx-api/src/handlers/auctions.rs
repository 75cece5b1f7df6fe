use std::collections::HashSet;

use ahx_core::dedup::MiniAuctionList;
use ahx_core::names::{NO_MATCH, fuzzy_rank, normalize_name};

use super::{HandlerResult, ok_gzip, ok_json, parse};
use crate::error::HandlerError;
use crate::requests::{
    AuctionsRequest, Owner, OwnersQueryByItemsRequest, OwnersQueryByItemsResponse, OwnersQueryResponse,
    OwnersQueryResult, OwnersRequest, Ownership, PriceListRequest,
};
use crate::state::ApiState;

const OWNERS_LIMIT: usize = 10;

fn realm_auctions(state: &ApiState, region_name: &str, realm_slug: &str) -> Result<MiniAuctionList, HandlerError> {
    let key = state.resolve_realm_key(region_name, realm_slug)?;
    Ok(state.live()?.get_mini_auctions(&key)?)
}

fn owners_of(minis: &MiniAuctionList) -> Vec<Owner> {
    minis
        .owner_names()
        .into_iter()
        .map(|name| Owner { normalized_name: normalize_name(&name), name })
        .collect()
}

pub fn auctions(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: AuctionsRequest = parse(payload)?;
    let key = state.resolve_realm_key(&req.region_name, &req.realm_slug)?;
    let page = state.live()?.query_auctions(&key, &req.query())?;
    ok_gzip(&page)
}

/// Owner names on a realm, optionally filtered by substring.
pub fn owners(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: OwnersRequest = parse(payload)?;
    let minis = realm_auctions(state, &req.region_name, &req.realm_slug)?;

    let query = normalize_name(&req.query);
    let mut owners: Vec<Owner> =
        owners_of(&minis).into_iter().filter(|o| query.is_empty() || o.normalized_name.contains(&query)).collect();
    owners.sort_by(|a, b| a.name.cmp(&b.name));
    owners.truncate(OWNERS_LIMIT);
    ok_json(&owners)
}

/// Fuzzy ranked owner search.
pub fn owners_query(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: OwnersRequest = parse(payload)?;
    let minis = realm_auctions(state, &req.region_name, &req.realm_slug)?;

    let query = normalize_name(&req.query);
    let mut items: Vec<OwnersQueryResult> = owners_of(&minis)
        .into_iter()
        .filter_map(|owner| {
            let rank = if query.is_empty() { 0 } else { fuzzy_rank(&query, &owner.normalized_name) };
            (rank != NO_MATCH).then(|| OwnersQueryResult { target: owner.normalized_name.clone(), owner, rank })
        })
        .collect();
    items.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.target.cmp(&b.target)));
    items.truncate(OWNERS_LIMIT);
    ok_json(&OwnersQueryResponse { items })
}

/// Per-owner value and volume held in the requested items.
pub fn owners_query_by_items(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: OwnersQueryByItemsRequest = parse(payload)?;
    let minis = realm_auctions(state, &req.region_name, &req.realm_slug)?;

    let wanted: HashSet<_> = req.items.iter().copied().collect();
    let mut resp = OwnersQueryByItemsResponse::default();
    for mini in minis.iter().filter(|m| wanted.contains(&m.item_id)) {
        let volume = mini.quantity.saturating_mul(mini.auctions());
        let value = mini.buyout.saturating_mul(volume);

        let entry = resp
            .ownership
            .entry(mini.owner.clone())
            .or_insert_with(|| Ownership { name: mini.owner.clone(), ..Default::default() });
        entry.owned_value = entry.owned_value.saturating_add(value);
        entry.owned_volume = entry.owned_volume.saturating_add(volume);
        resp.total_value = resp.total_value.saturating_add(value);
        resp.total_volume = resp.total_volume.saturating_add(volume);
    }
    ok_json(&resp)
}

pub fn price_list(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: PriceListRequest = parse(payload)?;
    let minis = realm_auctions(state, &req.region_name, &req.realm_slug)?;
    ok_gzip(&minis.price_list_for(&req.item_ids))
}

#[cfg(test)]
mod tests {
    use ahx_core::codec;
    use ahx_core::error::ErrorCode;
    use ahx_core::types::{PriceList, Prices};
    use ahx_store::AuctionsPage;

    use super::*;
    use crate::handlers::test_support::{auction, state_with};

    #[test]
    fn auctions_page_is_gzipped() {
        let (_dir, state) = state_with(&[auction(1, 25, "A", 20, 2), auction(2, 25, "A", 20, 2), auction(3, 26, "B", 5, 1)]);
        let msg = auctions(
            &state,
            br#"{"region_name":"us","realm_slug":"earthen-ring","count":10,"sort_kind":"buyout","sort_direction":"down"}"#,
        )
        .unwrap();
        let page: AuctionsPage = codec::from_gzip_base64_json(&msg.data).unwrap();
        assert_eq!(page.total_after_filter, 2);
        assert_eq!(page.total_count_incl_dupes, 3);
        assert_eq!(page.items[0].item_id, 25);
        assert_eq!(page.items[0].auc_list, vec![1, 2]);
    }

    #[test]
    fn auctions_errors_map_to_codes() {
        let (_dir, state) = state_with(&[]);
        let bad_count = auctions(&state, br#"{"region_name":"us","realm_slug":"earthen-ring","count":0}"#);
        assert_eq!(bad_count.unwrap_err().code, ErrorCode::UserError);
        let missing = auctions(&state, br#"{"region_name":"us","realm_slug":"stormrage","count":10}"#);
        assert_eq!(missing.unwrap_err().code, ErrorCode::NotFound);
        assert_eq!(auctions(&state, b"[").unwrap_err().code, ErrorCode::MsgJsonParseError);
    }

    #[test]
    fn owners_filters_by_substring() {
        let (_dir, state) = state_with(&[auction(1, 25, "A", 20, 2), auction(2, 25, "Bob", 20, 2)]);
        let msg = owners(&state, br#"{"region_name":"us","realm_slug":"earthen-ring","query":"a"}"#).unwrap();
        let owners: Vec<Owner> = serde_json::from_str(&msg.data).unwrap();
        assert_eq!(owners, vec![Owner { name: "A".into(), normalized_name: "a".into() }]);

        let msg = super::owners(&state, br#"{"region_name":"us","realm_slug":"earthen-ring","query":""}"#).unwrap();
        let owners: Vec<Owner> = serde_json::from_str(&msg.data).unwrap();
        assert_eq!(owners.len(), 2);
    }

    #[test]
    fn owners_query_ranks_closest_first() {
        let (_dir, state) =
            state_with(&[auction(1, 25, "Bobby", 20, 2), auction(2, 25, "Bob", 20, 2), auction(3, 25, "Carl", 1, 1)]);
        let msg = owners_query(&state, br#"{"region_name":"us","realm_slug":"earthen-ring","query":"bob"}"#).unwrap();
        let resp: OwnersQueryResponse = serde_json::from_str(&msg.data).unwrap();
        let names: Vec<&str> = resp.items.iter().map(|r| r.owner.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Bobby"]);
        assert_eq!(resp.items[0].rank, 0);
    }

    #[test]
    fn ownership_sums_value_and_volume() {
        let (_dir, state) = state_with(&[
            auction(1, 25, "A", 20, 2),
            auction(2, 25, "A", 20, 2),
            auction(3, 26, "B", 5, 1),
            auction(4, 27, "B", 100, 1),
        ]);
        let msg = owners_query_by_items(
            &state,
            br#"{"region_name":"us","realm_slug":"earthen-ring","items":[25,26]}"#,
        )
        .unwrap();
        let resp: OwnersQueryByItemsResponse = serde_json::from_str(&msg.data).unwrap();
        assert_eq!(resp.ownership["A"].owned_value, 80);
        assert_eq!(resp.ownership["A"].owned_volume, 4);
        assert_eq!(resp.ownership["B"].owned_value, 5);
        assert_eq!(resp.total_value, 85);
        assert_eq!(resp.total_volume, 5);
    }

    #[test]
    fn ownership_saturates_on_huge_buyouts() {
        let (_dir, state) = state_with(&[
            auction(1, 25, "A", i64::MAX, 2),
            auction(2, 25, "A", i64::MAX, 2),
            auction(3, 25, "B", i64::MAX / 2, 3),
        ]);
        let msg = owners_query_by_items(&state, br#"{"region_name":"us","realm_slug":"earthen-ring","items":[25]}"#)
            .unwrap();
        let resp: OwnersQueryByItemsResponse = serde_json::from_str(&msg.data).unwrap();
        assert_eq!(resp.ownership["A"].owned_value, i64::MAX);
        assert_eq!(resp.ownership["A"].owned_volume, 4);
        assert_eq!(resp.total_value, i64::MAX);
        assert_eq!(resp.total_volume, 7);
    }

    #[test]
    fn price_list_only_for_requested_items() {
        let (_dir, state) = state_with(&[auction(1, 25, "A", 20, 2), auction(2, 26, "B", 5, 1)]);
        let msg =
            price_list(&state, br#"{"region_name":"us","realm_slug":"earthen-ring","item_ids":[25]}"#).unwrap();
        let prices: PriceList = codec::from_gzip_base64_json(&msg.data).unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[&25], Prices { min_buyout_per: 10.0, quantity_total: 2, auctions_total: 1 });
    }
}
