use ahx_core::types::ItemPriceHistories;

use super::{HandlerResult, ok_gzip, parse};
use crate::error::HandlerError;
use crate::requests::PriceListHistoryRequest;
use crate::state::ApiState;

/// `{item_id → {timestamp → prices}}` within `[lower_bounds, upper_bounds]`.
pub fn price_list_history(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: PriceListHistoryRequest = parse(payload)?;
    if req.lower_bounds > req.upper_bounds {
        return Err(HandlerError::user("lower bound is after upper bound"));
    }
    let key = state.resolve_realm_key(&req.region_name, &req.realm_slug)?;
    let history = state.history()?;

    let mut out = ItemPriceHistories::new();
    for &item_id in &req.item_ids {
        out.insert(item_id, history.get_history(&key, item_id, req.lower_bounds, req.upper_bounds)?);
    }
    ok_gzip(&out)
}

#[cfg(test)]
mod tests {
    use ahx_core::codec;
    use ahx_core::error::ErrorCode;
    use ahx_core::types::Prices;

    use super::*;
    use crate::handlers::test_support::{auction, state_with};

    #[test]
    fn history_for_requested_range() {
        let (_dir, state) = state_with(&[auction(1, 25, "A", 20, 2)]);
        let msg = price_list_history(
            &state,
            br#"{"region_name":"us","realm_slug":"earthen-ring","item_ids":[25],"lower":0,"upper":2000000000}"#,
        )
        .unwrap();
        let out: ItemPriceHistories = codec::from_gzip_base64_json(&msg.data).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[&25][&1700000000], Prices { min_buyout_per: 10.0, quantity_total: 2, auctions_total: 1 });
    }

    #[test]
    fn empty_window_and_unknown_item() {
        let (_dir, state) = state_with(&[auction(1, 25, "A", 20, 2)]);
        let msg = price_list_history(
            &state,
            br#"{"region_name":"us","realm_slug":"earthen-ring","item_ids":[25,26],"lower_bounds":0,"upper_bounds":1600000000}"#,
        )
        .unwrap();
        let out: ItemPriceHistories = codec::from_gzip_base64_json(&msg.data).unwrap();
        assert!(out[&25].is_empty());
        assert!(out[&26].is_empty());

        let err = price_list_history(
            &state,
            br#"{"region_name":"us","realm_slug":"earthen-ring","item_ids":[25],"lower":10,"upper":5}"#,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::UserError);
    }
}
