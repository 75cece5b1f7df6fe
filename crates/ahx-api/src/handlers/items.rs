use super::{HandlerResult, ok_gzip, ok_json, parse, parse_or_default};
use crate::error::HandlerError;
use crate::requests::{ItemsQueryRequest, ItemsQueryResponse, ItemsRequest};
use crate::state::ApiState;

pub fn items_query(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: ItemsQueryRequest = parse_or_default(payload)?;
    let items = state.items()?.search(&req.query)?;
    ok_json(&ItemsQueryResponse { items })
}

/// Batch lookup; unknown ids are left out of the map.
pub fn items(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: ItemsRequest = parse(payload)?;
    if req.item_ids.is_empty() {
        return Err(HandlerError::user("item_ids is required"));
    }
    ok_gzip(&state.items()?.find(&req.item_ids)?)
}
