use ahx_core::bus::Message;
use ahx_core::error::ErrorCode;
use ahx_core::types::{StatusRequest, StatusResponse};

use super::{HandlerResult, ok_json, parse, parse_or_default};
use crate::error::HandlerError;
use crate::requests::{
    BootResponse, GenericTestErrorsRequest, RealmModificationDates, RealmModificationDatesRequest,
    RuntimeInfoResponse, SessionSecretResponse,
};
use crate::state::ApiState;

pub fn status(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: StatusRequest = parse(payload)?;
    if req.region_name.is_empty() {
        return Err(HandlerError::user("region_name is required"));
    }
    let realms = state
        .status
        .realms(&req.region_name)
        .ok_or_else(|| HandlerError::not_found(format!("region {} not found", req.region_name)))?;
    ok_json(&StatusResponse { realms })
}

pub fn boot(state: &ApiState, _payload: &[u8]) -> HandlerResult {
    ok_json(&BootResponse {
        regions: state.regions.as_slice().to_vec(),
        item_classes: state.item_classes.clone(),
        expansions: state.config.expansions.clone(),
        professions: state.config.professions.clone(),
    })
}

pub fn realm_modification_dates(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: RealmModificationDatesRequest = parse_or_default(payload)?;

    let regions: Vec<String> = if req.region_name.is_empty() {
        state.regions.iter().map(|r| r.name.clone()).collect()
    } else if state.status.has_region(&req.region_name) {
        vec![req.region_name]
    } else {
        return Err(HandlerError::not_found(format!("region {} not found", req.region_name)));
    };

    let mut dates = RealmModificationDates::new();
    for region in regions {
        let realms = state.status.realms(&region).unwrap_or_default();
        dates.insert(region, realms.into_iter().map(|r| (r.slug, r.last_downloaded)).collect());
    }
    ok_json(&dates)
}

pub fn session_secret(state: &ApiState, _payload: &[u8]) -> HandlerResult {
    ok_json(&SessionSecretResponse { session_secret: state.session_secret.to_string() })
}

pub fn runtime_info(state: &ApiState, _payload: &[u8]) -> HandlerResult {
    ok_json(&RuntimeInfoResponse { run_id: state.run_id.to_string() })
}

/// Answers with whatever error code the caller asks for.
pub fn generic_test_errors(_state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: GenericTestErrorsRequest = parse(payload)?;
    let code = ErrorCode::try_from(req.code).map_err(HandlerError::user)?;
    if code.is_ok() {
        return Ok(Message::ok(req.message));
    }
    if code == ErrorCode::Blank {
        return Err(HandlerError::user("blank is never sent"));
    }
    Err(HandlerError::new(code, if req.message.is_empty() { format!("test error {code}") } else { req.message }))
}
