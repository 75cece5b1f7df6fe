//! Distributed ingest: the collector announces fresh raw snapshots and these
//! handlers read them back and derive the realm's views.
//!
//! Handlers run on a blocking thread, so blob reads go through the current
//! runtime handle.

use ahx_core::bus::Message;
use ahx_core::dedup::MiniAuctionList;
use ahx_core::types::{AuctionsResponse, IntakeRequest, RealmKey};
use ahx_store::ingest::{ingest_live_auctions, ingest_pricelist_history};
use tokio::runtime::Handle;
use tracing::{info, warn};

use super::{HandlerResult, parse};
use crate::error::HandlerError;
use crate::state::ApiState;

/// Realms in the request this process should ingest.
fn accepted(state: &ApiState, req: &IntakeRequest) -> Vec<(RealmKey, i64)> {
    req.entries()
        .filter_map(|(region, slug, target_time)| {
            if !state.config.is_whitelisted(region, slug) {
                return None;
            }
            match state.status.realm(region, slug) {
                Some(realm) => Some((realm.key(), target_time)),
                None => {
                    warn!(region, realm = slug, "[intake] unknown realm, skipping");
                    None
                }
            }
        })
        .collect()
}

fn read_snapshot(state: &ApiState, handle: &Handle, realm: &RealmKey, target_time: i64) -> Result<AuctionsResponse, HandlerError> {
    Ok(handle.block_on(state.blobs.read_raw_auctions(realm, target_time))?)
}

fn runtime() -> Result<Handle, HandlerError> {
    Handle::try_current().map_err(|e| HandlerError::generic(e.to_string()))
}

pub fn live_auctions_intake(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: IntakeRequest = parse(payload)?;
    let live = state.live()?;
    let handle = runtime()?;

    let mut ingested = 0;
    for (realm, target_time) in accepted(state, &req) {
        let result = read_snapshot(state, &handle, &realm, target_time)
            .and_then(|snapshot| Ok(ingest_live_auctions(live, &realm, &snapshot)?));
        match result {
            Ok(minis) => {
                state.status.advance_last_downloaded(&realm, target_time);
                ingested += 1;
                info!(region = %realm.region, realm = %realm.slug, "[intake] {} live auctions at {target_time}", minis.len());
            }
            Err(e) => warn!(region = %realm.region, realm = %realm.slug, "[intake] live auctions failed: {e}"),
        }
    }
    info!("[intake] live auctions ingested for {ingested} realms");
    Ok(Message::ok(""))
}

pub fn pricelist_histories_intake(state: &ApiState, payload: &[u8]) -> HandlerResult {
    let req: IntakeRequest = parse(payload)?;
    let history = state.history()?;
    let handle = runtime()?;

    let mut ingested = 0;
    for (realm, target_time) in accepted(state, &req) {
        let result = read_snapshot(state, &handle, &realm, target_time).and_then(|snapshot| {
            let minis = MiniAuctionList::from_auctions(&snapshot.auctions);
            let week = ingest_pricelist_history(history, &realm, target_time, &minis)?;
            let shard = history.shard_bytes(&realm, week)?;
            handle.block_on(state.blobs.write_pricelist_history(&realm, week, shard))?;
            Ok(week)
        });
        match result {
            Ok(week) => {
                state.status.advance_last_downloaded(&realm, target_time);
                ingested += 1;
                info!(region = %realm.region, realm = %realm.slug, "[intake] history at {target_time} into shard {week}");
            }
            Err(e) => warn!(region = %realm.region, realm = %realm.slug, "[intake] pricelist history failed: {e}"),
        }
    }
    info!("[intake] pricelist histories ingested for {ingested} realms");
    Ok(Message::ok(""))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ahx_core::types::Prices;
    use ahx_store::blob::{PRICELIST_HISTORIES_BUCKET, pricelist_history_object};

    use super::*;
    use crate::handlers::test_support::{auction, state_with};

    const TS: i64 = 1700600000;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread().worker_threads(1).enable_all().build().unwrap()
    }

    fn intake(ts: i64) -> Vec<u8> {
        let mut req = IntakeRequest::default();
        req.insert("us", "earthen-ring", ts);
        req.insert("us", "stormrage", ts);
        serde_json::to_vec(&req).unwrap()
    }

    fn snapshot() -> AuctionsResponse {
        AuctionsResponse { realms: vec![], auctions: vec![auction(7, 26, "C", 9, 3), auction(8, 26, "C", 9, 3)] }
    }

    fn run(rt: &tokio::runtime::Runtime, state: &Arc<ApiState>, handler: super::super::Handler, body: Vec<u8>) -> Message {
        let state = Arc::clone(state);
        rt.block_on(rt.spawn_blocking(move || handler(&state, &body))).unwrap().unwrap()
    }

    #[test]
    fn live_intake_replaces_auctions() {
        let rt = runtime();
        let (_dir, state) = state_with(&[auction(1, 25, "A", 20, 2)]);
        let key = RealmKey::new("us", "earthen-ring");
        rt.block_on(state.blobs.write_raw_auctions(&key, TS, &snapshot())).unwrap();

        let reply = run(&rt, &state, live_auctions_intake, intake(TS));
        assert!(reply.code.is_ok());

        let minis = state.live().unwrap().get_mini_auctions(&key).unwrap();
        assert_eq!(minis.item_ids(), vec![26]);
        assert_eq!(minis.0[0].auc_list, vec![7, 8]);
        assert_eq!(state.status.realm("us", "earthen-ring").unwrap().last_downloaded, TS);
    }

    #[test]
    fn history_intake_persists_and_backs_up_shard() {
        let rt = runtime();
        let (_dir, state) = state_with(&[]);
        let key = RealmKey::new("us", "earthen-ring");
        rt.block_on(state.blobs.write_raw_auctions(&key, TS, &snapshot())).unwrap();

        let reply = run(&rt, &state, pricelist_histories_intake, intake(TS));
        assert!(reply.code.is_ok());

        let points = state.history().unwrap().get_history(&key, 26, 0, i64::MAX).unwrap();
        assert_eq!(points[&TS], Prices { min_buyout_per: 3.0, quantity_total: 6, auctions_total: 2 });

        let week = ahx_core::time_util::week_start_unix(TS);
        let bucket = state.blobs.get_or_create_bucket(PRICELIST_HISTORIES_BUCKET).unwrap();
        assert!(rt.block_on(bucket.exists(&pricelist_history_object(&key, week))).unwrap());
    }

    #[test]
    fn missing_snapshot_is_logged_not_fatal() {
        let rt = runtime();
        let (_dir, state) = state_with(&[auction(1, 25, "A", 20, 2)]);
        let reply = run(&rt, &state, live_auctions_intake, intake(TS));
        assert!(reply.code.is_ok());
        let key = RealmKey::new("us", "earthen-ring");
        assert_eq!(state.live().unwrap().get_mini_auctions(&key).unwrap().item_ids(), vec![25]);
    }

    #[test]
    fn bad_payload_is_parse_error() {
        let (_dir, state) = state_with(&[]);
        let err = live_auctions_intake(&state, b"nope").unwrap_err();
        assert_eq!(err.code, ahx_core::error::ErrorCode::MsgJsonParseError);
    }
}
