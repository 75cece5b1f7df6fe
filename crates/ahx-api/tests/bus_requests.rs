//! Requests through the in-process bus into every handler group.

use std::sync::Arc;

use ahx_api::{ApiState, ListenerSet, handlers};
use ahx_core::bus::{BusError, LocalBus, Messenger, decode_data, request_json, subjects};
use ahx_core::codec;
use ahx_core::config::AppConfig;
use ahx_core::dedup::MiniAuctionList;
use ahx_core::error::ErrorCode;
use ahx_core::types::{
    Auction, ItemPriceHistories, Prices, Realm, RealmKey, RegionTable, StatusRequest, StatusResponse, StatusTable,
};
use ahx_store::{BlobStore, ItemsStore, LiveAuctionsStore, PricelistHistoryStore};
use serde_json::json;
use tempfile::TempDir;

fn state(dir: &TempDir) -> Arc<ApiState> {
    let config: AppConfig = serde_json::from_value(json!({
        "regions": [{"name": "us", "hostname": "us.api.test", "primary": true}],
        "whitelist": {"us": {"earthen-ring": true}}
    }))
    .unwrap();

    let status = StatusTable::new();
    let mut realm = Realm::new("us", "earthen-ring", "Earthen Ring");
    realm.last_downloaded = 1700000000;
    status.set_realms("us", vec![realm]);

    let key = RealmKey::new("us", "earthen-ring");
    let auction = Auction {
        auc: 1,
        item: 25,
        owner: "A".into(),
        owner_realm: "Earthen Ring".into(),
        bid: 10,
        buyout: 20,
        quantity: 2,
        time_left: "SHORT".into(),
        rand: 0,
        seed: 0,
        context: 0,
    };
    let minis = MiniAuctionList::from_auctions(&[auction]);

    let live = LiveAuctionsStore::new(dir.path());
    live.open_realms([&key]).unwrap();
    live.replace(&key, &minis).unwrap();
    let history = PricelistHistoryStore::open(dir.path(), 4).unwrap();
    history.persist(&key, 1700000000, &minis.price_list()).unwrap();

    let state = ApiState::new(
        Arc::new(config.clone()),
        Arc::new(RegionTable::new(config.regions.clone())),
        Arc::new(status),
        Arc::new(BlobStore::memory()),
    )
    .with_live(Arc::new(live))
    .with_history(Arc::new(history))
    .with_items(Arc::new(ItemsStore::open(dir.path()).unwrap()));
    Arc::new(state)
}

async fn serve_all(bus: &LocalBus, state: &Arc<ApiState>) -> ListenerSet {
    let mut table = handlers::core_handlers(state);
    table.extend(handlers::live_auction_handlers(state));
    table.extend(handlers::history_handlers(state));
    table.extend(handlers::test_handlers(state));
    ListenerSet::start(Arc::new(bus.clone()), table).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_owners_and_history_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let bus = LocalBus::new();
    let mut listeners = serve_all(&bus, &state(&dir)).await;

    let msg = request_json(&bus, subjects::STATUS, &StatusRequest { region_name: "us".into() }).await.unwrap();
    let status: StatusResponse = decode_data(&msg).unwrap();
    assert_eq!(status.realms[0].slug, "earthen-ring");
    assert_eq!(status.realms[0].last_downloaded, 1700000000);

    let req = json!({"region_name": "us", "realm_slug": "earthen-ring", "query": "a"});
    let msg = request_json(&bus, subjects::OWNERS, &req).await.unwrap();
    let owners: serde_json::Value = decode_data(&msg).unwrap();
    assert_eq!(owners, json!([{"name": "A", "normalized_name": "a"}]));

    let req = json!({"region_name": "us", "realm_slug": "earthen-ring", "item_ids": [25], "lower": 0, "upper": 2000000000});
    for subject in [subjects::PRICE_LIST_HISTORY, subjects::PRICE_LIST_HISTORY_V2] {
        let msg = request_json(&bus, subject, &req).await.unwrap();
        let histories: ItemPriceHistories = codec::from_gzip_base64_json(&msg.data).unwrap();
        assert_eq!(histories[&25][&1700000000], Prices { min_buyout_per: 10.0, quantity_total: 2, auctions_total: 1 });
    }

    listeners.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_carry_reply_codes() {
    let dir = tempfile::tempdir().unwrap();
    let bus = LocalBus::new();
    let mut listeners = serve_all(&bus, &state(&dir)).await;

    let expect_code = |result: Result<_, BusError>, code: ErrorCode| match result {
        Err(BusError::Reply { code: got, .. }) => assert_eq!(got, code),
        other => panic!("expected {code} reply, got {other:?}"),
    };

    let raw = bus.request(subjects::AUCTIONS, b"{".to_vec()).await.unwrap();
    let reply = ahx_core::bus::Message::decode(&raw).unwrap();
    assert_eq!(reply.code, ErrorCode::MsgJsonParseError);
    assert!(!reply.error.is_empty());

    let req = json!({"region_name": "eu", "realm_slug": "earthen-ring", "count": 10});
    expect_code(request_json(&bus, subjects::AUCTIONS, &req).await, ErrorCode::NotFound);

    let req = json!({"region_name": "us", "realm_slug": "earthen-ring", "count": 5000});
    expect_code(request_json(&bus, subjects::AUCTIONS, &req).await, ErrorCode::UserError);

    expect_code(request_json(&bus, subjects::GENERIC_TEST_ERRORS, &json!({"code": -3})).await, ErrorCode::NotFound);

    listeners.stop().await;
    assert!(matches!(
        request_json(&bus, subjects::STATUS, &json!({"region_name": "us"})).await,
        Err(BusError::NoResponders(_))
    ));
}
