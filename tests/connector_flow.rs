use reqwest::Client;
use serde_json::json;
use sheetkpi::{
    config::{BACKEND_URL, CACHE_TTL_MS, MODE, SHEET_NAME},
    ConfigResolver, FileStore, KeyValueStore, ManualClock, SheetCache, SheetsConnector,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver(server: &MockServer) -> ConfigResolver {
    ConfigResolver::new(
        None,
        HashMap::from([
            (MODE.to_string(), "backend".to_string()),
            (BACKEND_URL.to_string(), server.uri()),
            (SHEET_NAME.to_string(), "Synthèse".to_string()),
            (CACHE_TTL_MS.to_string(), "60000".to_string()),
        ]),
    )
}

#[tokio::test]
async fn cache_file_survives_a_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sheets/values"))
        .and(query_param("range", "'Synthèse'!A1:Z100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["Année", "Indemnités km", "Remboursements frais", "Location"],
                ["2024", "4 544,00", "3431.89", "900"],
                ["2023", "1000", "", "900"]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_file = dir.path().join("state").join("cache.json");
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));

    let first = {
        let store = Arc::new(FileStore::open(&cache_file).unwrap());
        let connector = SheetsConnector::new(
            resolver(&server),
            SheetCache::new(store, clock.clone()),
            Client::new(),
        );
        connector.load_dataset(false).await.unwrap()
    };
    assert_eq!(first.years, vec!["2023", "2024"]);
    assert_eq!(first.allowances, vec![1000.0, 4544.0]);
    assert_eq!(first.reimbursements, vec![0.0, 3431.89]);
    assert_eq!(first.rent, vec![900.0, 900.0]);
    assert_eq!(first.totals(), vec![1000.0, 4544.0 + 3431.89]);

    // a new process reads the same file and never reaches the network
    clock.advance(Duration::from_secs(30));
    let store = Arc::new(FileStore::open(&cache_file).unwrap());
    assert!(store
        .keys()
        .contains(&"sheets:backend:'Synthèse'!A1:Z100".to_string()));
    let connector = SheetsConnector::new(
        resolver(&server),
        SheetCache::new(store, clock.clone()),
        Client::new(),
    );
    assert_eq!(connector.load_dataset(false).await.unwrap(), first);
}

#[tokio::test]
async fn table_cache_and_cooldown_share_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("cache.json")).unwrap());
    let clock = Arc::new(ManualClock::new(0));
    let connector = SheetsConnector::new(
        resolver(&server),
        SheetCache::new(store.clone(), clock),
        Client::new(),
    );

    let err = connector.load_table("Budget!A1:B5", false).await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP 429: slow down");
    assert!(connector
        .load_table("Budget!A1:B5", false)
        .await
        .unwrap()
        .is_empty());

    assert_eq!(store.get("sheets:table:backend:Budget!A1:B5:cd").as_deref(), Some("30000"));
    assert_eq!(connector.clear_all(), 1);
    assert!(store.keys().is_empty());
}
