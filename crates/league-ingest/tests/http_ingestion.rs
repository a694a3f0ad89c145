use std::sync::Arc;
use std::time::{Duration, Instant};

use league_ingest::{
    Credentials, DataType, ErrorKind, HttpTransport, IngestRequest, Ingestor, LeagueTarget,
    ProviderConfig,
};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(id: &str, server: &MockServer) -> ProviderConfig {
    let mut config = ProviderConfig::new(id, server.uri());
    config.backoff_base_ms = 50;
    config.timeout_ms = 5_000;
    config
}

fn ingestor(configs: Vec<ProviderConfig>) -> Ingestor {
    Ingestor::new(configs, Arc::new(HttpTransport::new())).unwrap()
}

#[tokio::test]
async fn test_sleeper_standings_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/league/784512/rosters"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "roster_id": 3,
                "owner_id": "u3",
                "players": ["4046", "6794"],
                "settings": { "wins": 9, "losses": 4, "ties": 0, "fpts": 1587 }
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let ingestor = ingestor(vec![provider("sleeper", &server)]);
    let request = IngestRequest::new("sleeper", DataType::Standings, "784512");

    let data = ingestor.fetch_one(&request).await.unwrap();
    assert_eq!(
        data,
        json!([{ "team_id": "3", "wins": 9, "losses": 4, "ties": 0, "points_for": 1587 }])
    );

    // Second fetch is served from cache; `expect(1)` verifies on drop.
    assert_eq!(ingestor.fetch_one(&request).await.unwrap(), data);
}

#[tokio::test]
async fn test_rate_limited_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/league/1/rosters"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/league/1/rosters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "roster_id": 1, "settings": { "wins": 1, "losses": 0 } }
        ])))
        .mount(&server)
        .await;

    let ingestor = ingestor(vec![provider("sleeper", &server)]);
    let target = LeagueTarget::new("sleeper", "1");

    let started = Instant::now();
    let report = ingestor.ingest_league(&target).await.unwrap();
    let standings = &report.results[&DataType::Standings];

    assert!(standings.is_ok());
    assert_eq!(standings.retries(), 1);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_espn_sends_cookies_and_view() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/seasons/2024/segments/0/leagues/99"))
        .and(query_param("view", "mStandings"))
        .and(header("Cookie", "espn_s2=s2-value; SWID={ABC-123}"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 99,
            "teams": [
                {
                    "id": 1,
                    "name": "Gridiron Gurus",
                    "playoffSeed": 2,
                    "record": { "overall": { "wins": 8, "losses": 5, "ties": 0, "pointsFor": 1402.5 } }
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut espn = provider("espn", &server);
    espn.credentials = Credentials::new()
        .with("espn_s2", "s2-value")
        .with("swid", "{ABC-123}");
    let ingestor = ingestor(vec![espn]);

    let request =
        IngestRequest::new("espn", DataType::Standings, "99").with_param("season", "2024");
    let data = ingestor.fetch_one(&request).await.unwrap();

    assert_eq!(data[0]["team_id"], json!("1"));
    assert_eq!(data[0]["wins"], json!(8));
    assert_eq!(data[0]["rank"], json!(2));
    assert_eq!(data[0]["name"], json!("Gridiron Gurus"));
}

#[tokio::test]
async fn test_fleaflicker_league_in_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/FetchLeagueScoreboard"))
        .and(query_param("league_id", "311194"))
        .and(query_param("sport", "NFL"))
        .and(query_param("scoring_period", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "games": [
                { "id": "57111", "home": { "id": 1 }, "away": { "id": 2 } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ingestor = ingestor(vec![provider("fleaflicker", &server)]);
    let request = IngestRequest::new("fleaflicker", DataType::Matchups, "311194")
        .with_param("scoring_period", "5");

    let data = ingestor.fetch_one(&request).await.unwrap();
    assert_eq!(data[0]["matchup_id"], json!("57111"));
    assert_eq!(data[0]["team_id"], json!("1"));
    assert_eq!(data[0]["opponent_id"], json!("2"));
}

#[tokio::test]
async fn test_not_found_is_a_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/league/404/rosters"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let ingestor = ingestor(vec![provider("sleeper", &server)]);
    let err = ingestor
        .fetch_one(&IngestRequest::new("sleeper", DataType::Standings, "404"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamClient);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/league/7/rosters"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut sleeper = provider("sleeper", &server);
    sleeper.retry_ceiling = 2;
    let ingestor = ingestor(vec![sleeper]);

    let err = ingestor
        .fetch_one(&IngestRequest::new("sleeper", DataType::Standings, "7"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamServer);
}
