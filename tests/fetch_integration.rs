use chrono::NaiveDate;
use leyncal::fetch::{CalendarClient, validate_range};
use leyncal::http::Backoff;
use mockito::{Matcher, Server};
use std::time::Duration;

fn fast_backoff() -> Backoff {
    Backoff::new(3, Duration::from_millis(5), Duration::from_millis(20))
}

fn leyning_body() -> &'static str {
    r#"{
        "items": [
            {
                "date": "2024-11-02",
                "hdate": "1 Cheshvan 5785",
                "name": {"en": "Noach"},
                "fullkriyah": {
                    "1": {"k": "Genesis", "b": "6:9", "e": "6:22", "v": 14},
                    "M": {"k": "Numbers", "b": "28:9", "e": "28:15", "v": 7}
                },
                "haft": {"k": "Isaiah", "b": "66:1", "e": "66:24", "v": 24}
            },
            {
                "date": "2024-10-26",
                "hdate": "24 Tishrei 5785",
                "name": {"en": "Bereshit"},
                "fullkriyah": {
                    "1": {"k": "Genesis", "b": "1:1", "e": "2:3", "v": 34}
                },
                "haft": {"k": "Isaiah", "b": "42:5", "e": "43:10", "v": 21}
            }
        ]
    }"#
}

#[tokio::test]
async fn fetch_returns_records_sorted_ascending() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/leyning")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cfg".into(), "json".into()),
            Matcher::UrlEncoded("start".into(), "2024-10-26".into()),
            Matcher::UrlEncoded("end".into(), "2024-11-02".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(leyning_body())
        .create_async()
        .await;

    let client = CalendarClient::new()
        .unwrap()
        .with_base_url(&server.url())
        .with_backoff(fast_backoff());

    let start = NaiveDate::from_ymd_opt(2024, 10, 26).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 11, 2).unwrap();
    let records = client.fetch(start, end).await.unwrap();

    mock.assert_async().await;
    assert_eq!(records.len(), 2);
    // The body above is deliberately out of order.
    assert_eq!(records[0].english_name(), "Bereshit");
    assert_eq!(records[1].english_name(), "Noach");
    assert!(records[0].date <= records[1].date);
    assert!(records.iter().all(|r| r.date >= start && r.date <= end));
}

#[tokio::test]
async fn test_mode_truncates_to_first_record() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/leyning")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(leyning_body())
        .create_async()
        .await;

    let client = CalendarClient::new()
        .unwrap()
        .with_base_url(&server.url())
        .with_backoff(fast_backoff())
        .with_test_mode(true);

    let records = client
        .fetch(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].english_name(), "Bereshit");
}

#[tokio::test]
async fn server_errors_are_retried_then_surfaced() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/leyning")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let client = CalendarClient::new()
        .unwrap()
        .with_base_url(&server.url())
        .with_backoff(fast_backoff());

    let result = client
        .fetch(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .await;

    mock.assert_async().await;
    assert!(result.is_err(), "exhausted retries should surface an error");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/leyning")
        .match_query(Matcher::Any)
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let client = CalendarClient::new()
        .unwrap()
        .with_base_url(&server.url())
        .with_backoff(fast_backoff());

    let result = client
        .fetch(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .await;

    mock.assert_async().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn invalid_range_fails_before_any_network_call() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/leyning")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    // Validation happens before a fetch is ever issued.
    assert!(validate_range("2024-12-31", "2024-01-01").is_err());

    mock.assert_async().await;
}
