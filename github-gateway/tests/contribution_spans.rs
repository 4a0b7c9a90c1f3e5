use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use github_gateway::{GitHubClient, GitHubConfig};
use serde_json::{Value, json};

type Seen = Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>>;

/// GraphQL stand-in that enforces the one-year `contributionsCollection`
/// limit and answers with records at both ends of each span.
async fn graphql(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    let vars = &body["variables"];
    let from: DateTime<Utc> = vars["from"].as_str().unwrap().parse().unwrap();
    let to: DateTime<Utc> = vars["to"].as_str().unwrap().parse().unwrap();
    seen.lock().unwrap().push((from, to));

    if to - from > Duration::days(366) {
        return Json(json!({
            "data": null,
            "errors": [{ "message": "The total time spanned by 'from' and 'to' must not exceed 1 year" }]
        }));
    }

    let query = body["query"].as_str().unwrap();
    let collection = if query.contains("contributionCalendar") {
        json!({ "contributionCalendar": { "weeks": [{ "contributionDays": [
            { "contributionCount": 2, "date": from.date_naive().to_string() },
            { "contributionCount": 2, "date": to.date_naive().to_string() }
        ]}]}})
    } else {
        let node = |at: DateTime<Utc>| {
            json!({
                "occurredAt": at.to_rfc3339(),
                "pullRequest": { "title": "Fix", "url": "https://github.com/acme/widgets/pull/1" }
            })
        };
        json!({ "pullRequestReviewContributions": { "nodes": [node(from), node(to)] } })
    };
    Json(json!({ "data": { "user": { "contributionsCollection": collection } } }))
}

async fn serve() -> (GitHubClient, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/graphql", post(graphql))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = GitHubClient::new(GitHubConfig {
        base_api: format!("http://{addr}"),
        graphql_url: format!("http://{addr}/graphql"),
    })
    .unwrap();
    (client, seen)
}

fn since_2000() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2003, 6, 1, 12, 0, 0).unwrap(),
    )
}

#[tokio::test]
async fn multi_year_calendar_is_fetched_per_span() {
    let (client, seen) = serve().await;
    let (from, to) = since_2000();

    let days = client
        .contribution_calendar("tok", "octocat", from, to)
        .await
        .unwrap();

    let spans = seen.lock().unwrap().clone();
    assert_eq!(spans.len(), 4);
    assert_eq!(spans[0].0, from);
    assert_eq!(spans[3].1, to);
    // shared boundary days are kept once
    assert_eq!(days.len(), 5);
    assert!(days.windows(2).all(|w| w[0].date < w[1].date));
    assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
}

#[tokio::test]
async fn multi_year_reviews_are_merged_without_duplicates() {
    let (client, seen) = serve().await;
    let (from, to) = since_2000();

    let reviews = client
        .review_contributions_since("tok", "octocat", from, to)
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 4);
    assert_eq!(reviews.len(), 5);
}

#[tokio::test]
async fn short_window_is_one_request() {
    let (client, seen) = serve().await;
    let to = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

    client
        .review_contributions_since("tok", "octocat", to - Duration::days(180), to)
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
}
