use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Article, VALID_TOKEN};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json;charset=UTF-8")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

// --- listing ---

#[tokio::test]
async fn article_list_is_wrapped_in_envelope() {
    let resp = app()
        .oneshot(empty_request("GET", "/article/list"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    assert_eq!(body["code"], 200);
    assert_eq!(body["message"], "ok");
    let articles: Vec<Article> = serde_json::from_value(body["data"].clone()).unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Hello, blog");
}

#[tokio::test]
async fn tag_list_returns_seeded_tags() {
    let resp = app()
        .oneshot(empty_request("GET", "/articleTag/list"))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["data"][0]["articleTagName"], "rust");
}

// --- detail ---

#[tokio::test]
async fn missing_article_is_business_error_with_http_200() {
    let resp = app()
        .oneshot(empty_request("GET", "/article/articleDetailById?articleId=999"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    assert_eq!(body["code"], 500);
    assert_eq!(body["message"], "article not found");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn create_article_malformed_json_returns_422() {
    let resp = app()
        .oneshot(json_request("POST", "/article", r#"{"not_title":1}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- auth ---

#[tokio::test]
async fn author_requires_bearer_token() {
    let resp = app()
        .oneshot(empty_request("GET", "/blogAuthor/currentUserInfo"))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["code"], 401);

    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/blogAuthor/currentUserInfo")
                .header(http::header::AUTHORIZATION, format!("Bearer {VALID_TOKEN}"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"]["userNick"], "author");
}

// --- debug routes ---

#[tokio::test]
async fn raw_status_route_sets_http_status() {
    let resp = app()
        .oneshot(empty_request("GET", "/debug/status/502"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = body_json(resp).await;
    assert_eq!(body["message"], "server says 502");
}

#[tokio::test]
async fn echo_returns_raw_query() {
    let resp = app()
        .oneshot(empty_request("DELETE", "/debug/echo?ids=1&ids=2"))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["data"]["query"], "ids=1&ids=2");
    assert!(body["data"]["authorization"].is_null());
}

#[tokio::test]
async fn upload_counts_multipart_fields() {
    let boundary = "XBOUNDARY";
    let payload = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"folder\"\r\n\r\ncovers\r\n\
         --{boundary}--\r\n"
    );
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(
                    http::header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(payload)
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    assert_eq!(body["data"]["fields"], serde_json::json!(["file", "folder"]));
    assert_eq!(body["data"]["bytes"], 11);
}

// --- full lifecycle ---

#[tokio::test]
async fn article_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    // create
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "POST",
            "/article",
            r#"{"title":"Async Rust","tagIds":[1,2]}"#,
        ))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    let created: Article = serde_json::from_value(body["data"].clone()).unwrap();
    assert_eq!(created.title, "Async Rust");
    assert_eq!(created.tag_ids, vec![1, 2]);
    let id = created.article_id;

    // update
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "PUT",
            &format!("/article/{id}"),
            r#"{"title":"Async Rust, revised"}"#,
        ))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["data"]["title"], "Async Rust, revised");

    // total
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", "/article/total"))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["data"], 2);

    // batch delete with repeated keys
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("DELETE", &format!("/article?ids=1&ids={id}")))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["data"], 2);

    // single delete of a missing article
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("DELETE", &format!("/article/{id}")))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["code"], 500);

    // list after delete: empty, and the raw body is still an envelope
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", "/article/list"))
        .await
        .unwrap();
    let raw = body_bytes(resp).await;
    let body: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(body["data"], serde_json::json!([]));
}
