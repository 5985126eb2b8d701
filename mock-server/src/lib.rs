//! In-memory stand-in for the blog content API.
//!
//! Every route answers with the backend envelope `{code, message, data}`.
//! Business failures use HTTP 200 with a non-200 `code`; the `/debug` routes
//! produce the other failure classes the front end has to cope with (slow
//! responses, raw HTTP errors, session expiry) and echo what the client sent.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use axum::{
    extract::{Multipart, Path, Query, RawQuery, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

/// Token the protected routes accept.
pub const VALID_TOKEN: &str = "secret-token";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub article_id: u64,
    pub title: String,
    pub markdown: String,
    pub excerpt: String,
    pub tag_ids: Vec<u64>,
    pub category_ids: Vec<u64>,
    pub create_time: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArticleTag {
    pub article_tag_id: u64,
    pub article_tag_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleInput {
    pub title: String,
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub tag_ids: Vec<u64>,
    #[serde(default)]
    pub category_ids: Vec<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleQuery {
    pub article_id: u64,
}

#[derive(Deserialize)]
pub struct SlowQuery {
    pub ms: u64,
}

#[derive(Debug, Default)]
pub struct BlogDb {
    pub articles: BTreeMap<u64, Article>,
    pub tags: Vec<ArticleTag>,
    next_id: u64,
}

impl BlogDb {
    pub fn seeded() -> Self {
        let mut db = Self {
            tags: vec![
                ArticleTag {
                    article_tag_id: 1,
                    article_tag_name: "rust".to_string(),
                },
                ArticleTag {
                    article_tag_id: 2,
                    article_tag_name: "networking".to_string(),
                },
            ],
            ..Self::default()
        };
        db.insert(ArticleInput {
            title: "Hello, blog".to_string(),
            markdown: "# Hello".to_string(),
            excerpt: "First post".to_string(),
            tag_ids: vec![1],
            category_ids: vec![1],
        });
        db
    }

    fn insert(&mut self, input: ArticleInput) -> Article {
        self.next_id += 1;
        let article = Article {
            article_id: self.next_id,
            title: input.title,
            markdown: input.markdown,
            excerpt: input.excerpt,
            tag_ids: input.tag_ids,
            category_ids: input.category_ids,
            create_time: "2024-01-01 00:00:00".to_string(),
        };
        self.articles.insert(article.article_id, article.clone());
        article
    }
}

pub type Db = Arc<RwLock<BlogDb>>;

type Envelope = Json<Value>;

fn ok(data: impl Serialize) -> Envelope {
    Json(json!({"code": 200, "message": "ok", "data": data}))
}

fn fail(code: i64, message: &str) -> Envelope {
    Json(json!({"code": code, "message": message, "data": null}))
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(BlogDb::seeded()));
    Router::new()
        .route("/articleTag/list", get(list_tags))
        .route("/article/list", get(list_articles))
        .route("/article/total", get(article_total))
        .route("/article/articleDetailById", get(article_detail))
        .route("/article", post(create_article).delete(delete_articles))
        .route("/article/{id}", put(update_article).delete(delete_article))
        .route("/blogAuthor/currentUserInfo", get(current_user))
        .route("/upload", post(upload))
        .route("/debug/slow", get(slow))
        .route("/debug/status/{status}", get(raw_status))
        .route("/debug/expired", get(expired))
        .route("/debug/echo", get(echo).delete(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock blog API listening");
    }
    axum::serve(listener, app()).await
}

async fn list_tags(State(db): State<Db>) -> Envelope {
    let db = db.read().await;
    ok(&db.tags)
}

async fn list_articles(State(db): State<Db>) -> Envelope {
    let db = db.read().await;
    ok(db.articles.values().collect::<Vec<_>>())
}

async fn article_total(State(db): State<Db>) -> Envelope {
    let db = db.read().await;
    ok(db.articles.len())
}

async fn article_detail(State(db): State<Db>, Query(query): Query<ArticleQuery>) -> Envelope {
    let db = db.read().await;
    match db.articles.get(&query.article_id) {
        Some(article) => ok(article),
        None => fail(500, "article not found"),
    }
}

async fn create_article(State(db): State<Db>, Json(input): Json<ArticleInput>) -> Envelope {
    let article = db.write().await.insert(input);
    debug!(article_id = article.article_id, "created article");
    ok(article)
}

async fn update_article(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<ArticleInput>,
) -> Envelope {
    let mut db = db.write().await;
    let Some(article) = db.articles.get_mut(&id) else {
        return fail(500, "article not found");
    };
    article.title = input.title;
    article.markdown = input.markdown;
    article.excerpt = input.excerpt;
    article.tag_ids = input.tag_ids;
    article.category_ids = input.category_ids;
    ok(article.clone())
}

async fn delete_article(State(db): State<Db>, Path(id): Path<u64>) -> Envelope {
    let mut db = db.write().await;
    match db.articles.remove(&id) {
        Some(_) => ok(1),
        None => fail(500, "article not found"),
    }
}

/// `DELETE /article?ids=1&ids=2`; ids that do not exist are ignored.
async fn delete_articles(
    State(db): State<Db>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Envelope {
    let ids: Vec<u64> = pairs
        .iter()
        .filter(|(key, _)| key == "ids")
        .filter_map(|(_, value)| value.parse().ok())
        .collect();
    if ids.is_empty() {
        return fail(400, "ids are required");
    }
    let mut db = db.write().await;
    let removed = ids
        .iter()
        .filter(|id| db.articles.remove(*id).is_some())
        .count();
    ok(removed)
}

async fn current_user(headers: HeaderMap) -> Envelope {
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {VALID_TOKEN}"));
    if !authorized {
        return fail(401, "token expired");
    }
    ok(json!({"userId": 1, "fullName": "Blog Author", "userNick": "author"}))
}

async fn upload(mut multipart: Multipart) -> Result<Envelope, StatusCode> {
    let mut fields = Vec::new();
    let mut bytes = 0usize;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        bytes += data.len();
        fields.push(name);
    }
    Ok(ok(json!({"fields": fields, "bytes": bytes})))
}

async fn slow(Query(query): Query<SlowQuery>) -> Envelope {
    tokio::time::sleep(Duration::from_millis(query.ms)).await;
    ok(query.ms)
}

async fn raw_status(Path(status): Path<u16>) -> (StatusCode, Envelope) {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"message": format!("server says {}", status.as_u16())})))
}

async fn expired() -> Envelope {
    fail(401, "token expired")
}

async fn echo(headers: HeaderMap, RawQuery(query): RawQuery) -> Envelope {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    ok(json!({"authorization": authorization, "query": query}))
}
