use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use linkdex_core::config::QueueConfig;
use linkdex_core::{FetchError, Library, PageFetcher, PageInfo, ScrapeQueue, Settings};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tempfile::tempdir;

struct NoFetch;

impl PageFetcher for NoFetch {
    fn fetch(&self, _url: &str) -> impl Future<Output = Result<PageInfo, FetchError>> + Send {
        async { Err(FetchError::Transport("offline".into())) }
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    library: Arc<Library>,
    queue: ScrapeQueue<NoFetch>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let library = Arc::new(Library::open(dir.path().join("db"), Settings::default()).unwrap());
        let queue = ScrapeQueue::new(library.clone(), NoFetch, QueueConfig::default());
        Self { _dir: dir, library, queue }
    }

    fn app(&self, admin_token: Option<&str>) -> Router {
        server::build_app(server::AppState {
            library: self.library.clone(),
            queue: self.queue.handle(),
            admin_token: admin_token.map(String::from),
        })
    }

    fn scraped(&self, url: &str, title: &str, text: &str, tags: &[&str]) -> u64 {
        let bm = self.library.add_bookmark(url, tags).unwrap();
        let info = PageInfo { title: title.into(), raw_text: text.into(), status_code: 200, ..PageInfo::default() };
        self.library.apply_scrape(bm.id, info).unwrap();
        bm.id
    }
}

async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Bytes) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder.header("content-type", "application/json").body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = tower::ServiceExt::oneshot(app, req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

fn json(body: &Bytes) -> Value { serde_json::from_slice(body).unwrap() }

#[tokio::test]
async fn search_returns_matching_bookmarks() {
    let fx = Fixture::new();
    let fox = fx.scraped("https://fox.test", "Foxes", "the quick brown fox jumped over the lazy dog", &[]);
    fx.scraped("https://cat.test", "Cats", "a lazy cat sleeps", &[]);

    let (status, body) = call(fx.app(None), Method::GET, "/search?q=quick+fox", None).await;
    assert_eq!(status, StatusCode::OK);
    let found = json(&body);
    let results = found["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"].as_u64().unwrap(), fox);
    assert_eq!(results[0]["title"], "Foxes");
    assert_eq!(found["total_hits"], 1);

    let (_, body) = call(fx.app(None), Method::GET, "/search?q=lazy&sort=title", None).await;
    let titles: Vec<String> = json(&body)["results"].as_array().unwrap().iter().map(|r| r["title"].as_str().unwrap().to_string()).collect();
    assert_eq!(titles, vec!["Cats", "Foxes"]);
}

#[tokio::test]
async fn search_applies_tag_filter_and_cap() {
    let fx = Fixture::new();
    for i in 0..4 {
        let tags: &[&str] = if i % 2 == 0 { &["rust"] } else { &[] };
        fx.scraped(&format!("https://p{i}.test"), "", "common words", tags);
    }

    let (_, body) = call(fx.app(None), Method::GET, "/search?q=common&tags=rust", None).await;
    assert_eq!(json(&body)["results"].as_array().unwrap().len(), 2);

    let (_, body) = call(fx.app(None), Method::GET, "/search?q=common&k=3", None).await;
    assert_eq!(json(&body)["results"].as_array().unwrap().len(), 3);

    let (_, body) = call(fx.app(None), Method::GET, "/search?q=", None).await;
    assert!(json(&body)["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn add_queues_a_scrape_and_rejects_bad_urls() {
    let fx = Fixture::new();
    let (status, body) = call(fx.app(None), Method::POST, "/bookmarks", Some(serde_json::json!({ "url": "https://new.test", "tags": ["Reading"] }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let added = json(&body);
    assert_eq!(added["tags"], serde_json::json!(["reading"]));
    assert_ne!(added["last_scraped"], "1970-01-01T00:00:00Z");
    assert_eq!(fx.queue.accept_pending(), 1);

    let (status, _) = call(fx.app(None), Method::POST, "/bookmarks", Some(serde_json::json!({ "url": "https://new.test" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(fx.app(None), Method::POST, "/bookmarks", Some(serde_json::json!({ "url": "not a url" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());
}

#[tokio::test]
async fn delete_removes_bookmark_from_search() {
    let fx = Fixture::new();
    let id = fx.scraped("https://fox.test", "Foxes", "brown fox", &[]);

    let (status, _) = call(fx.app(None), Method::DELETE, &format!("/bookmarks/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(fx.app(None), Method::GET, "/search?q=fox", None).await;
    assert!(json(&body)["results"].as_array().unwrap().is_empty());

    let (status, _) = call(fx.app(None), Method::GET, &format!("/bookmarks/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(fx.app(None), Method::DELETE, &format!("/bookmarks/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn edit_overrides_title_and_reindexes_tags() {
    let fx = Fixture::new();
    let id = fx.scraped("https://fox.test", "Foxes", "brown fox", &[]);

    let edit = serde_json::json!({ "title": "Vulpes", "tags": ["animals"] });
    let (status, body) = call(fx.app(None), Method::PUT, &format!("/bookmarks/{id}"), Some(edit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["title"], "Vulpes");

    let (_, body) = call(fx.app(None), Method::GET, "/search?tags=animals", None).await;
    assert_eq!(json(&body)["results"][0]["id"].as_u64().unwrap(), id);

    let (_, body) = call(fx.app(None), Method::GET, &format!("/bookmarks/{id}"), None).await;
    assert_eq!(json(&body)["preserve_title"], true);
}

#[tokio::test]
async fn bulk_add_and_export() {
    let fx = Fixture::new();
    let req = Request::post("/bookmarks/bulk").body(Body::from("https://a.test\n\nftp://bad.test\nhttps://b.test\n")).unwrap();
    let resp = tower::ServiceExt::oneshot(fx.app(None), req).await.unwrap();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let report = json(&body);
    assert_eq!(report["added"], 2);
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);

    let (status, body) = call(fx.app(None), Method::GET, "/export", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8_lossy(&body), "https://a.test\nhttps://b.test\n");
}

#[tokio::test]
async fn rebuild_requires_admin_token() {
    let fx = Fixture::new();
    fx.scraped("https://fox.test", "Foxes", "brown fox", &[]);

    let (status, _) = call(fx.app(None), Method::POST, "/index/rebuild", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::post("/index/rebuild").header("X-ADMIN-TOKEN", "wrong").body(Body::empty()).unwrap();
    let resp = tower::ServiceExt::oneshot(fx.app(Some("secret")), req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::post("/index/rebuild").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let resp = tower::ServiceExt::oneshot(fx.app(Some("secret")), req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(json(&body)["reindexed"], 1);
}

#[tokio::test]
async fn stats_count_searches() {
    let fx = Fixture::new();
    fx.scraped("https://fox.test", "Foxes", "brown fox", &[]);
    call(fx.app(None), Method::GET, "/search?q=fox", None).await;
    call(fx.app(None), Method::GET, "/search?q=cat", None).await;
    fx.library.update_bookmark_stats().unwrap();

    let (status, body) = call(fx.app(None), Method::GET, "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let stats = json(&body);
    assert_eq!(stats["searches"], 2);
    assert_eq!(stats["bookmarks"], 1);
    assert!(stats["indexed_words"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn scrape_after_queue_shutdown_is_unavailable() {
    let fx = Fixture::new();
    let id = fx.scraped("https://fox.test", "Foxes", "brown fox", &[]);
    let app = fx.app(None);
    let Fixture { _dir, library, queue } = fx;
    drop(queue);

    let before = library.bookmark(id).unwrap().last_scraped;
    let (status, body) = call(app, Method::POST, &format!("/bookmarks/{id}/scrape"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json(&body)["error"].is_string());
    assert_eq!(library.bookmark(id).unwrap().last_scraped, before);
}
