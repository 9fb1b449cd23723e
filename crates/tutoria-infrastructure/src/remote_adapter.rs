//! Remote document-collection service adapter.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Operation | Request                         | Response         |
//! |-----------|---------------------------------|------------------|
//! | load      | `GET    /{collection}`          | `[{"id", ...}]`  |
//! | create    | `POST   /{collection}`          | `{"id": "..."}`  |
//! | put       | `PUT    /{collection}/{id}`     | any              |
//! | update    | `PATCH  /{collection}/{id}`     | any              |
//! | delete    | `DELETE /{collection}/{id}`     | any              |
//!
//! Live updates are delivered by a watcher task per subscription that polls
//! the collection and pushes a snapshot whenever it differs from the last one
//! delivered. Writes made through this adapter wake all watchers at once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::Notify;
use tutoria_core::config::RemoteConfig;
use tutoria_core::{
    BackendKind, ChangeHandler, Collection, Document, Fields, PersistenceAdapter, Result,
    Subscription, TutoriaError,
};

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

pub struct RemoteDocumentAdapter {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    poll_interval: Duration,
    refresh: Arc<Notify>,
}

impl RemoteDocumentAdapter {
    /// Builds the HTTP client. No request is made until the first operation.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            TutoriaError::config(format!("Invalid remote base_url '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TutoriaError::config(format!(
                "Remote base_url '{}' cannot carry path segments",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TutoriaError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            refresh: Arc::new(Notify::new()),
        })
    }

    fn collection_url(&self, collection: Collection, id: Option<&str>) -> Result<Url> {
        collection_url(&self.base_url, collection, id)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        collection: Collection,
        id: Option<&str>,
    ) -> Result<reqwest::Response> {
        let response = builder.send().await.map_err(map_transport_error)?;
        check_status(response, collection, id)
    }

    async fn fetch(&self, collection: Collection) -> Result<Vec<Document>> {
        fetch_collection(&self.client, &self.base_url, self.api_key.as_deref(), collection).await
    }
}

fn collection_url(base: &Url, collection: Collection, id: Option<&str>) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| TutoriaError::config("Remote base_url cannot carry path segments"))?;
        segments.pop_if_empty().push(collection.as_ref());
        if let Some(id) = id {
            segments.push(id);
        }
    }
    Ok(url)
}

async fn fetch_collection(
    client: &Client,
    base: &Url,
    api_key: Option<&str>,
    collection: Collection,
) -> Result<Vec<Document>> {
    let url = collection_url(base, collection, None)?;
    let mut builder = client.get(url);
    if let Some(key) = api_key {
        builder = builder.bearer_auth(key);
    }
    let response = builder.send().await.map_err(map_transport_error)?;
    let response = check_status(response, collection, None)?;
    response
        .json::<Vec<Document>>()
        .await
        .map_err(|e| TutoriaError::Serialization {
            format: "JSON".to_string(),
            message: format!("Invalid {} listing: {}", collection, e),
        })
}

/// Network-level failures mean the store is unreachable.
fn map_transport_error(err: reqwest::Error) -> TutoriaError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        TutoriaError::backend_unavailable(err.to_string())
    } else {
        TutoriaError::data_access(err.to_string())
    }
}

fn check_status(
    response: reqwest::Response,
    collection: Collection,
    id: Option<&str>,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(status_error(status, collection, id))
}

fn status_error(status: StatusCode, collection: Collection, id: Option<&str>) -> TutoriaError {
    match status {
        StatusCode::NOT_FOUND => {
            TutoriaError::not_found(collection.entity_type(), id.unwrap_or_default())
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            TutoriaError::backend_unavailable(format!("{} responded {}", collection, s))
        }
        s => TutoriaError::data_access(format!("{} request rejected with {}", collection, s)),
    }
}

#[async_trait]
impl PersistenceAdapter for RemoteDocumentAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn supports_live_updates(&self) -> bool {
        true
    }

    async fn subscribe(&self, collection: Collection, on_change: ChangeHandler) -> Result<Subscription> {
        // The first snapshot is fetched inline so an unreachable store fails
        // the subscription instead of a silent watcher.
        let initial = self.fetch(collection).await?;
        on_change(collection, initial.clone());

        let client = self.client.clone();
        let base = self.base_url.clone();
        let api_key = self.api_key.clone();
        let interval = self.poll_interval;
        let refresh = self.refresh.clone();

        let watcher: tokio::task::JoinHandle<()> = tokio::spawn(async move {
            let mut last = initial;
            loop {
                // Registered before the fetch so a write landing mid-fetch
                // still wakes the next round.
                let woken = refresh.notified();
                tokio::pin!(woken);
                woken.as_mut().enable();

                match fetch_collection(&client, &base, api_key.as_deref(), collection).await {
                    Ok(current) if current != last => {
                        on_change(collection, current.clone());
                        last = current;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("[RemoteStore] Poll of {} failed: {}", collection, e);
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = &mut woken => {}
                }
            }
        });

        Ok(Subscription::new(collection, move || watcher.abort()))
    }

    async fn load(&self, collection: Collection) -> Result<Vec<Document>> {
        self.fetch(collection).await
    }

    async fn create(&self, collection: Collection, fields: Fields) -> Result<String> {
        let url = self.collection_url(collection, None)?;
        let response = self
            .send(self.request(Method::POST, url).json(&fields), collection, None)
            .await?;
        let created: CreatedResponse =
            response
                .json()
                .await
                .map_err(|e| TutoriaError::Serialization {
                    format: "JSON".to_string(),
                    message: format!("Invalid create response: {}", e),
                })?;
        self.refresh.notify_waiters();
        Ok(created.id)
    }

    async fn put(&self, collection: Collection, document: Document) -> Result<()> {
        let url = self.collection_url(collection, Some(&document.id))?;
        self.send(
            self.request(Method::PUT, url).json(&document.fields),
            collection,
            Some(&document.id),
        )
        .await?;
        self.refresh.notify_waiters();
        Ok(())
    }

    async fn update(&self, collection: Collection, id: &str, partial: Fields) -> Result<()> {
        let url = self.collection_url(collection, Some(id))?;
        self.send(self.request(Method::PATCH, url).json(&partial), collection, Some(id))
            .await?;
        self.refresh.notify_waiters();
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let url = self.collection_url(collection, Some(id))?;
        match self
            .send(self.request(Method::DELETE, url), collection, Some(id))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.refresh.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    use super::*;

    const API_KEY: &str = "secret";

    type Collections = Arc<Mutex<HashMap<String, Vec<Document>>>>;

    struct Request {
        method: String,
        path: String,
        authorization: Option<String>,
        body: Vec<u8>,
    }

    /// In-process document service speaking just enough HTTP/1.1 for the
    /// adapter. Connections are served one at a time and closed after each
    /// response.
    struct FakeDocumentService {
        base_url: String,
        task: tokio::task::JoinHandle<()>,
    }

    impl FakeDocumentService {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}/api", listener.local_addr().unwrap());
            let collections = Collections::default();
            let task = tokio::spawn(async move {
                let mut created = 0u32;
                while let Ok((mut stream, _)) = listener.accept().await {
                    let Some(request) = read_request(&mut stream).await else {
                        continue;
                    };
                    let (status, body) = handle(&collections, &mut created, request);
                    write_response(&mut stream, status, &body).await;
                }
            });
            Self { base_url, task }
        }

        fn config(&self, api_key: &str, poll_interval_ms: u64) -> RemoteConfig {
            RemoteConfig {
                base_url: self.base_url.clone(),
                api_key: Some(api_key.to_string()),
                poll_interval_ms,
                request_timeout_ms: 2_000,
            }
        }
    }

    impl Drop for FakeDocumentService {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    async fn read_request(stream: &mut TcpStream) -> Option<Request> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.lines();
        let mut request_line = lines.next()?.split_whitespace();
        let method = request_line.next()?.to_string();
        let path = request_line.next()?.to_string();
        let mut content_length = 0usize;
        let mut authorization = None;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().ok()?,
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let mut body = buf[head_end..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        Some(Request {
            method,
            path,
            authorization,
            body,
        })
    }

    async fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
        let reason = match status {
            200 => "OK",
            401 => "Unauthorized",
            404 => "Not Found",
            _ => "Bad Request",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    }

    fn handle(collections: &Collections, created: &mut u32, request: Request) -> (u16, String) {
        let expected = format!("Bearer {API_KEY}");
        if request.authorization.as_deref() != Some(expected.as_str()) {
            return (401, "{}".to_string());
        }
        let Some(rest) = request.path.strip_prefix("/api/") else {
            return (404, "{}".to_string());
        };
        let segments: Vec<&str> = rest.split('/').collect();
        let fields = || serde_json::from_slice::<Fields>(&request.body).unwrap_or_default();

        let mut collections = collections.lock().unwrap();
        match (request.method.as_str(), segments.as_slice()) {
            ("GET", [name]) => {
                let documents = collections.get(*name).cloned().unwrap_or_default();
                (200, serde_json::to_string(&documents).unwrap())
            }
            ("POST", [name]) => {
                *created += 1;
                let id = format!("srv-{created}");
                collections
                    .entry(name.to_string())
                    .or_default()
                    .push(Document::new(id.clone(), fields()));
                (200, json!({ "id": id }).to_string())
            }
            ("PUT", [name, id]) => {
                let documents = collections.entry(name.to_string()).or_default();
                match documents.iter_mut().find(|d| d.id == *id) {
                    Some(existing) => existing.fields = fields(),
                    None => documents.push(Document::new(*id, fields())),
                }
                (200, "{}".to_string())
            }
            ("PATCH", [name, id]) => {
                let documents = collections.entry(name.to_string()).or_default();
                match documents.iter_mut().find(|d| d.id == *id) {
                    Some(existing) => {
                        existing.fields.extend(fields());
                        (200, "{}".to_string())
                    }
                    None => (404, "{}".to_string()),
                }
            }
            ("DELETE", [name, id]) => {
                let documents = collections.entry(name.to_string()).or_default();
                let before = documents.len();
                documents.retain(|d| d.id != *id);
                if documents.len() == before {
                    (404, "{}".to_string())
                } else {
                    (200, "{}".to_string())
                }
            }
            _ => (400, "{}".to_string()),
        }
    }

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    async fn next_push(rx: &mut mpsc::UnboundedReceiver<Vec<Document>>) -> Vec<Document> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no push within 2s")
            .expect("watcher stopped")
    }

    fn unreachable_config() -> RemoteConfig {
        RemoteConfig {
            // Port 9 (discard) on loopback is closed on test hosts.
            base_url: "http://127.0.0.1:9/api".to_string(),
            api_key: None,
            poll_interval_ms: 50,
            request_timeout_ms: 500,
        }
    }

    #[test]
    fn test_collection_urls() {
        let base = Url::parse("https://docs.example.com/v1/").unwrap();
        assert_eq!(
            collection_url(&base, Collection::Sectors, None).unwrap().as_str(),
            "https://docs.example.com/v1/sectors"
        );
        assert_eq!(
            collection_url(&base, Collection::Users, Some("a b/c"))
                .unwrap()
                .as_str(),
            "https://docs.example.com/v1/users/a%20b%2Fc"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let config = RemoteConfig::new("not a url");
        assert!(matches!(
            RemoteDocumentAdapter::new(&config),
            Err(TutoriaError::Config(_))
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::NOT_FOUND, Collection::Sectors, Some("1")).is_not_found());
        assert!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, Collection::Sectors, None)
                .is_backend_unavailable()
        );
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, Collection::Sectors, None),
            TutoriaError::DataAccess(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_backend_unavailable() {
        let adapter = RemoteDocumentAdapter::new(&unreachable_config()).unwrap();
        let err = adapter
            .create(Collection::Sectors, Fields::new())
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_subscribe_to_unreachable_store_fails() {
        let adapter = RemoteDocumentAdapter::new(&unreachable_config()).unwrap();
        let result = adapter
            .subscribe(Collection::Tutorials, Arc::new(|_, _| {}))
            .await;
        assert!(result.unwrap_err().is_backend_unavailable());
    }

    #[tokio::test]
    async fn test_writes_round_trip_through_document_service() {
        let service = FakeDocumentService::start().await;
        // A one-minute poll means every push below comes from a write wake-up
        let adapter = RemoteDocumentAdapter::new(&service.config(API_KEY, 60_000)).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = adapter
            .subscribe(
                Collection::Sectors,
                Arc::new(move |_, documents| {
                    let _ = tx.send(documents);
                }),
            )
            .await
            .unwrap();
        // The initial snapshot is delivered before subscribe returns
        assert!(rx.try_recv().unwrap().is_empty());

        let id = adapter
            .create(Collection::Sectors, fields(json!({ "name": "Produção" })))
            .await
            .unwrap();
        assert_eq!(id, "srv-1");
        let pushed = next_push(&mut rx).await;
        assert_eq!(pushed, vec![Document::new("srv-1", fields(json!({ "name": "Produção" })))]);

        // PATCH merges into the stored fields
        adapter
            .update(Collection::Sectors, &id, fields(json!({ "active": true })))
            .await
            .unwrap();
        let pushed = next_push(&mut rx).await;
        assert_eq!(pushed[0].fields, fields(json!({ "name": "Produção", "active": true })));

        // PUT replaces them
        let replacement = Document::new(id.clone(), fields(json!({ "name": "Logística" })));
        adapter.put(Collection::Sectors, replacement.clone()).await.unwrap();
        let pushed = next_push(&mut rx).await;
        assert_eq!(pushed, vec![replacement.clone()]);

        // Rewriting identical content wakes the watcher but pushes nothing
        adapter.put(Collection::Sectors, replacement).await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(300), rx.recv())
                .await
                .is_err()
        );

        let err = adapter
            .update(Collection::Sectors, "missing", fields(json!({ "name": "x" })))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err:?}");
        adapter.delete(Collection::Sectors, "missing").await.unwrap();

        adapter.delete(Collection::Sectors, &id).await.unwrap();
        assert!(next_push(&mut rx).await.is_empty());
        assert!(adapter.load(Collection::Sectors).await.unwrap().is_empty());

        // Unsubscribing stops the watcher, which drops the handler and its sender
        subscription.unsubscribe();
        let after = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(after, Ok(None)), "watcher still running: {after:?}");
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_data_access_errors() {
        let service = FakeDocumentService::start().await;
        let adapter = RemoteDocumentAdapter::new(&service.config("wrong", 50)).unwrap();

        let err = adapter.load(Collection::Users).await.unwrap_err();
        assert!(matches!(err, TutoriaError::DataAccess(_)), "unexpected error: {err:?}");
    }
}
