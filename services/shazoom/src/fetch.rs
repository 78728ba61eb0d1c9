//!
//! src/fetch.rs  Oct 16th, 2026
//!
//! Defines methods for hitting the identification service and the object
//! store. Request builders are exposed per endpoint; `HttpBackend` sends
//! them and maps failures into the error taxonomy
//!

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use reqwest::{Client, RequestBuilder, Response, header, multipart, redirect};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ApiConfig, HttpConfig, RetryConfig};
use crate::errors::ShazoomError;
use crate::types::{
    IdentificationResult, IdentifyResponse, UploadDestination, UploadReference,
    UploadTarget, UploadUrlResponse
};
use crate::upload::LocalFile;
use crate::workflow::IdentifyBackend;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

fn client_with_headers(http: &HttpConfig, headers: header::HeaderMap) ->
    Result<Client, ShazoomError> {
    client_helper(http)
        .default_headers(headers)
        .user_agent(concat!("shazoom/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ShazoomError::Config(format!("build client: {e}")))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, ShazoomError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_with_headers(http, h)
}

/// Object stores answer in xml, so no json accept header here
pub fn object_store_client(http: &HttpConfig) -> Result<Client, ShazoomError> {
    client_with_headers(http, header::HeaderMap::new())
}

/// Simple function to generate random wait for get_json_with_retry
fn generate_backoff(base: Duration, attempt: usize, jitter: bool, rng: &mut SmallRng) ->
    Duration {
    let exp = (1_u32 << attempt.min(6)) * base;
    if jitter {
        exp + Duration::from_millis(rng.gen_range(50..=200))
    } else {
        exp
    }
}

/// Condenses a failed response into one line for logs and errors
pub async fn status_error(resp: Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        format!("status {status}")
    } else {
        let snippet: String = body.chars().take(200).collect();
        format!("status {status}: {snippet}")
    }
}

///
/// GET with retries on transport errors and retryable statuses. Only for
/// idempotent requests.
///
pub async fn get_text_with_retry(
    request: RequestBuilder,
    retry: &RetryConfig
) -> Result<String, ShazoomError> {
    let mut rng = SmallRng::from_entropy();
    let max_retries = retry.max_attempts.saturating_sub(1) as usize;
    let mut attempt = 0_usize;
    loop {
        let response = request.try_clone()
            .ok_or_else(|| ShazoomError::Fetch("non-cloneable request".to_string()))?
            .send()
            .await;
        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    return Ok(resp.text().await?);
                }
                let status = resp.status();
                let retryable = retry.retryable_statuses.contains(&status.as_u16());
                if !retryable || attempt >= max_retries {
                    return Err(ShazoomError::Fetch(status_error(resp).await));
                }
                let backoff = generate_backoff(retry.base_backoff, attempt, retry.jitter, &mut rng);
                warn!(status = %status, backoff = ?backoff.as_millis(), "http.retry");
                sleep(backoff).await;
                attempt += 1;
            },
            Err(e) => {
                if attempt >= max_retries {
                    return Err(e.into());
                }
                let backoff = generate_backoff(retry.base_backoff, attempt, retry.jitter, &mut rng);
                warn!(error = %e, backoff = ?backoff.as_millis(), "http.retry.error");
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Malformed bodies are Parse errors and are never retried
pub async fn get_json_with_retry<T: DeserializeOwned>(
    request: RequestBuilder,
    retry: &RetryConfig
) -> Result<T, ShazoomError> {
    let body = get_text_with_retry(request, retry).await?;
    Ok( serde_json::from_str::<T>(&body)? )
}

#[derive(Clone, Debug)]
pub struct ShazoomClient {
    pub http: Client,
    pub base: Url,
    pub identify_timeout: Duration
}

impl ShazoomClient {
    pub fn new(http_config: &HttpConfig, cfg: &ApiConfig) -> Result<Self, ShazoomError> {
        let http = base_client(http_config)?;
        Ok( Self {
            http,
            base: cfg.base_url.clone(),
            identify_timeout: http_config.identify_timeout
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ShazoomError> {
        self.base.join(path)
            .map_err(|e| ShazoomError::Config(format!("join {path} onto {}: {e}", self.base)))
    }

    /// GET /find-song, wakes the backend up
    pub fn warmup(&self) -> Result<RequestBuilder, ShazoomError> {
        Ok( self.http.get(self.endpoint("find-song")?) )
    }

    /// GET /upload-url
    pub fn upload_url(&self) -> Result<RequestBuilder, ShazoomError> {
        Ok( self.http.get(self.endpoint("upload-url")?) )
    }

    /// POST /find-song {"fileKey": ...}
    pub fn find_song(&self, reference: &UploadReference) -> Result<RequestBuilder, ShazoomError> {
        let body = serde_json::json!({ "fileKey": reference.as_str() });
        Ok( self.http.post(self.endpoint("find-song")?)
            .timeout(self.identify_timeout)
            .json(&body) )
    }
}

#[derive(Clone, Debug)]
pub struct ObjectStoreClient {
    pub http: Client
}

impl ObjectStoreClient {
    pub fn new(http_config: &HttpConfig) -> Result<Self, ShazoomError> {
        Ok( Self { http: object_store_client(http_config)? } )
    }

    fn parse_url(url: &str) -> Result<Url, ShazoomError> {
        Url::parse(url).map_err(|e| ShazoomError::Upload(format!("bad upload url {url}: {e}")))
    }

    /// PUT {uploadUrl} with the raw file as body
    pub fn put(&self, url: &str, file: &LocalFile) -> Result<RequestBuilder, ShazoomError> {
        Ok( self.http.put(Self::parse_url(url)?)
            .header(header::CONTENT_TYPE, file.mime())
            .body(file.bytes().to_vec()) )
    }

    /// POST {uploadData.url} as multipart: issuer fields first, file last
    pub fn post(
        &self,
        url: &str,
        fields: &BTreeMap<String, String>,
        file: &LocalFile
    ) -> Result<RequestBuilder, ShazoomError> {
        let url = Self::parse_url(url)?;
        let form = fields.iter().fold(multipart::Form::new(), |form, (k, v)| {
            form.text(k.clone(), v.clone())
        });
        let part = multipart::Part::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime())
            .map_err(|e| ShazoomError::Upload(format!("mime {}: {e}", file.mime())))?;
        Ok( self.http.post(url).multipart(form.part("file", part)) )
    }
}

/// The real collaborators: identification api plus object store
#[derive(Clone, Debug)]
pub struct HttpBackend {
    pub api: ShazoomClient,
    pub store: ObjectStoreClient,
    pub retry: RetryConfig
}

impl HttpBackend {
    pub fn new(http_config: &HttpConfig, api: &ApiConfig) -> Result<Self, ShazoomError> {
        Ok( Self {
            api: ShazoomClient::new(http_config, api)?,
            store: ObjectStoreClient::new(http_config)?,
            retry: http_config.retry.clone()
        })
    }
}

#[async_trait]
impl IdentifyBackend for HttpBackend {
    async fn warm_up(&self) -> Result<(), ShazoomError> {
        get_text_with_retry(self.api.warmup()?, &self.retry).await?;
        info!("api.warmup.ok");
        Ok(())
    }

    async fn upload_destination(&self) -> Result<UploadDestination, ShazoomError> {
        let raw: UploadUrlResponse = get_json_with_retry(self.api.upload_url()?, &self.retry)
            .await
            .map_err(|e| ShazoomError::Upload(format!("upload url request: {e}")))?;
        let destination = UploadDestination::try_from(raw)?;
        debug!(file_key = %destination.reference, "upload.destination");
        Ok(destination)
    }

    async fn transmit(&self, target: &UploadTarget, file: &LocalFile) -> Result<(), ShazoomError> {
        let request = match target {
            UploadTarget::Put { url } => {
                info!(bytes = file.size(), mime = file.mime(), "upload.put");
                self.store.put(url, file)?
            },
            UploadTarget::Post { url, fields } => {
                info!(bytes = file.size(), fields = fields.len(), "upload.post");
                self.store.post(url, fields, file)?
            }
        };
        let resp = request.send().await
            .map_err(|e| ShazoomError::Upload(format!("transmit: {e}")))?;
        if !resp.status().is_success() {
            return Err(ShazoomError::Upload(status_error(resp).await));
        }
        Ok(())
    }

    async fn identify(&self, reference: &UploadReference) -> Result<IdentificationResult, ShazoomError> {
        let resp = self.api.find_song(reference)?
            .send()
            .await
            .map_err(|e| ShazoomError::Identification(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ShazoomError::Identification(status_error(resp).await));
        }
        let body = resp.text().await
            .map_err(|e| ShazoomError::Identification(e.to_string()))?;
        let raw: IdentifyResponse = serde_json::from_str(&body)
            .map_err(|e| ShazoomError::Identification(format!("malformed response: {e}")))?;
        Ok( IdentificationResult::from(raw) )
    }
}

/// Unit Tests
#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::config::{self, RETRY_MAX_ATTEMPTS};

    const RETRY_ATTEMPTS: usize = RETRY_MAX_ATTEMPTS as usize;

    fn live() -> bool {
        std::env::var("LIVE_HTTP").ok().as_deref() == Some("1")
    }

    fn api() -> ApiConfig {
        ApiConfig {
            base_url: Url::parse("https://api.example.com/prod/").unwrap(),
            warmup: false
        }
    }

    fn clip() -> LocalFile {
        LocalFile::new("clip.mp3", vec![1, 2, 3, 4])
    }

    #[test]
    fn endpoints_join_under_base() -> Result<(), ShazoomError> {
        let client = ShazoomClient::new(&HttpConfig::default(), &api())?;

        let warm = client.warmup()?.build()?;
        assert_eq!(warm.method(), reqwest::Method::GET);
        assert_eq!(warm.url().as_str(), "https://api.example.com/prod/find-song");

        let upload = client.upload_url()?.build()?;
        assert_eq!(upload.url().path(), "/prod/upload-url");
        Ok(())
    }

    #[test]
    fn find_song_posts_file_key() -> Result<(), ShazoomError> {
        let client = ShazoomClient::new(&HttpConfig::default(), &api())?;
        let req = client.find_song(&UploadReference("clips/Menina_10secs.mp3".into()))?.build()?;

        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(
            req.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        let body = req.body().and_then(|b| b.as_bytes()).expect("buffered body");
        let json: serde_json::Value = serde_json::from_slice(body)?;
        assert_eq!(json["fileKey"], "clips/Menina_10secs.mp3");
        assert_eq!(req.timeout(), Some(&HttpConfig::default().identify_timeout));
        Ok(())
    }

    #[test]
    fn put_carries_mime_and_bytes() -> Result<(), ShazoomError> {
        let store = ObjectStoreClient::new(&HttpConfig::default())?;
        let req = store.put("https://bucket.s3.amazonaws.com/up/clip.mp3?X-Amz-Signature=1", &clip())?
            .build()?;

        assert_eq!(req.method(), reqwest::Method::PUT);
        assert_eq!(
            req.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("audio/mpeg")
        );
        assert_eq!(req.body().and_then(|b| b.as_bytes()), Some(&[1_u8, 2, 3, 4][..]));
        Ok(())
    }

    #[test]
    fn post_is_multipart() -> Result<(), ShazoomError> {
        let store = ObjectStoreClient::new(&HttpConfig::default())?;
        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), "uploads/clip.mp3".to_string());
        fields.insert("policy".to_string(), "abc".to_string());

        let req = store.post("https://bucket.s3.amazonaws.com/", &fields, &clip())?.build()?;
        assert_eq!(req.method(), reqwest::Method::POST);
        let content_type = req.headers().get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        Ok(())
    }

    #[test]
    fn bad_upload_url_is_upload_error() -> Result<(), ShazoomError> {
        let store = ObjectStoreClient::new(&HttpConfig::default())?;
        assert!(matches!(store.put("not a url", &clip()), Err(ShazoomError::Upload(_))));
        Ok(())
    }

    #[test]
    fn backoff_grows() {
        let mut rng = SmallRng::seed_from_u64(7);
        let base = Duration::from_millis(100);
        assert_eq!(generate_backoff(base, 0, false, &mut rng), Duration::from_millis(100));
        assert_eq!(generate_backoff(base, 3, false, &mut rng), Duration::from_millis(800));
        let jittered = generate_backoff(base, 1, true, &mut rng);
        assert!(jittered >= Duration::from_millis(250) && jittered <= Duration::from_millis(400));
    }

    /// Local stand-in for the api and the bucket
    async fn bind() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let base = Url::parse(&format!("http://{addr}/prod/")).expect("base url");
        (listener, base)
    }

    /// Answers one connection per canned response, in order. Returns the
    /// request lines seen so far.
    fn serve(listener: TcpListener, responses: Vec<(u16, String)>) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                let line = read_request(&mut socket).await;
                log.lock().unwrap().push(line);
                let reply = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        seen
    }

    /// Drains headers and a content-length body, returns the request line
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 4096];
        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return String::new(),
                Ok(n) => buf.extend_from_slice(&chunk[..n])
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let length = head.lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n])
            }
        }
        head.lines().next().unwrap_or_default().to_string()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            base_backoff: Duration::from_millis(1),
            jitter: false,
            ..RetryConfig::default()
        }
    }

    fn local_backend(base: &Url) -> Result<HttpBackend, ShazoomError> {
        let http = HttpConfig { retry: fast_retry(), ..HttpConfig::default() };
        HttpBackend::new(&http, &ApiConfig { base_url: base.clone(), warmup: false })
    }

    fn canned(status: u16, body: &str) -> (u16, String) {
        (status, body.to_string())
    }

    #[tokio::test]
    async fn retries_unavailable_then_succeeds() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        let seen = serve(listener, vec![canned(503, ""), canned(200, "warm")]);

        let client = base_client(&HttpConfig::default())?;
        let body = get_text_with_retry(client.get(base.join("find-song").expect("join")), &fast_retry())
            .await?;
        assert_eq!(body, "warm");
        assert_eq!(seen.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn not_found_is_not_retried() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        let seen = serve(listener, vec![canned(404, "missing"), canned(200, "late")]);

        let client = base_client(&HttpConfig::default())?;
        let result = get_text_with_retry(client.get(base.clone()), &fast_retry()).await;
        match result {
            Err(ShazoomError::Fetch(msg)) => assert!(msg.contains("404"), "{msg}"),
            other => panic!("expected fetch error, got {other:?}")
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn retries_stop_at_max_attempts() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        let seen = serve(listener, vec![canned(503, ""); 4]);

        let client = base_client(&HttpConfig::default())?;
        let result = get_text_with_retry(client.get(base.clone()), &fast_retry()).await;
        assert!(matches!(result, Err(ShazoomError::Fetch(ref m)) if m.contains("503")));
        assert_eq!(seen.lock().unwrap().len(), RETRY_ATTEMPTS);
        Ok(())
    }

    #[tokio::test]
    async fn identify_server_error_is_identification_error() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        let seen = serve(listener, vec![canned(500, "boom")]);

        let backend = local_backend(&base)?;
        let result = backend.identify(&UploadReference("uploads/a.mp3".into())).await;
        match result {
            Err(ShazoomError::Identification(msg)) => assert!(msg.contains("500"), "{msg}"),
            other => panic!("expected identification error, got {other:?}")
        }
        assert_eq!(seen.lock().unwrap().as_slice(), ["POST /prod/find-song HTTP/1.1"]);
        Ok(())
    }

    #[tokio::test]
    async fn identify_malformed_body_is_identification_error() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        serve(listener, vec![canned(200, "<html>gateway</html>")]);

        let backend = local_backend(&base)?;
        let result = backend.identify(&UploadReference("uploads/a.mp3".into())).await;
        assert!(matches!(result, Err(ShazoomError::Identification(ref m)) if m.contains("malformed")));
        Ok(())
    }

    #[tokio::test]
    async fn identify_maps_response() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        serve(listener, vec![canned(
            200,
            r#"{"track_metadata":{"title":"Menina","artist":"Mc Rogerinho"},"confidence":0.81}"#
        )]);

        let backend = local_backend(&base)?;
        let result = backend.identify(&UploadReference("clips/Menina_10secs.mp3".into())).await?;
        assert_eq!(result.confidence_percent, 81);
        assert_eq!(result.matched_track.map(|t| t.title), Some("Menina".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn forbidden_upload_url_is_upload_error() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        let seen = serve(listener, vec![canned(403, "denied"), canned(200, "{}")]);

        let backend = local_backend(&base)?;
        let result = backend.upload_destination().await;
        assert!(matches!(result, Err(ShazoomError::Upload(ref m)) if m.contains("403")));
        assert_eq!(seen.lock().unwrap().as_slice(), ["GET /prod/upload-url HTTP/1.1"]);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_transmit_is_upload_error() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        let seen = serve(listener, vec![canned(403, "SignatureDoesNotMatch")]);

        let backend = local_backend(&base)?;
        let target = UploadTarget::Put { url: format!("{base}bucket/a.mp3") };
        let result = backend.transmit(&target, &clip()).await;
        assert!(matches!(result, Err(ShazoomError::Upload(ref m)) if m.contains("403")));
        assert_eq!(seen.lock().unwrap().as_slice(), ["PUT /prod/bucket/a.mp3 HTTP/1.1"]);
        Ok(())
    }

    #[tokio::test]
    async fn destination_then_put_round_trip() -> Result<(), ShazoomError> {
        let (listener, base) = bind().await;
        let issued = format!(r#"{{"fileKey":"uploads/a.mp3","uploadUrl":"{base}bucket/a.mp3"}}"#);
        let seen = serve(listener, vec![(200, issued), canned(200, "")]);

        let backend = local_backend(&base)?;
        let destination = backend.upload_destination().await?;
        assert_eq!(destination.reference.as_str(), "uploads/a.mp3");
        backend.transmit(&destination.target, &clip()).await?;

        assert_eq!(seen.lock().unwrap().as_slice(), [
            "GET /prod/upload-url HTTP/1.1",
            "PUT /prod/bucket/a.mp3 HTTP/1.1"
        ]);
        Ok(())
    }

    #[tokio::test]
    #[allow(dead_code)]
    async fn live_warmup_and_sample_testbench() -> Result<(), ShazoomError> {
        dotenvy::dotenv().ok();

        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = config::load_config()?;
        let backend = HttpBackend::new(&cfgs.http, &cfgs.api)?;
        backend.warm_up().await?;

        let result = backend.identify(&UploadReference("clips/Menina_10secs.mp3".into())).await?;
        println!("result: {}", serde_json::to_string_pretty(&result)?);
        Ok(())
    }
}
