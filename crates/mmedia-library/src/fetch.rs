//! Transport seam for the catalog loader.
//!
//! The loader only needs two things from the outside world: the catalog
//! document body and the artwork bytes for each entry.  [`HttpFetcher`] serves
//! both over HTTP(S) with reqwest and reads `file://` locators from disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use mmedia_proto::model::Artwork;
use reqwest::Client;

const USER_AGENT: &str = concat!("mmedia/", env!("CARGO_PKG_VERSION"));

/// Errors from fetching the catalog document or an artwork locator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Reading a `file://` locator failed.
    #[error("failed to read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    /// The artwork locator answered with something other than an image.
    #[error("{url} is {content_type}, not an image")]
    NotAnImage { url: String, content_type: String },
}

pub trait CatalogFetcher: Send + Sync + 'static {
    /// Body of the catalog document at `url`.
    fn fetch_document<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;

    /// Artwork at `url`.
    fn fetch_artwork<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Artwork, FetchError>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response, FetchError> {
        let response = self.client.get(url).header("Accept", accept).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

/// Filesystem path behind a `file://` locator, `None` for any other scheme.
fn local_path(url: &str) -> Result<Option<PathBuf>, FetchError> {
    if !url.starts_with("file:") {
        return Ok(None);
    }
    let parsed =
        reqwest::Url::parse(url).map_err(|_| FetchError::InvalidLocator(url.to_string()))?;
    parsed
        .to_file_path()
        .map(Some)
        .map_err(|_| FetchError::InvalidLocator(url.to_string()))
}

async fn read_file(path: PathBuf) -> Result<Vec<u8>, FetchError> {
    tokio::fs::read(&path)
        .await
        .map_err(|source| FetchError::File { path, source })
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

fn is_image(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

impl CatalogFetcher for HttpFetcher {
    fn fetch_document<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            if let Some(path) = local_path(url)? {
                let bytes = read_file(path).await?;
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            let response = self.get(url, "application/json").await?;
            Ok(response.text().await?)
        })
    }

    fn fetch_artwork<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Artwork, FetchError>> {
        Box::pin(async move {
            if let Some(path) = local_path(url)? {
                let content_type = content_type_for(&path).to_string();
                let bytes = read_file(path).await?;
                return Ok(Artwork::Image {
                    bytes: Arc::from(bytes),
                    content_type,
                });
            }

            let response = self.get(url, "image/*").await?;
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if !is_image(&content_type) {
                return Err(FetchError::NotAnImage {
                    url: url.to_string(),
                    content_type,
                });
            }
            let bytes = response.bytes().await?;
            Ok(Artwork::Image {
                bytes: Arc::from(bytes.as_ref()),
                content_type,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_path_only_for_file_scheme() {
        assert!(local_path("https://h/cat/list.json").unwrap().is_none());
        let path = local_path("file:///tmp/cat/list.json").unwrap().unwrap();
        assert!(path.ends_with("cat/list.json"));
    }

    #[tokio::test]
    async fn test_reads_file_locators() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("catalog.json");
        let art = dir.path().join("cover.PNG");
        std::fs::write(&doc, r#"{"music":[]}"#).unwrap();
        std::fs::write(&art, [0x89, b'P', b'N', b'G']).unwrap();

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let doc_url = reqwest::Url::from_file_path(&doc).unwrap();
        let body = fetcher.fetch_document(doc_url.as_str()).await.unwrap();
        assert_eq!(body, r#"{"music":[]}"#);

        let art_url = reqwest::Url::from_file_path(&art).unwrap();
        match fetcher.fetch_artwork(art_url.as_str()).await.unwrap() {
            Artwork::Image {
                bytes,
                content_type,
            } => {
                assert_eq!(bytes.len(), 4);
                assert_eq!(content_type, "image/png");
            }
            Artwork::Placeholder => panic!("expected image bytes"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = reqwest::Url::from_file_path(dir.path().join("nope.png")).unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch_artwork(url.as_str()).await.unwrap_err();
        assert!(matches!(err, FetchError::File { .. }));
    }

    /// One-shot HTTP server answering every request with `content_type` and
    /// `body`.  Returns the base URL.
    async fn serve_once(content_type: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request).await.unwrap();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                content_type,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/art/cover.jpg", addr)
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("image/png"));
        assert!(is_image("Image/JPEG; charset=binary"));
        assert!(!is_image("text/html; charset=utf-8"));
        assert!(!is_image(""));
    }

    fn direct_fetcher() -> HttpFetcher {
        HttpFetcher {
            client: Client::builder().no_proxy().build().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_html_artwork_is_rejected() {
        let url = serve_once("text/html", "<html>not found</html>").await;
        let fetcher = direct_fetcher();
        match fetcher.fetch_artwork(&url).await {
            Err(FetchError::NotAnImage { content_type, .. }) => {
                assert_eq!(content_type, "text/html")
            }
            other => panic!("expected NotAnImage, got {:?}", other.map(|a| a.is_placeholder())),
        }
    }

    #[tokio::test]
    async fn test_image_artwork_over_http() {
        let url = serve_once("image/jpeg", "JFIF").await;
        let fetcher = direct_fetcher();
        match fetcher.fetch_artwork(&url).await.unwrap() {
            Artwork::Image {
                bytes,
                content_type,
            } => {
                assert_eq!(&bytes[..], b"JFIF");
                assert_eq!(content_type, "image/jpeg");
            }
            Artwork::Placeholder => panic!("expected image bytes"),
        }
    }
}
