//! WebDAV implementation of [`RemoteStore`] over reqwest.
//!
//! Speaks the small subset of RFC 4918 the engine needs: PROPFIND for
//! stat/list, PUT for upload, GET for download, MKCOL for directories and
//! DELETE for removal. Multistatus responses are parsed with quick-xml.

use crate::config::RemoteConfig;
use crate::remote::{join_remote, parent_remote, FileKind, FileStat, RemoteStore};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Method, StatusCode};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:resourcetype/>
    <D:getcontentlength/>
    <D:getlastmodified/>
  </D:prop>
</D:propfind>"#;

/// WebDAV client bound to a server URL and base path.
pub struct WebDavStore {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
    base_path: String,
}

impl WebDavStore {
    /// Connect to the server described by `config` and verify the session
    /// with a shallow listing of the base path. Any failure here is a
    /// [`EngineError::Connection`]; nothing else about the run has started.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::Connection(format!("failed to build client: {e}")))?;

        let store = Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            base_path: config.base_path.clone(),
        };

        // Verifying round-trip before reporting success.
        store
            .propfind("", "1")
            .await
            .map_err(|e| EngineError::Connection(format!("{}: {e}", store.url)))?;

        debug!(url = %store.url, base_path = %store.base_path, "WebDAV session verified");
        Ok(store)
    }

    /// Server-absolute, percent-encoded URL for a store-relative path.
    fn full_url(&self, remote_path: &str) -> String {
        let full = join_remote(&self.base_path, remote_path);
        let encoded: Vec<String> = full
            .split('/')
            .map(|seg| utf8_percent_encode(seg, PATH_SEGMENT_ENCODE_SET).to_string())
            .collect();
        format!("{}{}", self.url, encoded.join("/"))
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn propfind(&self, remote_path: &str, depth: &str) -> Result<String> {
        let method = Method::from_bytes(b"PROPFIND").expect("static method token");
        let url = self.full_url(remote_path);

        let resp = self
            .request(method, &url)
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(EngineError::NotFound(remote_path.to_string())),
            s if s.is_success() || s == StatusCode::MULTI_STATUS => Ok(resp.text().await?),
            s => Err(EngineError::Remote(format!(
                "PROPFIND {remote_path} returned {s}"
            ))),
        }
    }

    /// Ensure a remote directory exists, creating missing ancestors
    /// bottom-up: check the directory, recurse to its parent first if
    /// absent, then MKCOL.
    async fn ensure_directory(&self, remote_dir: &str) -> Result<()> {
        let trimmed = remote_dir.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(());
        }

        match self.propfind(trimmed, "0").await {
            Ok(_) => return Ok(()),
            Err(EngineError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        if let Some(parent) = parent_remote(trimmed) {
            Box::pin(self.ensure_directory(parent)).await?;
        }

        let url = self.full_url(trimmed);
        let method = Method::from_bytes(b"MKCOL").expect("static method token");
        let resp = self.request(method, &url).send().await?;

        match resp.status() {
            s if s.is_success() => {
                debug!(path = %trimmed, "Created remote directory");
                Ok(())
            }
            // Lost a race with another writer; the directory is there.
            StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            s => Err(EngineError::Remote(format!("MKCOL {trimmed} returned {s}"))),
        }
    }
}

#[async_trait]
impl RemoteStore for WebDavStore {
    async fn exists(&self, remote_path: &str) -> Result<bool> {
        match self.propfind(remote_path, "0").await {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn upload(&self, remote_path: &str, local_path: &Path, overwrite: bool) -> Result<()> {
        if let Some(parent) = parent_remote(remote_path) {
            self.ensure_directory(parent).await?;
        }

        if !overwrite && self.exists(remote_path).await? {
            return Err(EngineError::AlreadyExists(remote_path.to_string()));
        }

        let file = tokio::fs::File::open(local_path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let url = self.full_url(remote_path);
        let resp = self.request(Method::PUT, &url).body(body).send().await?;

        if !resp.status().is_success() {
            return Err(EngineError::Remote(format!(
                "PUT {remote_path} returned {}",
                resp.status()
            )));
        }

        debug!(path = %remote_path, "Uploaded");
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let url = self.full_url(remote_path);
        let resp = self.request(Method::GET, &url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                return Err(EngineError::NotFound(remote_path.to_string()));
            }
            s if !s.is_success() => {
                return Err(EngineError::Remote(format!(
                    "GET {remote_path} returned {s}"
                )));
            }
            _ => {}
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(local_path).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        debug!(path = %remote_path, local = %local_path.display(), "Downloaded");
        Ok(())
    }

    async fn list(&self, remote_path: &str, deep: bool) -> Result<Vec<FileStat>> {
        let depth = if deep { "infinity" } else { "1" };
        let xml = self.propfind(remote_path, depth).await?;

        let self_path = join_remote(&self.base_path, remote_path);
        parse_multistatus(&xml, &self_path)
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        let url = self.full_url(remote_path);
        let resp = self.request(Method::DELETE, &url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(EngineError::NotFound(remote_path.to_string())),
            s if s.is_success() => Ok(()),
            s => Err(EngineError::Remote(format!(
                "DELETE {remote_path} returned {s}"
            ))),
        }
    }
}

/// Parse a 207 multistatus body into [`FileStat`]s, dropping the entry that
/// describes the listed collection itself.
fn parse_multistatus(xml: &str, self_path: &str) -> Result<Vec<FileStat>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stats = Vec::new();

    let mut href = String::new();
    let mut size = 0u64;
    let mut lastmod = Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now);
    let mut is_dir = false;
    let mut in_response = false;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => {
                    in_response = true;
                    href.clear();
                    size = 0;
                    lastmod = Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now);
                    is_dir = false;
                }
                b"href" if in_response => field = Some("href"),
                b"getcontentlength" if in_response => field = Some("size"),
                b"getlastmodified" if in_response => field = Some("lastmod"),
                b"collection" if in_response => is_dir = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_response && e.local_name().as_ref() == b"collection" {
                    is_dir = true;
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(f) = field {
                    let text = t
                        .unescape()
                        .map_err(|e| EngineError::Remote(format!("bad multistatus text: {e}")))?
                        .to_string();
                    match f {
                        "href" => href = text,
                        "size" => size = text.trim().parse().unwrap_or(0),
                        "lastmod" => lastmod = parse_http_date(text.trim()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    in_response = false;
                    let decoded = percent_decode_str(&href).decode_utf8_lossy().to_string();
                    let path = decoded.trim_end_matches('/');

                    // Skip the collection entry for the request path itself.
                    if path != self_path.trim_end_matches('/') {
                        if let Some(basename) = path.rsplit('/').next() {
                            if !basename.is_empty() {
                                stats.push(FileStat {
                                    basename: basename.to_string(),
                                    lastmod,
                                    size,
                                    kind: if is_dir {
                                        FileKind::Directory
                                    } else {
                                        FileKind::File
                                    },
                                });
                            }
                        }
                    }
                }
                b"href" | b"getcontentlength" | b"getlastmodified" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EngineError::Remote(format!("bad multistatus XML: {e}")));
            }
            _ => {}
        }
    }

    Ok(stats)
}

/// Parse the RFC 1123 dates WebDAV servers return for `getlastmodified`.
fn parse_http_date(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(text)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/backups/snapshots/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/></D:resourcetype>
        <D:getlastmodified>Mon, 12 Jan 2026 10:00:00 GMT</D:getlastmodified>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/backups/snapshots/full_2026-01-11_03-00-00-000Z.json</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype/>
        <D:getcontentlength>2048</D:getcontentlength>
        <D:getlastmodified>Sun, 11 Jan 2026 03:00:01 GMT</D:getlastmodified>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/backups/snapshots/archive%20old/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/></D:resourcetype>
        <D:getlastmodified>Sat, 10 Jan 2026 00:00:00 GMT</D:getlastmodified>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn test_parse_multistatus_skips_self() {
        let stats = parse_multistatus(SAMPLE, "/backups/snapshots").unwrap();
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn test_parse_multistatus_fields() {
        let stats = parse_multistatus(SAMPLE, "/backups/snapshots").unwrap();

        let file = &stats[0];
        assert_eq!(file.basename, "full_2026-01-11_03-00-00-000Z.json");
        assert_eq!(file.size, 2048);
        assert_eq!(file.kind, FileKind::File);
        assert_eq!(
            file.lastmod,
            Utc.with_ymd_and_hms(2026, 1, 11, 3, 0, 1).unwrap()
        );

        let dir = &stats[1];
        assert_eq!(dir.basename, "archive old");
        assert_eq!(dir.kind, FileKind::Directory);
    }

    #[test]
    fn test_parse_http_date_fallback() {
        assert_eq!(
            parse_http_date("not a date"),
            Utc.timestamp_opt(0, 0).single().unwrap()
        );
    }
}
