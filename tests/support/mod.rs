//! Shared fixtures for the integration tests.
//!
//! * [`InMemoryBridge`] — a fake remote store with a call log and per-op
//!   failure injection.
//! * [`ScriptedOracle`] — replies with a fixed answer and records payloads.
//! * [`ArxivStub`] — a minimal local HTTP server standing in for the arXiv
//!   API and PDF endpoints.

#![allow(dead_code)]

use async_trait::async_trait;
use papershelf::{
    BridgeError, BridgeErrorKind, BridgeOp, ClassificationOracle, Classifier, EntryKind, Listing,
    ListingEntry, OracleError, RemoteBridge,
};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Smallest byte string the downloader accepts as a PDF.
pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n% papershelf test fixture\n%%EOF\n";

// ── In-memory bridge ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Store {
    /// Directory path → children.
    dirs: BTreeMap<String, Vec<ListingEntry>>,
    calls: Vec<String>,
    failures: HashMap<BridgeOp, BridgeErrorKind>,
}

/// Fake remote store. The root `/` always exists.
#[derive(Clone)]
pub struct InMemoryBridge {
    store: Arc<Mutex<Store>>,
}

impl Default for InMemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBridge {
    pub fn new() -> Self {
        let mut store = Store::default();
        store.dirs.insert("/".to_string(), Vec::new());
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Create `path` and any missing parents.
    pub fn with_dir(self, path: &str) -> Self {
        {
            let mut store = self.store.lock().unwrap();
            let mut parent = String::from("/");
            for part in path.split('/').filter(|p| !p.is_empty()) {
                let full = join(&parent, part);
                if !store.dirs.contains_key(&full) {
                    add_entry(&mut store, &parent, part, EntryKind::Directory);
                    store.dirs.insert(full.clone(), Vec::new());
                }
                parent = full;
            }
        }
        self
    }

    /// Put a document named `name` into the existing directory `dir`.
    pub fn with_document(self, dir: &str, name: &str) -> Self {
        {
            let mut store = self.store.lock().unwrap();
            add_entry(&mut store, dir, name, EntryKind::Document);
        }
        self
    }

    /// Make every call of `op` fail with `kind`.
    pub fn failing(self, op: BridgeOp, kind: BridgeErrorKind) -> Self {
        self.store.lock().unwrap().failures.insert(op, kind);
        self
    }

    /// Commands issued so far, e.g. `["ls /", "mkdir /papers"]`.
    pub fn calls(&self) -> Vec<String> {
        self.store.lock().unwrap().calls.clone()
    }

    /// Commands issued for one operation.
    pub fn calls_of(&self, op: BridgeOp) -> Vec<String> {
        let prefix = format!("{} ", op.command());
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.store.lock().unwrap().dirs.contains_key(path)
    }

    /// Names of the documents in `dir`.
    pub fn documents(&self, dir: &str) -> Vec<String> {
        self.store
            .lock()
            .unwrap()
            .dirs
            .get(dir)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.kind == EntryKind::Document)
                    .map(|e| e.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn begin(&self, op: BridgeOp, path: &str, line: String) -> Result<(), BridgeError> {
        let mut store = self.store.lock().unwrap();
        store.calls.push(line);
        match store.failures.get(&op) {
            Some(kind) => Err(BridgeError::new(*kind, op, path, "injected failure")),
            None => Ok(()),
        }
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn split(path: &str) -> (String, String) {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(i) => (path[..i].to_string(), path[i + 1..].to_string()),
        None => ("/".to_string(), path.to_string()),
    }
}

fn add_entry(store: &mut Store, dir: &str, name: &str, kind: EntryKind) {
    if let Some(children) = store.dirs.get_mut(dir) {
        children.push(ListingEntry {
            name: name.to_string(),
            kind,
        });
    }
}

fn has_entry(store: &Store, dir: &str, name: &str) -> bool {
    store
        .dirs
        .get(dir)
        .is_some_and(|children| children.iter().any(|e| e.name == name))
}

/// rmapi refuses to overwrite an existing entry on put and mv.
fn already_exists(op: BridgeOp, path: &str) -> BridgeError {
    BridgeError::new(BridgeErrorKind::RemoteRejected, op, path, "entry already exists")
}

fn not_found(op: BridgeOp, path: &str) -> BridgeError {
    BridgeError::new(BridgeErrorKind::NotFound, op, path, "no such entry")
}

#[async_trait]
impl RemoteBridge for InMemoryBridge {
    async fn list(&self, path: &str) -> Result<Listing, BridgeError> {
        self.begin(BridgeOp::List, path, format!("ls {path}"))?;
        let store = self.store.lock().unwrap();
        store
            .dirs
            .get(path)
            .map(|entries| Listing::from_entries(entries.clone()))
            .ok_or_else(|| not_found(BridgeOp::List, path))
    }

    async fn make_dir(&self, path: &str) -> Result<(), BridgeError> {
        self.begin(BridgeOp::MakeDir, path, format!("mkdir {path}"))?;
        let mut store = self.store.lock().unwrap();
        let (parent, name) = split(path);
        if !store.dirs.contains_key(&parent) {
            return Err(not_found(BridgeOp::MakeDir, path));
        }
        if store.dirs.contains_key(path) {
            return Err(BridgeError::new(
                BridgeErrorKind::RemoteRejected,
                BridgeOp::MakeDir,
                path,
                "entry already exists",
            ));
        }
        add_entry(&mut store, &parent, &name, EntryKind::Directory);
        store.dirs.insert(path.to_string(), Vec::new());
        Ok(())
    }

    async fn put(&self, local: &Path, remote_dir: &str) -> Result<(), BridgeError> {
        let name = local
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.begin(
            BridgeOp::Put,
            remote_dir,
            format!("put {} {}", name, remote_dir),
        )?;
        let mut store = self.store.lock().unwrap();
        if !store.dirs.contains_key(remote_dir) {
            return Err(not_found(BridgeOp::Put, remote_dir));
        }
        if has_entry(&store, remote_dir, &name) {
            return Err(already_exists(BridgeOp::Put, remote_dir));
        }
        add_entry(&mut store, remote_dir, &name, EntryKind::Document);
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), BridgeError> {
        self.begin(BridgeOp::Move, src, format!("mv {src} {dst}"))?;
        let mut store = self.store.lock().unwrap();
        let (src_dir, src_name) = split(src);
        let (dst_dir, dst_name) = split(dst);
        if has_entry(&store, &dst_dir, &dst_name) {
            return Err(already_exists(BridgeOp::Move, dst));
        }

        let entry = store
            .dirs
            .get_mut(&src_dir)
            .and_then(|children| {
                let pos = children.iter().position(|e| e.name == src_name)?;
                Some(children.remove(pos))
            })
            .ok_or_else(|| not_found(BridgeOp::Move, src))?;

        add_entry(&mut store, &dst_dir, &dst_name, entry.kind);
        Ok(())
    }
}

// ── Scripted oracle ──────────────────────────────────────────────────────────

/// Oracle with a canned reply.
pub struct ScriptedOracle {
    reply: Result<String, OracleError>,
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedOracle {
    pub fn answering(category: &str, title: &str) -> Arc<Self> {
        Self::raw(Ok(format!(
            r#"{{"classification": "{category}", "title": "{title}"}}"#
        )))
    }

    pub fn failing(error: OracleError) -> Arc<Self> {
        Self::raw(Err(error))
    }

    pub fn raw(reply: Result<String, OracleError>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

#[async_trait]
impl ClassificationOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str, document: &[u8]) -> Result<String, OracleError> {
        self.payloads.lock().unwrap().push(document.to_vec());
        self.reply.clone()
    }
}

/// Classifier backed by `oracle`, without pdfium.
pub fn classifier(oracle: &Arc<ScriptedOracle>) -> Classifier {
    Classifier::new(
        Ok(Arc::clone(oracle) as Arc<dyn ClassificationOracle>),
        Some(PathBuf::from("/nonexistent/libpdfium.so")),
    )
}

// ── Local files ──────────────────────────────────────────────────────────────

/// Write a fake PDF named `name` into `dir` and return its path.
pub fn write_pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, FAKE_PDF).unwrap();
    path
}

// ── arXiv stub server ────────────────────────────────────────────────────────

/// Atom feed for one paper.
pub fn atom_feed(id: &str, title: &str, primary_category: Option<&str>) -> String {
    let category = primary_category
        .map(|term| {
            format!(
                r#"<arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="{term}" scheme="http://arxiv.org/schemas/atom"/>"#
            )
        })
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: id_list={id}</title>
  <entry>
    <id>http://arxiv.org/abs/{id}v1</id>
    <title>{title}</title>
    {category}
  </entry>
</feed>"#
    )
}

/// Atom feed arXiv returns when it has no paper for the query.
pub const EMPTY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>ArXiv Query</title></feed>"#;

/// Minimal HTTP/1.1 server: `GET /api/query?…` returns `feed`, `GET /pdf/…`
/// returns `pdf` (or 404 when `None`).
pub struct ArxivStub {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ArxivStub {
    pub async fn start(feed: String, pdf: Option<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let feed = feed.clone();
                let pdf = pdf.clone();
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).into_owned();
                    let target = head
                        .lines()
                        .next()
                        .and_then(|l| l.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    log.lock().unwrap().push(target.clone());

                    let (status, content_type, body) = if target.starts_with("/api/query") {
                        ("200 OK", "application/atom+xml", feed.into_bytes())
                    } else if target.starts_with("/pdf/") {
                        match pdf {
                            Some(bytes) => ("200 OK", "application/pdf", bytes),
                            None => ("404 Not Found", "text/plain", b"not found".to_vec()),
                        }
                    } else {
                        ("404 Not Found", "text/plain", b"not found".to_vec())
                    };

                    let header = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn metadata_base_url(&self) -> String {
        format!("http://{}/api/query", self.addr)
    }

    pub fn document_base_url(&self) -> String {
        format!("http://{}/pdf", self.addr)
    }

    /// Request targets received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}
