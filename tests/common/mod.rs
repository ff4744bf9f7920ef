//! Shared fixtures: generated glTF models and a throwaway HTTP server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use huitong_thumbs::catalog::MemoryCatalog;
use huitong_thumbs::config::PipelineSettings;
use huitong_thumbs::loader::AssetLoader;
use huitong_thumbs::storage::{MemoryObjectStore, ObjectStore};
use huitong_thumbs::{ThumbnailPipeline, ThumbnailService};

const CUBE_INDICES: [u16; 36] = [
    0, 1, 3, 0, 3, 2, // -z
    4, 6, 7, 4, 7, 5, // +z
    0, 4, 5, 0, 5, 1, // -y
    2, 3, 7, 2, 7, 6, // +y
    0, 2, 6, 0, 6, 4, // -x
    1, 5, 7, 1, 7, 3, // +x
];

/// Positions and indices of an axis-aligned cube, packed as one buffer.
fn cube_buffer(center: [f32; 3], half: f32) -> (Vec<u8>, [f32; 3], [f32; 3]) {
    let mut bytes = Vec::with_capacity(168);
    for i in 0..8u32 {
        for (axis, c) in center.iter().enumerate() {
            let sign = if i & (1 << axis) != 0 { 1.0 } else { -1.0 };
            bytes.extend_from_slice(&(c + sign * half).to_le_bytes());
        }
    }
    for index in CUBE_INDICES {
        bytes.extend_from_slice(&index.to_le_bytes());
    }
    let min = center.map(|c| c - half);
    let max = center.map(|c| c + half);
    (bytes, min, max)
}

fn cube_document(buffer_len: usize, buffer_uri: Option<&str>, min: [f32; 3], max: [f32; 3]) -> String {
    let buffer = match buffer_uri {
        Some(uri) => format!(r#"{{"byteLength": {buffer_len}, "uri": "{uri}"}}"#),
        None => format!(r#"{{"byteLength": {buffer_len}}}"#),
    };
    format!(
        r#"{{
            "asset": {{"version": "2.0"}},
            "scene": 0,
            "scenes": [{{"nodes": [0]}}],
            "nodes": [{{"mesh": 0}}],
            "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1}}]}}],
            "buffers": [{buffer}],
            "bufferViews": [
                {{"buffer": 0, "byteOffset": 0, "byteLength": 96}},
                {{"buffer": 0, "byteOffset": 96, "byteLength": 72}}
            ],
            "accessors": [
                {{"bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3",
                  "min": [{}, {}, {}], "max": [{}, {}, {}]}},
                {{"bufferView": 1, "componentType": 5123, "count": 36, "type": "SCALAR"}}
            ]
        }}"#,
        min[0], min[1], min[2], max[0], max[1], max[2]
    )
}

/// A binary glTF holding a single cube.
pub fn cube_glb(center: [f32; 3], half: f32) -> Vec<u8> {
    let (bin, min, max) = cube_buffer(center, half);
    let mut json = cube_document(bin.len(), None, min, max).into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}

/// A JSON glTF whose cube buffer lives in a sibling file named `bin_uri`.
pub fn cube_gltf_external(center: [f32; 3], half: f32, bin_uri: &str) -> (String, Vec<u8>) {
    let (bin, min, max) = cube_buffer(center, half);
    (cube_document(bin.len(), Some(bin_uri), min, max), bin)
}

/// What the test server answers for a route.
#[derive(Clone)]
pub enum Reply {
    Body(Vec<u8>),
    Status(u16),
    /// A status with a JSON body.
    Json(u16, String),
    /// Accept the request and never answer.
    Hang,
}

/// A request as the test server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path and query string.
    pub target: String,
    /// Header names are lowercase.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Default)]
struct Log {
    hits: HashMap<String, usize>,
    requests: Vec<Recorded>,
}

/// A minimal HTTP/1.1 server.
///
/// Routes are keyed by path, or by `"METHOD /path"` to answer one method
/// only; a trailing `*` matches any suffix. The query string is ignored for
/// matching. Unknown routes get a 404.
pub struct TestServer {
    addr: SocketAddr,
    log: Arc<Mutex<Log>>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Reply)>) -> Self {
        let routes: Arc<HashMap<String, Reply>> =
            Arc::new(routes.into_iter().map(|(p, r)| (p.to_string(), r)).collect());
        let log = Arc::new(Mutex::new(Log::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_log = log.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let log = server_log.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, &routes, &log).await;
                });
            }
        });

        Self { addr, log }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Requests received for `path`, any method.
    pub fn hits(&self, path: &str) -> usize {
        self.log.lock().hits.get(path).copied().unwrap_or(0)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().requests.clone()
    }
}

async fn serve(mut stream: TcpStream, routes: &HashMap<String, Reply>, log: &Mutex<Log>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_len = loop {
        if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            break end + 4;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&request[..head_len]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or("GET").to_string();
    let target = request_line.next().unwrap_or("/").to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = request[head_len..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let path = target.split('?').next().unwrap_or("/").to_string();
    {
        let mut log = log.lock();
        *log.hits.entry(path.clone()).or_insert(0) += 1;
        log.requests.push(Recorded {
            method: method.clone(),
            target: target.clone(),
            headers,
            body,
        });
    }

    let keyed = format!("{method} {path}");
    let route = routes.get(&keyed).or_else(|| routes.get(&path)).or_else(|| {
        routes.iter().find_map(|(key, reply)| {
            let prefix = key.strip_suffix('*')?;
            (keyed.starts_with(prefix) || path.starts_with(prefix)).then_some(reply)
        })
    });
    let (status, content_type, body) = match route {
        Some(Reply::Body(body)) => (200, "application/octet-stream", body.clone()),
        Some(Reply::Status(status)) => (*status, "application/octet-stream", Vec::new()),
        Some(Reply::Json(status, json)) => (*status, "application/json", json.clone().into_bytes()),
        Some(Reply::Hang) => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }
        None => (404, "application/octet-stream", Vec::new()),
    };

    let header = format!(
        "HTTP/1.1 {status} Test\r\nContent-Length: {}\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}

/// Settings tuned for fast tests.
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        load_timeout_ms: 2_000,
        render_timeout_ms: 5_000,
        fetch_timeout_ms: 2_000,
        retry_delay_ms: 10,
        ..PipelineSettings::default()
    }
}

/// A service over an in-memory catalog, storing thumbnails in `store`.
pub fn service_with_store(settings: PipelineSettings, store: Arc<dyn ObjectStore>) -> ThumbnailService {
    let loader = AssetLoader::new(&settings).unwrap();
    let pipeline = ThumbnailPipeline::new(settings, loader, store);
    ThumbnailService::new(Arc::new(MemoryCatalog::new()), pipeline)
}

/// A service where catalog, thumbnails and blobs all live in memory.
pub fn memory_service(settings: PipelineSettings) -> (ThumbnailService, Arc<MemoryObjectStore>) {
    let store = Arc::new(MemoryObjectStore::new());
    let loader = AssetLoader::new(&settings).unwrap().with_blobs(store.clone());
    let pipeline = ThumbnailPipeline::new(settings, loader, store.clone());
    (ThumbnailService::new(Arc::new(MemoryCatalog::new()), pipeline), store)
}
