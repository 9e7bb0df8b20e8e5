//! Shared helpers for integration tests: a recording mock upstream, a
//! raw-socket upstream, test certificates and a proxy bound to an ephemeral
//! localhost port.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use corsgate::{Proxy, ProxyOptions};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Mock upstream. Routes:
/// - `/missing` → 404 `not here`
/// - `/cors` → 200 with its own CORS headers
/// - `/echo` → 200 echoing the request body
/// - `/slow` → 200 after three seconds
/// - anything else → 200 `data`
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    task: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await
    }

    pub async fn bind(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let service = service_fn(move |req| respond(Arc::clone(&recorded), req));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(socket), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn respond(
    recorded: Arc<Mutex<Vec<Recorded>>>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    recorded.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        path: path.clone(),
        headers: parts.headers.clone(),
        body: body.clone(),
    });

    let response = match parts.uri.path() {
        "/missing" => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"not here"))),
        "/cors" => Response::builder()
            .header("access-control-allow-origin", "https://upstream.example")
            .header("access-control-allow-methods", "GET")
            .body(Full::new(Bytes::from_static(b"cors"))),
        "/echo" => Response::builder().body(Full::new(body)),
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Response::builder().body(Full::new(Bytes::from_static(b"late")))
        }
        _ => Response::builder()
            .header("x-upstream", "mock")
            .body(Full::new(Bytes::from_static(b"data"))),
    };

    Ok(response.unwrap())
}

/// Gap between the two chunks of the `/trickle` response.
pub const TRICKLE_PAUSE: Duration = Duration::from_secs(2);

/// Upstream that writes HTTP/1.1 straight to the socket, for responses a
/// well-behaved server never produces. Routes:
/// - `/truncated` → declares 100 body bytes, sends 10, then closes
/// - `/trickle` → chunked `first`, a pause of [`TRICKLE_PAUSE`], then `second`
/// - anything else → 200 `ok`
pub struct RawUpstream {
    pub addr: SocketAddr,
    trickle_finished: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RawUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let trickle_finished = Arc::new(AtomicBool::new(false));

        let finished = Arc::clone(&trickle_finished);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve_raw(socket, Arc::clone(&finished)));
            }
        });

        Self {
            addr,
            trickle_finished,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Whether `/trickle` is past its pause and sending the last chunk.
    pub fn trickle_finished(&self) -> bool {
        self.trickle_finished.load(Ordering::SeqCst)
    }
}

impl Drop for RawUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_raw(mut socket: TcpStream, trickle_finished: Arc<AtomicBool>) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    let path = head.split_whitespace().nth(1).unwrap_or("/");

    match path {
        "/truncated" => {
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n0123456789")
                .await;
        }
        "/trickle" => {
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nfirst\r\n")
                .await;
            let _ = socket.flush().await;
            tokio::time::sleep(TRICKLE_PAUSE).await;
            trickle_finished.store(true, Ordering::SeqCst);
            let _ = socket.write_all(b"6\r\nsecond\r\n0\r\n\r\n").await;
        }
        _ => {
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                .await;
        }
    }
    let _ = socket.shutdown().await;
}

/// A CA and a `localhost` server certificate it signed, written as PEM files.
pub struct TestCertificate {
    pub ca_pem: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestCertificate {
    pub fn generate() -> Self {
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "corsgate test CA");
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = ca_params.clone().self_signed(&ca_key).unwrap();
        let issuer = Issuer::new(ca_params, ca_key);

        let server_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let server_key = KeyPair::generate().unwrap();
        let server_cert = server_params.signed_by(&server_key, &issuer).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, server_cert.pem()).unwrap();
        std::fs::write(&key_path, server_key.serialize_pem()).unwrap();

        Self {
            ca_pem: ca_cert.pem(),
            cert_path,
            key_path,
            _dir: dir,
        }
    }

    /// HTTPS client trusting the test CA, with `localhost` pinned to `addr`.
    pub fn client(&self, addr: SocketAddr) -> reqwest::Client {
        let ca = reqwest::Certificate::from_pem(self.ca_pem.as_bytes()).unwrap();
        reqwest::Client::builder()
            .no_proxy()
            .add_root_certificate(ca)
            .resolve("localhost", addr)
            .build()
            .unwrap()
    }
}

/// Start a proxy on an ephemeral localhost port; returns it with its base URL.
pub async fn start_proxy(options: ProxyOptions) -> (Proxy, String) {
    let mut proxy = Proxy::new(options.bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))).unwrap();
    proxy.listen(0).await.unwrap();
    let base = format!("http://{}", proxy.local_addr().unwrap());
    (proxy, base)
}

/// HTTP client that ignores proxy environment variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
