use std::net::SocketAddr;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::client::Client;
use crate::engine::BlobEngine;
use crate::feature::{FeatureFlags, KV_STORE};
use crate::guard::TokenPolicy;
use crate::http::{Frame, HttpResponse, CONTINUE};
use crate::log_store::LogStore;
use crate::server::Server;
use crate::service::KvService;
use crate::sled::SledStore;
use crate::thread_pool::shared_queue::SharedQueueThreadPool;
use crate::thread_pool::ThreadPool;

async fn start_server<E: BlobEngine>(engine: E, flags: FeatureFlags) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let service = KvService::new(
        engine,
        SharedQueueThreadPool::new(2).unwrap(),
        flags,
        Box::new(TokenPolicy::new(["secret"])),
    );
    let server = Server::new(service).unwrap();
    let handle = tokio::spawn(async move {
        let _ = server.serve_on(listener).await;
    });

    (addr.to_string(), handle)
}

async fn read_response(stream: &mut TcpStream) -> HttpResponse {
    let mut buf = Vec::new();
    loop {
        let mut chunk = [0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0, "server closed the connection");
        buf.extend_from_slice(&chunk[..n]);
        if let Some((response, _)) = HttpResponse::parse(&buf).unwrap() {
            return response;
        }
    }
}

async fn client_access_server<E: BlobEngine>(engine: E) {
    let flags = FeatureFlags::from_enabled([KV_STORE]);
    let (addr, handle) = start_server(engine, flags.clone()).await;

    let mut client = Client::connect(&addr).await.unwrap().with_token("secret");
    let id = client.put("hello").await.unwrap();
    let other = client.put("hello world").await.unwrap();
    assert_ne!(id, other);

    assert_eq!(client.get(id).await.unwrap(), Some("hello".to_string()));
    assert_eq!(client.get(other).await.unwrap(), Some("hello world".to_string()));
    assert_eq!(client.get(id + 1_000_000).await.unwrap(), None);

    let mut intruder = Client::connect(&addr).await.unwrap().with_token("wrong");
    let err = intruder.get(id).await.unwrap_err();
    assert!(err.to_string().contains("Access is Denied"));

    flags.disable(KV_STORE);
    assert_eq!(client.get(id).await.unwrap(), None);
    assert!(client.put("ignored").await.is_err());

    handle.abort();
}

#[tokio::test]
async fn client_access_server_log_engine() {
    let tmp_dir = TempDir::new().unwrap();
    client_access_server(LogStore::open(tmp_dir.path()).unwrap()).await;
}

#[tokio::test]
async fn client_access_server_sled_engine() {
    let tmp_dir = TempDir::new().unwrap();
    client_access_server(SledStore::open(tmp_dir.path()).unwrap()).await;
}

#[tokio::test]
async fn client_reads_values_after_restart() {
    let tmp_dir = TempDir::new().unwrap();
    let flags = FeatureFlags::from_enabled([KV_STORE]);

    let (addr, handle) = start_server(LogStore::open(tmp_dir.path()).unwrap(), flags.clone()).await;
    let id = {
        let mut client = Client::connect(&addr).await.unwrap().with_token("secret");
        client.put("durable").await.unwrap()
    };
    handle.abort();
    let _ = handle.await;

    // Reopen and check value
    let (addr, handle) = start_server(LogStore::open(tmp_dir.path()).unwrap(), flags).await;
    let mut client = Client::connect(&addr).await.unwrap().with_token("secret");
    assert_eq!(client.get(id).await.unwrap(), Some("durable".to_string()));
    handle.abort();
}

#[tokio::test]
async fn server_answers_expect_continue() {
    let tmp_dir = TempDir::new().unwrap();
    let flags = FeatureFlags::from_enabled([KV_STORE]);
    let (addr, handle) = start_server(LogStore::open(tmp_dir.path()).unwrap(), flags).await;

    let body = "data=hello";
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(
            format!(
                "POST /store/ HTTP/1.1\r\n\
                 Authorization: Bearer secret\r\n\
                 Content-Type: application/x-www-form-urlencoded\r\n\
                 Expect: 100-continue\r\n\
                 Content-Length: {}\r\n\r\n",
                body.len()
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    let mut interim = vec![0; CONTINUE.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut interim))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(interim, CONTINUE);

    stream.write_all(body.as_bytes()).await.unwrap();
    let response = read_response(&mut stream).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "{\"id\":1}");

    handle.abort();
}

#[tokio::test]
async fn server_rejects_malformed_request() {
    let tmp_dir = TempDir::new().unwrap();
    let flags = FeatureFlags::from_enabled([KV_STORE]);
    let (addr, handle) = start_server(LogStore::open(tmp_dir.path()).unwrap(), flags).await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream.write_all(b"GARBAGE\r\n\r\n").await.unwrap();

    let response = read_response(&mut stream).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.header("Connection"), Some("close"));

    handle.abort();
}
