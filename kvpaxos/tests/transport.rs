use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use kvpaxos::external::{self, Client, Response};
use kvpaxos::{Config, Envelope, Error, FailureConfig, Peer, RegistryConfig, Request, Running};

/// Frame that decodes as neither a client nor a peer request.
const GARBAGE: &[u8] = &[0xff; 8];

/// Ports the OS just handed out and released.
fn free_addrs(count: usize) -> Vec<SocketAddr> {
    let listeners = (0..count)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect::<Vec<_>>();
    listeners.iter()
        .map(|listener| listener.local_addr().unwrap())
        .collect()
}

async fn start(count: usize) -> Vec<Running> {
    let addrs = free_addrs(count * 2);
    let (peers, ports) = addrs.split_at(count);
    let configs = (0..count).map(|id| {
        Config::new(id, ports[id].port(), count)
            .with_peers(peers.to_vec())
            .with_timeout(Duration::from_millis(500))
            .with_failures(FailureConfig::disabled())
            .with_registry(RegistryConfig::default().with_retries(20).with_backoff(Duration::from_millis(100)))
            .run()
    });
    future::try_join_all(configs).await.unwrap()
}

async fn settle<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("cluster did not settle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clients_see_writes_through_any_node() {
    let nodes = start(3).await;
    let mut first = Client::connect(nodes[0].client_addr()).await.unwrap();
    let mut last = Client::connect(nodes[2].client_addr()).await.unwrap();

    let stored = first.put("Key1", "Value1").await.unwrap();
    assert_eq!(stored, Response::Stored { key: "Key1".into(), value: "Value1".into() });

    settle(|| nodes.iter().all(|node| node.server().get("Key1").as_deref() == Some("Value1"))).await;
    assert_eq!(last.get("Key1").await.unwrap(), Response::Value { key: "Key1".into(), value: "Value1".into() });
    assert_eq!(last.get("Key2").await.unwrap(), Response::NotFound { key: "Key2".into() });

    assert_eq!(last.reset().await.unwrap(), Response::Reset { acknowledged: 3 });
    assert_eq!(last.delete("Key1").await.unwrap(), Response::Deleted { key: "Key1".into() });
    settle(|| nodes.iter().all(|node| node.server().get("Key1").is_none())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn peer_connections_multiplex_concurrent_calls() {
    let nodes = start(3).await;
    let peer = Peer::new(nodes[1].peer_addr());
    let calls = (0..8).map(|_| peer.request(Request::Identity));
    for response in future::join_all(calls).await {
        assert_eq!(response.unwrap(), kvpaxos::Response::Identity("server-2".into()));
    }

    // A fresh peer handle dials a new connection to the same node.
    let again = Peer::new(nodes[1].peer_addr());
    assert!(again.request(Request::Identity).await.is_ok());
}

/// Connection that speaks raw length-delimited frames.
async fn raw(addr: SocketAddr) -> Framed<tokio::net::TcpStream, LengthDelimitedCodec> {
    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, LengthDelimitedCodec::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_client_frames_are_refused_without_closing_the_connection() {
    let nodes = start(1).await;
    let mut connection = raw(nodes[0].client_addr()).await;

    connection.send(Bytes::from_static(GARBAGE)).await.unwrap();
    let frame = connection.next().await.unwrap().unwrap();
    let refused: Response = bincode::deserialize(&frame).unwrap();
    assert_eq!(refused, Response::Rejected { reason: "malformed request".into() });

    let put = external::Request::Put { key: "Key1".into(), value: "Value1".into() };
    connection.send(Bytes::from(bincode::serialize(&put).unwrap())).await.unwrap();
    let frame = connection.next().await.unwrap().unwrap();
    let stored: Response = bincode::deserialize(&frame).unwrap();
    assert_eq!(stored, Response::Stored { key: "Key1".into(), value: "Value1".into() });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_peer_frames_are_dropped_without_closing_the_connection() {
    let nodes = start(1).await;
    let mut connection = raw(nodes[0].peer_addr()).await;

    connection.send(Bytes::from_static(GARBAGE)).await.unwrap();
    let identity = Envelope { seq: 9, body: Request::Identity };
    connection.send(Bytes::from(bincode::serialize(&identity).unwrap())).await.unwrap();

    // The garbage frame gets no answer, so the first reply is for `seq` 9.
    let frame = tokio::time::timeout(Duration::from_secs(2), connection.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply: Envelope<kvpaxos::Response> = bincode::deserialize(&frame).unwrap();
    assert_eq!(reply.seq, 9);
    assert_eq!(reply.body, kvpaxos::Response::Identity("server-1".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_start_releases_the_peer_port() {
    let peer_addr = free_addrs(1)[0];
    let busy = TcpListener::bind("127.0.0.1:0").unwrap();
    let busy_port = busy.local_addr().unwrap().port();

    let started = Config::new(0, busy_port, 1)
        .with_peers(vec![peer_addr])
        .with_failures(FailureConfig::disabled())
        .run()
        .await;
    assert!(matches!(started, Err(Error::Io(_))));

    settle(|| std::net::TcpStream::connect(peer_addr).is_err()).await;
    drop(busy);
}
