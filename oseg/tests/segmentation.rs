//! End to end tests: segmentations on two servers sharing one fake store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use craq_client::ClientConfig;
use location_cache::{BoundingBox, CoordinateSegmentation};
use oseg::{
    AckSender, Config, Listener, Lookup, MigrateAck, ObjectSegmentation, OsegError,
    SegmentationConfig,
};
use protocol_craq::{CraqEntry, DataKey, ENTRY_VALUE_LEN, ObjectId, Response, ServerId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

// ── Fake store ──────────────────────────────────────────────────────────

type Records = Arc<Mutex<HashMap<DataKey, CraqEntry>>>;

async fn start_store() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let records: Records = Arc::default();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, records.clone()));
        }
    });
    addr
}

async fn serve(mut stream: TcpStream, records: Records) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        while let Some(line_end) = buf.windows(2).position(|w| w == b"\r\n") {
            let line = buf[..line_end].to_vec();
            let mut consumed = line_end + 2;
            let mut out = [0u8; 128];

            let len = if let Some(key) = line.strip_prefix(b"get ") {
                let key = DataKey::from_slice(key).unwrap();
                let response = match records.lock().await.get(&key) {
                    Some(entry) => Response::Value { key, entry: *entry },
                    None => Response::NotFound { key },
                };
                response.encode(&mut out)
            } else if let Some(rest) = line.strip_prefix(b"set ") {
                let key = DataKey::from_slice(&rest[..rest.len() - 3]).unwrap();
                if buf.len() < consumed + ENTRY_VALUE_LEN + 2 {
                    break;
                }
                let entry =
                    CraqEntry::from_value(&buf[consumed..consumed + ENTRY_VALUE_LEN]).unwrap();
                consumed += ENTRY_VALUE_LEN + 2;
                records.lock().await.insert(key, entry);
                Response::Stored { key }.encode(&mut out)
            } else {
                panic!("unexpected command: {:?}", String::from_utf8_lossy(&line));
            };

            buf.drain(..consumed);
            if stream.write_all(&out[..len]).await.is_err() {
                return;
            }
        }
    }
}

// ── Collaborators ───────────────────────────────────────────────────────

struct NoRegions;

impl CoordinateSegmentation for NoRegions {
    fn server_region(&self, _server: ServerId) -> Vec<BoundingBox> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Lookup(ObjectId, CraqEntry),
    Write(ObjectId, ServerId),
    Migrated(ObjectId, ServerId, ServerId),
}

struct Events(mpsc::UnboundedSender<Event>);

impl Listener for Events {
    fn lookup_completed(&self, id: &ObjectId, entry: CraqEntry) {
        let _ = self.0.send(Event::Lookup(*id, entry));
    }

    fn write_finished(&self, id: &ObjectId, server: ServerId) {
        let _ = self.0.send(Event::Write(*id, server));
    }

    fn migration_acknowledged(&self, id: &ObjectId, from: ServerId, to: ServerId) {
        let _ = self.0.send(Event::Migrated(*id, from, to));
    }
}

/// Hands acknowledgments to whoever plays the router.
struct Router(mpsc::UnboundedSender<MigrateAck>);

impl AckSender for Router {
    fn send_ack(&self, ack: MigrateAck) -> Result<(), MigrateAck> {
        self.0.send(ack).map_err(|e| e.0)
    }
}

struct Server {
    oseg: Arc<ObjectSegmentation<craq_client::CraqClient>>,
    events: mpsc::UnboundedReceiver<Event>,
    acks: mpsc::UnboundedReceiver<MigrateAck>,
}

fn config(addr: &str, server: ServerId) -> Config {
    Config {
        backend: ClientConfig {
            endpoints: vec![addr.to_string()],
            connections: 2,
            request_timeout_ms: 500,
            tick_interval_ms: 5,
            ..Default::default()
        },
        segmentation: SegmentationConfig {
            server_id: server,
            not_found_sit_out_ms: 20,
            tick_interval_ms: 5,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn start_server(config: &Config) -> Server {
    let (event_tx, events) = mpsc::unbounded_channel();
    let (ack_tx, acks) = mpsc::unbounded_channel();
    let oseg = ObjectSegmentation::start(
        config,
        Arc::new(NoRegions),
        Arc::new(Events(event_tx)),
        Arc::new(Router(ack_tx)),
    )
    .unwrap();
    Server { oseg, events, acks }
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting")
        .expect("channel closed")
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn publish_then_read() {
    let addr = start_store().await;
    let mut a = start_server(&config(&addr, 1));
    let b = start_server(&config(&addr, 2));
    let id = ObjectId::from_u128(42);

    a.oseg.new_object_add(id, 12.5).unwrap();
    assert_eq!(next(&mut a.events).await, Event::Write(id, 1));

    let entry = b.oseg.resolve(id).await.unwrap();
    assert_eq!(entry.server(), 1);
    assert_eq!(entry.radius(), 12.5);

    // answered from the cache, nothing queued
    assert_eq!(b.oseg.lookup(id), Lookup::Resolved(entry));
    assert_eq!(b.oseg.pushback(), 0);

    a.oseg.stop();
    b.oseg.stop();
}

#[tokio::test]
async fn migration_acknowledged_after_publish() {
    let addr = start_store().await;
    let mut origin = start_server(&config(&addr, 1));
    let mut target = start_server(&config(&addr, 2));
    let id = ObjectId::from_u128(7);

    origin.oseg.new_object_add(id, 3.0).unwrap();
    assert_eq!(next(&mut origin.events).await, Event::Write(id, 1));

    assert!(origin.oseg.migrate_object(id, CraqEntry::new(2, 3.0)));
    let held = {
        let oseg = origin.oseg.clone();
        tokio::spawn(async move { oseg.resolve(id).await })
    };

    target.oseg.add_object(id, 3.0, 1, true).unwrap();
    let ack = next(&mut target.acks).await;
    assert_eq!(
        ack,
        MigrateAck {
            object: id,
            origin: 1,
            target: 2,
            radius: 3.0,
        }
    );
    assert_eq!(next(&mut target.events).await, Event::Migrated(id, 1, 2));
    assert!(target.oseg.is_local(&id));

    // the store already points at the target
    let other = start_server(&config(&addr, 3));
    assert_eq!(other.oseg.resolve(id).await.unwrap().server(), 2);

    origin.oseg.process_migrate_ack(ack);
    assert_eq!(held.await.unwrap().unwrap(), CraqEntry::new(2, 3.0));
    assert_eq!(
        next(&mut origin.events).await,
        Event::Lookup(id, CraqEntry::new(2, 3.0))
    );
    assert_eq!(next(&mut origin.events).await, Event::Migrated(id, 1, 2));
    assert!(origin.oseg.clear_to_migrate(&id));

    for server in [&origin, &target, &other] {
        server.oseg.stop();
    }
}

#[tokio::test]
async fn unknown_object_unresolved() {
    let addr = start_store().await;
    let mut config = config(&addr, 1);
    config.segmentation.max_not_found_retries = Some(3);
    let mut server = start_server(&config);
    let id = ObjectId::from_u128(99);

    assert!(matches!(
        server.oseg.resolve(id).await,
        Err(OsegError::Unresolved)
    ));
    assert_eq!(
        next(&mut server.events).await,
        Event::Lookup(id, CraqEntry::null())
    );
    server.oseg.stop();
}

#[tokio::test]
async fn stop_fails_held_lookups() {
    // nothing listens here, so lookups stay queued
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let server = start_server(&config(&addr, 1));
    let held = {
        let oseg = server.oseg.clone();
        tokio::spawn(async move { oseg.resolve(ObjectId::from_u128(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.oseg.pushback(), 1);

    server.oseg.stop();
    assert!(matches!(held.await.unwrap(), Err(OsegError::Stopped)));
    assert_eq!(server.oseg.lookup(ObjectId::from_u128(5)), Lookup::Stopped);
}
