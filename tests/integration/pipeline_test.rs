//! End-to-end tests: feed frames through the producer, the stream and the consumer

mod common;

use common::{kraken_frame, MemoryStore, MemoryStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tradespike::bus::Horizon;
use tradespike::consumer::{Consumer, ConsumerConfig};
use tradespike::feed::KrakenProvider;
use tradespike::producer::{Producer, ProducerConfig};

const BASE_SECS: f64 = 1_700_000_000.0;

fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        stream_name: "trades".into(),
        horizon: Horizon::TrimHorizon,
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_spike_reaches_alert_log() {
    let stream = MemoryStream::new();
    let store = MemoryStore::new();
    let mut producer = Producer::new(
        Box::new(KrakenProvider::new("XBT/USD")),
        stream.clone(),
        store.clone(),
        ProducerConfig {
            batch_size: 100,
            ..Default::default()
        },
    );

    for s in 0..29 {
        let frame = kraken_frame(10, BASE_SECS + s as f64);
        producer.handle_frame(&frame).await;
    }
    let frame = kraken_frame(50, BASE_SECS + 29.0);
    producer.handle_frame(&frame).await;
    // Opens second 31 so second 30 is finalized
    let frame = kraken_frame(1, BASE_SECS + 30.0);
    producer.handle_frame(&frame).await;
    assert!(producer.flush().await);
    stream.close();

    assert_eq!(stream.len(), 341);
    let keys = stream.partition_keys();
    assert!(keys.iter().all(|k| k == "xbt_usd"));
    let uploaded: usize = store
        .objects()
        .iter()
        .map(|(_, body)| body.lines().count())
        .sum();
    assert_eq!(uploaded, 341);

    let dir = TempDir::new().unwrap();
    let mut consumer = Consumer::open(stream.clone(), dir.path(), consumer_config())
        .await
        .unwrap();
    let (_tx, rx) = watch::channel(false);
    consumer.run(rx).await.unwrap();

    let mut expected = vec![10u64; 29];
    expected.push(50);
    assert_eq!(consumer.aggregator().history(), expected.as_slice());

    let snap = consumer.state().read_metrics().await.unwrap();
    assert_eq!(snap.trades_per_sec, 50);
    assert!(snap.is_spike);
    assert!(snap.z >= 3.0);

    let alerts = consumer.state().read_alerts(50).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].count, 50);
}

#[tokio::test]
async fn test_baseline_has_no_alerts() {
    let stream = MemoryStream::new();
    let mut producer = Producer::new(
        Box::new(KrakenProvider::new("XBT/USD")),
        stream.clone(),
        MemoryStore::new(),
        ProducerConfig::default(),
    );

    for s in 0..31 {
        let frame = kraken_frame(10, BASE_SECS + s as f64);
        producer.handle_frame(&frame).await;
    }
    // A frame the stream cannot parse sits between valid ones
    stream.push_raw("xbt_usd", b"{not json".to_vec());
    let frame = kraken_frame(10, BASE_SECS + 31.0);
    producer.handle_frame(&frame).await;
    stream.close();

    let dir = TempDir::new().unwrap();
    let mut consumer = Consumer::open(stream, dir.path(), consumer_config())
        .await
        .unwrap();
    let (_tx, rx) = watch::channel(false);
    consumer.run(rx).await.unwrap();

    assert_eq!(consumer.stats().skipped, 1);
    assert_eq!(consumer.aggregator().history(), vec![10u64; 31].as_slice());

    let snap = consumer.state().read_metrics().await.unwrap();
    assert_eq!(snap.trades_per_sec, 10);
    assert!(!snap.is_spike);
    assert_eq!(snap.z, 0.0);
    assert!(consumer.state().read_alerts(50).await.is_empty());
}

#[tokio::test]
async fn test_producer_run_against_local_feed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Feed: wait for the subscription, send three frames, close
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let subscription = loop {
            match ws.next().await {
                Some(Ok(Message::Text(t))) => break t,
                Some(Ok(_)) => continue,
                other => panic!("unexpected {other:?}"),
            }
        };
        for s in 0..3 {
            ws.send(Message::Text(kraken_frame(4, BASE_SECS + s as f64)))
                .await
                .unwrap();
        }
        ws.close(None).await.unwrap();
        subscription
    });

    let stream = MemoryStream::new();
    let store = MemoryStore::new();
    let mut producer = Producer::new(
        Box::new(KrakenProvider::with_url("XBT/USD", format!("ws://{addr}"))),
        stream.clone(),
        store.clone(),
        ProducerConfig {
            batch_size: 100,
            reconnect_delay: Duration::from_millis(100),
            ..Default::default()
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        producer.run(shutdown_rx).await.unwrap();
        producer
    });

    let subscription = server.await.unwrap();
    let sub: serde_json::Value = serde_json::from_str(&subscription).unwrap();
    assert_eq!(sub["event"], "subscribe");
    assert_eq!(sub["pair"][0], "XBT/USD");

    // Close of the connection flushes the partial batch
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.objects().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no upload after close");

    shutdown_tx.send(true).unwrap();
    let producer = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("producer did not stop")
        .unwrap();

    let objects = store.objects();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].1.lines().count(), 12);
    assert!(objects[0].0.starts_with("kraken/xbt_usd/"));
    assert_eq!(stream.len(), 12);
    assert_eq!(producer.stats().records_published, 12);
    assert_eq!(producer.buffered(), 0);
}

async fn read_subscription<S>(ws: &mut tokio_tungstenite::WebSocketStream<S>) -> String
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(t))) => return t,
            Some(Ok(_)) => continue,
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_producer_reconnects_and_resubscribes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = MemoryStore::new();
    let reconnect_delay = Duration::from_millis(100);

    // Feed: two connections, each subscribed before any frame is sent
    let feed_store = store.clone();
    let server = tokio::spawn(async move {
        let mut subscriptions = Vec::new();

        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        subscriptions.push(read_subscription(&mut ws).await);
        for s in 0..2 {
            let frame = kraken_frame(4, BASE_SECS + s as f64);
            ws.send(Message::Text(frame)).await.unwrap();
        }
        ws.close(None).await.unwrap();
        let closed_at = tokio::time::Instant::now();

        let (tcp, _) = listener.accept().await.unwrap();
        let reopened_after = closed_at.elapsed();
        let flushed_before_reopen = feed_store.objects();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        subscriptions.push(read_subscription(&mut ws).await);
        let frame = kraken_frame(3, BASE_SECS + 2.0);
        ws.send(Message::Text(frame)).await.unwrap();
        ws.close(None).await.unwrap();

        (subscriptions, reopened_after, flushed_before_reopen)
    });

    let stream = MemoryStream::new();
    let mut producer = Producer::new(
        Box::new(KrakenProvider::with_url("XBT/USD", format!("ws://{addr}"))),
        stream.clone(),
        store.clone(),
        ProducerConfig {
            batch_size: 100,
            reconnect_delay,
            ..Default::default()
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        producer.run(shutdown_rx).await.unwrap();
        producer
    });

    let (subscriptions, reopened_after, flushed_before_reopen) =
        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("feed never saw a second connection")
            .unwrap();

    assert_eq!(subscriptions.len(), 2);
    for text in &subscriptions {
        let sub: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(sub["event"], "subscribe");
        assert_eq!(sub["pair"][0], "XBT/USD");
    }
    assert!(reopened_after >= reconnect_delay);
    assert_eq!(flushed_before_reopen.len(), 1);
    assert_eq!(flushed_before_reopen[0].1.lines().count(), 8);

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.objects().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("second connection was not flushed");

    shutdown_tx.send(true).unwrap();
    let producer = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("producer did not stop")
        .unwrap();

    let objects = store.objects();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[1].1.lines().count(), 3);
    assert_eq!(stream.len(), 11);
    assert_eq!(producer.stats().records_published, 11);
}
