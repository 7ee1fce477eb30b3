//! Exercises the fetch pool end to end with a mock NNTP responder: three
//! segments queued in stream order but answered out of order by the
//! mock still arrive correctly keyed by message-id once delivered.

use std::sync::Arc;
use std::time::Duration;

use nzbstream::nntp::mock::MockNntpConnector;
use nzbstream::nntp::FetchPool;

#[tokio::test]
async fn delivers_segments_keyed_by_message_id_regardless_of_fetch_order() {
    let connector = Arc::new(MockNntpConnector::new());
    connector.insert("seg-1", b"first payload".to_vec()).await;
    connector.insert("seg-2", b"second payload".to_vec()).await;
    connector.insert("seg-3", b"third payload".to_vec()).await;

    let pool = FetchPool::new(None);
    pool.spawn_workers(Arc::clone(&connector), 3);

    pool.add_segment(3, "seg-3".to_string()).await;
    pool.add_segment(1, "seg-1".to_string()).await;
    pool.add_segment(2, "seg-2".to_string()).await;

    let timeout = Duration::from_secs(5);
    let second = pool.get_segment("seg-2", timeout).await.unwrap().unwrap();
    let first = pool.get_segment("seg-1", timeout).await.unwrap().unwrap();
    let third = pool.get_segment("seg-3", timeout).await.unwrap().unwrap();

    assert_eq!(second, b"second payload");
    assert_eq!(first, b"first payload");
    assert_eq!(third, b"third payload");

    pool.quit(3).await;
}

#[tokio::test]
async fn a_gone_article_does_not_wedge_the_rest_of_the_pool() {
    let connector = Arc::new(MockNntpConnector::new());
    connector.mark_gone("seg-dead").await;
    connector.insert("seg-alive", b"still here".to_vec()).await;

    let pool = FetchPool::new(None);
    pool.spawn_workers(Arc::clone(&connector), 2);

    pool.add_segment(1, "seg-dead".to_string()).await;
    pool.add_segment(2, "seg-alive".to_string()).await;

    let alive = pool
        .get_segment("seg-alive", Duration::from_secs(5))
        .await
        .unwrap()
        .expect("alive segment should still be delivered by the other worker");
    assert_eq!(alive, b"still here");

    let dead = tokio::time::timeout(
        Duration::from_secs(5),
        pool.get_segment("seg-dead", Duration::from_secs(5)),
    )
    .await
    .expect("a gone article must surface promptly, not hang forever");
    assert!(
        matches!(dead, Err(nzbstream::nntp::NntpError::ArticleGone(_))),
        "expected ArticleGone, got {dead:?}"
    );

    pool.quit(2).await;
}
