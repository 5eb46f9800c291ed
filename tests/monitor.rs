mod common;

use std::time::Duration;

use common::{FakeFactory, target, wait_for};
use dbsentry::{MONITOR, Monitor, MonitorConfig, MonitorError, RestartMonitor, Sweep};

fn monitor(factory: &std::sync::Arc<FakeFactory>) -> Monitor {
    Monitor::new(factory.clone(), MonitorConfig::default())
}

#[tokio::test]
async fn test_restart_fires_once_on_decrease() {
    let factory = FakeFactory::new();
    let db1 = target("db1");
    factory.with(&db1, |s| s.uptimes = [100, 120, 15].into());
    let monitor = monitor(&factory);
    let mut sub = monitor.add(&db1).await.unwrap();

    assert_eq!(monitor.check().await.restarted, 0);
    assert!(sub.try_recv().is_none());
    assert_eq!(monitor.check().await.restarted, 0);
    assert!(sub.try_recv().is_none());

    let sweep = monitor.check().await;
    assert_eq!(
        sweep,
        Sweep {
            checked: 1,
            restarted: 1,
            failed: 0
        }
    );
    let notice = sub.try_recv().expect("restart notice");
    assert_eq!(notice.target, db1);
    assert!(sub.try_recv().is_none());

    monitor.check().await;
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_direct_and_global_subscribers_are_tagged() {
    let factory = FakeFactory::new();
    let db1 = target("db1");
    let db2 = target("db2");
    factory.with(&db1, |s| s.uptimes = [500, 501].into());
    factory.with(&db2, |s| s.uptimes = [50, 10].into());
    let monitor = monitor(&factory);

    let mut sub1 = monitor.add(&db1).await.unwrap();
    let mut sub2 = monitor.add(&db2).await.unwrap();
    let mut global = monitor.global_subscribe().await.unwrap();

    monitor.check().await;
    monitor.check().await;

    assert!(sub1.try_recv().is_none());
    assert_eq!(sub2.try_recv().map(|n| n.target), Some(db2.clone()));
    assert_eq!(global.recv().await.map(|n| n.target), Some(db2));
    assert!(global.try_recv().is_err());
}

#[tokio::test]
async fn test_target_added_later_joins_global_stream() {
    let factory = FakeFactory::new();
    let db3 = target("db3");
    factory.with(&db3, |s| s.uptimes = [9000, 2].into());
    let monitor = monitor(&factory);

    let mut global = monitor.global_subscribe().await.unwrap();
    let _sub = monitor.add(&db3).await.unwrap();
    monitor.check().await;
    monitor.check().await;

    assert_eq!(global.recv().await.map(|n| n.target), Some(db3));
}

#[tokio::test]
async fn test_second_global_subscribe_is_rejected_while_alive() {
    let factory = FakeFactory::new();
    let monitor = monitor(&factory);

    let first = monitor.global_subscribe().await.unwrap();
    assert!(matches!(
        monitor.global_subscribe().await,
        Err(MonitorError::GlobalTaken)
    ));

    drop(first);
    assert!(monitor.global_subscribe().await.is_ok());
}

#[tokio::test]
async fn test_shared_target_uses_one_connection() {
    let factory = FakeFactory::new();
    let db1 = target("db1");
    factory.with(&db1, |s| s.uptimes = [10, 20, 1].into());
    let monitor = monitor(&factory);

    let first = monitor.add(&db1).await.unwrap();
    let mut second = monitor.add(&db1).await.unwrap();
    assert_eq!(factory.with(&db1, |s| s.made), 1);

    assert!(!monitor.remove(&db1, first).await);
    monitor.check().await;
    monitor.check().await;
    monitor.check().await;
    assert!(second.try_recv().is_some());
    assert_eq!(factory.with(&db1, |s| s.closes), 0);
}

#[tokio::test]
async fn test_remove_last_subscriber_evicts_and_closes() {
    let factory = FakeFactory::new();
    let db1 = target("db1");
    let monitor = monitor(&factory);

    let sub = monitor.add(&db1).await.unwrap();
    assert!(monitor.remove(&db1, sub).await);
    assert_eq!(factory.with(&db1, |s| s.closes), 1);

    assert_eq!(monitor.check().await.checked, 0);
    assert!(!monitor.global_remove(&db1).await);
}

#[tokio::test]
async fn test_open_failure_registers_nothing() {
    let factory = FakeFactory::new();
    let db1 = target("db1");
    factory.with(&db1, |s| s.open_fail = 1);
    let monitor = monitor(&factory);

    let err = monitor.add(&db1).await.unwrap_err();
    assert_eq!(err.as_label(), "monitor_connect");
    assert!(!err.to_string().contains("s3cret"));
    assert_eq!(monitor.check().await.checked, 0);

    assert!(monitor.add(&db1).await.is_ok());
    assert_eq!(monitor.check().await.checked, 1);
}

#[tokio::test]
async fn test_failed_read_skips_target_and_reconnects() {
    let factory = FakeFactory::new();
    let bad = target("bad");
    let good = target("good");
    factory.with(&bad, |s| {
        s.uptime_fail = 1;
        s.uptimes = [100, 3].into();
    });
    factory.with(&good, |s| s.uptimes = [7, 8].into());
    let monitor = monitor(&factory);
    let mut bad_sub = monitor.add(&bad).await.unwrap();
    let _good_sub = monitor.add(&good).await.unwrap();

    let sweep = monitor.check().await;
    assert_eq!(sweep.checked, 2);
    assert_eq!(sweep.failed, 1);
    assert_eq!(factory.with(&bad, |s| s.closes), 1);

    assert_eq!(monitor.check().await.failed, 0);
    assert_eq!(factory.with(&bad, |s| s.opens), 2);
    monitor.check().await;
    assert!(bad_sub.try_recv().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_detects_and_stops() {
    let factory = FakeFactory::new();
    let db1 = target("db1");
    factory.with(&db1, |s| s.uptimes = [100, 101, 4].into());
    let monitor = monitor(&factory);
    let mut sub = monitor.add(&db1).await.unwrap();

    monitor.start(Duration::from_secs(1)).await.unwrap();
    assert!(matches!(
        monitor.start(Duration::from_secs(1)).await,
        Err(MonitorError::AlreadyRunning)
    ));

    let notice = tokio::time::timeout(Duration::from_secs(10), sub.recv())
        .await
        .expect("restart within timeout");
    assert_eq!(notice.map(|n| n.target), Some(db1));

    monitor.stop().await.unwrap();
    assert_eq!(monitor.status().get(MONITOR).map(String::as_str), Some("Stopped"));
    monitor.stop().await.unwrap();

    monitor.start(Duration::from_secs(1)).await.unwrap();
    wait_for(|| monitor.status().get(MONITOR).cloned(), "Idle").await;
    monitor.stop().await.unwrap();
}

#[tokio::test]
async fn test_usable_through_trait_object() {
    let factory = FakeFactory::new();
    let db1 = target("db1");
    let monitor: Box<dyn RestartMonitor> = Box::new(monitor(&factory));

    let sub = monitor.add(&db1).await.unwrap();
    assert_eq!(monitor.status().get(MONITOR).map(String::as_str), Some("Stopped"));
    assert!(monitor.remove(&db1, sub).await);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_read_ends_in_crashed() {
    let factory = FakeFactory::new();
    let db1 = target("db1");
    let monitor = monitor(&factory);
    let _sub = monitor.add(&db1).await.unwrap();
    factory.with(&db1, |s| s.uptime_panic = true);

    monitor.start(Duration::from_secs(1)).await.unwrap();
    wait_for(|| monitor.status().get(MONITOR).cloned(), "Crashed").await;

    assert!(monitor.stop().await.is_ok());
    assert_eq!(monitor.status().get(MONITOR).map(String::as_str), Some("Crashed"));

    factory.with(&db1, |s| s.uptime_panic = false);
    monitor.start(Duration::from_secs(1)).await.unwrap();
    wait_for(|| monitor.status().get(MONITOR).cloned(), "Idle").await;
    monitor.stop().await.unwrap();
}
