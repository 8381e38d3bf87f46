mod common;

use common::{MockService, events, init_logging, london, period};
use geoband::{
    AnyLand, AreaPartitioner, BatchReplayer, Config, Disposition, FetchConfig, Fetcher,
    NoopObserver, ServiceError, Store,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::tempdir;

fn refused_root_service() -> Arc<MockService> {
    let root = london().polygon().key();
    Arc::new(MockService::new(move |request| {
        if request.polygon == root {
            Err(ServiceError::CapacityExceeded)
        } else {
            Ok(events(&request.polygon, 6000))
        }
    }))
}

fn partitioner(service: &Arc<MockService>) -> AreaPartitioner<MockService, AnyLand> {
    let config = Config::default().with_fetch(FetchConfig::unpaced());
    let fetcher = Fetcher::sequential(Arc::clone(service), &config.fetch);
    AreaPartitioner::new(config, fetcher, AnyLand)
}

#[tokio::test]
async fn test_partition_cache_survives_reopen() -> anyhow::Result<()> {
    init_logging();
    let dir = tempdir()?;
    let path = dir.path().join("cache.log");
    let service = refused_root_service();

    {
        let store = Store::builder().path(&path).build()?;
        let mut session = store.session()?;
        let report = partitioner(&service)
            .run(&mut session, london(), period("2024-01"))
            .await;
        session.close()?;
        store.close()?;
        assert_eq!(report.external_calls, 5);
        assert_eq!(report.settled_count(), 4);
    }

    let store = Store::open(&path)?;
    let stats = store.stats()?;
    assert_eq!(stats.area_count, 4);
    assert_eq!(stats.event_count, 24_000);
    assert_eq!(stats.split_count, 1);

    let mut session = store.session()?;
    let report = partitioner(&service)
        .run(&mut session, london(), period("2024-01"))
        .await;
    assert_eq!(report.external_calls, 0);
    assert_eq!(report.cache_hits, 5);
    assert_eq!(report.count(Disposition::CacheHit), 5);
    assert_eq!(service.call_count(), 5);
    Ok(())
}

#[tokio::test]
async fn test_replay_results_persist() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("cache.log");
    let keys: Vec<String> = london().quadrants().iter().map(|q| q.polygon().key()).collect();
    let service = Arc::new(MockService::always(12));

    {
        let store = Store::open(&path)?;
        let fetch = FetchConfig::unpaced();
        let replayer = BatchReplayer::new(store.clone(), Arc::clone(&service), &fetch);
        let report = replayer
            .replay(&keys, period("2024-05"), &mut NoopObserver)
            .await?;
        assert_eq!(report.successful, 4);
        store.close()?;
    }

    let store = Store::open(&path)?;
    let period_stats = store.period_stats(period("2024-05"))?;
    assert_eq!(period_stats.areas, 4);
    assert_eq!(period_stats.total_events, 48);
    assert_eq!(store.stats()?.event_count, 48);
    Ok(())
}

#[tokio::test]
async fn test_interrupted_write_is_recovered() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("cache.log");
    let service = Arc::new(MockService::always(6000));

    {
        let store = Store::open(&path)?;
        let mut session = store.session()?;
        partitioner(&service)
            .run(&mut session, london(), period("2024-01"))
            .await;
        session.close()?;
        store.close()?;
    }

    // simulate a crash halfway through appending a line
    let mut file = std::fs::OpenOptions::new().append(true).open(&path)?;
    file.write_all(br#"{"op":"area","id":2,"polygon_key":"#)?;
    drop(file);

    let store = Store::open(&path)?;
    assert_eq!(store.stats()?.area_count, 1);

    let mut session = store.session()?;
    let report = partitioner(&service)
        .run(&mut session, london(), period("2024-01"))
        .await;
    assert_eq!(report.external_calls, 0);
    Ok(())
}

#[test]
fn test_in_memory_builder_ignores_path() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("unused.log");
    let store = Store::builder().path(&path).in_memory().build()?;

    let mut session = store.session()?;
    session.insert_area_if_absent("k", 1, period("2024-01"))?;
    session.close()?;

    assert!(!path.exists());
    assert_eq!(store.stats()?.area_count, 1);
    Ok(())
}
