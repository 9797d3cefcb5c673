//! # Scatter-Gather Integration Flows
//!
//! End-to-end runs through the full stack: registry topology, route rule
//! evaluation, parallel fan-out and each merge strategy, wired together
//! the way a query layer would use the crate.

use std::sync::Arc;
use std::time::Duration;

use shardmerge::adapters::{
    CountUnit, InMemoryMetadataProvider, InMemoryShardStore, LookupShardRoute, PagedFetchUnit,
    PhysicDataSource, StreamUnit, TargetRegistry,
};
use shardmerge::{
    AggregateMergeEngine, CancelSignal, CancelSource, EntityMetadata, ExecutionPolicy,
    ExecutionUnit, FailurePolicy, MergePhase, MergeSession, OrderSpec, PageWindow,
    PagedMergeEngine, PhysicalTarget, QueryRouter, RouteCondition, RouteQuery, RouteRuleEngine,
    ShardValue, ShardingCapability, ShardingError, StreamingMergeEngine,
};

// =============================================================================
// TEST FIXTURES
// =============================================================================

/// Three data sources A (default), B, C with Order sharded by Area.
fn order_topology() -> (Arc<TargetRegistry>, RouteRuleEngine) {
    let registry = Arc::new(TargetRegistry::new());
    for (name, default) in [("A", true), ("B", false), ("C", false)] {
        let ds = if default {
            PhysicDataSource::default_source(name, format!("conn://{name}"))
        } else {
            PhysicDataSource::new(name, format!("conn://{name}"))
        };
        registry.register_data_source(ds).unwrap();
    }

    let metadata = Arc::new(InMemoryMetadataProvider::new());
    metadata.register(EntityMetadata {
        entity: "Order".to_string(),
        capability: ShardingCapability::DataSource,
        data_source_property: Some("Area".to_string()),
        table_property: None,
        multi_data_source: true,
        multi_table: false,
        single_key: true,
        primary_key: "Id".to_string(),
    });

    let engine = RouteRuleEngine::new(Arc::clone(&registry), metadata);
    engine.bind_data_source_route(
        "Order",
        Arc::new(LookupShardRoute::new(
            "Order",
            [
                (ShardValue::from("A"), "A".to_string()),
                (ShardValue::from("B"), "B".to_string()),
                (ShardValue::from("C"), "C".to_string()),
            ],
        )),
    );
    (registry, engine)
}

fn target(name: &str) -> PhysicalTarget {
    PhysicalTarget::data_source_only(name)
}

/// Store holding 2 orders in A, 3 in B, 5 in C.
fn seeded_store() -> Arc<InMemoryShardStore<i64>> {
    let store = Arc::new(InMemoryShardStore::new());
    store.load(&target("A"), vec![1, 2]);
    store.load(&target("B"), vec![3, 4, 5]);
    store.load(&target("C"), vec![6, 7, 8, 9, 10]);
    store
}

// =============================================================================
// ROUTING FLOWS
// =============================================================================

#[tokio::test]
async fn test_exact_area_routes_to_single_shard() {
    let (_, engine) = order_topology();
    let result = engine
        .route(&RouteQuery::single(
            "Order",
            RouteCondition::Value(ShardValue::from("B")),
        ))
        .unwrap();
    assert_eq!(result.sorted(), vec![target("B")]);
}

#[tokio::test]
async fn test_unfiltered_query_routes_to_all_shards() {
    let (_, engine) = order_topology();
    let result = engine.route(&RouteQuery::full_scan("Order")).unwrap();
    assert_eq!(result.sorted(), vec![target("A"), target("B"), target("C")]);
}

#[test]
fn test_second_default_data_source_is_fatal() {
    let registry = TargetRegistry::new();
    registry
        .register_data_source(PhysicDataSource::default_source("A", "conn://A"))
        .unwrap();
    let err = registry
        .register_data_source(PhysicDataSource::default_source("B", "conn://B"))
        .unwrap_err();
    assert!(matches!(
        err,
        ShardingError::DuplicateDefaultDataSource { .. }
    ));
    // The first default survives the failed registration.
    assert_eq!(registry.default_data_source_name().unwrap(), "A");
}

// =============================================================================
// ROUTE-THEN-MERGE FLOWS
// =============================================================================

#[tokio::test]
async fn test_unfiltered_count_sums_all_shards() {
    let (_, engine) = order_topology();
    let targets = engine
        .route(&RouteQuery::full_scan("Order"))
        .unwrap()
        .sorted();

    let store = seeded_store();
    let session = MergeSession::new();
    let merged = AggregateMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast))
        .count(
            &session,
            &targets,
            Arc::new(CountUnit::new(store)),
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    assert_eq!(merged.value, 10);
    assert_eq!(session.phase(), MergePhase::Complete);
    assert_eq!(session.total_recorded(), 10.0);
}

#[tokio::test]
async fn test_routed_count_touches_only_matching_shard() {
    let (_, engine) = order_topology();
    let targets = engine
        .route(&RouteQuery::single(
            "Order",
            RouteCondition::Value(ShardValue::from("C")),
        ))
        .unwrap()
        .sorted();

    let merged = AggregateMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast))
        .count(
            &MergeSession::new(),
            &targets,
            Arc::new(CountUnit::new(seeded_store())),
            &CancelSignal::never(),
        )
        .await
        .unwrap();
    assert_eq!(merged.value, 5);
}

#[tokio::test]
async fn test_streamed_rows_cover_every_shard() {
    let (_, engine) = order_topology();
    let targets = engine
        .route(&RouteQuery::full_scan("Order"))
        .unwrap()
        .sorted();

    let session = Arc::new(MergeSession::new());
    let mut stream = StreamingMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast))
        .merge(
            Arc::clone(&session),
            &targets,
            Arc::new(StreamUnit::new(seeded_store())),
            &CancelSignal::never(),
        )
        .unwrap();

    let mut rows = Vec::new();
    while let Some(item) = stream.next().await {
        rows.push(item.unwrap());
    }
    rows.sort();
    assert_eq!(rows, (1..=10).collect::<Vec<i64>>());
    assert_eq!(session.phase(), MergePhase::Complete);
}

// =============================================================================
// PAGINATION ACROSS PARTITIONINGS
// =============================================================================

/// Split the same logical rows across targets two different ways.
fn partitioned_store(split: &[(&str, Vec<i64>)]) -> Arc<InMemoryShardStore<i64>> {
    let store = Arc::new(InMemoryShardStore::new());
    for (name, rows) in split {
        store.load(&target(name), rows.clone());
    }
    store
}

#[tokio::test]
async fn test_page_window_invariant_under_repartitioning() {
    let all: Vec<i64> = (1..=30).collect();
    let window = PageWindow::new(10, 5);
    let engine = PagedMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast));

    let by_range = partitioned_store(&[
        ("A", all[..10].to_vec()),
        ("B", all[10..20].to_vec()),
        ("C", all[20..].to_vec()),
    ]);
    let by_stride = partitioned_store(&[
        ("A", all.iter().copied().step_by(3).collect()),
        ("B", all.iter().copied().skip(1).step_by(3).collect()),
        ("C", all.iter().copied().skip(2).step_by(3).collect()),
    ]);

    let targets = [target("A"), target("B"), target("C")];
    let mut pages = Vec::new();
    for store in [by_range, by_stride] {
        let page = engine
            .page(
                &MergeSession::new(),
                &targets,
                Arc::new(PagedFetchUnit::new(store)),
                window,
                OrderSpec::by_key(|row: &i64| *row),
                &CancelSignal::never(),
            )
            .await
            .unwrap();
        pages.push(page.rows);
    }
    assert_eq!(pages[0], pages[1]);
    assert_eq!(pages[0], vec![11, 12, 13, 14, 15]);
}

// =============================================================================
// AGGREGATES AND FAILURE HANDLING
// =============================================================================

/// Average over shard-local (sum, count) pairs must match the flat
/// average no matter how rows land on shards.
#[test]
fn test_average_invariant_under_random_partitioning() {
    use rand::Rng;

    struct PairUnit {
        store: Arc<InMemoryShardStore<i64>>,
    }

    #[async_trait::async_trait]
    impl ExecutionUnit<(f64, u64)> for PairUnit {
        async fn run(
            &self,
            target: &PhysicalTarget,
            _cancel: CancelSignal,
        ) -> Result<(f64, u64), ShardingError> {
            let rows = self.store.rows_for(target);
            let sum: i64 = rows.iter().sum();
            Ok((sum as f64, rows.len() as u64))
        }
    }

    let mut rng = rand::thread_rng();
    let values: Vec<i64> = (0..200).map(|_| rng.gen_range(-1000..1000)).collect();
    let flat_avg = values.iter().sum::<i64>() as f64 / values.len() as f64;

    // Scatter rows over three shards at random.
    let store = Arc::new(InMemoryShardStore::new());
    let names = ["A", "B", "C"];
    for value in &values {
        let name = names[rng.gen_range(0..names.len())];
        store.insert(&target(name), *value);
    }

    let merged = tokio_test::block_on(async {
        AggregateMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast))
            .average(
                &MergeSession::new(),
                &[target("A"), target("B"), target("C")],
                Arc::new(PairUnit { store }),
                &CancelSignal::never(),
            )
            .await
            .unwrap()
    });
    let avg = merged.value.unwrap();
    assert!((avg - flat_avg).abs() < 1e-9);
}

#[tokio::test]
async fn test_cancellation_releases_all_units() {
    struct Stuck;

    #[async_trait::async_trait]
    impl ExecutionUnit<u64> for Stuck {
        async fn run(
            &self,
            _target: &PhysicalTarget,
            cancel: CancelSignal,
        ) -> Result<u64, ShardingError> {
            cancel.cancelled().await;
            Err(ShardingError::Cancelled)
        }
    }

    let source = CancelSource::new();
    let signal = source.signal();
    let task = tokio::spawn(async move {
        AggregateMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast))
            .count(
                &MergeSession::new(),
                &[target("A"), target("B"), target("C")],
                Arc::new(Stuck),
                &signal,
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    source.cancel();

    // Every unit settles promptly once cancellation lands.
    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("cancelled fan-out must settle")
        .unwrap();
    assert!(matches!(result, Err(ShardingError::Cancelled)));
}
