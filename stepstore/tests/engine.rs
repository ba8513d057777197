#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stepstore::decomposition::{decompose, ProcessGrid};
use stepstore::element::Element;
use stepstore::object_key::{DefaultObjectKeyEncoding, ObjectKeyEncodingTraits, ObjectKeyParts};
use stepstore::storage::transport::MemoryTransport;
use stepstore::storage::transport_adapter::performance_metrics::PerformanceMetricsTransportAdapter;
use stepstore::storage::{Bytes, ObjectKey, OpenMode, StorageError, StorageTransportTraits};
use stepstore::variable::{ElementType, Variable, VariableCatalog};
use stepstore::{EngineConfig, EngineError, EngineStatus, PutMode, StepEngine, StepMode};

type Metrics = PerformanceMetricsTransportAdapter<MemoryTransport>;

fn config(params: &[(&str, &str)]) -> EngineConfig {
    EngineConfig::from_params(
        [("jobId", "job42"), ("experimentName", "heat")]
            .iter()
            .chain(params)
            .copied(),
    )
    .unwrap()
}

fn catalog_ab() -> Arc<VariableCatalog> {
    let mut catalog = VariableCatalog::new();
    catalog
        .declare(Variable::new("varA", ElementType::Float32, vec![8], vec![4], vec![4]).unwrap())
        .unwrap();
    catalog
        .declare(Variable::new("varB", ElementType::UInt8, vec![], vec![], vec![]).unwrap())
        .unwrap();
    Arc::new(catalog)
}

fn metrics_transport() -> (Arc<MemoryTransport>, Arc<Metrics>) {
    let memory = Arc::new(MemoryTransport::new());
    let metrics = Arc::new(PerformanceMetricsTransportAdapter::new(memory.clone()));
    (memory, metrics)
}

#[test]
fn engine_two_ranks_three_steps() -> Result<(), Box<dyn Error>> {
    let grid = ProcessGrid::try_from([1u64, 2].as_slice())?;
    let global_shape = grid.global_shape(&[2, 2])?;
    assert_eq!(global_shape, vec![2, 4]);

    let (memory, metrics) = metrics_transport();
    for rank in 0..2u32 {
        let block = decompose(&global_shape, &grid, rank.into())?;
        let mut catalog = VariableCatalog::new();
        catalog.declare(Variable::from_decomposition(
            "Temperature",
            ElementType::Float64,
            &block,
        )?)?;
        let mut engine = StepEngine::open(
            "heat.bp",
            Arc::new(catalog),
            metrics.clone(),
            config(&[]),
            rank.into(),
            OpenMode::Write,
        )?;
        for step in 0..3u32 {
            engine.begin_step(StepMode::Append, None)?;
            let value = f64::from(step * 10 + rank);
            engine.put("Temperature", &[value; 4], PutMode::Deferred)?;
            engine.end_step()?;
        }
        engine.close()?;
        assert_eq!(engine.current_step(), Some(3));
    }
    assert_eq!(metrics.writes(), 6);
    assert_eq!(metrics.bytes_written(), 6 * 4 * 8);

    let encoding = DefaultObjectKeyEncoding::new_slash();
    let keys = memory.list();
    assert_eq!(keys.len(), 6);
    let parts = keys
        .iter()
        .map(|key| encoding.decode(key))
        .collect::<Result<Vec<_>, _>>()?;
    for part in &parts {
        assert_eq!(part.job_id, "job42");
        assert_eq!(part.experiment_name, "heat");
        assert_eq!(part.variable_name, "Temperature");
        assert_eq!(part.variable_version, 0);
        assert_eq!(part.offsets, vec![0, 2 * part.rank]);
        assert!(part.timestep < 3);
    }
    for a in &parts {
        for b in &parts {
            let fields = a.differing_fields(b);
            if a.rank == b.rank {
                assert!(fields == vec!["timestep"] || fields.is_empty());
            } else if a.timestep == b.timestep {
                assert_eq!(fields, vec!["offsets", "rank"]);
            } else {
                assert_eq!(fields, vec!["timestep", "offsets", "rank"]);
            }
        }
    }
    let distinct: BTreeSet<_> = parts.iter().map(|p| (p.timestep, p.rank)).collect();
    assert_eq!(distinct.len(), 6);

    let key = encoding.encode(
        &ObjectKeyParts::new("job42", "heat", "Temperature")
            .with_timestep(2)
            .with_offsets([0, 2])
            .with_rank(1),
    );
    assert_eq!(key.as_str(), "job42/heat/2/Temperature/0/0/2/1");
    memory.open("check", OpenMode::Read)?;
    assert_eq!(
        memory.read(&key)?,
        Some(Bytes::from(f64::to_bytes(&[21.0; 4]).into_owned()))
    );
    Ok(())
}

#[test]
fn engine_one_write_per_deferred_put() -> Result<(), Box<dyn Error>> {
    let (_, metrics) = metrics_transport();
    let mut engine = StepEngine::open(
        "one",
        catalog_ab(),
        metrics.clone(),
        config(&[]),
        0,
        OpenMode::Write,
    )?;
    engine.begin_step(StepMode::Append, None)?;
    engine.put("varA", &[1.0f32, 2.0, 3.0, 4.0], PutMode::Deferred)?;
    assert!(engine.needs_flush());
    engine.end_step()?;
    assert_eq!(metrics.writes(), 1);
    assert_eq!(metrics.bytes_written(), 16);
    engine.close()?;
    assert_eq!(metrics.writes(), 1);
    Ok(())
}

#[test]
fn engine_perform_puts_without_data() -> Result<(), Box<dyn Error>> {
    let (_, metrics) = metrics_transport();
    let mut engine = StepEngine::open(
        "empty",
        catalog_ab(),
        metrics.clone(),
        config(&[]),
        0,
        OpenMode::Write,
    )?;
    engine.begin_step(StepMode::Append, None)?;
    engine.perform_puts()?;
    engine.perform_puts()?;
    assert_eq!(metrics.writes(), 0);

    engine.put("varB", &[7u8], PutMode::Sync)?;
    engine.perform_puts()?;
    assert_eq!(metrics.writes(), 1);
    engine.perform_puts()?;
    engine.end_step()?;
    assert_eq!(metrics.writes(), 1);
    engine.close()?;
    Ok(())
}

#[test]
fn engine_close_twice() -> Result<(), Box<dyn Error>> {
    let (memory, metrics) = metrics_transport();
    let mut engine = StepEngine::open(
        "close",
        catalog_ab(),
        metrics.clone(),
        config(&[]),
        0,
        OpenMode::Write,
    )?;
    engine.put("varB", &[1u8], PutMode::Deferred)?;
    engine.close()?;
    let writes = metrics.writes();
    let list = memory.list();
    engine.close()?;
    assert_eq!(engine.status(), EngineStatus::Closed);
    assert_eq!(metrics.writes(), writes);
    assert_eq!(metrics.closes(), 1);
    assert_eq!(memory.list(), list);
    assert_eq!(list.len(), 1);
    Ok(())
}

#[test]
fn engine_collision_at_open() -> Result<(), Box<dyn Error>> {
    let (memory, metrics) = metrics_transport();
    let key = DefaultObjectKeyEncoding::new_slash().encode(
        &ObjectKeyParts::new("job42", "heat", "varB").with_rank(3),
    );
    memory.open("existing", OpenMode::Write)?;
    memory.write(&key, Bytes::from_static(b"old"), 0)?;
    memory.close()?;

    let result = StepEngine::open(
        "collide",
        catalog_ab(),
        metrics.clone(),
        config(&[]),
        3,
        OpenMode::Write,
    );
    match result {
        Err(EngineError::ObjectCollision {
            rank,
            step,
            variable,
            key: collided,
        }) => {
            assert_eq!((rank, step, variable.as_str()), (3, 0, "varB"));
            assert_eq!(collided, key);
        }
        other => panic!("expected a collision, got {other:?}"),
    }
    assert_eq!(metrics.exists_checks(), 2);
    assert_eq!(metrics.closes(), 1);
    assert!(!memory.is_open());

    // Another rank does not collide
    let mut engine = StepEngine::open(
        "collide",
        catalog_ab(),
        metrics.clone(),
        config(&[]),
        2,
        OpenMode::Write,
    )?;
    engine.close()?;
    Ok(())
}

#[test]
fn engine_collision_at_write() -> Result<(), Box<dyn Error>> {
    let (memory, metrics) = metrics_transport();
    let key = DefaultObjectKeyEncoding::new_slash().encode(
        &ObjectKeyParts::new("job42", "heat", "varA")
            .with_timestep(1)
            .with_offsets([4])
            .with_rank(0),
    );
    memory.open("existing", OpenMode::Write)?;
    memory.write(&key, Bytes::from_static(b"old"), 0)?;

    let mut engine = StepEngine::open(
        "collide",
        catalog_ab(),
        metrics.clone(),
        config(&[]),
        0,
        OpenMode::Write,
    )?;
    engine.put("varA", &[0.0f32; 4], PutMode::Deferred)?;
    engine.end_step()?;
    engine.put("varA", &[1.0f32; 4], PutMode::Deferred)?;
    let err = engine.end_step().unwrap_err();
    assert!(
        matches!(&err, EngineError::ObjectCollision { step: 1, key: k, .. } if *k == key),
        "{err}"
    );
    assert_eq!(engine.status(), EngineStatus::Stepping);
    assert_eq!(metrics.writes(), 1);
    engine.close()?;

    memory.open("check", OpenMode::Read)?;
    assert_eq!(memory.read(&key)?, Some(Bytes::from_static(b"old")));
    Ok(())
}

#[test]
fn engine_collision_overwrite() -> Result<(), Box<dyn Error>> {
    testing_logger::setup();
    let (memory, metrics) = metrics_transport();
    let key = DefaultObjectKeyEncoding::new_slash()
        .encode(&ObjectKeyParts::new("job42", "heat", "varB"));
    memory.open("existing", OpenMode::Write)?;
    memory.write(&key, Bytes::from_static(b"old"), 0)?;

    let mut engine = StepEngine::open(
        "overwrite",
        catalog_ab(),
        metrics.clone(),
        config(&[("collisionPolicy", "overwrite")]),
        0,
        OpenMode::Write,
    )?;
    engine.put("varB", &[9u8], PutMode::Deferred)?;
    engine.close()?;
    assert_eq!(metrics.exists_checks(), 0);
    assert_eq!(metrics.writes(), 1);

    memory.open("check", OpenMode::Read)?;
    assert_eq!(memory.read(&key)?, Some(Bytes::from_static(&[9])));

    testing_logger::validate(|captured_logs| {
        assert_eq!(captured_logs.len(), 1);
        assert_eq!(captured_logs[0].level, log::Level::Warn);
        assert!(captured_logs[0].body.contains("overwrite"));
    });
    Ok(())
}

#[test]
fn engine_verbose_tracing() -> Result<(), Box<dyn Error>> {
    testing_logger::setup();
    let (_, metrics) = metrics_transport();
    let mut engine = StepEngine::open(
        "quiet",
        catalog_ab(),
        metrics.clone(),
        config(&[("verbose", "4")]),
        0,
        OpenMode::Write,
    )?;
    engine.put("varB", &[1u8], PutMode::Deferred)?;
    engine.end_step()?;
    engine.close()?;
    testing_logger::validate(|captured_logs| {
        assert!(captured_logs.is_empty());
    });

    testing_logger::setup();
    let mut engine = StepEngine::open(
        "loud",
        catalog_ab(),
        metrics.clone(),
        config(&[("verbose", "5")]),
        1,
        OpenMode::Write,
    )?;
    engine.begin_step(StepMode::Append, None)?;
    engine.put("varB", &[1u8], PutMode::Deferred)?;
    engine.end_step()?;
    engine.close()?;
    testing_logger::validate(|captured_logs| {
        let bodies: Vec<&str> = captured_logs.iter().map(|log| log.body.as_str()).collect();
        assert!(captured_logs
            .iter()
            .all(|log| log.level == log::Level::Debug));
        for expected in ["opened loud", "begin_step 0", "put varB", "wrote job42/heat/0/varB/0/1", "end_step", "close loud"] {
            assert!(
                bodies.iter().any(|body| body.contains(expected)),
                "{expected} not in {bodies:?}"
            );
        }
    });
    Ok(())
}

#[test]
fn engine_object_larger_than_target() -> Result<(), Box<dyn Error>> {
    testing_logger::setup();
    let (_, metrics) = metrics_transport();
    let mut engine = StepEngine::open(
        "large",
        catalog_ab(),
        metrics.clone(),
        config(&[("targetObjectSize", "8")]),
        0,
        OpenMode::Write,
    )?;
    engine.put("varA", &[0.0f32; 4], PutMode::Deferred)?;
    engine.close()?;
    assert_eq!(metrics.writes(), 1);
    testing_logger::validate(|captured_logs| {
        assert_eq!(captured_logs.len(), 1);
        assert_eq!(captured_logs[0].level, log::Level::Warn);
        assert!(captured_logs[0].body.contains("16 bytes"));
    });
    Ok(())
}

#[test]
fn engine_write_error() -> Result<(), Box<dyn Error>> {
    let (memory, metrics) = metrics_transport();
    let mut engine = StepEngine::open(
        "closed",
        catalog_ab(),
        metrics.clone(),
        config(&[]),
        0,
        OpenMode::Write,
    )?;
    // The backend is closed underneath the engine
    memory.close()?;
    engine.put("varB", &[1u8], PutMode::Deferred)?;
    let err = engine.end_step().unwrap_err();
    assert!(
        matches!(&err, EngineError::Write { rank: 0, step: 0, variable, .. } if variable == "varB"),
        "{err}"
    );
    assert_eq!(engine.status(), EngineStatus::Stepping);
    assert_eq!(engine.pending_bytes(), 1);
    assert!(engine.close().is_err());
    assert_eq!(engine.status(), EngineStatus::Closed);
    Ok(())
}

/// A memory transport whose next `failures` writes fail.
#[derive(Debug, Default)]
struct FailingTransport {
    memory: MemoryTransport,
    failures: AtomicUsize,
}

impl FailingTransport {
    fn fail_next_writes(&self, failures: usize) {
        self.failures.store(failures, Ordering::SeqCst);
    }
}

impl StorageTransportTraits for FailingTransport {
    fn open(&self, name: &str, mode: OpenMode) -> Result<(), StorageError> {
        self.memory.open(name, mode)
    }

    fn is_open(&self) -> bool {
        self.memory.is_open()
    }

    fn size_key(&self, key: &ObjectKey) -> Result<Option<u64>, StorageError> {
        self.memory.size_key(key)
    }

    fn write(&self, key: &ObjectKey, value: Bytes, size_hint: u64) -> Result<(), StorageError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(StorageError::Other(format!("write of {key} failed")))
        } else {
            self.memory.write(key, value, size_hint)
        }
    }

    fn read(&self, key: &ObjectKey) -> Result<Option<Bytes>, StorageError> {
        self.memory.read(key)
    }

    fn close(&self) -> Result<(), StorageError> {
        self.memory.close()
    }
}

#[test]
fn engine_end_step_retry_after_write_error() -> Result<(), Box<dyn Error>> {
    let transport = Arc::new(FailingTransport::default());
    let mut engine = StepEngine::open(
        "retry",
        catalog_ab(),
        transport.clone(),
        config(&[]),
        0,
        OpenMode::Write,
    )?;
    engine.begin_step(StepMode::Append, None)?;
    engine.put("varA", &[1.0f32, 2.0, 3.0, 4.0], PutMode::Deferred)?;
    transport.fail_next_writes(1);
    assert!(matches!(engine.end_step(), Err(EngineError::Write { .. })));
    assert_eq!(engine.pending_bytes(), 16);
    assert!(engine.needs_flush());
    assert_eq!(engine.current_step(), Some(0));

    engine.end_step()?;
    assert_eq!(engine.current_step(), Some(1));
    assert_eq!(engine.pending_bytes(), 0);
    let key = engine.object_key("varA", 0)?;
    assert_eq!(
        transport.memory.read(&key)?.unwrap(),
        [1.0f32, 2.0, 3.0, 4.0].map(f32::to_ne_bytes).concat()
    );
    engine.close()?;
    Ok(())
}

#[test]
fn engine_rewrite_retry_after_write_error() -> Result<(), Box<dyn Error>> {
    let transport = Arc::new(FailingTransport::default());
    let mut engine = StepEngine::open(
        "retry",
        catalog_ab(),
        transport.clone(),
        config(&[]),
        0,
        OpenMode::Write,
    )?;
    engine.begin_step(StepMode::Append, None)?;
    engine.put("varB", &[1u8], PutMode::Deferred)?;
    engine.perform_puts()?;
    engine.put("varB", &[2u8], PutMode::Deferred)?;
    transport.fail_next_writes(1);
    assert!(matches!(engine.perform_puts(), Err(EngineError::Write { .. })));

    // The retry still rewrites the object written earlier in the step
    engine.perform_puts()?;
    engine.end_step()?;
    let key = engine.object_key("varB", 0)?;
    assert_eq!(transport.memory.read(&key)?.unwrap(), vec![1u8, 2]);
    engine.close()?;
    Ok(())
}

#[test]
fn engine_key_separator() -> Result<(), Box<dyn Error>> {
    let (memory, metrics) = metrics_transport();
    let mut engine = StepEngine::open(
        "dots",
        catalog_ab(),
        metrics.clone(),
        config(&[("keySeparator", "."), ("experimentName", "heat.v2")]),
        0,
        OpenMode::Write,
    )?;
    engine.put("varB", &[1u8], PutMode::Deferred)?;
    engine.close()?;
    assert_eq!(
        memory.list()[0].as_str(),
        "job42.heat%2Ev2.0.varB.0.0"
    );
    Ok(())
}
