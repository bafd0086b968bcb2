//! Batched writer behavior tests.
//!
//! Tests:
//! - Concurrent waiting writes all succeed and are visible afterward
//! - Batch size cap holds under bursts
//! - Fire-and-forget submissions never block
//! - Stop reaches termination within one poll interval plus the in-flight batch
//! - Whole-batch rollback still signals every waiter
//! - 150 queued writes are applied as 100 + 50

mod common;

use batchwrite::engine::reader::ReaderPool;
use batchwrite::engine::sqlite::SqliteEngine;
use batchwrite::engine::Parameters;
use batchwrite::flow::completion::WriteOutcome;
use batchwrite::writer::{Writer, WriterConfig, WriterError, WriterPhase, MAX_BATCH_SIZE};
use common::{params, wait_for, MemoryEngine, TestFixture};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for conditions that should hold almost immediately.
const WAIT: Duration = Duration::from_secs(5);

const CREATE: &str = "CREATE (n)";
const WAITED: &str = "CREATE (waited)";
const INSERT_NAME: &str = "INSERT INTO nodes (name) VALUES (:name)";

fn fast_config() -> WriterConfig {
    WriterConfig {
        poll_interval: Duration::from_millis(50),
        write_timeout: Duration::from_secs(10),
        ..WriterConfig::default()
    }
}

fn sqlite_with_nodes(fixture: &TestFixture) -> SqliteEngine {
    let engine = SqliteEngine::open(&fixture.db_path).expect("open engine");
    engine
        .execute(
            "CREATE TABLE nodes (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            &Parameters::new(),
        )
        .expect("create table");
    engine
}

fn node_count(pool: &ReaderPool) -> i64 {
    let rows = pool
        .query("SELECT COUNT(*) AS n FROM nodes", &Parameters::new())
        .expect("count query");
    rows[0]["n"].as_i64().expect("count is an integer")
}

fn named(name: &str) -> Parameters {
    params(json!({ "name": name }))
}

fn numbered(i: usize) -> String {
    format!("CREATE (n {{i: {i}}})")
}

#[test]
fn test_concurrent_waiting_writes_are_applied_and_visible() {
    let fixture = TestFixture::new();
    let writer = Writer::spawn(sqlite_with_nodes(&fixture), fast_config()).unwrap();
    let pool = ReaderPool::new(&fixture.db_path, 2).unwrap();

    let callers: Vec<_> = (0..16)
        .map(|caller| {
            let handle = writer.handle();
            thread::spawn(move || {
                for i in 0..25 {
                    let name = format!("caller-{caller}-{i}");
                    let outcome = handle
                        .submit_and_wait(INSERT_NAME, named(&name))
                        .expect("write should not time out");
                    assert_eq!(outcome, WriteOutcome::Applied);
                }
            })
        })
        .collect();

    for caller in callers {
        caller.join().expect("caller panicked");
    }

    // Every acknowledged write is already visible
    assert_eq!(node_count(&pool), 16 * 25);
    writer.shutdown().unwrap();
}

#[test]
fn test_create_then_read_shows_one_more_node() {
    let fixture = TestFixture::new();
    let writer = Writer::spawn(sqlite_with_nodes(&fixture), fast_config()).unwrap();
    let pool = ReaderPool::new(&fixture.db_path, 1).unwrap();
    let handle = writer.handle();

    let before = node_count(&pool);
    let start = Instant::now();
    let outcome = handle.submit_and_wait(INSERT_NAME, named("Jim-Bob"));

    assert!(outcome.unwrap().is_applied());
    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(node_count(&pool), before + 1);

    let rows = pool
        .query("SELECT name FROM nodes", &Parameters::new())
        .unwrap();
    assert_eq!(rows[0]["name"], json!("Jim-Bob"));
    writer.shutdown().unwrap();
}

#[test]
fn test_create_node_with_recording_engine() {
    let engine = MemoryEngine::new();
    let writer = Writer::spawn(engine.clone(), fast_config()).unwrap();
    let handle = writer.handle();

    let before = engine.committed().len();
    let outcome = handle.submit_and_wait(CREATE, Parameters::new());

    assert_eq!(outcome.unwrap(), WriteOutcome::Applied);
    assert_eq!(engine.committed().len(), before + 1);
    writer.shutdown().unwrap();
}

#[test]
fn test_150_queued_writes_apply_as_two_units() {
    let engine = MemoryEngine::new();
    let mut writer = Writer::new(engine.clone(), fast_config());
    let handle = writer.handle();

    for i in 0..150 {
        handle.submit_async(numbered(i), Parameters::new()).unwrap();
    }
    writer.start().unwrap();

    assert!(wait_for(WAIT, || engine.committed().len() == 150));
    assert_eq!(engine.units_opened(), 2);
    assert_eq!(engine.unit_sizes(), vec![100, 50]);
    assert_eq!(engine.commits(), 2);
    assert_eq!(engine.rollbacks(), 0);
    writer.shutdown().unwrap();
}

#[test]
fn test_batch_size_never_exceeds_cap_under_bursts() {
    let engine = MemoryEngine::new();
    let writer = Writer::spawn(engine.clone(), fast_config()).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let handle = writer.handle();
            thread::spawn(move || {
                for i in 0..500 {
                    handle.submit_async(numbered(i), Parameters::new()).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let patience = Duration::from_secs(10);
    assert!(wait_for(patience, || engine.committed().len() == 2_000));

    let sizes = engine.unit_sizes();
    let within_cap = sizes.iter().all(|&s| (1..=MAX_BATCH_SIZE).contains(&s));
    assert!(within_cap, "sizes: {sizes:?}");
    assert_eq!(sizes.iter().sum::<usize>(), 2_000);
    writer.shutdown().unwrap();
}

#[test]
fn test_small_batch_cap_is_respected() {
    let engine = MemoryEngine::new();
    let config = WriterConfig {
        max_batch_size: 7,
        ..fast_config()
    };
    let mut writer = Writer::new(engine.clone(), config);
    let handle = writer.handle();
    for _ in 0..20 {
        handle.submit_async(CREATE, Parameters::new()).unwrap();
    }
    writer.start().unwrap();

    assert!(wait_for(WAIT, || engine.committed().len() == 20));
    assert_eq!(engine.unit_sizes(), vec![7, 7, 6]);
    writer.shutdown().unwrap();
}

#[test]
fn test_single_producer_order_is_preserved() {
    let engine = MemoryEngine::new();
    let writer = Writer::spawn(engine.clone(), fast_config()).unwrap();
    let handle = writer.handle();

    let statements: Vec<String> = (0..300).map(numbered).collect();
    for statement in &statements {
        handle.submit_async(statement, Parameters::new()).unwrap();
    }

    assert!(wait_for(WAIT, || engine.committed().len() == 300));
    assert_eq!(engine.committed(), statements);
    writer.shutdown().unwrap();
}

#[test]
fn test_submit_async_never_blocks() {
    // Writer never started: nothing drains the queue
    let delay = Duration::from_secs(1);
    let engine = MemoryEngine::new().with_execute_delay(delay);
    let writer = Writer::new(engine, fast_config());
    let handle = writer.handle();

    let start = Instant::now();
    for _ in 0..20_000 {
        handle.submit_async(CREATE, Parameters::new()).unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(handle.pending(), 20_000);
}

#[test]
fn test_stop_terminates_promptly_under_load() {
    let delay = Duration::from_millis(1);
    let engine = MemoryEngine::new().with_execute_delay(delay);
    let poll_interval = Duration::from_millis(100);
    let config = WriterConfig {
        poll_interval,
        ..fast_config()
    };
    let mut writer = Writer::spawn(engine.clone(), config).unwrap();
    let handle = writer.handle();
    let producing = Arc::new(AtomicBool::new(true));

    // Fire-and-forget load, slower than the writer drains it
    let producer = {
        let handle = handle.clone();
        let producing = Arc::clone(&producing);
        thread::spawn(move || {
            let mut sent = 0;
            while producing.load(Ordering::SeqCst) {
                handle.submit_async(CREATE, Parameters::new()).unwrap();
                sent += 1;
                thread::sleep(Duration::from_millis(2));
            }
            sent
        })
    };

    // A caller waiting on each of its writes in turn
    let waiter = {
        let handle = handle.clone().with_write_timeout(Duration::from_secs(1));
        let producing = Arc::clone(&producing);
        thread::spawn(move || {
            let (mut submitted, mut applied) = (0, 0);
            while producing.load(Ordering::SeqCst) {
                submitted += 1;
                match handle.submit_and_wait(WAITED, Parameters::new()) {
                    Ok(outcome) => {
                        assert_eq!(outcome, WriteOutcome::Applied);
                        applied += 1;
                    }
                    // Queued behind the stop; never picked up
                    Err(e) => {
                        assert!(matches!(e, WriterError::Timeout(_)), "{e}");
                        break;
                    }
                }
            }
            (submitted, applied)
        })
    };

    assert!(wait_for(WAIT, || engine.commits() >= 3));

    let start = Instant::now();
    writer.stop();
    writer.join().unwrap();
    let elapsed = start.elapsed();

    // One poll interval plus one full in-flight batch (100 x 1ms), with slack
    let in_flight = Duration::from_millis(MAX_BATCH_SIZE as u64 * 5);
    let budget = poll_interval + in_flight + Duration::from_millis(500);
    assert!(elapsed < budget, "stop took {elapsed:?}");
    assert_eq!(writer.state().phase(), WriterPhase::Terminated);

    producing.store(false, Ordering::SeqCst);
    let sent = producer.join().unwrap();
    let (waited, applied) = waiter.join().unwrap();

    // The batch in flight at stop() finished: committed and signaled
    let committed = engine.committed();
    assert_eq!(engine.rollbacks(), 0);
    assert_eq!(engine.commits(), engine.units_opened());
    assert_eq!(engine.unit_sizes().iter().sum::<usize>(), committed.len());

    // Whatever was not committed is still queued; nothing got lost
    assert_eq!(committed.len() + handle.pending(), sent + waited);
    let waited_committed = committed.iter().filter(|s| *s == WAITED);
    assert_eq!(waited_committed.count(), applied);
}

#[test]
fn test_failed_batch_rolls_back_and_still_signals_every_waiter() {
    // Every statement fails
    let engine = MemoryEngine::failing_on("");
    let mut writer = Writer::new(engine.clone(), fast_config());
    let handle = writer.handle();

    let waiters: Vec<_> = (0..5)
        .map(|i| {
            let handle = handle.clone();
            let (statement, params) = (numbered(i), Parameters::new());
            thread::spawn(move || handle.submit_and_wait(statement, params))
        })
        .collect();

    // All five queued before the writer runs, so they share one unit
    assert!(wait_for(WAIT, || handle.pending() == 5));
    writer.start().unwrap();

    for waiter in waiters {
        let result = waiter.join().unwrap();
        // The wait itself succeeds even though the batch aborted
        let outcome = result.expect("aborted batch must still signal its waiters");
        match outcome {
            WriteOutcome::Aborted { cause } => assert!(cause.contains("rejected")),
            WriteOutcome::Applied => panic!("nothing in a failed batch is applied"),
        }
    }

    assert!(engine.committed().is_empty());
    assert_eq!(engine.units_opened(), 1);
    assert_eq!(engine.rollbacks(), 1);
    assert_eq!(engine.commits(), 0);
    writer.shutdown().unwrap();
}

#[test]
fn test_one_bad_statement_aborts_whole_sqlite_batch() {
    let fixture = TestFixture::new();
    let mut writer = Writer::new(sqlite_with_nodes(&fixture), fast_config());
    let pool = ReaderPool::new(&fixture.db_path, 1).unwrap();
    let handle = writer.handle();

    let good = {
        let handle = handle.clone();
        let params = named("good");
        thread::spawn(move || handle.submit_and_wait(INSERT_NAME, params))
    };
    assert!(wait_for(WAIT, || handle.pending() == 1));
    let bad = {
        let handle = handle.clone();
        let (null, params) = ("INSERT INTO nodes (name) VALUES (NULL)", Parameters::new());
        thread::spawn(move || handle.submit_and_wait(null, params))
    };
    assert!(wait_for(WAIT, || handle.pending() == 2));

    writer.start().unwrap();

    let good = good.join().unwrap().unwrap();
    let bad = bad.join().unwrap().unwrap();
    assert!(!good.is_applied(), "shares the batch's fate");
    assert!(!bad.is_applied());
    assert!(matches!(good.into_result(), Err(WriterError::Aborted(_))));
    assert_eq!(node_count(&pool), 0);

    // Next batch is unaffected
    let outcome = handle.submit_and_wait(INSERT_NAME, named("after"));
    assert!(outcome.unwrap().is_applied());
    assert_eq!(node_count(&pool), 1);
    writer.shutdown().unwrap();
}

#[test]
fn test_begin_failure_aborts_batch_and_loop_continues() {
    let engine = MemoryEngine::new();
    engine.set_fail_begin(true);
    let writer = Writer::spawn(engine.clone(), fast_config()).unwrap();
    let handle = writer.handle();

    let outcome = handle.submit_and_wait(CREATE, Parameters::new()).unwrap();
    match outcome {
        WriteOutcome::Aborted { cause } => assert!(cause.contains("begin"), "{cause}"),
        WriteOutcome::Applied => panic!("batch applied without a unit"),
    }

    engine.set_fail_begin(false);
    let outcome = handle.submit_and_wait(CREATE, Parameters::new()).unwrap();
    assert_eq!(outcome, WriteOutcome::Applied);
    assert_eq!(engine.committed().len(), 1);
    writer.shutdown().unwrap();
}

#[test]
fn test_timed_out_write_is_still_applied() {
    let delay = Duration::from_millis(300);
    let engine = MemoryEngine::new().with_execute_delay(delay);
    let writer = Writer::spawn(engine.clone(), fast_config()).unwrap();
    let handle = writer.handle();

    let timeout = Duration::from_millis(20);
    let (slow, params) = ("CREATE (slow)", Parameters::new());
    let result = handle.submit_and_wait_timeout(slow, params, timeout);
    assert!(matches!(result, Err(WriterError::Timeout(_))));

    // The caller stopped waiting; the write did not stop happening
    let expected = vec!["CREATE (slow)".to_string()];
    assert!(wait_for(WAIT, || engine.committed() == expected));
    writer.shutdown().unwrap();
}

#[test]
fn test_mixed_waiting_and_fire_and_forget() {
    let engine = MemoryEngine::new();
    let mut writer = Writer::new(engine.clone(), fast_config());
    let handle = writer.handle();

    for _ in 0..10 {
        handle.submit_async(CREATE, Parameters::new()).unwrap();
    }
    let waiter = {
        let handle = handle.clone();
        let params = Parameters::new();
        thread::spawn(move || handle.submit_and_wait(WAITED, params))
    };
    assert!(wait_for(WAIT, || handle.pending() == 11));
    writer.start().unwrap();

    assert_eq!(waiter.join().unwrap().unwrap(), WriteOutcome::Applied);
    assert_eq!(engine.unit_sizes(), vec![11]);
    writer.shutdown().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_writes_from_many_tasks() {
    let engine = MemoryEngine::new();
    let writer = Writer::spawn(engine.clone(), fast_config()).unwrap();

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let handle = writer.handle();
            let (statement, params) = (numbered(i), Parameters::new());
            tokio::spawn(async move { handle.write(statement, params).await })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    for result in results {
        let outcome = tokio_test::assert_ok!(result.expect("task panicked"));
        assert_eq!(outcome, WriteOutcome::Applied);
    }
    assert_eq!(engine.committed().len(), 64);

    tokio::task::spawn_blocking(move || writer.shutdown())
        .await
        .unwrap()
        .unwrap();
}
