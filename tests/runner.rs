use anyhow::bail;
use cronometro::{
    run, run_with_callback, CronometroError, Done, Routine, RunOptions, TestDefinition, Tests,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn quiet(iterations: i64) -> RunOptions {
    RunOptions::new().iterations(iterations).warmup(false).print(false)
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let c = Arc::new(AtomicUsize::new(0));
    (c.clone(), c)
}

#[test]
fn should_measure_passing_test_and_record_failing_one() -> anyhow::Result<()> {
    let tests = Tests::new()
        .sync("single", || Ok(()))
        .sync("multiple", || bail!("FAILED"));

    let results = run(tests, quiet(10))?;

    assert_eq!(results.names().collect::<Vec<_>>(), vec!["single", "multiple"]);

    let single = &results["single"];
    assert!(single.success);
    assert_eq!(single.size, 10);
    assert!(single.error.is_none());
    assert!(single.mean > 0.0);
    assert!(single.min <= single.max);
    assert_eq!(single.percentiles.len(), cronometro::PERCENTILES.len());

    let multiple = &results["multiple"];
    assert!(!multiple.success);
    assert_eq!(multiple.error.as_ref().map(|e| e.message()), Some("FAILED"));
    assert_eq!(multiple.size, 0);
    assert_eq!(multiple.mean, 0.0);
    assert!(multiple.percentiles.is_empty());
    Ok(())
}

#[test]
fn should_reject_invalid_iterations_before_running_anything() {
    let (calls, seen) = counter();
    let options = RunOptions::new()
        .iterations(-1)
        .print(false)
        .on_test_start(move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    let err = run(Tests::new().sync("single", || Ok(())), options).unwrap_err();
    assert!(matches!(err, CronometroError::InvalidIterations(-1)));
    assert_eq!(err.to_string(), "The iterations option must be a positive number.");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn should_reject_invalid_threshold() {
    let err = run(Tests::new(), quiet(10).error_threshold(150.0)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "The errorThreshold option must be a number between 0 and 100."
    );
}

#[test]
fn should_return_empty_results_for_empty_table() -> anyhow::Result<()> {
    let results = run(Tests::new(), quiet(10))?;
    assert!(results.is_empty());
    Ok(())
}

#[test]
fn should_treat_empty_definition_as_noop() -> anyhow::Result<()> {
    let tests = Tests::new().add("noop", TestDefinition::empty());
    let results = run(tests, quiet(25))?;
    assert!(results["noop"].success);
    assert_eq!(results["noop"].size, 25);
    Ok(())
}

#[test]
fn should_call_body_twice_as_often_when_warming_up() -> anyhow::Result<()> {
    let (calls, seen) = counter();
    let tests = Tests::new().sync("counted", move || {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let results = run(tests, quiet(50).warmup(true).error_threshold(0.0))?;
    assert_eq!(results["counted"].size, 50);
    assert_eq!(calls.load(Ordering::SeqCst), 100);
    Ok(())
}

#[test]
fn should_skip_body_and_teardown_when_setup_fails() -> anyhow::Result<()> {
    let (body_calls, body_seen) = counter();
    let (after_calls, after_seen) = counter();
    let definition = TestDefinition::new(Routine::sync(move || {
        body_seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
    .before(Routine::sync(|| bail!("setup broke")))
    .after(Routine::sync(move || {
        after_seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    let results = run(Tests::new().add("guarded", definition), quiet(10))?;
    let result = &results["guarded"];
    assert!(!result.success);
    assert_eq!(result.error.as_ref().map(|e| e.message()), Some("setup broke"));
    assert_eq!(body_calls.load(Ordering::SeqCst), 0);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn should_report_teardown_error_even_when_body_succeeded() -> anyhow::Result<()> {
    let definition =
        TestDefinition::new(Routine::sync(|| Ok(()))).after(Routine::callback(|done: Done| {
            done.fail("teardown broke")
        }));

    let results = run(Tests::new().add("cleanup", definition), quiet(10))?;
    let result = &results["cleanup"];
    assert!(!result.success);
    assert_eq!(result.size, 0);
    assert_eq!(result.error.as_ref().map(|e| e.message()), Some("teardown broke"));
    Ok(())
}

#[test]
fn should_complete_callbacks_invoked_from_other_threads() -> anyhow::Result<()> {
    let tests = Tests::new().callback("deferred", |done: Done| {
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_micros(10));
            done.ok();
        });
    });

    let results = run(tests, quiet(20))?;
    assert!(results["deferred"].success);
    assert_eq!(results["deferred"].size, 20);
    // Every iteration waited for its completion signal.
    assert!(results["deferred"].min >= 10_000);
    Ok(())
}

#[test]
fn should_turn_callback_panic_into_isolation_failure() -> anyhow::Result<()> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let options = quiet(10).on_test_error(move |name, error, handle| {
        sink.lock()
            .unwrap()
            .push((name.to_string(), error.message().to_string(), handle.is_some()));
    });

    let tests = Tests::new()
        .sync("single", || Ok(()))
        .callback("multiple", |_done: Done| panic!("FAILED"));

    let results = run(tests, options)?;
    assert!(results["single"].success);
    assert!(!results["multiple"].success);
    assert_eq!(results["multiple"].error.as_ref().map(|e| e.message()), Some("FAILED"));
    assert_eq!(
        *errors.lock().unwrap(),
        vec![("multiple".to_string(), "FAILED".to_string(), true)]
    );
    Ok(())
}

#[test]
fn should_fire_start_and_end_hooks_in_order() -> anyhow::Result<()> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let on_start = events.clone();
    let on_end = events.clone();
    let options = quiet(10)
        .on_test_start(move |name, data, _| {
            on_start.lock().unwrap().push(format!("start {} #{}", name, data.index));
        })
        .on_test_end(move |name, result, _| {
            on_end.lock().unwrap().push(format!("end {} {}", name, result.success));
        });

    let tests = Tests::new()
        .sync("a", || Ok(()))
        .sync("b", || bail!("nope"));
    run(tests, options)?;

    assert_eq!(
        *events.lock().unwrap(),
        vec!["start a #0", "end a true", "start b #1", "end b false"]
    );
    Ok(())
}

#[test]
fn should_preserve_submission_order_regardless_of_speed() -> anyhow::Result<()> {
    let tests = Tests::new()
        .sync("slow", || {
            std::thread::sleep(Duration::from_micros(50));
            Ok(())
        })
        .sync("fast", || Ok(()))
        .sync("medium", || {
            std::thread::sleep(Duration::from_micros(5));
            Ok(())
        });

    let results = run(tests, quiet(5))?;
    assert_eq!(results.names().collect::<Vec<_>>(), vec!["slow", "fast", "medium"]);
    Ok(())
}

#[test]
fn should_record_same_size_when_run_twice() -> anyhow::Result<()> {
    let table = || {
        Tests::new()
            .sync("fixed", || Ok(()))
            .sync("short", || bail!("stop"))
    };
    let options = quiet(300).error_threshold(0.0);

    let first = run(table(), options.clone())?;
    let second = run(table(), options)?;

    for name in ["fixed", "short"] {
        assert_eq!(first[name].size, second[name].size);
        assert_eq!(first[name].success, second[name].success);
    }
    assert_eq!(first["fixed"].size, 300);
    Ok(())
}

#[test]
fn should_invoke_callback_exactly_once() {
    let (calls, seen) = counter();
    run_with_callback(Tests::new().sync("single", || Ok(())), quiet(10), move |outcome| {
        seen.fetch_add(1, Ordering::SeqCst);
        let results = outcome.unwrap();
        assert_eq!(results["single"].size, 10);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn should_pass_validation_error_to_callback() {
    let outcome = Arc::new(Mutex::new(None));
    let slot = outcome.clone();
    run_with_callback(Tests::new(), quiet(0), move |result| {
        *slot.lock().unwrap() = Some(result.is_err());
    });
    assert_eq!(*outcome.lock().unwrap(), Some(true));
}

#[cfg(feature = "async")]
mod async_runs {
    use super::*;
    use cronometro::run_async;

    #[tokio::test]
    async fn should_measure_future_tests_from_async_context() -> anyhow::Result<()> {
        let tests = Tests::new()
            .future("sleepy", || async {
                tokio::time::sleep(Duration::from_micros(1)).await;
                Ok(())
            })
            .future("rejected", || async { bail!("FAILED") });

        let results = run_async(tests, quiet(10)).await?;
        assert!(results["sleepy"].success);
        assert_eq!(results["sleepy"].size, 10);
        assert_eq!(results["rejected"].error.as_ref().map(|e| e.message()), Some("FAILED"));
        Ok(())
    }

    #[tokio::test]
    async fn should_reject_invalid_options_from_async_context() {
        let err = run_async(Tests::new(), quiet(0)).await.unwrap_err();
        assert!(matches!(err, CronometroError::InvalidIterations(0)));
    }
}
