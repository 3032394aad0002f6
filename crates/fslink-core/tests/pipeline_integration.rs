//! Integration tests for pipelines, the execution cache and error reporting.

mod common;

use std::sync::Arc;
use std::thread;

use common::{people, TestContext};
use fslink_core::{
    BlockingAnalyzer, EngineConfig, Error, ExecutionMode, LinkType, LinkageSession,
    LinkageSettings, QueryPipeline, ResultHandle, Value,
};

fn three_step_pipeline(input: &ResultHandle) -> QueryPipeline {
    let mut pipeline = QueryPipeline::with_inputs([input.clone()]);
    pipeline
        .enqueue("select unique_id, first_name from people where unique_id < 8", "filtered")
        .unwrap();
    pipeline
        .enqueue(
            "select first_name, count(*) as n from filtered group by first_name",
            "counts",
        )
        .unwrap();
    pipeline
        .enqueue("select first_name, n * 10 as score from counts", "scored")
        .unwrap();
    pipeline
}

fn sorted_rows(ctx: &TestContext, handle: &ResultHandle) -> Vec<Vec<Value>> {
    ctx.engine
        .query(&format!(
            "select * from {} order by first_name",
            handle.physical_name
        ))
        .unwrap()
        .rows
}

#[test]
fn test_composed_and_traced_results_match() {
    let composed = TestContext::new();
    let input = composed.register("people", &people(0, 10));
    let composed_handle = composed
        .engine
        .execute_pipeline(three_step_pipeline(&input))
        .unwrap();

    let traced = TestContext::with_config(EngineConfig::default().with_execution_mode(ExecutionMode::Traced));
    let input = traced.register("people", &people(0, 10));
    let traced_handle = traced
        .engine
        .execute_pipeline(three_step_pipeline(&input))
        .unwrap();

    assert_eq!(composed.backend.materializations(), 1);
    assert_eq!(traced.backend.materializations(), 3);
    assert_eq!(traced_handle.physical_name, "scored");
    assert_eq!(
        sorted_rows(&composed, &composed_handle),
        sorted_rows(&traced, &traced_handle)
    );
    assert_eq!(
        sorted_rows(&composed, &composed_handle),
        vec![
            vec![Value::Text("name0".into()), Value::Integer(30)],
            vec![Value::Text("name1".into()), Value::Integer(30)],
            vec![Value::Text("name2".into()), Value::Integer(20)],
        ]
    );
}

#[test]
fn test_traced_mode_materialises_aliased_seeds() {
    let ctx = TestContext::with_config(EngineConfig::default().with_execution_mode(ExecutionMode::Traced));
    ctx.register("raw_people", &people(0, 4));
    let aliased = ctx.engine.table_handle("people", "raw_people").unwrap();

    let mut pipeline = QueryPipeline::with_inputs([aliased]);
    pipeline.enqueue("select count(*) as n from people", "total").unwrap();
    let handle = ctx.engine.execute_pipeline(pipeline).unwrap();

    assert!(ctx.engine.backend().table_exists("people").unwrap());
    assert_eq!(ctx.engine.fetch(&handle).unwrap().scalar_u64().unwrap(), 4);
    let roles: Vec<String> = ctx.engine.last_trace().into_iter().map(|t| t.output_role).collect();
    assert_eq!(roles, vec!["people", "total"]);
}

#[test]
fn test_identical_statement_executes_once() {
    let ctx = TestContext::new();
    let input = ctx.register("people", &people(0, 10));

    let first = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();
    let second = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();

    assert_eq!(first.physical_name, second.physical_name);
    assert_eq!(ctx.backend.materializations(), 1);
    assert_eq!(ctx.engine.cache().stats().hits(), 1);
    assert_eq!(ctx.engine.cache().stats().misses(), 1);
    assert!((ctx.engine.cache().stats().hit_rate() - 0.5).abs() < 1e-12);
}

#[test]
fn test_cache_disabled_reexecutes() {
    let ctx = TestContext::with_config(EngineConfig::default().with_cache(false));
    let input = ctx.register("people", &people(0, 10));

    let first = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();
    let second = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();

    assert_eq!(first.physical_name, second.physical_name);
    assert_eq!(ctx.backend.materializations(), 2);
}

#[test]
fn test_concurrent_identical_requests_execute_once() {
    let ctx = Arc::new(TestContext::new());
    ctx.register("people", &people(0, 50));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                ctx.engine
                    .sql_to_handle("select count(*) as n from people", "people_count", true)
                    .unwrap()
            })
        })
        .collect();
    let names: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().physical_name)
        .collect();

    assert!(names.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(ctx.backend.materializations(), 1);
}

#[test]
fn test_dropping_handle_forces_reexecution() {
    let ctx = TestContext::new();
    let input = ctx.register("people", &people(0, 10));

    let first = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();
    ctx.engine.drop_handle(&first).unwrap();
    let second = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();

    assert_eq!(ctx.backend.materializations(), 2);
    assert_eq!(ctx.engine.fetch(&second).unwrap().len(), 3);
}

#[test]
fn test_backend_failure_reports_statement_and_message() {
    let ctx = TestContext::new();
    let mut pipeline = QueryPipeline::new();
    pipeline.enqueue("select 1 as x", "ok_step").unwrap();
    pipeline
        .enqueue("select no_such_column from ok_step", "bad_step")
        .unwrap();

    let err = ctx.engine.execute_pipeline(pipeline).unwrap_err();
    let rendered = err.to_string();
    match err {
        Error::PipelineExecution {
            templated_name,
            statement,
            ..
        } => {
            assert_eq!(templated_name, "bad_step");
            assert!(statement.contains("no_such_column"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(rendered.contains("no such column: no_such_column"));
    assert!(ctx.engine.cache().is_empty());
}

#[test]
fn test_traced_failure_names_failing_step() {
    let ctx = TestContext::with_config(EngineConfig::default().with_execution_mode(ExecutionMode::Traced));
    let mut pipeline = QueryPipeline::new();
    pipeline.enqueue("select 1 as x", "ok_step").unwrap();
    pipeline
        .enqueue("select no_such_column from ok_step", "bad_step")
        .unwrap();

    match ctx.engine.execute_pipeline(pipeline) {
        Err(Error::PipelineExecution {
            templated_name,
            physical_name,
            ..
        }) => {
            assert_eq!(templated_name, "bad_step");
            assert_eq!(physical_name, "bad_step");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(ctx.engine.backend().table_exists("ok_step").unwrap());
}

#[test]
fn test_reuse_without_reset_is_rejected() {
    let ctx = TestContext::new();
    let mut pipeline = QueryPipeline::new();
    pipeline.enqueue("select no_such_column", "broken").unwrap();

    assert!(ctx.engine.execute_pipeline_mut(&mut pipeline).is_err());
    assert!(matches!(
        ctx.engine.execute_pipeline_mut(&mut pipeline),
        Err(Error::InvalidPipelineState(_))
    ));
}

#[test]
fn test_overwriting_input_drops_results_built_from_it() {
    let ctx = TestContext::new();
    let input = ctx.register("people", &people(0, 10));
    let settings = LinkageSettings::new(LinkType::DedupeOnly).with_blocking_rules(["1=1"]);

    let session = LinkageSession::new(&ctx.engine, settings.clone(), vec![input]).unwrap();
    assert_eq!(BlockingAnalyzer::new(&session).cartesian().unwrap(), 45);
    let stale_concat = session.concat().unwrap();

    let input = ctx.engine.register_table("people", &people(0, 4), true).unwrap();
    assert!(!ctx.engine.backend().table_exists(&stale_concat.physical_name).unwrap());
    assert!(ctx.engine.cache().stats().invalidations() >= 1);

    let session = LinkageSession::new(&ctx.engine, settings, vec![input]).unwrap();
    assert_eq!(BlockingAnalyzer::new(&session).cartesian().unwrap(), 6);
}

#[test]
fn test_overwriting_unrelated_input_keeps_cached_results() {
    let ctx = TestContext::new();
    let input = ctx.register("people", &people(0, 10));
    ctx.register("other_people", &people(0, 3));

    let first = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();
    ctx.engine
        .register_table("other_people", &people(0, 5), true)
        .unwrap();
    let second = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();

    assert_eq!(first.physical_name, second.physical_name);
    assert_eq!(ctx.backend.materializations(), 1);
}

#[test]
fn test_traced_mode_refuses_to_replace_registered_table() {
    let ctx = TestContext::with_config(EngineConfig::default().with_execution_mode(ExecutionMode::Traced));
    ctx.register("people", &people(0, 10));
    ctx.register("raw_people", &people(0, 4));
    let aliased = ctx.engine.table_handle("people", "raw_people").unwrap();

    let mut pipeline = QueryPipeline::with_inputs([aliased]);
    pipeline.enqueue("select count(*) as n from people", "total").unwrap();

    assert!(matches!(
        ctx.engine.execute_pipeline(pipeline),
        Err(Error::Configuration(_))
    ));
    assert_eq!(ctx.backend.materializations(), 0);
    assert_eq!(
        ctx.engine
            .query("select count(*) from people")
            .unwrap()
            .scalar_u64()
            .unwrap(),
        10
    );
}

#[test]
fn test_traced_mode_replaces_its_own_tables() {
    let ctx = TestContext::with_config(EngineConfig::default().with_execution_mode(ExecutionMode::Traced));
    let input = ctx.register("people", &people(0, 10));

    let first = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();
    let second = ctx.engine.execute_pipeline(three_step_pipeline(&input)).unwrap();

    assert_eq!(first.physical_name, second.physical_name);
    assert_eq!(ctx.backend.materializations(), 6);
}
