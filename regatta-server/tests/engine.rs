//! End-to-end tests for the transactional job engine: creation under
//! concurrency, status aggregation, retry behavior, and listing contracts.

mod common;

use std::collections::BTreeMap;

use regatta_core::domain::job::JobStatus;
use regatta_core::domain::run::RunStatus;
use regatta_core::dto::job::{CreateJob, UpdateJob};
use regatta_core::dto::run::CreateRun;
use regatta_server::error::Error;
use regatta_server::service::{job_service, run_service};
use regatta_server::txn::{self, Isolation};
use serde_json::json;

fn create_req(job_id: &str) -> CreateJob {
    CreateJob {
        job_id: Some(json!(job_id)),
        ..Default::default()
    }
}

fn status_req(job_id: &str, status: JobStatus) -> CreateJob {
    CreateJob {
        job_id: Some(json!(job_id)),
        status: Some(status),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_then_list_round_trips_all_fields() {
    let (pool, _dir) = common::setup().await;

    let mut extra = serde_json::Map::new();
    extra.insert("description".to_string(), json!("rados thrash"));

    let req = CreateJob {
        job_id: Some(json!("17")),
        name: Some("rados".to_string()),
        status: Some(JobStatus::Running),
        targets: Some(BTreeMap::from([(
            "ubuntu@smithi001".to_string(),
            "client.0".to_string(),
        )])),
        extra,
    };

    let created = job_service::create_job(&pool, "r1", req).await.unwrap();
    assert_eq!(created.run, "r1");
    assert_eq!(created.job_id, "17");
    assert_eq!(created.status, JobStatus::Running);

    let jobs = job_service::list_jobs(&pool, "r1", None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    let listed = &jobs[0];
    assert_eq!(listed.job_id, created.job_id);
    assert_eq!(listed.name, created.name);
    assert_eq!(listed.status, created.status);
    assert_eq!(listed.posted, created.posted);
    assert_eq!(listed.targets, created.targets);
    assert_eq!(listed.metadata["description"], json!("rados thrash"));
}

#[tokio::test]
async fn first_job_creates_its_run() {
    let (pool, _dir) = common::setup().await;

    job_service::create_job(&pool, "fresh", create_req("1"))
        .await
        .unwrap();

    let run = run_service::get_run(&pool, "fresh").await.unwrap();
    assert_eq!(run.name, "fresh");
    // One queued job aggregates to a queued run.
    assert_eq!(run.status, RunStatus::Queued);
}

#[tokio::test]
async fn numeric_job_id_is_normalized() {
    let (pool, _dir) = common::setup().await;

    let req = CreateJob {
        job_id: Some(json!(276)),
        ..Default::default()
    };
    let job = job_service::create_job(&pool, "r1", req).await.unwrap();
    assert_eq!(job.job_id, "276");

    let fetched = job_service::get_job(&pool, "r1", "276").await.unwrap();
    assert_eq!(fetched.job_id, "276");
}

#[tokio::test]
async fn missing_or_empty_job_id_is_invalid_input() {
    let (pool, _dir) = common::setup().await;

    let err = job_service::create_job(&pool, "r1", CreateJob::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = job_service::create_job(&pool, "r1", create_req(""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn duplicate_job_id_is_a_conflict() {
    let (pool, _dir) = common::setup().await;

    job_service::create_job(&pool, "r1", create_req("1"))
        .await
        .unwrap();
    let err = job_service::create_job(&pool, "r1", create_req("1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // The same job_id in a different run is fine.
    job_service::create_job(&pool, "r2", create_req("1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_creates_yield_exactly_one_job() {
    let (pool, _dir) = common::setup().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let req = CreateJob {
                job_id: Some(json!("7")),
                name: Some(format!("writer-{i}")),
                ..Default::default()
            };
            job_service::create_job(&pool, "contended", req).await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);

    let jobs = job_service::list_jobs(&pool, "contended", None).await.unwrap();
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
async fn status_update_reaggregates_the_run() {
    let (pool, _dir) = common::setup().await;

    job_service::create_job(&pool, "r1", status_req("1", JobStatus::Fail))
        .await
        .unwrap();
    job_service::create_job(&pool, "r1", status_req("2", JobStatus::Running))
        .await
        .unwrap();

    // Any running job wins.
    assert_eq!(
        run_service::get_run_status(&pool, "r1").await.unwrap(),
        RunStatus::Running
    );

    let patch = UpdateJob {
        status: Some(JobStatus::Pass),
        ..Default::default()
    };
    job_service::update_job(&pool, "r1", "2", patch).await.unwrap();

    // With the running job finished, the failure shows through.
    assert_eq!(
        run_service::get_run_status(&pool, "r1").await.unwrap(),
        RunStatus::Fail
    );
}

#[tokio::test]
async fn update_merges_fields_and_keeps_unknown_ones() {
    let (pool, _dir) = common::setup().await;

    job_service::create_job(&pool, "r1", create_req("1"))
        .await
        .unwrap();

    let mut extra = serde_json::Map::new();
    extra.insert("duration".to_string(), json!(421.5));
    let patch = UpdateJob {
        name: Some("upgrade".to_string()),
        extra,
        ..Default::default()
    };
    let job = job_service::update_job(&pool, "r1", "1", patch).await.unwrap();

    assert_eq!(job.name.as_deref(), Some("upgrade"));
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.metadata["duration"], json!(421.5));

    let fetched = job_service::get_job(&pool, "r1", "1").await.unwrap();
    assert_eq!(fetched.metadata["duration"], json!(421.5));
}

#[tokio::test]
async fn update_of_missing_job_is_not_found() {
    let (pool, _dir) = common::setup().await;

    job_service::create_job(&pool, "r1", create_req("1"))
        .await
        .unwrap();

    let patch = UpdateJob {
        status: Some(JobStatus::Pass),
        ..Default::default()
    };
    let err = job_service::update_job(&pool, "r1", "missing", patch.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = job_service::update_job(&pool, "no-such-run", "1", patch)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn delete_reaggregates_over_remaining_jobs() {
    let (pool, _dir) = common::setup().await;

    job_service::create_job(&pool, "r1", status_req("1", JobStatus::Fail))
        .await
        .unwrap();
    job_service::create_job(&pool, "r1", status_req("2", JobStatus::Pass))
        .await
        .unwrap();
    assert_eq!(
        run_service::get_run_status(&pool, "r1").await.unwrap(),
        RunStatus::Fail
    );

    job_service::delete_job(&pool, "r1", "1").await.unwrap();
    assert_eq!(
        run_service::get_run_status(&pool, "r1").await.unwrap(),
        RunStatus::Pass
    );

    // Deleting the last job keeps the run, with nothing to aggregate.
    job_service::delete_job(&pool, "r1", "2").await.unwrap();
    assert_eq!(
        run_service::get_run_status(&pool, "r1").await.unwrap(),
        RunStatus::Unknown
    );

    let err = job_service::delete_job(&pool, "r1", "2").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn listing_is_newest_first_and_filterable() {
    let (pool, _dir) = common::setup().await;

    job_service::create_job(&pool, "r1", status_req("1", JobStatus::Pass))
        .await
        .unwrap();
    job_service::create_job(&pool, "r1", status_req("2", JobStatus::Fail))
        .await
        .unwrap();
    job_service::create_job(&pool, "r1", status_req("3", JobStatus::Pass))
        .await
        .unwrap();

    let jobs = job_service::list_jobs(&pool, "r1", None).await.unwrap();
    let ids: Vec<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
    assert_eq!(ids, ["3", "2", "1"]);

    let passed = job_service::list_jobs(&pool, "r1", Some(JobStatus::Pass))
        .await
        .unwrap();
    let ids: Vec<&str> = passed.iter().map(|j| j.job_id.as_str()).collect();
    assert_eq!(ids, ["3", "1"]);

    // An unknown run is an empty listing, not an error.
    let none = job_service::list_jobs(&pool, "nowhere", None).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn slice_projects_fields_and_rejects_unknown_names() {
    let (pool, _dir) = common::setup().await;

    let mut extra = serde_json::Map::new();
    extra.insert("machine_type".to_string(), json!("smithi"));
    let req = CreateJob {
        job_id: Some(json!("1")),
        name: Some("rbd".to_string()),
        extra,
        ..Default::default()
    };
    job_service::create_job(&pool, "r1", req).await.unwrap();

    let jobs = job_service::list_jobs(&pool, "r1", None).await.unwrap();

    let sliced = job_service::slice_jobs(&jobs, "job_id, status, machine_type").unwrap();
    assert_eq!(sliced.len(), 1);
    assert_eq!(sliced[0]["job_id"], json!("1"));
    assert_eq!(sliced[0]["status"], json!("queued"));
    assert_eq!(sliced[0]["machine_type"], json!("smithi"));
    assert!(!sliced[0].contains_key("name"));

    let err = job_service::slice_jobs(&jobs, "job_id,bogus").unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn explicit_run_lifecycle() {
    let (pool, _dir) = common::setup().await;

    let run = run_service::create_run(
        &pool,
        CreateRun {
            name: Some("suite".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(run.status, RunStatus::Unknown);

    let err = run_service::create_run(
        &pool,
        CreateRun {
            name: Some("suite".to_string()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let err = run_service::create_run(&pool, CreateRun::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn deleting_a_run_cascades_to_its_jobs() {
    let (pool, _dir) = common::setup().await;

    job_service::create_job(&pool, "r1", create_req("1"))
        .await
        .unwrap();
    job_service::create_job(&pool, "r1", create_req("2"))
        .await
        .unwrap();

    run_service::delete_run(&pool, "r1").await.unwrap();

    let err = run_service::get_run(&pool, "r1").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    let err = run_service::delete_run(&pool, "r1").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn retry_budget_exhaustion_commits_nothing() {
    let (pool, _dir) = common::setup().await;

    let result: Result<(), Error> = txn::run_txn(&pool, Isolation::Immediate, 3, |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO runs (name, status, posted) VALUES (?1, ?2, ?3)")
                .bind("doomed")
                .bind("unknown")
                .bind(chrono::Utc::now())
                .execute(&mut *conn)
                .await?;
            // Always report a write conflict, as a permanently contended
            // store would.
            Err(Error::Race(sqlx::Error::WorkerCrashed))
        })
    })
    .await;

    assert!(matches!(result, Err(Error::Unavailable { attempts: 3 })));

    let committed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE name = ?1")
        .bind("doomed")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(committed, 0);
}

#[tokio::test]
async fn non_race_errors_are_not_retried() {
    let (pool, _dir) = common::setup().await;

    let mut calls = 0;
    let result: Result<(), Error> = txn::run_txn(&pool, Isolation::Immediate, 10, |conn| {
        calls += 1;
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&mut *conn).await?;
            Err(Error::InvalidInput("bad payload".to_string()))
        })
    })
    .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(calls, 1);
}
