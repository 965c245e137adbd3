//! Repository tests: upsert, soft delete, listing and purge.

use chrono::{Duration, Utc};
use result_viewer_lib::models::{Measurement, RunListFilter, SystemInfo};
use uuid::Uuid;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_upsert_then_get_round_trips_children() {
    let env = TestEnv::new().await;
    let repo = env.repository();
    let k = key("host-a", "pdc-1", "run-1");

    let mut run = sample_run(&k, at(2024, 5, 1), 3);
    run.specflow_log = Some("Given a table".to_string());
    run.system_info = Some(SystemInfo {
        id: Uuid::now_v7(),
        system_name: "Suite 4".to_string(),
        stm: "STM-12".to_string(),
        ..SystemInfo::default()
    });
    run.measurements = vec![Measurement {
        id: Uuid::now_v7(),
        test_name: "Dose".to_string(),
        measurement_name: "TubeCurrent".to_string(),
        result: "Passed".to_string(),
        measured_value: Some("5.2".to_string()),
        ..Measurement::default()
    }];

    let id = repo.upsert(&run).await.unwrap();
    let stored = repo.get_by_key(&k).await.unwrap().expect("run stored");

    assert_eq!(stored.id, id);
    assert_eq!(stored.test_count, 3);
    assert_eq!(stored.specflow_log.as_deref(), Some("Given a table"));
    let names: Vec<_> = stored.test_results.iter().map(|r| r.test_name.as_str()).collect();
    assert_eq!(names, vec!["Case0", "Case1", "Case2"]);
    assert_eq!(stored.system_info.unwrap().stm, "STM-12");
    assert_eq!(stored.measurements.len(), 1);
    assert_eq!(stored.measurements[0].measured_value.as_deref(), Some("5.2"));
}

#[actix_rt::test]
async fn test_upsert_replaces_children_and_keeps_id() {
    let env = TestEnv::new().await;
    let repo = env.repository();
    let k = key("host-a", "pdc-1", "run-2");

    let first_id = repo.upsert(&sample_run(&k, at(2024, 5, 1), 3)).await.unwrap();

    let mut second = sample_run(&k, at(2024, 5, 2), 1);
    second.overall_result = "Failed".to_string();
    let second_id = repo.upsert(&second).await.unwrap();

    assert_eq!(first_id, second_id, "upsert must update the existing row");

    let stored = repo.get_by_key(&k).await.unwrap().unwrap();
    assert_eq!(stored.overall_result, "Failed");
    assert_eq!(stored.start_time, at(2024, 5, 2));
    assert_eq!(stored.test_results.len(), 1);
    assert!(stored.system_info.is_none());

    let (_, total) = repo
        .list_paged(1, 20, &RunListFilter::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
}

#[actix_rt::test]
async fn test_upsert_large_run_in_batches() {
    let env = TestEnv::new().await;
    let repo = env.repository();
    let k = key("host-a", "pdc-1", "soak");

    // More rows than one multi-row insert can bind
    let mut run = sample_run(&k, at(2024, 5, 1), 6000);
    run.measurements = (0..3000)
        .map(|i| Measurement {
            id: Uuid::now_v7(),
            test_name: "Dose".to_string(),
            measurement_name: format!("Sample{}", i),
            result: "Passed".to_string(),
            ..Measurement::default()
        })
        .collect();

    let id = repo.upsert(&run).await.unwrap();
    let stored = repo.get_by_key(&k).await.unwrap().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.test_results.len(), 6000);
    assert_eq!(stored.test_results[0].test_name, "Case0");
    assert_eq!(stored.test_results[5999].test_name, "Case5999");
    assert_eq!(stored.measurements.len(), 3000);
    assert_eq!(stored.measurements[2999].measurement_name, "Sample2999");

    // Replacing a large run swaps every child
    let id_again = repo.upsert(&sample_run(&k, at(2024, 5, 2), 4500)).await.unwrap();
    assert_eq!(id_again, id);
    let stored = repo.get_by_key(&k).await.unwrap().unwrap();
    assert_eq!(stored.test_results.len(), 4500);
    assert!(stored.measurements.is_empty());
}

#[actix_rt::test]
async fn test_get_unknown_key_returns_none() {
    let env = TestEnv::new().await;
    let found = env
        .repository()
        .get_by_key(&key("nobody", "pdc", "run"))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[actix_rt::test]
async fn test_soft_delete_hides_run_and_upsert_revives_it() {
    let env = TestEnv::new().await;
    let repo = env.repository();
    let k = key("host-a", "pdc-1", "run-3");

    let mut run = sample_run(&k, at(2020, 1, 1), 1);
    run.created_at = Utc::now() - Duration::days(365 * 3);
    repo.upsert(&run).await.unwrap();

    let cutoff = Utc::now() - Duration::days(365 * 2);
    assert_eq!(repo.soft_delete_expired(cutoff).await.unwrap(), 1);
    assert_eq!(repo.soft_delete_expired(cutoff).await.unwrap(), 0);

    assert!(repo.get_by_key(&k).await.unwrap().is_none());
    let (items, total) = repo
        .list_paged(1, 20, &RunListFilter::default())
        .await
        .unwrap();
    assert!(items.is_empty());
    assert_eq!(total, 0);

    // Re-ingesting the same key clears the flag
    let mut again = sample_run(&k, at(2020, 1, 1), 2);
    again.created_at = Utc::now();
    repo.upsert(&again).await.unwrap();

    let revived = repo.get_by_key(&k).await.unwrap().expect("run revived");
    assert!(!revived.is_deleted);
    assert_eq!(revived.test_results.len(), 2);
}

#[actix_rt::test]
async fn test_soft_delete_spares_recent_runs() {
    let env = TestEnv::new().await;
    let repo = env.repository();

    let mut old = sample_run(&key("h", "p", "old"), at(2020, 1, 1), 0);
    old.created_at = Utc::now() - Duration::days(365 * 3);
    repo.upsert(&old).await.unwrap();
    repo.upsert(&sample_run(&key("h", "p", "new"), at(2024, 1, 1), 0))
        .await
        .unwrap();

    let count = repo
        .soft_delete_expired(Utc::now() - Duration::days(365 * 2))
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert!(repo.get_by_key(&key("h", "p", "new")).await.unwrap().is_some());
}

#[actix_rt::test]
async fn test_list_paged_orders_newest_first() {
    let env = TestEnv::new().await;
    let repo = env.repository();

    for day in 1..=5 {
        let k = key("host-a", "pdc-1", &format!("run-{}", day));
        repo.upsert(&sample_run(&k, at(2024, 3, day), 1)).await.unwrap();
    }

    let (page1, total) = repo
        .list_paged(1, 2, &RunListFilter::default())
        .await
        .unwrap();
    assert_eq!(total, 5);
    let ids: Vec<_> = page1.iter().map(|r| r.run_id.as_str()).collect();
    assert_eq!(ids, vec!["run-5", "run-4"]);

    let (page3, _) = repo
        .list_paged(3, 2, &RunListFilter::default())
        .await
        .unwrap();
    let ids: Vec<_> = page3.iter().map(|r| r.run_id.as_str()).collect();
    assert_eq!(ids, vec!["run-1"]);

    let (beyond, total) = repo
        .list_paged(4, 2, &RunListFilter::default())
        .await
        .unwrap();
    assert!(beyond.is_empty());
    assert_eq!(total, 5);
}

#[actix_rt::test]
async fn test_list_paged_far_past_the_end() {
    let env = TestEnv::new().await;
    let repo = env.repository();
    repo.upsert(&sample_run(&key("host-a", "pdc-1", "only"), at(2024, 3, 1), 1))
        .await
        .unwrap();

    for page in [i64::MAX as u64, u64::MAX] {
        let (items, total) = repo
            .list_paged(page, 100, &RunListFilter::default())
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 1);
    }
}

#[actix_rt::test]
async fn test_list_paged_filters() {
    let env = TestEnv::new().await;
    let repo = env.repository();

    let mut failed = sample_run(&key("lab-host-7", "pdc-1", "r1"), at(2024, 1, 10), 1);
    failed.overall_result = "Failed".to_string();
    repo.upsert(&failed).await.unwrap();
    repo.upsert(&sample_run(&key("lab-host-8", "pdc-2", "r2"), at(2024, 2, 10), 1))
        .await
        .unwrap();
    repo.upsert(&sample_run(&key("ci-host", "pdc-1", "r3"), at(2024, 3, 10), 1))
        .await
        .unwrap();

    let by_host = RunListFilter {
        host: Some("lab-host".to_string()),
        ..RunListFilter::default()
    };
    let (_, total) = repo.list_paged(1, 20, &by_host).await.unwrap();
    assert_eq!(total, 2);

    let by_pdc_and_result = RunListFilter {
        pdc: Some("pdc-1".to_string()),
        result: Some("Fail".to_string()),
        ..RunListFilter::default()
    };
    let (items, total) = repo.list_paged(1, 20, &by_pdc_and_result).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].run_id, "r1");

    let by_dates = RunListFilter {
        from_date: Some(at(2024, 2, 1)),
        to_date: Some(at(2024, 2, 28)),
        ..RunListFilter::default()
    };
    let (items, total) = repo.list_paged(1, 20, &by_dates).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].run_id, "r2");

    let inclusive = RunListFilter {
        from_date: Some(at(2024, 1, 10)),
        to_date: Some(at(2024, 3, 10)),
        ..RunListFilter::default()
    };
    let (_, total) = repo.list_paged(1, 20, &inclusive).await.unwrap();
    assert_eq!(total, 3);
}

#[actix_rt::test]
async fn test_delete_expired_removes_runs_and_children() {
    let env = TestEnv::new().await;
    let repo = env.repository();
    let k = key("host-a", "pdc-1", "ancient");

    let mut run = sample_run(&k, at(2015, 1, 1), 4);
    run.created_at = Utc::now() - Duration::days(365 * 8);
    run.measurements = vec![Measurement {
        id: Uuid::now_v7(),
        test_name: "Dose".to_string(),
        measurement_name: "TubeCurrent".to_string(),
        result: "Passed".to_string(),
        ..Measurement::default()
    }];
    repo.upsert(&run).await.unwrap();
    repo.upsert(&sample_run(&key("host-a", "pdc-1", "recent"), at(2024, 1, 1), 1))
        .await
        .unwrap();

    let removed = repo
        .delete_expired(Utc::now() - Duration::days(365 * 7))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(repo.get_by_key(&k).await.unwrap().is_none());

    // Re-inserting the key starts from a clean slate
    let fresh_id = repo.upsert(&sample_run(&k, at(2024, 1, 2), 1)).await.unwrap();
    let stored = repo.get_by_key(&k).await.unwrap().unwrap();
    assert_eq!(stored.id, fresh_id);
    assert_eq!(stored.test_results.len(), 1);
    assert!(stored.measurements.is_empty());
}
