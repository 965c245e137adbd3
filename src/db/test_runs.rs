//! Database queries for test runs and their children.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entity::measurement::{self, Entity as MeasurementEntity};
use crate::entity::system_info::{self, Entity as SystemInfoEntity};
use crate::entity::test_result::{self, Entity as TestResultEntity};
use crate::entity::test_run::{self, Entity as TestRunEntity};
use crate::error::{AppError, AppResult};
use crate::models::{
    Measurement, RunKey, RunListFilter, SystemInfo, TestResult, TestRun, TestRunSummary,
};

use super::{DbPool, RunRepository};

/// Bind parameters per statement accepted by SQLite; PostgreSQL allows more.
const MAX_BIND_PARAMETERS: usize = 32_766;

/// Rows per multi-row insert, from each table's column count.
const TEST_RESULT_BATCH: usize = MAX_BIND_PARAMETERS / 8;
const MEASUREMENT_BATCH: usize = MAX_BIND_PARAMETERS / 13;

/// Columns read by the list view; raw payloads stay in the database.
#[derive(Debug, FromQueryResult)]
struct SummaryRow {
    id: Uuid,
    host: String,
    pdc: String,
    run_id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    overall_result: String,
    test_count: i32,
    passed_count: i32,
    failed_count: i32,
    skipped_count: i32,
    archive_path: Option<String>,
    created_at: DateTime<Utc>,
    import_status: String,
}

impl From<SummaryRow> for TestRunSummary {
    fn from(row: SummaryRow) -> Self {
        TestRunSummary {
            id: row.id,
            host: row.host,
            pdc: row.pdc,
            run_id: row.run_id,
            start_time: row.start_time,
            end_time: row.end_time,
            overall_result: row.overall_result,
            test_count: row.test_count,
            passed_count: row.passed_count,
            failed_count: row.failed_count,
            skipped_count: row.skipped_count,
            archive_path: row.archive_path,
            created_at: row.created_at,
            import_status: row.import_status,
        }
    }
}

#[async_trait]
impl RunRepository for DbPool {
    async fn get_by_key(&self, key: &RunKey) -> AppResult<Option<TestRun>> {
        let conn = self.connection();

        let Some(row) = TestRunEntity::find()
            .filter(test_run::Column::Host.eq(key.host.as_str()))
            .filter(test_run::Column::Pdc.eq(key.pdc.as_str()))
            .filter(test_run::Column::RunId.eq(key.run_id.as_str()))
            .filter(test_run::Column::IsDeleted.eq(false))
            .one(conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test run: {}", e)))?
        else {
            return Ok(None);
        };

        // Children are loaded with one query each instead of a joined fetch
        let results = TestResultEntity::find()
            .filter(test_result::Column::TestRunId.eq(row.id))
            .order_by_asc(test_result::Column::Sequence)
            .all(conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to load test results: {}", e)))?;

        let info = SystemInfoEntity::find()
            .filter(system_info::Column::TestRunId.eq(row.id))
            .one(conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to load system info: {}", e)))?;

        let measurements = MeasurementEntity::find()
            .filter(measurement::Column::TestRunId.eq(row.id))
            .order_by_asc(measurement::Column::Sequence)
            .all(conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to load measurements: {}", e)))?;

        Ok(Some(assemble(row, results, info, measurements)))
    }

    async fn list_paged(
        &self,
        page: u64,
        page_size: u64,
        filter: &RunListFilter,
    ) -> AppResult<(Vec<TestRunSummary>, u64)> {
        let mut select = TestRunEntity::find().filter(test_run::Column::IsDeleted.eq(false));

        if let Some(ref host) = filter.host {
            select = select.filter(test_run::Column::Host.contains(host.as_str()));
        }

        if let Some(ref pdc) = filter.pdc {
            select = select.filter(test_run::Column::Pdc.contains(pdc.as_str()));
        }

        if let Some(ref result) = filter.result {
            select = select.filter(test_run::Column::OverallResult.contains(result.as_str()));
        }

        if let Some(from) = filter.from_date {
            select = select.filter(test_run::Column::StartTime.gte(from));
        }

        if let Some(to) = filter.to_date {
            select = select.filter(test_run::Column::StartTime.lte(to));
        }

        let total = select
            .clone()
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count test runs: {}", e)))?;

        let page_size = page_size.max(1);
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        if offset >= total {
            debug!(page, page_size, total, "Requested page is past the last run");
            return Ok((Vec::new(), total));
        }

        let rows = select
            .select_only()
            .columns([
                test_run::Column::Id,
                test_run::Column::Host,
                test_run::Column::Pdc,
                test_run::Column::RunId,
                test_run::Column::StartTime,
                test_run::Column::EndTime,
                test_run::Column::OverallResult,
                test_run::Column::TestCount,
                test_run::Column::PassedCount,
                test_run::Column::FailedCount,
                test_run::Column::SkippedCount,
                test_run::Column::ArchivePath,
                test_run::Column::CreatedAt,
                test_run::Column::ImportStatus,
            ])
            .order_by_desc(test_run::Column::StartTime)
            .offset(offset)
            .limit(page_size)
            .into_model::<SummaryRow>()
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list test runs: {}", e)))?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn upsert(&self, run: &TestRun) -> AppResult<Uuid> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to start transaction: {}", e)))?;

        // Match on the key regardless of the soft-delete flag so deleted runs are revived
        let existing = TestRunEntity::find()
            .filter(test_run::Column::Host.eq(run.host.as_str()))
            .filter(test_run::Column::Pdc.eq(run.pdc.as_str()))
            .filter(test_run::Column::RunId.eq(run.run_id.as_str()))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to look up test run: {}", e)))?;

        let run_id = match existing {
            Some(row) => {
                let id = row.id;
                let mut active: test_run::ActiveModel = row.into();
                active.start_time = Set(run.start_time);
                active.end_time = Set(run.end_time);
                active.overall_result = Set(run.overall_result.clone());
                active.test_count = Set(run.test_count);
                active.passed_count = Set(run.passed_count);
                active.failed_count = Set(run.failed_count);
                active.skipped_count = Set(run.skipped_count);
                active.raw_json = Set(run.raw_json.clone());
                active.raw_fingerprint_xml = Set(run.raw_fingerprint_xml.clone());
                active.specflow_log = Set(run.specflow_log.clone());
                active.archive_path = Set(run.archive_path.clone());
                active.created_at = Set(run.created_at);
                active.import_status = Set(run.import_status.clone());
                active.is_deleted = Set(false);

                active
                    .update(&txn)
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to update test run: {}", e)))?;

                delete_children(&txn, id).await?;

                debug!(host = %run.host, pdc = %run.pdc, run_id = %run.run_id, "Upsert: updated existing test run");
                id
            }
            None => {
                let active = test_run::ActiveModel {
                    id: Set(run.id),
                    host: Set(run.host.clone()),
                    pdc: Set(run.pdc.clone()),
                    run_id: Set(run.run_id.clone()),
                    start_time: Set(run.start_time),
                    end_time: Set(run.end_time),
                    overall_result: Set(run.overall_result.clone()),
                    test_count: Set(run.test_count),
                    passed_count: Set(run.passed_count),
                    failed_count: Set(run.failed_count),
                    skipped_count: Set(run.skipped_count),
                    raw_json: Set(run.raw_json.clone()),
                    raw_fingerprint_xml: Set(run.raw_fingerprint_xml.clone()),
                    specflow_log: Set(run.specflow_log.clone()),
                    archive_path: Set(run.archive_path.clone()),
                    created_at: Set(run.created_at),
                    import_status: Set(run.import_status.clone()),
                    is_deleted: Set(false),
                };

                active
                    .insert(&txn)
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to insert test run: {}", e)))?;

                debug!(host = %run.host, pdc = %run.pdc, run_id = %run.run_id, "Upsert: inserted new test run");
                run.id
            }
        };

        insert_children(&txn, run_id, run).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit test run: {}", e)))?;

        Ok(run_id)
    }

    async fn soft_delete_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = TestRunEntity::update_many()
            .col_expr(test_run::Column::IsDeleted, Expr::value(true))
            .filter(test_run::Column::CreatedAt.lt(cutoff))
            .filter(test_run::Column::IsDeleted.eq(false))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to soft-delete test runs: {}", e)))?;

        info!(count = result.rows_affected, cutoff = %cutoff, "Soft-deleted expired test runs");
        Ok(result.rows_affected)
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to start transaction: {}", e)))?;

        let expired = Query::select()
            .column(test_run::Column::Id)
            .from(TestRunEntity)
            .and_where(test_run::Column::CreatedAt.lt(cutoff))
            .to_owned();

        TestResultEntity::delete_many()
            .filter(test_result::Column::TestRunId.in_subquery(expired.clone()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete test results: {}", e)))?;

        SystemInfoEntity::delete_many()
            .filter(system_info::Column::TestRunId.in_subquery(expired.clone()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete system infos: {}", e)))?;

        MeasurementEntity::delete_many()
            .filter(measurement::Column::TestRunId.in_subquery(expired))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete measurements: {}", e)))?;

        let result = TestRunEntity::delete_many()
            .filter(test_run::Column::CreatedAt.lt(cutoff))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete test runs: {}", e)))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit deletion: {}", e)))?;

        info!(count = result.rows_affected, cutoff = %cutoff, "Hard-deleted expired test runs");
        Ok(result.rows_affected)
    }
}

async fn delete_children<C: ConnectionTrait>(conn: &C, run_id: Uuid) -> AppResult<()> {
    TestResultEntity::delete_many()
        .filter(test_result::Column::TestRunId.eq(run_id))
        .exec(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to delete test results: {}", e)))?;

    SystemInfoEntity::delete_many()
        .filter(system_info::Column::TestRunId.eq(run_id))
        .exec(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to delete system info: {}", e)))?;

    MeasurementEntity::delete_many()
        .filter(measurement::Column::TestRunId.eq(run_id))
        .exec(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to delete measurements: {}", e)))?;

    Ok(())
}

async fn insert_children<C: ConnectionTrait>(conn: &C, run_id: Uuid, run: &TestRun) -> AppResult<()> {
    let results: Vec<test_result::ActiveModel> = run
        .test_results
        .iter()
        .enumerate()
        .map(|(i, r)| test_result::ActiveModel {
            id: Set(r.id),
            test_run_id: Set(run_id),
            test_name: Set(r.test_name.clone()),
            result: Set(r.result.clone()),
            error_message: Set(r.error_message.clone()),
            output: Set(r.output.clone()),
            duration_seconds: Set(r.duration_seconds),
            sequence: Set(i as i32),
        })
        .collect();

    let mut results = results.into_iter().peekable();
    while results.peek().is_some() {
        let batch: Vec<_> = results.by_ref().take(TEST_RESULT_BATCH).collect();
        TestResultEntity::insert_many(batch)
            .exec_without_returning(conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert test results: {}", e)))?;
    }

    if let Some(ref info) = run.system_info {
        let active = system_info::ActiveModel {
            id: Set(info.id),
            test_run_id: Set(run_id),
            system_name: Set(info.system_name.clone()),
            stm: Set(info.stm.clone()),
            msi_version: Set(info.msi_version.clone()),
            pdc_version: Set(info.pdc_version.clone()),
            monoplane_or_biplane: Set(info.monoplane_or_biplane.clone()),
            frontal_stand_type: Set(info.frontal_stand_type.clone()),
            table_type: Set(info.table_type.clone()),
            table_top_type: Set(info.table_top_type.clone()),
            detector_name_frontal: Set(info.detector_name_frontal.clone()),
            detector_name_lateral: Set(info.detector_name_lateral.clone()),
            system_type: Set(info.system_type.clone()),
            product_family: Set(info.product_family.clone()),
            detector_type: Set(info.detector_type.clone()),
            lateral_stand_type: Set(info.lateral_stand_type.clone()),
            system_config_type: Set(info.system_config_type.clone()),
            raw_xml: Set(info.raw_xml.clone()),
        };

        SystemInfoEntity::insert(active)
            .exec_without_returning(conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert system info: {}", e)))?;
    }

    let measurements: Vec<measurement::ActiveModel> = run
        .measurements
        .iter()
        .enumerate()
        .map(|(i, m)| measurement::ActiveModel {
            id: Set(m.id),
            test_run_id: Set(run_id),
            test_name: Set(m.test_name.clone()),
            measurement_name: Set(m.measurement_name.clone()),
            result: Set(m.result.clone()),
            measurement_unit: Set(m.measurement_unit.clone()),
            description: Set(m.description.clone()),
            measured_value: Set(m.measured_value.clone()),
            spec_error_upper: Set(m.spec_error_upper.clone()),
            spec_error_lower: Set(m.spec_error_lower.clone()),
            spec_warning_upper: Set(m.spec_warning_upper.clone()),
            spec_warning_lower: Set(m.spec_warning_lower.clone()),
            sequence: Set(i as i32),
        })
        .collect();

    let mut measurements = measurements.into_iter().peekable();
    while measurements.peek().is_some() {
        let batch: Vec<_> = measurements.by_ref().take(MEASUREMENT_BATCH).collect();
        MeasurementEntity::insert_many(batch)
            .exec_without_returning(conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert measurements: {}", e)))?;
    }

    Ok(())
}

fn assemble(
    row: test_run::Model,
    results: Vec<test_result::Model>,
    info: Option<system_info::Model>,
    measurements: Vec<measurement::Model>,
) -> TestRun {
    TestRun {
        id: row.id,
        host: row.host,
        pdc: row.pdc,
        run_id: row.run_id,
        start_time: row.start_time,
        end_time: row.end_time,
        overall_result: row.overall_result,
        test_count: row.test_count,
        passed_count: row.passed_count,
        failed_count: row.failed_count,
        skipped_count: row.skipped_count,
        raw_json: row.raw_json,
        raw_fingerprint_xml: row.raw_fingerprint_xml,
        specflow_log: row.specflow_log,
        archive_path: row.archive_path,
        created_at: row.created_at,
        import_status: row.import_status,
        is_deleted: row.is_deleted,
        test_results: results
            .into_iter()
            .map(|r| TestResult {
                id: r.id,
                test_name: r.test_name,
                result: r.result,
                error_message: r.error_message,
                output: r.output,
                duration_seconds: r.duration_seconds,
            })
            .collect(),
        system_info: info.map(|s| SystemInfo {
            id: s.id,
            system_name: s.system_name,
            stm: s.stm,
            msi_version: s.msi_version,
            pdc_version: s.pdc_version,
            monoplane_or_biplane: s.monoplane_or_biplane,
            frontal_stand_type: s.frontal_stand_type,
            table_type: s.table_type,
            table_top_type: s.table_top_type,
            detector_name_frontal: s.detector_name_frontal,
            detector_name_lateral: s.detector_name_lateral,
            system_type: s.system_type,
            product_family: s.product_family,
            detector_type: s.detector_type,
            lateral_stand_type: s.lateral_stand_type,
            system_config_type: s.system_config_type,
            raw_xml: s.raw_xml,
        }),
        measurements: measurements
            .into_iter()
            .map(|m| Measurement {
                id: m.id,
                test_name: m.test_name,
                measurement_name: m.measurement_name,
                result: m.result,
                measurement_unit: m.measurement_unit,
                description: m.description,
                measured_value: m.measured_value,
                spec_error_upper: m.spec_error_upper,
                spec_error_lower: m.spec_error_lower,
                spec_warning_upper: m.spec_warning_upper,
                spec_warning_lower: m.spec_warning_lower,
            })
            .collect(),
    }
}
