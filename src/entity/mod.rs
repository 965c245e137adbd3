//! SeaORM entity definitions.
//!
//! One `test_runs` row owns its `test_results`, `system_infos` and
//! `measurements` rows through `test_run_id` (cascade delete).

pub mod measurement;
pub mod system_info;
pub mod test_result;
pub mod test_run;
