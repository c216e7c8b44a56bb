//! End-to-end integration tests
//!
//! These tests validate the complete replay pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Reads input.csv (a journal) from a fixture directory
//! 2. Replays it through the engine and renders one report
//! 3. Compares the report with expected.csv
//!
//! Fixtures live in tests/fixtures/ and cover:
//! - The even split and greedy settlement of a single expense
//! - Uneven splits with a rounding remainder and placeholder expenses
//! - Sub-group balances with solo members
//! - Event status, finalization and cancellation
//! - The claim/confirm/unconfirm lifecycle, rejected and malformed rows
//! - Members leaving, total edits and reference protection
//! - One participant joining two events in the same batch
//!
//! Each fixture is run twice: once with the synchronous strategy and once
//! with the async strategy.

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use event_settlement_engine::cli::{ReportType, StrategyType};
    use event_settlement_engine::config::EngineConfig;
    use event_settlement_engine::strategy::{create_strategy, BatchConfig, ReplayOptions};
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    /// Replay tests/fixtures/{fixture_name}/input.csv and compare the selected
    /// report with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if a fixture file cannot be read or the output differs.
    fn run_test_fixture(fixture_name: &str, report: ReportType, strategy_type: StrategyType) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        let options = ReplayOptions::new(
            EngineConfig::default(),
            report,
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        );
        // Small batches so multi-event journals span several of them
        let strategy = create_strategy(strategy_type, options, Some(BatchConfig::new(4, 2)));

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        strategy
            .process(Path::new(&input_path), &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to replay journal: {}", e));

        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));

        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (strategy: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, strategy_type, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("dinner", ReportType::Suggestions)]
    #[case("uneven_split", ReportType::Balances)]
    #[case("subgroups", ReportType::Groups)]
    #[case("event_lifecycle", ReportType::Events)]
    #[case("claim_lifecycle", ReportType::Suggestions)]
    #[case("member_leaves", ReportType::Suggestions)]
    #[case("shared_participant", ReportType::Suggestions)]
    fn test_fixtures(
        #[case] fixture: &str,
        #[case] report: ReportType,
        #[values(StrategyType::Sync, StrategyType::Async)] strategy: StrategyType,
    ) {
        run_test_fixture(fixture, report, strategy);
    }
}
