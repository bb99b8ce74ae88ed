mod utils;
use utils::*;

use mock_service::MockConfig;
use prload::prelude::*;
use prload_core::ConfigError;
use std::num::{NonZeroU32, NonZeroU64};
use std::time::Duration;

fn one_user() -> Vec<Stage> {
    vec![
        Stage::new(Duration::ZERO, 1),
        Stage::new(Duration::from_secs(30), 1),
    ]
}

fn small_population() -> Population {
    Population {
        teams: 3,
        members_per_team: 4,
    }
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn healthy_target_single_user() {
    let api = init(MockConfig::default()).await;

    let report = LoadTest::new(api)
        .stages(one_user())
        .population(small_population())
        .iterations(NonZeroU64::new(5).unwrap())
        .await
        .unwrap();

    assert_eq!(report.seed.created_teams, 3);
    assert_eq!(report.seed.users, 12);
    assert_eq!(report.statistics.iterations, 5);
    assert!(report.statistics.latency.p95 < Duration::from_millis(300));
    assert_eq!(report.statistics.error_rate, 0.);
    assert!(report.passed(), "{report}");
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn target_failing_everything_fails_error_threshold() {
    let api = init(MockConfig::default().forced_status(500)).await;

    let report = LoadTest::new(api)
        .stages(one_user())
        .population(small_population())
        .iterations(NonZeroU64::new(10).unwrap())
        .await
        .unwrap();

    // Setup is rejected too, but the members are still used as operands.
    assert_eq!(report.seed.created_teams, 0);
    assert_eq!(report.seed.users, 12);
    assert_eq!(report.scheduler.iterations, 10);
    assert_eq!(
        report.statistics.iterations + report.scheduler.skipped,
        10,
        "{report}"
    );
    assert!(report.statistics.iterations > 0);
    assert_eq!(report.statistics.error_rate, 1.);
    assert!(!report.passed());

    let error_rate = report
        .thresholds
        .iter()
        .find(|t| t.criterion.starts_with("errors"))
        .unwrap();
    assert!(!error_rate.passed);

    let status_failures: u64 = report
        .statistics
        .operations
        .iter()
        .map(|o| o.status_failures)
        .sum();
    assert_eq!(status_failures, report.statistics.iterations);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn partial_setup() {
    let api = init(MockConfig::default().reject_every_nth_team(4)).await;

    let report = LoadTest::new(api)
        .stages(one_user())
        .population(Population {
            teams: 8,
            members_per_team: 2,
        })
        .iterations(NonZeroU64::new(5).unwrap())
        .await
        .unwrap();

    assert_eq!(report.seed.attempted_teams, 8);
    assert_eq!(report.seed.created_teams, 6);
    // Members of the rejected teams are kept.
    assert_eq!(report.seed.users, 16);
    assert_eq!(report.statistics.iterations, 5);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn slow_target_fails_latency_checks() {
    let api = init(MockConfig::default().delay(Duration::from_millis(350))).await;

    let report = LoadTest::new(api)
        .stages(one_user())
        .population(Population {
            teams: 1,
            members_per_team: 3,
        })
        .iterations(NonZeroU64::new(2).unwrap())
        .await
        .unwrap();

    assert_eq!(report.statistics.iterations, 2);
    assert!(report.statistics.latency.p95 >= Duration::from_millis(300));
    assert!(report.thresholds.iter().all(|t| !t.passed));

    let latency_failures: u64 = report
        .statistics
        .operations
        .iter()
        .map(|o| o.latency_failures)
        .sum();
    assert_eq!(latency_failures, 2);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn staged_run_with_rate_cap() {
    let api = init(MockConfig::default()).await;

    let report = LoadTest::new(api)
        .stages(Stage::parse_list("500ms:3,1s:3,500ms:0").unwrap())
        .population(small_population())
        .max_rps(NonZeroU32::new(20).unwrap())
        .await
        .unwrap();

    assert_eq!(report.scheduler.peak_concurrency, 3);
    assert!(report.statistics.iterations > 0);
    assert!(report.statistics.iterations <= 50, "{report}");
    assert_eq!(report.statistics.error_rate, 0., "{report}");
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn unreachable_target_records_transport_failures() {
    let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();

    let report = LoadTest::new(api)
        .stages(one_user())
        .population(small_population())
        .iterations(NonZeroU64::new(20).unwrap())
        .await
        .unwrap();

    assert_eq!(report.seed.created_teams, 0);
    assert_eq!(report.scheduler.iterations, 20);
    assert_eq!(
        report.statistics.iterations + report.scheduler.skipped,
        20
    );
    assert!(report.statistics.iterations > 0);

    let transport_failures: u64 = report
        .statistics
        .operations
        .iter()
        .map(|o| o.transport_failures)
        .sum();
    assert_eq!(transport_failures, report.statistics.iterations);
    assert_eq!(report.statistics.error_rate, 1.);
    assert!(!report.passed());
}

#[tokio::test]
async fn invalid_stages_are_rejected() {
    let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
    let res = LoadTest::new(api)
        .stages(vec![Stage::new(Duration::ZERO, 1)])
        .await;

    assert!(matches!(res, Err(ConfigError::EmptyProfile)));
}
