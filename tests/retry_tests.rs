use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use orderbot::models::{OrderStatus, Summary};
use orderbot::notify::render_message;
use orderbot::{RetryPolicy, RunReport};

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO)
}

// ── RetryPolicy ──

#[tokio::test]
async fn test_action_success_without_check() {
    let calls = Arc::new(AtomicU32::new(0));
    let ok = policy(3)
        .execute("ping", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            }
        })
        .await;

    assert!(ok);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_action_gives_up_after_max_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let ok = policy(3)
        .execute("ping", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), String>("nope".to_string())
            }
        })
        .await;

    assert!(!ok);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_check_decides_success() {
    let checks = Arc::new(AtomicU32::new(0));
    let ok = policy(3)
        .execute_with_check(
            "login",
            || async { Ok::<(), String>(()) },
            || {
                let checks = checks.clone();
                async move { checks.fetch_add(1, Ordering::SeqCst) == 1 }
            },
        )
        .await;

    assert!(ok);
    assert_eq!(checks.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_check_never_passing_returns_false() {
    let ok = policy(2)
        .execute_with_check("login", || async { Ok::<(), String>(()) }, || async { false })
        .await;

    assert!(!ok);
}

// ── Status rules ──

#[test]
fn test_terminal_statuses_have_no_way_out() {
    for status in [OrderStatus::Done, OrderStatus::NoReceipt, OrderStatus::Error] {
        assert!(status.is_terminal());
        assert!(!status.can_transition_to(OrderStatus::Retry));
    }
    assert!(OrderStatus::Retry.can_transition_to(OrderStatus::Error));
    assert!(OrderStatus::Retry.can_transition_to(OrderStatus::Retry));
    assert!(!OrderStatus::Retry.can_transition_to(OrderStatus::Pending));
    assert_eq!("NO_RECEIPT".parse::<OrderStatus>(), Ok(OrderStatus::NoReceipt));
    assert!("SHIPPED".parse::<OrderStatus>().is_err());
}

// ── Report message ──

#[test]
fn test_report_message_carries_counts_and_abort_reason() {
    let summary = Summary::from_rows(vec![("DONE".to_string(), 3), ("ERROR".to_string(), 1)]);
    assert_eq!(summary.success_rate(), 75.0);

    let report = RunReport {
        run_id: Uuid::now_v7(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
        tally: None,
        summary,
        export_path: "out/report.csv".into(),
        error: Some("Login Failed: session 0 could not log in".to_string()),
    };

    let message = render_message(&report).to_string();
    assert!(message.contains("*Total:*\\n4"));
    assert!(message.contains("75.0%"));
    assert!(message.contains("out/report.csv"));
    assert!(message.contains("run aborted: Login Failed"));
}
