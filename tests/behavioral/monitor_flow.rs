// ABOUTME: Behavioral tests for the session monitor poll cycle and snapshot fan-out
//
// Time-dependent classification uses `poll_at` with explicit instants so no
// test sleeps for the idle or done thresholds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use fleetmux::models::{PaneType, PrInfo, SessionStatus};
use fleetmux::monitor::MonitorError;
use fleetmux::tmux::NewSession;
use pretty_assertions::assert_eq;

use super::fixtures::{eventually, test_monitor, ScriptedSource, TestRepo};

fn source() -> Arc<ScriptedSource> {
    Arc::new(ScriptedSource::new())
}

#[tokio::test]
async fn test_empty_before_first_poll() {
    let source = source();
    source.add_session("api", &[("zsh", "$ ")]);
    let monitor = test_monitor(&source);

    assert!(monitor.snapshot().is_empty());
    assert!(monitor.find_by_name("api").is_none());
}

#[tokio::test]
async fn test_snapshot_copies_are_independent() {
    let source = source();
    source.add_session("api", &[("claude", "> working")]);
    let monitor = test_monitor(&source);
    monitor.poll_once().await;

    let mut copy = monitor.snapshot();
    copy[0].name = "renamed".to_string();
    copy[0].status = SessionStatus::Error;
    copy[0].panes.clear();

    let fresh = monitor.snapshot();
    assert_eq!(fresh[0].name, "api");
    assert_eq!(fresh[0].status, SessionStatus::Active);
    assert_eq!(fresh[0].panes.len(), 1);
}

#[tokio::test]
async fn test_slow_subscriber_holds_only_latest_snapshot() {
    let source = source();
    source.add_session("api", &[("claude", "first")]);
    let monitor = test_monitor(&source);

    let mut fast = monitor.subscribe();
    let mut slow = monitor.subscribe();

    monitor.poll_once().await;
    let seen = fast.try_recv().expect("fast subscriber sees first publish");
    assert_eq!(seen[0].panes[0].content, "first");

    source.set_text("api", 0, "second");
    monitor.poll_once().await;
    let seen = fast.try_recv().expect("fast subscriber sees second publish");
    assert_eq!(seen[0].panes[0].content, "second");

    // The slow subscriber never read: only the latest value is pending
    let latest = slow.try_recv().expect("slow subscriber has a pending snapshot");
    assert_eq!(latest[0].panes[0].content, "second");
    assert!(slow.try_recv().is_none());
    assert!(!slow.has_pending());
}

#[tokio::test]
async fn test_done_after_quiet_period_with_prompt() {
    let source = source();
    source.add_session("finished", &[("zsh", "cargo test\ntest result: ok\nuser@host:~/api$ ")]);
    source.add_session("building", &[("zsh", "cargo build\n   Compiling serde v1.0")]);
    let monitor = test_monitor(&source);

    let t0 = Utc::now();
    monitor.poll_at(t0).await;
    monitor.poll_at(t0 + TimeDelta::seconds(65)).await;

    assert_eq!(monitor.find_by_name("finished").unwrap().status, SessionStatus::Done);
    assert_eq!(monitor.find_by_name("building").unwrap().status, SessionStatus::Idle);
}

#[tokio::test]
async fn test_status_progression_over_time() {
    let source = source();
    source.add_session("api", &[("nvim", ""), ("claude", "thinking")]);
    let monitor = test_monitor(&source);
    let t0 = Utc::now();

    monitor.poll_at(t0).await;
    assert_eq!(monitor.find_by_name("api").unwrap().status, SessionStatus::Active);

    monitor.poll_at(t0 + TimeDelta::seconds(20)).await;
    assert_eq!(monitor.find_by_name("api").unwrap().status, SessionStatus::Active);

    monitor.poll_at(t0 + TimeDelta::seconds(31)).await;
    assert_eq!(monitor.find_by_name("api").unwrap().status, SessionStatus::Idle);

    source.set_text("api", 1, "thinking\nwrote src/main.rs");
    monitor.poll_at(t0 + TimeDelta::seconds(40)).await;
    let session = monitor.find_by_name("api").unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.last_changed, t0 + TimeDelta::seconds(40));

    // Editor pane never carries a status, agent pane mirrors the session
    assert_eq!(session.panes[0].pane_type, PaneType::Editor);
    assert_eq!(session.panes[0].status, None);
    assert_eq!(session.panes[0].content, "");
    assert_eq!(session.panes[1].status, Some(SessionStatus::Active));
}

#[tokio::test]
async fn test_error_reported_even_when_content_changes() {
    let source = source();
    source.add_session("api", &[("cargo", "Compiling")]);
    let monitor = test_monitor(&source);
    let t0 = Utc::now();
    monitor.poll_at(t0).await;

    source.set_text("api", 0, "Compiling\nerror[E0425]: cannot find value `x`");
    monitor.poll_at(t0 + TimeDelta::seconds(2)).await;

    assert_eq!(monitor.find_by_name("api").unwrap().status, SessionStatus::Error);
}

#[tokio::test]
async fn test_new_session_seeded_active() {
    let source = source();
    source.add_session("api", &[("zsh", "thread 'main' panic: boom\n$ ")]);
    let monitor = test_monitor(&source);

    monitor.poll_once().await;
    assert_eq!(monitor.find_by_name("api").unwrap().status, SessionStatus::Active);

    monitor.poll_once().await;
    assert_eq!(monitor.find_by_name("api").unwrap().status, SessionStatus::Error);
}

#[tokio::test]
async fn test_last_changed_never_moves_backward() {
    let source = source();
    source.add_session("api", &[("zsh", "one")]);
    let monitor = test_monitor(&source);
    let t0 = Utc::now();

    monitor.poll_at(t0 + TimeDelta::seconds(10)).await;
    source.set_text("api", 0, "two");
    monitor.poll_at(t0).await;

    assert_eq!(
        monitor.find_by_name("api").unwrap().last_changed,
        t0 + TimeDelta::seconds(10)
    );
}

#[tokio::test]
async fn test_sessions_vanish_when_listing_fails() {
    let source = source();
    source.add_session("api", &[("zsh", "$")]);
    source.add_session("web", &[("zsh", "$")]);
    let monitor = test_monitor(&source);
    monitor.poll_once().await;
    assert_eq!(monitor.snapshot().len(), 2);

    let mut sub = monitor.subscribe();
    source.fail_listing(true);
    monitor.poll_once().await;

    assert!(monitor.snapshot().is_empty());
    assert!(sub.try_recv().expect("clearing is published").is_empty());

    // Recovery brings them back as new sessions
    source.fail_listing(false);
    monitor.poll_once().await;
    assert_eq!(monitor.snapshot().len(), 2);
}

#[tokio::test]
async fn test_removed_session_disappears() {
    let source = source();
    source.add_session("api", &[("zsh", "$")]);
    source.add_session("web", &[("zsh", "$")]);
    let monitor = test_monitor(&source);
    monitor.poll_once().await;

    source.remove_session("api");
    monitor.poll_once().await;

    let names: Vec<String> = monitor.snapshot().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["web".to_string()]);
}

#[tokio::test]
async fn test_capture_failure_falls_back_to_pane_zero() {
    let source = source();
    source.add_session("api", &[("zsh", "pane zero text"), ("claude", "agent text")]);
    source.fail_capture("api", 1);
    let monitor = test_monitor(&source);

    monitor.poll_once().await;

    let session = monitor.find_by_name("api").unwrap();
    assert_eq!(session.panes[1].content, "pane zero text");
}

#[tokio::test]
async fn test_git_detected_once_and_carried_forward() {
    let repo = TestRepo::new().unwrap();
    let source = source();
    source.add_session("api", &[("claude", "$")]);
    source.set_git("api", repo.git_info());
    let monitor = test_monitor(&source);

    for _ in 0..3 {
        monitor.poll_once().await;
    }

    assert_eq!(source.git_calls(), 1);
    let session = monitor.find_by_name("api").unwrap();
    assert!(session.is_git_repo);
    assert!(!session.is_worktree);
    assert!(!session.branch.is_empty());
}

#[tokio::test]
async fn test_refresh_diff_is_stored_and_carried_forward() {
    let repo = TestRepo::new().unwrap();
    std::fs::write(repo.path().join("README.md"), "# Changed\n").unwrap();
    std::fs::write(repo.path().join("notes.txt"), "new file\n").unwrap();

    let source = source();
    source.add_session("api", &[("claude", "$")]);
    source.set_git("api", repo.git_info());
    let monitor = test_monitor(&source);
    monitor.poll_once().await;
    assert_eq!(monitor.find_by_name("api").unwrap().diff, None);

    let stat = monitor.refresh_diff("api").await.unwrap();
    assert_eq!(stat.added, 1);
    assert_eq!(stat.modified, 1);
    assert_eq!(stat.deleted, 0);

    monitor.poll_once().await;
    assert_eq!(monitor.find_by_name("api").unwrap().diff, Some(stat));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscriber_ends_on_latest_state_under_concurrent_updates() {
    let source = source();
    source.add_session("api", &[("claude", "start")]);
    let monitor = test_monitor(&source);
    monitor.poll_once().await;
    let mut sub = monitor.subscribe();
    let mut latest = monitor.snapshot();

    for round in 0..200u64 {
        source.set_text("api", 0, &format!("step {round}"));
        let annotating = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move {
                monitor
                    .annotate_pr(
                        "api",
                        PrInfo {
                            number: round,
                            title: format!("round {round}"),
                            url: String::new(),
                            state: "open".to_string(),
                        },
                    )
                    .unwrap();
            })
        };
        monitor.poll_once().await;
        annotating.await.unwrap();

        if let Some(snapshot) = sub.try_recv() {
            latest = snapshot.to_vec();
        }
        assert_eq!(latest, monitor.snapshot(), "round {round}");
    }
}

#[tokio::test]
async fn test_control_operations_reach_source() {
    let source = source();
    source.add_session("api", &[("nvim", ""), ("zsh", "$"), ("claude", ">")]);
    let monitor = test_monitor(&source);
    monitor.poll_once().await;

    let pane = monitor.send_text("api", None, "continue\n").await.unwrap();
    assert_eq!(pane, 2);
    monitor.send_text("api", Some(1), "ls\n").await.unwrap();
    assert_eq!(
        source.sent(),
        vec![
            ("api".to_string(), 2, "continue\n".to_string()),
            ("api".to_string(), 1, "ls\n".to_string()),
        ]
    );

    let dir = tempfile::TempDir::new().unwrap();
    monitor
        .create_session(&NewSession::new("web", dir.path()).with_command("claude"))
        .await
        .unwrap();
    monitor.poll_once().await;
    let web = monitor.find_by_name("web").unwrap();
    assert_eq!(web.panes[0].pane_type, PaneType::Agent);

    monitor.kill_session("web").await.unwrap();
    monitor.poll_once().await;
    assert!(monitor.find_by_name("web").is_none());

    assert!(matches!(
        monitor.kill_session("web").await,
        Err(MonitorError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_running_monitor_publishes_changes() {
    let source = source();
    source.add_session("api", &[("claude", "start")]);
    let monitor = test_monitor(&source);
    let mut sub = monitor.subscribe();
    monitor.start().unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.len(), 1);

    source.set_text("api", 0, "progress");
    let mut saw_progress = false;
    for _ in 0..20 {
        let Ok(Some(snapshot)) = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await
        else {
            break;
        };
        if snapshot[0].panes[0].content == "progress" {
            saw_progress = true;
            break;
        }
    }
    assert!(saw_progress);

    monitor.stop().await;
    assert!(!monitor.is_running());

    // Subscriptions outlive stop until explicitly closed
    assert_eq!(monitor.subscriber_count(), 1);
    monitor.unsubscribe(sub.id());
    assert!(eventually(Duration::from_secs(1), || monitor.subscriber_count() == 0).await);

    // Whatever was still pending drains, then the channel reports closure
    let drained = tokio::time::timeout(Duration::from_secs(1), async {
        while sub.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
}
