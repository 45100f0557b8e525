//! Scheduled group refresh: traits and the periodic job.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use todo_analytics::dispatch::EventHandlers;
use todo_analytics::error::{Error, Result};
use todo_analytics::identity::IdentityResolver;
use todo_analytics::model::{Context, GroupId, License, TraitValue, Traits, UserId};
use todo_analytics::schedule::{GroupRefreshJob, refresh_group, refresh_traits};

/// Only group calls are expected; anything else is a test failure.
#[derive(Default)]
struct GroupRecorder {
    groups: Mutex<Vec<(GroupId, Traits)>>,
    fail: bool,
}

#[async_trait]
impl EventHandlers for GroupRecorder {
    async fn handle_identify(&self, _: &UserId, _: &GroupId, _: &Traits) -> Result<()> {
        panic!("scheduled refresh must not identify");
    }

    async fn handle_group(&self, group_id: &GroupId, traits: &Traits) -> Result<()> {
        if self.fail {
            return Err(Error::Other("destination unavailable".into()));
        }
        self.groups
            .lock()
            .unwrap()
            .push((group_id.clone(), traits.clone()));
        Ok(())
    }

    async fn handle_track_event(&self, _: &UserId, _: &str) -> Result<()> {
        panic!("scheduled refresh must not track");
    }
}

fn licensed_context() -> Context {
    Context::new("u1", "c1").with_license(License {
        is_active: Some(true),
        is_evaluation: Some(false),
    })
}

#[test]
fn traits_carry_license_flags_and_sync_time() {
    let before = chrono::Utc::now();
    let traits = refresh_traits(&licensed_context(), None);

    assert_eq!(traits["name"], TraitValue::from("c1"));
    assert_eq!(traits["isActive"], TraitValue::Bool(true));
    assert_eq!(traits["isEvaluation"], TraitValue::Bool(false));
    assert!(!traits.contains_key("todoCount"));

    let TraitValue::Text(ref synced) = traits["lastDailySync"] else {
        panic!("lastDailySync should be text");
    };
    assert!(synced.ends_with('Z'));
    let synced = chrono::DateTime::parse_from_rfc3339(synced).unwrap();
    assert!(synced.timestamp_millis() >= before.timestamp_millis());
}

#[test]
fn traits_include_todo_count_when_known() {
    let traits = refresh_traits(&licensed_context(), Some(7));
    assert_eq!(traits["todoCount"], TraitValue::Int(7));
}

#[test]
fn missing_license_flags_are_left_out() {
    let traits = refresh_traits(&Context::new("u1", "c1"), None);
    assert!(!traits.contains_key("isActive"));
    assert!(!traits.contains_key("isEvaluation"));
    assert!(traits.contains_key("lastDailySync"));
}

#[tokio::test]
async fn refresh_calls_group_handler_directly() {
    let recorder = GroupRecorder::default();
    // Collapsing users does not change the group.
    let resolver = IdentityResolver::new(true);

    refresh_group(&recorder, &resolver, &licensed_context(), Some(3))
        .await
        .unwrap();

    let groups = recorder.groups.lock().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].0, GroupId("c1".into()));
    assert_eq!(groups[0].1["todoCount"], TraitValue::Int(3));
}

#[tokio::test]
async fn refresh_failure_is_returned_once_and_not_retried() {
    let recorder = GroupRecorder {
        fail: true,
        ..GroupRecorder::default()
    };

    let result = refresh_group(
        &recorder,
        &IdentityResolver::default(),
        &licensed_context(),
        None,
    )
    .await;

    assert!(result.is_err());
    assert!(recorder.groups.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn job_refreshes_immediately_then_on_interval() {
    let recorder = Arc::new(GroupRecorder::default());
    let job = Arc::new(
        GroupRefreshJob::new(
            recorder.clone(),
            IdentityResolver::default(),
            licensed_context(),
        )
        .interval(Duration::from_secs(3600)),
    );
    let stop = job.shutdown_handle();

    let runner = job.clone();
    let task = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_secs(3600 + 60)).await;
    stop.notify_one();
    task.await.unwrap();

    assert_eq!(recorder.groups.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn job_keeps_running_after_a_failed_refresh() {
    let recorder = Arc::new(GroupRecorder {
        fail: true,
        ..GroupRecorder::default()
    });
    let job = Arc::new(
        GroupRefreshJob::new(recorder.clone(), IdentityResolver::default(), licensed_context())
            .interval(Duration::from_secs(60)),
    );
    let stop = job.shutdown_handle();

    let runner = job.clone();
    let task = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_secs(150)).await;
    assert!(!task.is_finished());
    stop.notify_one();
    task.await.unwrap();
}
