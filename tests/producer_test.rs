//! Event bundler: every tracked action enqueues identify + group + track.

use std::sync::Arc;

use todo_analytics::error::Error;
use todo_analytics::identity::IdentityResolver;
use todo_analytics::model::{Context, Envelope, GroupId, UserId, name_traits};
use todo_analytics::producer::{BackgroundTracker, TrackEventRequest, Tracker, events};
use todo_analytics::queue::{MemoryQueue, QueueBoundary};

fn tracker(collapse: bool, queue: &Arc<MemoryQueue>) -> Tracker {
    Tracker::new(IdentityResolver::new(collapse), queue.clone())
}

async fn drain(queue: &MemoryQueue) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Some(delivery) = queue.read().await.unwrap() {
        out.push(Envelope::decode(&delivery.body).unwrap());
        queue.ack(delivery.msg_id).await.unwrap();
    }
    out
}

#[tokio::test]
async fn track_enqueues_identify_group_and_track() {
    let queue = Arc::new(MemoryQueue::new("analytics"));
    let tracker = tracker(false, &queue);

    tracker
        .track(&Context::new("u1", "c1"), "Todo Created")
        .await
        .unwrap();

    assert_eq!(
        drain(&queue).await,
        vec![
            Envelope::Identify {
                user_id: UserId("u1".into()),
                group_id: GroupId("c1".into()),
                traits: name_traits("u1"),
            },
            Envelope::Group {
                group_id: GroupId("c1".into()),
                traits: name_traits("c1"),
            },
            Envelope::Track {
                user_id: UserId("u1".into()),
                event: "Todo Created".into(),
            },
        ]
    );
}

#[tokio::test]
async fn override_uses_group_id_as_user_id() {
    let queue = Arc::new(MemoryQueue::new("analytics"));
    let tracker = tracker(true, &queue);

    tracker
        .track(&Context::new("u1", "c1"), "Todo Created")
        .await
        .unwrap();

    let envelopes = drain(&queue).await;
    assert_eq!(envelopes.len(), 3);
    for envelope in envelopes {
        match envelope {
            Envelope::Identify {
                user_id, traits, ..
            } => {
                assert_eq!(user_id, UserId("c1".into()));
                assert_eq!(traits, name_traits("c1"));
            }
            Envelope::Track { user_id, .. } => assert_eq!(user_id, UserId("c1".into())),
            Envelope::Group { group_id, .. } => assert_eq!(group_id, GroupId("c1".into())),
        }
    }
}

#[tokio::test]
async fn bundle_is_one_of_each_kind() {
    let queue = Arc::new(MemoryQueue::new("analytics"));
    let tracker = tracker(false, &queue);

    for (account, cloud, event) in [("a", "b", "x"), ("", "site", "Todos Loaded")] {
        let bundle = tracker.bundle(&Context::new(account, cloud), event);
        let kinds: Vec<_> = bundle.iter().map(Envelope::kind).collect();
        assert_eq!(kinds, ["identify", "group", "track"]);
    }
}

#[tokio::test]
async fn wrappers_use_fixed_event_names() {
    let queue = Arc::new(MemoryQueue::new("analytics"));
    let tracker = tracker(false, &queue);
    let ctx = Context::new("u1", "c1");

    tracker.track_get_all(&ctx).await.unwrap();
    tracker.track_create(&ctx).await.unwrap();
    tracker.track_update(&ctx).await.unwrap();
    tracker.track_delete(&ctx).await.unwrap();
    tracker.track_delete_all(&ctx).await.unwrap();
    tracker
        .track_event(
            &ctx,
            &TrackEventRequest {
                event: "Todos Loaded".into(),
            },
        )
        .await
        .unwrap();

    let tracked: Vec<String> = drain(&queue)
        .await
        .into_iter()
        .filter_map(|e| match e {
            Envelope::Track { event, .. } => Some(event),
            _ => None,
        })
        .collect();

    assert_eq!(
        tracked,
        vec![
            events::GET_ALL,
            events::CREATE,
            events::UPDATE,
            events::DELETE,
            events::DELETE_ALL,
            "Todos Loaded",
        ]
    );
}

#[tokio::test]
async fn rejected_push_fails_and_enqueues_nothing() {
    let queue = Arc::new(MemoryQueue::new("analytics").with_capacity(2));
    let tracker = tracker(false, &queue);

    let err = tracker
        .track(&Context::new("u1", "c1"), "Todo Created")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::QueueRejected(_)), "got {err:?}");
    assert!(queue.is_empty());
}

#[tokio::test]
async fn background_tracker_enqueues_off_the_caller_path() {
    let queue = Arc::new(MemoryQueue::new("analytics"));
    let (handle, worker) = BackgroundTracker::spawn(Arc::new(tracker(false, &queue)), 8);

    assert!(handle.submit(Context::new("u1", "c1"), events::CREATE));
    assert!(handle.submit(Context::new("u2", "c1"), events::DELETE));
    drop(handle);
    worker.await.unwrap();

    assert_eq!(queue.ready_len(), 6);
}

#[tokio::test]
async fn background_tracker_drops_failed_enqueues() {
    let queue = Arc::new(MemoryQueue::new("analytics").with_capacity(0));
    let (handle, worker) = BackgroundTracker::spawn(Arc::new(tracker(false, &queue)), 8);

    assert!(handle.submit(Context::new("u1", "c1"), events::CREATE));
    drop(handle);
    // The worker logs the rejection and keeps going; nothing panics.
    worker.await.unwrap();

    assert!(queue.is_empty());
}

#[tokio::test]
async fn background_tracker_drops_when_channel_is_full() {
    let queue = Arc::new(MemoryQueue::new("analytics"));
    let (handle, worker) = BackgroundTracker::spawn(Arc::new(tracker(false, &queue)), 1);

    // Single-threaded test runtime: the worker has not run yet.
    assert!(handle.submit(Context::new("u1", "c1"), events::CREATE));
    assert!(!handle.submit(Context::new("u1", "c1"), events::UPDATE));

    drop(handle);
    worker.await.unwrap();
    assert_eq!(queue.ready_len(), 3);
}
