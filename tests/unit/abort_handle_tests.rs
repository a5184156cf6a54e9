//! Unit tests for the cooperative abort flag.

use std::time::Duration;

use kbase_chat::stream::cancel::AbortHandle;

#[test]
fn new_handle_is_not_aborted() {
    assert!(!AbortHandle::new().is_aborted());
}

#[test]
fn clones_share_the_flag() {
    let handle = AbortHandle::new();
    let clone = handle.clone();

    clone.abort();
    assert!(handle.is_aborted());
}

#[test]
fn abort_is_idempotent() {
    let handle = AbortHandle::new();
    handle.abort();
    handle.abort();
    assert!(handle.is_aborted());
}

#[test]
fn child_follows_parent_but_not_the_reverse() {
    let parent = AbortHandle::new();
    let child = parent.child();
    child.abort();
    assert!(!parent.is_aborted());

    let other_child = parent.child();
    parent.abort();
    assert!(other_child.is_aborted());
}

#[tokio::test]
async fn aborted_future_completes_after_abort() {
    let handle = AbortHandle::new();
    let waiter = handle.clone();
    let task = tokio::spawn(async move { waiter.aborted().await });

    handle.abort();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("waiter wakes up")
        .expect("task completes");
}
