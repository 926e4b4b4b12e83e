//! Ordo Lock Integration Tests
//!
//! Drive `InterProcessMutex` through the public API against an in-process
//! `MemoryEnsemble`. No external coordination service is needed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ordo_coordination::{
    CoordinationClient, CoordinationError, MemoryClient, MemoryEnsemble, NamespacedClient,
};
use ordo_lock::{
    InterProcessLock, InterProcessMutex, InterruptHandle, LockError, OwnerId, StandardLockDriver,
};

const LOCK_PATH: &str = "/locks/test";
const WAIT: Duration = Duration::from_secs(10);

fn make_lock(client: &Arc<MemoryClient>) -> InterProcessMutex<MemoryClient> {
    InterProcessMutex::new(client.clone(), LOCK_PATH).unwrap()
}

/// Poll `condition` until it holds or a few seconds pass
async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ============== Reentrancy Tests ==============

async fn foo(mutex: &dyn InterProcessLock, owner: &OwnerId, other: Option<&OwnerId>) {
    assert!(mutex.try_acquire(owner, WAIT).await.unwrap());
    assert!(mutex.is_acquired_in_this_process());
    bar(mutex, owner, other).await;
    assert!(mutex.is_acquired_in_this_process());
    mutex.release(owner).await.unwrap();
}

async fn bar(mutex: &dyn InterProcessLock, owner: &OwnerId, other: Option<&OwnerId>) {
    assert!(mutex.try_acquire(owner, WAIT).await.unwrap());
    assert!(mutex.is_acquired_in_this_process());
    if let Some(other) = other {
        // A different owner on the same instance does not share the hold
        assert!(
            !mutex
                .try_acquire(other, Duration::from_millis(100))
                .await
                .unwrap()
        );
    }
    snafu(mutex, owner).await;
    assert!(mutex.is_acquired_in_this_process());
    mutex.release(owner).await.unwrap();
}

async fn snafu(mutex: &dyn InterProcessLock, owner: &OwnerId) {
    assert!(mutex.try_acquire(owner, WAIT).await.unwrap());
    assert!(mutex.is_acquired_in_this_process());
    mutex.release(owner).await.unwrap();
    assert!(mutex.is_acquired_in_this_process());
}

#[tokio::test]
async fn test_reentrant() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex = make_lock(&client);

    foo(&mutex, &OwnerId::from("main"), None).await;
    assert!(!mutex.is_acquired_in_this_process());
    assert!(ensemble.children(LOCK_PATH).is_empty());
}

#[tokio::test]
async fn test_reentrant_two_owners() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex = make_lock(&client);

    foo(&mutex, &OwnerId::from("main"), Some(&OwnerId::from("other"))).await;
    assert!(!mutex.is_acquired_in_this_process());
    assert!(ensemble.children(LOCK_PATH).is_empty());
}

#[tokio::test]
async fn test_reentrant_hold_uses_one_node() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex = make_lock(&client);
    let owner = OwnerId::from("main");

    mutex.acquire(&owner).await.unwrap();
    let node = mutex.lock_node(&owner).unwrap();
    mutex.acquire(&owner).await.unwrap();
    mutex.acquire(&owner).await.unwrap();

    assert_eq!(mutex.hold_count(&owner), 3);
    assert_eq!(mutex.lock_node(&owner).unwrap(), node);
    assert_eq!(mutex.participant_nodes().await.unwrap(), vec![node]);

    for _ in 0..3 {
        mutex.release(&owner).await.unwrap();
    }
    assert!(mutex.release(&owner).await.unwrap_err().is_not_owner());
}

// ============== Mutual Exclusion Tests ==============

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reentrant_single_lock() {
    const TASK_QTY: usize = 10;

    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex = Arc::new(make_lock(&client));
    let has_lock = Arc::new(AtomicBool::new(false));

    let mut tasks = Vec::with_capacity(TASK_QTY);
    for i in 0..TASK_QTY {
        let mutex = mutex.clone();
        let has_lock = has_lock.clone();
        tasks.push(tokio::spawn(async move {
            let owner = OwnerId::new(format!("task-{i}"));
            mutex.acquire(&owner).await.unwrap();
            assert!(
                has_lock
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
            has_lock.store(false, Ordering::SeqCst);
            mutex.release(&owner).await.unwrap();
        }));
    }

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
    assert!(!mutex.is_acquired_in_this_process());
    assert!(ensemble.children(LOCK_PATH).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_clients() {
    let ensemble = MemoryEnsemble::new();
    let mutex1 = Arc::new(make_lock(&Arc::new(ensemble.connect())));
    let mutex2 = Arc::new(make_lock(&Arc::new(ensemble.connect())));
    let (release1, wait1) = tokio::sync::oneshot::channel::<()>();
    let (release2, wait2) = tokio::sync::oneshot::channel::<()>();

    let spawn_holder = |mutex: Arc<InterProcessMutex<MemoryClient>>,
                        wait: tokio::sync::oneshot::Receiver<()>| {
        tokio::spawn(async move {
            let owner = OwnerId::random();
            assert!(mutex.try_acquire(&owner, WAIT).await.unwrap());
            let _ = tokio::time::timeout(WAIT, wait).await;
            mutex.release(&owner).await.unwrap();
        })
    };
    let task1 = spawn_holder(mutex1.clone(), wait1);
    let task2 = spawn_holder(mutex2.clone(), wait2);

    eventually(|| mutex1.is_acquired_in_this_process() || mutex2.is_acquired_in_this_process())
        .await;
    assert_ne!(
        mutex1.is_acquired_in_this_process(),
        mutex2.is_acquired_in_this_process()
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_ne!(
        mutex1.is_acquired_in_this_process(),
        mutex2.is_acquired_in_this_process()
    );

    let first_was_1 = mutex1.is_acquired_in_this_process();
    if first_was_1 {
        release1.send(()).unwrap();
        task1.await.unwrap();
    } else {
        release2.send(()).unwrap();
        task2.await.unwrap();
    }

    let (first, second) = if first_was_1 {
        (&mutex1, &mutex2)
    } else {
        (&mutex2, &mutex1)
    };
    eventually(|| second.is_acquired_in_this_process()).await;
    assert!(!first.is_acquired_in_this_process());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fifo_ordering() {
    let ensemble = MemoryEnsemble::new();
    let holder = make_lock(&Arc::new(ensemble.connect()));
    let holder_owner = OwnerId::from("holder");
    holder.acquire(&holder_owner).await.unwrap();

    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for i in 0..5 {
        let mutex = make_lock(&Arc::new(ensemble.connect()));
        let order = order.clone();
        tasks.push(tokio::spawn(async move {
            let owner = OwnerId::new(format!("waiter-{i}"));
            mutex.acquire(&owner).await.unwrap();
            order.lock().push(i);
            mutex.release(&owner).await.unwrap();
        }));
        // Queue each waiter before the next one
        eventually(|| ensemble.children(LOCK_PATH).len() == i + 2).await;
    }

    holder.release(&holder_owner).await.unwrap();
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_disjoint_paths_do_not_contend() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let left = InterProcessMutex::new(client.clone(), "/locks/left").unwrap();
    let right = InterProcessMutex::new(client, "/locks/right").unwrap();

    assert!(
        left.try_acquire(&OwnerId::from("a"), Duration::ZERO)
            .await
            .unwrap()
    );
    assert!(
        right
            .try_acquire(&OwnerId::from("b"), Duration::ZERO)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_with_namespace() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(NamespacedClient::new(Arc::new(ensemble.connect()), "test"));
    let mutex = InterProcessMutex::new(client, LOCK_PATH).unwrap();
    let owner = OwnerId::from("main");

    assert!(mutex.try_acquire(&owner, WAIT).await.unwrap());
    let node = mutex.lock_node(&owner).unwrap();
    assert!(node.starts_with("/locks/test/lock-"));
    assert!(ensemble.exists(&format!("/test{node}")));

    tokio::time::sleep(Duration::from_millis(20)).await;
    mutex.release(&owner).await.unwrap();
    assert!(ensemble.children("/test/locks/test").is_empty());
}

#[tokio::test]
async fn test_lock_kinds_share_a_path() {
    let ensemble = MemoryEnsemble::new();
    let read = InterProcessMutex::with_driver(
        Arc::new(ensemble.connect()),
        "/locks/rw",
        "read-lock-",
        Arc::new(StandardLockDriver),
    )
    .unwrap();
    let plain = InterProcessMutex::new(Arc::new(ensemble.connect()), "/locks/rw").unwrap();

    read.acquire(&OwnerId::from("reader")).await.unwrap();
    // "read-lock-N" ends in "lock-" but is not a "lock-" contender
    assert!(
        plain
            .try_acquire(&OwnerId::from("writer"), Duration::from_millis(200))
            .await
            .unwrap()
    );
    assert_eq!(
        plain.participant_nodes().await.unwrap(),
        vec!["/locks/rw/lock-0000000001".to_string()]
    );
    assert_eq!(
        read.participant_nodes().await.unwrap(),
        vec!["/locks/rw/read-lock-0000000000".to_string()]
    );
}

// ============== Timeout & Cancellation Tests ==============

#[tokio::test]
async fn test_timeout_leaves_no_residual_node() {
    let ensemble = MemoryEnsemble::new();
    let holder = make_lock(&Arc::new(ensemble.connect()));
    let waiter = make_lock(&Arc::new(ensemble.connect()));
    holder.acquire(&OwnerId::from("holder")).await.unwrap();

    let acquired = waiter
        .try_acquire(&OwnerId::from("waiter"), Duration::from_millis(100))
        .await
        .unwrap();

    assert!(!acquired);
    assert!(!waiter.is_acquired_in_this_process());
    assert_eq!(ensemble.children(LOCK_PATH).len(), 1);
    assert_eq!(ensemble.watch_count(), 0);
}

#[tokio::test]
async fn test_release_by_non_owner_changes_nothing() {
    let ensemble = MemoryEnsemble::new();
    let mutex = make_lock(&Arc::new(ensemble.connect()));
    mutex.acquire(&OwnerId::from("holder")).await.unwrap();
    let before = ensemble.children(LOCK_PATH);

    let err = mutex.release(&OwnerId::from("intruder")).await.unwrap_err();

    assert!(matches!(err, LockError::NotOwner { .. }));
    assert_eq!(ensemble.children(LOCK_PATH), before);
    assert!(mutex.is_owned_by(&OwnerId::from("holder")));
}

#[tokio::test]
async fn test_interrupt_removes_pending_node() {
    let ensemble = MemoryEnsemble::new();
    let holder = make_lock(&Arc::new(ensemble.connect()));
    let waiter = Arc::new(make_lock(&Arc::new(ensemble.connect())));
    holder.acquire(&OwnerId::from("holder")).await.unwrap();

    let interrupt = InterruptHandle::new();
    let pending = {
        let waiter = waiter.clone();
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            waiter
                .acquire_interruptibly(&OwnerId::from("waiter"), &interrupt, None)
                .await
        })
    };
    eventually(|| ensemble.children(LOCK_PATH).len() == 2).await;

    interrupt.interrupt();
    let result = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();

    assert!(matches!(result, Err(LockError::Interrupted)));
    assert_eq!(ensemble.children(LOCK_PATH).len(), 1);
    assert!(!waiter.is_acquired_in_this_process());
}

#[tokio::test]
async fn test_interrupt_before_acquire_creates_nothing() {
    let ensemble = MemoryEnsemble::new();
    let mutex = make_lock(&Arc::new(ensemble.connect()));
    let interrupt = InterruptHandle::new();
    interrupt.interrupt();

    let result = mutex
        .acquire_interruptibly(&OwnerId::from("a"), &interrupt, None)
        .await;

    assert!(matches!(result, Err(LockError::Interrupted)));
    assert!(!ensemble.exists(LOCK_PATH));
}

#[tokio::test]
async fn test_dropped_acquire_removes_node() {
    let ensemble = MemoryEnsemble::new();
    let holder = make_lock(&Arc::new(ensemble.connect()));
    let waiter = make_lock(&Arc::new(ensemble.connect()));
    holder.acquire(&OwnerId::from("holder")).await.unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        waiter.acquire(&OwnerId::from("waiter")),
    )
    .await;
    assert!(abandoned.is_err());

    eventually(|| ensemble.children(LOCK_PATH).len() == 1).await;
    assert_eq!(ensemble.watch_count(), 0);
    assert!(!waiter.is_acquired_in_this_process());
}

// ============== Session & Connection Tests ==============

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_death_hands_over() {
    let ensemble = MemoryEnsemble::new();
    let client1 = Arc::new(ensemble.connect());
    let holder = make_lock(&client1);
    let waiter = Arc::new(make_lock(&Arc::new(ensemble.connect())));
    holder.acquire(&OwnerId::from("a")).await.unwrap();

    let pending = {
        let waiter = waiter.clone();
        tokio::spawn(async move { waiter.try_acquire(&OwnerId::from("b"), WAIT).await })
    };
    eventually(|| ensemble.children(LOCK_PATH).len() == 2).await;

    assert!(client1.expire_session());
    let acquired = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(acquired);
    assert!(waiter.is_owned_by(&OwnerId::from("b")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_killed_session() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex1 = make_lock(&client);
    let mutex2 = Arc::new(make_lock(&client));
    mutex1.acquire(&OwnerId::from("first")).await.unwrap();

    let pending = {
        let mutex2 = mutex2.clone();
        tokio::spawn(async move { mutex2.acquire(&OwnerId::from("second")).await })
    };
    eventually(|| ensemble.children(LOCK_PATH).len() == 2).await;

    // Both nodes die with the session; the pending contender queues again
    assert!(client.expire_session());
    tokio::time::timeout(WAIT, pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(mutex2.is_acquired_in_this_process());
    assert_eq!(ensemble.children(LOCK_PATH).len(), 1);
}

#[tokio::test]
async fn test_held_state_survives_session_kill_until_release() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex = make_lock(&client);
    let owner = OwnerId::from("a");
    mutex.acquire(&owner).await.unwrap();

    assert!(client.expire_session());
    assert!(ensemble.children(LOCK_PATH).is_empty());
    assert!(mutex.is_acquired_in_this_process());

    mutex.release(&owner).await.unwrap();
    assert!(!mutex.is_acquired_in_this_process());
}

#[tokio::test]
async fn test_connection_loss_fails_acquire() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex = make_lock(&client);
    client.disconnect();

    let err = mutex.acquire(&OwnerId::from("a")).await.unwrap_err();

    assert!(matches!(
        err,
        LockError::Connection(CoordinationError::ConnectionLoss)
    ));
    assert!(!mutex.is_acquired_in_this_process());
}

#[tokio::test]
async fn test_closed_client_fails_pending_acquire() {
    let ensemble = MemoryEnsemble::new();
    let holder = make_lock(&Arc::new(ensemble.connect()));
    let client = Arc::new(ensemble.connect());
    let waiter = Arc::new(make_lock(&client));
    holder.acquire(&OwnerId::from("a")).await.unwrap();

    let pending = {
        let waiter = waiter.clone();
        tokio::spawn(async move { waiter.acquire(&OwnerId::from("b")).await })
    };
    eventually(|| ensemble.children(LOCK_PATH).len() == 2).await;

    client.close();
    let result = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();

    assert!(matches!(
        result,
        Err(LockError::Connection(CoordinationError::Closed))
    ));
    assert_eq!(ensemble.children(LOCK_PATH).len(), 1);
}

#[tokio::test]
async fn test_reconnect_during_wait_still_acquires() {
    let ensemble = MemoryEnsemble::new();
    let holder = make_lock(&Arc::new(ensemble.connect()));
    let client = Arc::new(ensemble.connect());
    let waiter = Arc::new(make_lock(&client));
    let holder_owner = OwnerId::from("a");
    holder.acquire(&holder_owner).await.unwrap();

    let pending = {
        let waiter = waiter.clone();
        tokio::spawn(async move { waiter.try_acquire(&OwnerId::from("b"), WAIT).await })
    };
    eventually(|| ensemble.watch_count() == 1).await;

    client.disconnect();
    client.reconnect();
    // The waiter re-polls and watches the holder again
    eventually(|| ensemble.watch_count() == 1).await;
    assert!(!pending.is_finished());

    holder.release(&holder_owner).await.unwrap();
    let acquired = tokio::time::timeout(WAIT, pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(acquired);
}

#[tokio::test]
async fn test_failed_release_can_be_retried() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex = make_lock(&client);
    let other = make_lock(&Arc::new(ensemble.connect()));
    let owner = OwnerId::from("a");
    mutex.acquire(&owner).await.unwrap();

    client.disconnect();
    let err = mutex.release(&owner).await.unwrap_err();
    assert!(matches!(
        err,
        LockError::Connection(CoordinationError::ConnectionLoss)
    ));
    // The node is still there, so the owner still holds
    assert!(mutex.is_owned_by(&owner));
    assert_eq!(ensemble.children(LOCK_PATH).len(), 1);

    client.reconnect();
    mutex.release(&owner).await.unwrap();
    assert!(!mutex.is_acquired_in_this_process());
    assert!(
        other
            .try_acquire(&OwnerId::from("b"), Duration::from_millis(200))
            .await
            .unwrap()
    );
}

// ============== Query Tests ==============

#[tokio::test]
async fn test_participant_nodes_in_order() {
    let ensemble = MemoryEnsemble::new();
    let holder = make_lock(&Arc::new(ensemble.connect()));
    assert!(holder.participant_nodes().await.unwrap().is_empty());
    holder.acquire(&OwnerId::from("a")).await.unwrap();

    let waiter = Arc::new(make_lock(&Arc::new(ensemble.connect())));
    let pending = {
        let waiter = waiter.clone();
        tokio::spawn(async move { waiter.acquire(&OwnerId::from("b")).await })
    };
    eventually(|| ensemble.children(LOCK_PATH).len() == 2).await;

    let nodes = holder.participant_nodes().await.unwrap();
    assert_eq!(
        nodes,
        vec![
            format!("{LOCK_PATH}/lock-0000000000"),
            format!("{LOCK_PATH}/lock-0000000001"),
        ]
    );
    assert_eq!(holder.lock_node(&OwnerId::from("a")).unwrap(), nodes[0]);

    pending.abort();
    let _ = pending.await;
}

#[tokio::test]
async fn test_node_data_carries_owner() {
    let ensemble = MemoryEnsemble::new();
    let client = Arc::new(ensemble.connect());
    let mutex = make_lock(&client);
    let owner = OwnerId::from("owner-7");
    mutex.acquire(&owner).await.unwrap();

    let node = mutex.lock_node(&owner).unwrap();
    assert_eq!(client.get_data(&node).await.unwrap(), b"owner-7".to_vec());
}
