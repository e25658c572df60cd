use std::{
    process,
    sync::mpsc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use desktop_core::{InstanceGate, InstanceRole};

fn unique_gate(label: &str) -> InstanceGate {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    InstanceGate::with_key(format!(
        "anytype-desktop-test-{label}-{}-{nanos}.sock",
        process::id()
    ))
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn second_acquisition_forwards_arguments_to_holder() {
    let gate = unique_gate("forward");
    let (forwarded_tx, forwarded_rx) = mpsc::channel();

    let first = gate
        .acquire(&args(&["anytype"]), move |forwarded| {
            forwarded_tx.send(forwarded).is_ok()
        })
        .expect("first acquisition");
    let InstanceRole::Primary(mut guard) = first else {
        panic!("first process must hold the lock");
    };

    let second = gate
        .acquire(&args(&["anytype", "anytype://object?objectId=1"]), |_| true)
        .expect("second acquisition");
    assert!(matches!(second, InstanceRole::Secondary));

    let received = forwarded_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("holder received the invocation");
    assert_eq!(received, args(&["anytype", "anytype://object?objectId=1"]));

    guard.release();
    assert!(guard.is_released());
}

#[test]
fn lock_can_be_taken_again_after_release() {
    let gate = unique_gate("release");

    let InstanceRole::Primary(mut guard) = gate.acquire(&[], |_| true).expect("acquire") else {
        panic!("first process must hold the lock");
    };
    guard.release();
    guard.release();

    let again = gate.acquire(&[], |_| true).expect("re-acquire");
    assert!(matches!(again, InstanceRole::Primary(_)));
}

#[test]
fn busy_holder_is_waited_out() {
    let gate = unique_gate("busy");

    let InstanceRole::Primary(guard) = gate.acquire(&[], |_| false).expect("acquire") else {
        panic!("first process must hold the lock");
    };
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(400));
        drop(guard);
    });

    let successor = gate.acquire(&[], |_| true).expect("takes over after release");
    assert!(matches!(successor, InstanceRole::Primary(_)));
    releaser.join().expect("releaser thread");
}

#[cfg(unix)]
#[test]
fn stale_socket_file_from_crashed_holder_is_reclaimed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("instance.sock");
    // A bound-then-dropped std listener leaves its socket file behind, like a
    // holder that was killed.
    drop(std::os::unix::net::UnixListener::bind(&path).expect("bind stale socket"));
    assert!(path.exists());

    let gate = InstanceGate::at_path(&path);
    let InstanceRole::Primary(mut guard) = gate.acquire(&[], |_| true).expect("acquire") else {
        panic!("stale socket must not block the new holder");
    };

    let second = gate
        .acquire(&args(&["anytype"]), |_| true)
        .expect("second acquisition");
    assert!(matches!(second, InstanceRole::Secondary));

    guard.release();
    assert!(!path.exists());
}
