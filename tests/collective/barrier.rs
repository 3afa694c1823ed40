use std::sync::{Arc, Mutex};

use super::helpers::{await_request, run_ranks};

/// 4 ranks issue a non-blocking barrier; after observing completion, each
/// appends to a shared host log. Every rank must have entered the barrier
/// before any rank exits it.
#[test]
fn test_barrier_orders_host_log() {
    let log: Arc<Mutex<Vec<(u32, &'static str)>>> = Arc::new(Mutex::new(Vec::new()));
    let shared = Arc::clone(&log);

    run_ranks(4, move |rc| {
        shared.lock().unwrap().push((rc.rank(), "enter"));

        let mut req = rc.backend.nonblocking_barrier(&rc.comm).unwrap();
        await_request(&mut req);

        let mut entries = shared.lock().unwrap();
        let enters = entries.iter().filter(|(_, what)| *what == "enter").count();
        assert_eq!(enters, 4, "rank {} exited before all ranks entered", rc.rank());
        entries.push((rc.rank(), "exit"));
    });

    let entries = log.lock().unwrap();
    assert_eq!(entries.len(), 8);
    for rank in 0..4 {
        assert!(entries.contains(&(rank, "enter")));
        assert!(entries.contains(&(rank, "exit")));
    }
}

/// Blocking barrier sequences the stream without a request.
#[test]
fn test_blocking_barrier() {
    run_ranks(4, |rc| {
        rc.backend.barrier(&rc.comm).unwrap();
        // Synchronizing the stream rides out the barrier's flag wait.
        rc.comm.stream().synchronize();
    });
}

/// Repeated barriers on the same communicator keep matching up.
#[test]
fn test_repeated_barriers() {
    run_ranks(3, |rc| {
        for _ in 0..10 {
            let mut req = rc.backend.nonblocking_barrier(&rc.comm).unwrap();
            await_request(&mut req);
        }
    });
}
