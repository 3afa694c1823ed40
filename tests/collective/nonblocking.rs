use std::sync::mpsc;
use std::time::{Duration, Instant};

use gantry::{AllreduceAlgorithm, DeviceBuffer, ReduceOp};

use super::helpers::{await_request, run_ranks};

/// `wait` never blocks the host: it returns while the barrier cannot have
/// completed, because the other rank has not entered it yet.
#[test]
fn test_wait_does_not_block_host() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(Some(release_rx));

    run_ranks(2, move |rc| {
        if rc.rank() == 0 {
            let mut req = rc.backend.nonblocking_barrier(&rc.comm).unwrap();
            // The peer is parked until we release it, so the barrier is
            // stuck; wait must still return.
            req.wait().unwrap();
            assert!(!req.test().unwrap());

            release_tx.send(()).unwrap();
            await_request(&mut req);
        } else {
            let rx = release_rx.lock().unwrap().take().unwrap();
            rx.recv().unwrap();
            let mut req = rc.backend.nonblocking_barrier(&rc.comm).unwrap();
            await_request(&mut req);
        }
    });
}

/// Idempotent test/wait: once `test` returns true, later `test` calls still
/// return true and `wait` is a no-op.
#[test]
fn test_request_test_wait_idempotent() {
    run_ranks(2, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<f32>::zeroed(2);
        buf.upload(&[1.0, 2.0], &stream);

        let mut req = unsafe {
            rc.backend
                .nonblocking_allreduce_inplace(
                    buf.as_mut_device_ptr(),
                    2,
                    ReduceOp::Sum,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap()
        };
        await_request(&mut req);
        assert!(req.is_null());
        assert!(req.test().unwrap());
        assert!(req.test().unwrap());
        req.wait().unwrap();
        req.wait().unwrap();
    });
}

/// Two allreduces in flight at once on the same stream, waited together.
#[test]
fn test_two_concurrent_allreduces() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let mut a = DeviceBuffer::<f32>::zeroed(4);
        a.upload(&[(rc.rank() + 1) as f32; 4], &stream);
        let mut b = DeviceBuffer::<f32>::zeroed(4);
        b.upload(&[(10 * (rc.rank() + 1)) as f32; 4], &stream);

        let mut req_a = unsafe {
            rc.backend
                .nonblocking_allreduce_inplace(
                    a.as_mut_device_ptr(),
                    4,
                    ReduceOp::Sum,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap()
        };
        req_a.wait().unwrap();
        let mut req_b = unsafe {
            rc.backend
                .nonblocking_allreduce_inplace(
                    b.as_mut_device_ptr(),
                    4,
                    ReduceOp::Sum,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap()
        };

        await_request(&mut req_b);
        await_request(&mut req_a);

        let mut out_a = [0.0f32; 4];
        a.download(&mut out_a, &stream);
        let mut out_b = [0.0f32; 4];
        b.download(&mut out_b, &stream);
        assert_eq!(out_a, [10.0f32; 4]);
        assert_eq!(out_b, [100.0f32; 4]);
    });
}

/// Pipelined allreduce x100 on one stream: the host issues all of them in
/// bounded time (progress is off the critical path) and the final buffer
/// matches the analytic result.
#[test]
fn test_pipelined_allreduce_hundred() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<f64>::zeroed(4);
        buf.upload(&[1.0, 2.0, 3.0, 4.0], &stream);

        let start = Instant::now();
        let mut requests = Vec::with_capacity(100);
        for _ in 0..100 {
            let mut req = unsafe {
                rc.backend
                    .nonblocking_allreduce_inplace(
                        buf.as_mut_device_ptr(),
                        4,
                        ReduceOp::Sum,
                        &rc.comm,
                        AllreduceAlgorithm::Automatic,
                    )
                    .unwrap()
            };
            // Chain into the stream; the host does not block.
            req.wait().unwrap();
            requests.push(req);
        }
        let issue_time = start.elapsed();
        assert!(
            issue_time < Duration::from_secs(2),
            "issuing 100 collectives took {issue_time:?}"
        );

        for req in &mut requests {
            await_request(req);
        }

        let mut out = [0.0f64; 4];
        buf.download(&mut out, &stream);
        let scale = 4f64.powi(100);
        for (i, v) in out.iter().enumerate() {
            let expected = (i + 1) as f64 * scale;
            let rel = ((v - expected) / expected).abs();
            assert!(rel < 1e-9, "element {i}: got {v}, expected {expected}");
        }
    });
}
