use gantry::{AllreduceAlgorithm, CollectiveAlgorithm, DeviceBuffer, ReduceOp};

use super::helpers::{await_request, run_ranks};

/// Stream-ordering law: A then B on the same user stream; device work after
/// B observes both results.
#[test]
fn test_two_nonblocking_collectives_ordered_on_stream() {
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
        req_b.wait().unwrap();

        // Downloads ride the user stream, which is ordered after both ops.
        let mut out_a = [0.0f32; 4];
        a.download(&mut out_a, &stream);
        let mut out_b = [0.0f32; 4];
        b.download(&mut out_b, &stream);
        assert_eq!(out_a, [10.0f32; 4]);
        assert_eq!(out_b, [100.0f32; 4]);
    });
}

/// Blocking collectives on the same stream serialize by construction: the
/// second's staging copy cannot begin until the first's flag is signaled.
#[test]
fn test_blocking_collectives_chain_on_stream() {
    run_ranks(2, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<i64>::zeroed(2);
        buf.upload(&[1, 1], &stream);

        for _ in 0..5 {
            unsafe {
                rc.backend
                    .allreduce_inplace(
                        buf.as_mut_device_ptr(),
                        2,
                        ReduceOp::Sum,
                        &rc.comm,
                        AllreduceAlgorithm::Automatic,
                    )
                    .unwrap();
            }
        }

        let mut out = [0i64; 2];
        buf.download(&mut out, &stream);
        // Five doublings across 2 ranks.
        assert_eq!(out, [32, 32]);
    });
}

/// Mixed operation types on one stream stay ordered.
#[test]
fn test_mixed_ops_ordered() {
    run_ranks(2, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<i32>::zeroed(2);
        if rc.rank() == 0 {
            buf.upload(&[11, 22], &stream);
        }

        // Broadcast, then allreduce the broadcast result.
        let mut req = unsafe {
            rc.backend
                .nonblocking_bcast(
                    buf.as_mut_device_ptr(),
                    2,
                    0,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap()
        };
        req.wait().unwrap();
        let mut req2 = unsafe {
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
        await_request(&mut req2);

        let mut out = [0i32; 2];
        buf.download(&mut out, &stream);
        assert_eq!(out, [22, 44]);
    });
}
