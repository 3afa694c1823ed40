use gantry::{AllreduceAlgorithm, DeviceBuffer, ReduceOp};

use super::helpers::{await_request, run_ranks};

/// Allreduce SUM of [1,2,3,4] replicated on 4 ranks yields [4,8,12,16]
/// everywhere.
#[test]
fn test_allreduce_sum_replicated() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let mut send = DeviceBuffer::<f32>::zeroed(4);
        let mut recv = DeviceBuffer::<f32>::zeroed(4);
        send.upload(&[1.0, 2.0, 3.0, 4.0], &stream);

        unsafe {
            rc.backend
                .allreduce(
                    send.as_device_ptr(),
                    recv.as_mut_device_ptr(),
                    4,
                    ReduceOp::Sum,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap();
        }

        let mut out = [0.0f32; 4];
        recv.download(&mut out, &stream);
        assert_eq!(out, [4.0, 8.0, 12.0, 16.0], "rank {}", rc.rank());
    });
}

/// Round-trip: rank 0 contributes V, every other rank zeros; SUM yields V
/// on every rank.
#[test]
fn test_allreduce_roundtrip_identity() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let v = [3.5f64, -1.25, 0.5, 42.0, 7.0];
        let mut buf = DeviceBuffer::<f64>::zeroed(5);
        if rc.rank() == 0 {
            buf.upload(&v, &stream);
        }

        unsafe {
            rc.backend
                .allreduce_inplace(
                    buf.as_mut_device_ptr(),
                    5,
                    ReduceOp::Sum,
                    &rc.comm,
                    AllreduceAlgorithm::HostTransfer,
                )
                .unwrap();
        }

        let mut out = [0.0f64; 5];
        buf.download(&mut out, &stream);
        assert_eq!(out, v, "rank {}", rc.rank());
    });
}

/// In-place equivalence: the single-buffer form produces the same result as
/// the two-buffer form with send == recv contents.
#[test]
fn test_allreduce_inplace_equivalence() {
    run_ranks(3, |rc| {
        let stream = rc.comm.stream().clone();
        let init: Vec<i64> = (0..6).map(|i| (rc.rank() as i64 + 1) * (i + 1)).collect();

        let mut separate_send = DeviceBuffer::<i64>::zeroed(6);
        let mut separate_recv = DeviceBuffer::<i64>::zeroed(6);
        separate_send.upload(&init, &stream);
        let mut inplace = DeviceBuffer::<i64>::zeroed(6);
        inplace.upload(&init, &stream);

        unsafe {
            rc.backend
                .allreduce(
                    separate_send.as_device_ptr(),
                    separate_recv.as_mut_device_ptr(),
                    6,
                    ReduceOp::Max,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap();
            rc.backend
                .allreduce_inplace(
                    inplace.as_mut_device_ptr(),
                    6,
                    ReduceOp::Max,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap();
        }

        let mut two_buffer = [0i64; 6];
        separate_recv.download(&mut two_buffer, &stream);
        let mut one_buffer = [0i64; 6];
        inplace.download(&mut one_buffer, &stream);
        assert_eq!(two_buffer, one_buffer);
        // Max across ranks 1..=3 of (rank+1)*(i+1) is 3*(i+1).
        let expected: Vec<i64> = (0..6).map(|i| 3 * (i + 1)).collect();
        assert_eq!(one_buffer.to_vec(), expected);
    });
}

/// Non-blocking allreduce observed through a request.
#[test]
fn test_nonblocking_allreduce() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<u32>::zeroed(8);
        buf.upload(&[rc.rank() + 1; 8], &stream);

        let mut req = unsafe {
            rc.backend
                .nonblocking_allreduce_inplace(
                    buf.as_mut_device_ptr(),
                    8,
                    ReduceOp::Sum,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap()
        };
        assert!(!req.is_null());
        await_request(&mut req);

        let mut out = [0u32; 8];
        buf.download(&mut out, &stream);
        assert_eq!(out, [10u32; 8]);
    });
}

/// Different operators over the same fabric.
#[test]
fn test_allreduce_min_prod() {
    run_ranks(3, |rc| {
        let stream = rc.comm.stream().clone();
        let mut min_buf = DeviceBuffer::<i32>::zeroed(2);
        min_buf.upload(&[rc.rank() as i32 + 5, -(rc.rank() as i32)], &stream);
        let mut prod_buf = DeviceBuffer::<f64>::zeroed(1);
        prod_buf.upload(&[(rc.rank() + 1) as f64], &stream);

        unsafe {
            rc.backend
                .allreduce_inplace(
                    min_buf.as_mut_device_ptr(),
                    2,
                    ReduceOp::Min,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap();
            rc.backend
                .allreduce_inplace(
                    prod_buf.as_mut_device_ptr(),
                    1,
                    ReduceOp::Prod,
                    &rc.comm,
                    AllreduceAlgorithm::Automatic,
                )
                .unwrap();
        }

        let mut min_out = [0i32; 2];
        min_buf.download(&mut min_out, &stream);
        assert_eq!(min_out, [5, -2]);
        let mut prod_out = [0.0f64; 1];
        prod_buf.download(&mut prod_out, &stream);
        assert_eq!(prod_out, [6.0]);
    });
}
