use gantry::{CollectiveAlgorithm, DeviceBuffer, ReduceOp};

use super::helpers::{await_request, run_ranks};

/// Reduce SUM to root 2; only the root sees the result.
#[test]
fn test_reduce_to_root() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let mut send = DeviceBuffer::<i32>::zeroed(3);
        send.upload(&[rc.rank() as i32; 3], &stream);
        let mut recv = DeviceBuffer::<i32>::zeroed(3);
        recv.upload(&[-5; 3], &stream);

        unsafe {
            rc.backend
                .reduce(
                    send.as_device_ptr(),
                    recv.as_mut_device_ptr(),
                    3,
                    ReduceOp::Sum,
                    2,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap();
        }
        rc.comm.stream().synchronize();

        let mut out = [0i32; 3];
        recv.download(&mut out, &stream);
        if rc.rank() == 2 {
            assert_eq!(out, [6, 6, 6]);
        } else {
            assert_eq!(out, [-5, -5, -5], "non-root buffer mutated");
        }
    });
}

/// Reduce-scatter MAX of a rank-major 4x4 matrix: rank k receives the
/// element-wise max across ranks of row k.
#[test]
fn test_reduce_scatter_max_matrix() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        // Rank r's matrix entry (row, col) = r * 100 + row * 10 + col,
        // except rank (3 - row) plants a spike in that row.
        let r = rc.rank() as i32;
        let mut matrix = [0i32; 16];
        for row in 0..4 {
            for col in 0..4 {
                matrix[row * 4 + col] = r * 100 + (row as i32) * 10 + col as i32;
                if rc.rank() == 3 - row as u32 {
                    matrix[row * 4 + col] = 1000 + (row as i32) * 10 + col as i32;
                }
            }
        }
        let mut send = DeviceBuffer::<i32>::zeroed(16);
        send.upload(&matrix, &stream);
        let mut recv = DeviceBuffer::<i32>::zeroed(4);

        let mut req = unsafe {
            rc.backend
                .nonblocking_reduce_scatter(
                    send.as_device_ptr(),
                    recv.as_mut_device_ptr(),
                    4,
                    ReduceOp::Max,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap()
        };
        await_request(&mut req);

        let mut out = [0i32; 4];
        recv.download(&mut out, &stream);
        // Row k's max across ranks is the spike planted by rank 3-k.
        let row = rc.rank() as i32;
        assert_eq!(
            out,
            [
                1000 + row * 10,
                1000 + row * 10 + 1,
                1000 + row * 10 + 2,
                1000 + row * 10 + 3
            ],
            "rank {}",
            rc.rank()
        );
    });
}

/// In-place reduce-scatter: the reduced block lands at the front of the
/// buffer.
#[test]
fn test_reduce_scatter_inplace() {
    run_ranks(2, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<f32>::zeroed(4);
        buf.upload(&[1.0, 2.0, 3.0, 4.0], &stream);

        unsafe {
            rc.backend
                .reduce_scatter_inplace(
                    buf.as_mut_device_ptr(),
                    2,
                    ReduceOp::Sum,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap();
        }
        rc.comm.stream().synchronize();

        let mut out = [0.0f32; 4];
        buf.download(&mut out, &stream);
        // Both ranks contributed the same vector; rank k's block doubles.
        if rc.rank() == 0 {
            assert_eq!(out[0], 2.0);
            assert_eq!(out[1], 4.0);
        } else {
            assert_eq!(out[0], 6.0);
            assert_eq!(out[1], 8.0);
        }
    });
}

/// Non-blocking reduce in place at the root.
#[test]
fn test_nonblocking_reduce_inplace() {
    run_ranks(3, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<u64>::zeroed(2);
        buf.upload(&[rc.rank() as u64 + 1, 10 * (rc.rank() as u64 + 1)], &stream);

        let mut req = unsafe {
            rc.backend
                .nonblocking_reduce_inplace(
                    buf.as_mut_device_ptr(),
                    2,
                    ReduceOp::Prod,
                    0,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap()
        };
        await_request(&mut req);

        if rc.rank() == 0 {
            let mut out = [0u64; 2];
            buf.download(&mut out, &stream);
            assert_eq!(out, [6, 6000]);
        }
    });
}
