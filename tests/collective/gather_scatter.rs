use gantry::{CollectiveAlgorithm, DeviceBuffer};

use super::helpers::{await_request, run_ranks};

/// Gather to root 0 of each rank's id, count=1: root receives [0,1,2,3];
/// other ranks' receive buffers are untouched.
#[test]
fn test_gather_rank_ids_to_root() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let mut send = DeviceBuffer::<u32>::zeroed(1);
        send.upload(&[rc.rank()], &stream);
        let mut recv = DeviceBuffer::<u32>::zeroed(4);
        recv.upload(&[99, 99, 99, 99], &stream);

        unsafe {
            rc.backend
                .gather(
                    send.as_device_ptr(),
                    recv.as_mut_device_ptr(),
                    1,
                    0,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap();
        }
        rc.comm.stream().synchronize();

        let mut out = [0u32; 4];
        recv.download(&mut out, &stream);
        if rc.rank() == 0 {
            assert_eq!(out, [0, 1, 2, 3]);
        } else {
            assert_eq!(out, [99, 99, 99, 99], "non-root buffer mutated");
        }
    });
}

/// In-place gather at the root: the root's contribution sits in its slot
/// and is not rewritten by the transport.
#[test]
fn test_gather_inplace_root() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        if rc.rank() == 1 {
            let mut buf = DeviceBuffer::<i32>::zeroed(8);
            let mut init = [0i32; 8];
            // Root slot (elements 2..4) holds the root's own contribution.
            init[2] = 100;
            init[3] = 101;
            buf.upload(&init, &stream);

            let mut req = unsafe {
                rc.backend
                    .nonblocking_gather_inplace(
                        buf.as_mut_device_ptr(),
                        2,
                        1,
                        &rc.comm,
                        CollectiveAlgorithm::Automatic,
                    )
                    .unwrap()
            };
            await_request(&mut req);

            let mut out = [0i32; 8];
            buf.download(&mut out, &stream);
            assert_eq!(out, [0, 1, 100, 101, 20, 21, 30, 31]);
        } else {
            let mut send = DeviceBuffer::<i32>::zeroed(2);
            let base = (rc.rank() * 10) as i32;
            send.upload(&[base, base + 1], &stream);
            let mut recv = DeviceBuffer::<i32>::zeroed(2);

            let mut req = unsafe {
                rc.backend
                    .nonblocking_gather(
                        send.as_device_ptr(),
                        recv.as_mut_device_ptr(),
                        2,
                        1,
                        &rc.comm,
                        CollectiveAlgorithm::Automatic,
                    )
                    .unwrap()
            };
            await_request(&mut req);
        }
    });
}

/// Scatter from root 3: rank k receives block k; the root's own block stays
/// in place.
#[test]
fn test_scatter_blocks() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let mut send = DeviceBuffer::<f32>::zeroed(8);
        if rc.rank() == 3 {
            let blocks: Vec<f32> = (0..8).map(|i| i as f32 * 0.5).collect();
            send.upload(&blocks, &stream);
        }
        let mut recv = DeviceBuffer::<f32>::zeroed(2);

        unsafe {
            rc.backend
                .scatter(
                    send.as_device_ptr(),
                    recv.as_mut_device_ptr(),
                    2,
                    3,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap();
        }
        rc.comm.stream().synchronize();

        let mut out = [0.0f32; 2];
        recv.download(&mut out, &stream);
        let base = rc.rank() as f32;
        assert_eq!(out, [base, base + 0.5], "rank {}", rc.rank());
    });
}

/// Non-blocking scatter: the root's receive buffer gets its own block even
/// with separate send/recv buffers.
#[test]
fn test_nonblocking_scatter_root_block() {
    run_ranks(2, |rc| {
        let stream = rc.comm.stream().clone();
        let mut send = DeviceBuffer::<u64>::zeroed(4);
        if rc.rank() == 0 {
            send.upload(&[10, 11, 20, 21], &stream);
        }
        let mut recv = DeviceBuffer::<u64>::zeroed(2);

        let mut req = unsafe {
            rc.backend
                .nonblocking_scatter(
                    send.as_device_ptr(),
                    recv.as_mut_device_ptr(),
                    2,
                    0,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap()
        };
        await_request(&mut req);

        let mut out = [0u64; 2];
        recv.download(&mut out, &stream);
        let expected = if rc.rank() == 0 { [10, 11] } else { [20, 21] };
        assert_eq!(out, expected);
    });
}
