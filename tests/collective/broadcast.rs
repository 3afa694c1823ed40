use gantry::{CollectiveAlgorithm, DeviceBuffer};

use super::helpers::{await_request, run_ranks};

/// Broadcast [7,7,7] from root 2: every rank ends with [7,7,7]; the root's
/// buffer is unchanged.
#[test]
fn test_bcast_from_root_two() {
    run_ranks(4, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<i32>::zeroed(3);
        if rc.rank() == 2 {
            buf.upload(&[7, 7, 7], &stream);
        }

        unsafe {
            rc.backend
                .bcast(
                    buf.as_mut_device_ptr(),
                    3,
                    2,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap();
        }

        let mut out = [0i32; 3];
        buf.download(&mut out, &stream);
        assert_eq!(out, [7, 7, 7], "rank {}", rc.rank());
    });
}

/// Non-blocking broadcast from rank 0.
#[test]
fn test_nonblocking_bcast() {
    run_ranks(3, |rc| {
        let stream = rc.comm.stream().clone();
        let mut buf = DeviceBuffer::<f32>::zeroed(4);
        if rc.rank() == 0 {
            buf.upload(&[42.0, 43.0, 44.0, 45.0], &stream);
        }

        let mut req = unsafe {
            rc.backend
                .nonblocking_bcast(
                    buf.as_mut_device_ptr(),
                    4,
                    0,
                    &rc.comm,
                    CollectiveAlgorithm::Automatic,
                )
                .unwrap()
        };
        await_request(&mut req);

        let mut out = [0.0f32; 4];
        buf.download(&mut out, &stream);
        assert_eq!(out, [42.0, 43.0, 44.0, 45.0]);
    });
}

/// A bad root fails explicitly before anything is enqueued.
#[test]
fn test_bcast_invalid_root() {
    run_ranks(2, |rc| {
        let mut buf = DeviceBuffer::<u8>::zeroed(1);
        let err = unsafe {
            rc.backend.bcast(
                buf.as_mut_device_ptr(),
                1,
                9,
                &rc.comm,
                CollectiveAlgorithm::Automatic,
            )
        }
        .unwrap_err();
        assert!(matches!(err, gantry::GantryError::InvalidRank { rank: 9, .. }));
        assert_eq!(rc.ctx.inflight(), 0);
    });
}
