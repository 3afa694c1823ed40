use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::types::Element;

use super::stream::DeviceStream;

/// Alignment for device allocations.
const DEVICE_ALIGN: usize = 256;

/// A device-resident buffer of `len` elements.
///
/// Contents are reachable from the host only through stream copies; `upload`
/// and `download` enqueue the copy and synchronize the stream before
/// returning, so the borrowed host slice never outlives its use.
pub struct DeviceBuffer<T: Element> {
    ptr: NonNull<u8>,
    len: usize,
    _marker: PhantomData<T>,
}

// The buffer is an exclusively owned allocation; raw pointers into it are
// only dereferenced by stream workers while a copy the owner enqueued is in
// flight.
unsafe impl<T: Element> Send for DeviceBuffer<T> {}

impl<T: Element> DeviceBuffer<T> {
    /// Allocate a zero-initialized buffer of `len` elements.
    pub fn zeroed(len: usize) -> Self {
        let layout = Self::layout(len);
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };
        Self {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    fn layout(len: usize) -> Layout {
        let bytes = len.saturating_mul(std::mem::size_of::<T>()).max(1);
        Layout::from_size_align(bytes, DEVICE_ALIGN)
            .unwrap_or_else(|_| panic!("device allocation of {bytes} bytes overflows"))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw device address of the buffer.
    pub fn as_device_ptr(&self) -> *const T {
        self.ptr.as_ptr() as *const T
    }

    /// Raw mutable device address of the buffer.
    pub fn as_mut_device_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr() as *mut T
    }

    /// Copy `data` into the buffer through `stream`, then synchronize.
    ///
    /// Panics if `data.len() != self.len()`.
    pub fn upload(&mut self, data: &[T], stream: &DeviceStream) {
        assert_eq!(data.len(), self.len, "upload length mismatch");
        unsafe {
            stream.copy_async(
                data.as_ptr() as u64,
                self.ptr.as_ptr() as u64,
                std::mem::size_of_val(data),
            );
        }
        stream.synchronize();
    }

    /// Copy the buffer into `out` through `stream`, then synchronize.
    ///
    /// Panics if `out.len() != self.len()`.
    pub fn download(&self, out: &mut [T], stream: &DeviceStream) {
        assert_eq!(out.len(), self.len, "download length mismatch");
        unsafe {
            stream.copy_async(
                self.ptr.as_ptr() as u64,
                out.as_mut_ptr() as u64,
                std::mem::size_of_val(out),
            );
        }
        stream.synchronize();
    }
}

impl<T: Element> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), Self::layout(self.len)) };
    }
}
