// Copyright 2013-2014 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::alloc::Layout;
use std::borrow::Borrow;
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::process;
use std::ptr::{self, NonNull};

use crate::alloc::{CounterAlloc, Global};
use crate::error::AllocationError;


/// The block shared by every handle descended from one construction.
struct Counter<F, A> {
    count: Cell<usize>,
    finalizer: Option<F>,
    alloc: A,
}

/// A single-threaded reference-counted handle to a boxed payload.
///
/// Every clone shares the payload, the optional finalizer and one counter.
/// When the last handle is dropped, the finalizer runs on the payload, then
/// the payload is dropped and freed, then the counter block is freed.
///
/// The handle is neither `Send` nor `Sync`: the counter is a plain `Cell`.
pub struct SharedHandle<T, F = fn(&mut T), A = Global>
where
    F: FnOnce(&mut T),
    A: CounterAlloc,
{
    payload: NonNull<T>,
    counter: NonNull<Counter<F, A>>,
    _owns: PhantomData<(T, Counter<F, A>)>,
}

impl<T> SharedHandle<T> {
    /// Boxes `value` and constructs a handle without a finalizer.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let five = SharedHandle::new(5).unwrap();
    /// assert_eq!(*five, 5);
    /// ```
    pub fn new(value: T) -> Result<SharedHandle<T>, AllocationError<T>> {
        SharedHandle::from_box(Box::new(value))
    }

    /// Takes ownership of an already allocated payload.
    pub fn from_box(payload: Box<T>) -> Result<SharedHandle<T>, AllocationError<T>> {
        SharedHandle::new_in(payload, None, Global)
    }
}

impl<T, F: FnOnce(&mut T)> SharedHandle<T, F> {
    /// Takes ownership of `payload` and arranges for `finalizer` to run on it
    /// once, right before it is freed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use shared_handle::SharedHandle;
    ///
    /// let finalized = Rc::new(Cell::new(false));
    /// let flag = finalized.clone();
    /// let handle = SharedHandle::with_finalizer(Box::new(7), move |_: &mut i32| flag.set(true)).unwrap();
    /// let copy = handle.clone();
    ///
    /// drop(handle);
    /// assert!(!finalized.get());
    /// drop(copy);
    /// assert!(finalized.get());
    /// ```
    pub fn with_finalizer(
        payload: Box<T>,
        finalizer: F,
    ) -> Result<SharedHandle<T, F>, AllocationError<T, F>> {
        SharedHandle::new_in(payload, Some(finalizer), Global)
    }
}

impl<T, F: FnOnce(&mut T), A: CounterAlloc> SharedHandle<T, F, A> {
    /// Constructs a handle whose counter block comes from `alloc`.
    ///
    /// The counter block is allocated before ownership of the payload is
    /// taken. If that fails, the payload and the finalizer are handed back
    /// inside the error and the finalizer never runs.
    pub fn new_in(
        payload: Box<T>,
        finalizer: Option<F>,
        alloc: A,
    ) -> Result<SharedHandle<T, F, A>, AllocationError<T, F>> {
        let layout = Layout::new::<Counter<F, A>>();
        let counter = match alloc.allocate(layout) {
            Some(ptr) => ptr.cast::<Counter<F, A>>(),
            None => {
                debug!("counter allocation of {} bytes failed", layout.size());
                return Err(AllocationError::new(payload, finalizer, layout));
            }
        };
        unsafe {
            counter.as_ptr().write(Counter {
                count: Cell::new(1),
                finalizer,
                alloc,
            });
        }
        let payload = NonNull::from(Box::leak(payload));
        trace!("constructed {:p}, count 1", payload);
        Ok(SharedHandle {
            payload,
            counter,
            _owns: PhantomData,
        })
    }

    /// Releases this handle, the same as dropping it.
    ///
    /// If it was the last one, the finalizer runs and the payload and the
    /// counter block are freed before this returns.
    #[inline]
    pub fn release(this: Self) {
        drop(this)
    }

    /// Number of live handles sharing this payload.
    #[inline]
    pub fn strong_count(this: &Self) -> usize {
        this.counter().count.get()
    }

    /// Whether both handles descend from the same construction.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        // Zero-sized payloads all live at the same dangling address.
        this.counter == other.counter
    }

    /// Raw pointer to the payload, valid while any handle is live.
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        this.payload.as_ptr()
    }

    /// The allocator that provided the counter block.
    #[inline]
    pub fn allocator(this: &Self) -> &A {
        &this.counter().alloc
    }

    /// Returns a mutable reference to the payload if no other handle shares it.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let mut x = SharedHandle::new(3).unwrap();
    /// *SharedHandle::get_mut(&mut x).unwrap() = 4;
    /// assert_eq!(*x, 4);
    ///
    /// let _y = x.clone();
    /// assert!(SharedHandle::get_mut(&mut x).is_none());
    /// ```
    #[inline]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if SharedHandle::strong_count(this) == 1 {
            Some(unsafe { this.payload.as_mut() })
        } else {
            None
        }
    }

    #[inline(always)]
    fn counter(&self) -> &Counter<F, A> {
        unsafe { self.counter.as_ref() }
    }

    /// Runs the finalizer, then frees the payload, then the counter block.
    ///
    /// # Safety
    ///
    /// The count must have just reached zero through this handle.
    unsafe fn destroy(&mut self) {
        let counter = self.counter.as_ptr();
        let finalizer = ptr::read(ptr::addr_of!((*counter).finalizer));
        let alloc = ptr::read(ptr::addr_of!((*counter).alloc));

        // Locals drop in reverse order, also while unwinding out of a
        // panicking finalizer: the payload goes first, the counter block last.
        let _counter = FreeCounter {
            ptr: self.counter,
            alloc,
        };
        let _payload = FreePayload(self.payload);

        if let Some(finalizer) = finalizer {
            trace!("finalizing {:p}", self.payload);
            finalizer(&mut *self.payload.as_ptr());
        }
    }
}

struct FreePayload<T>(NonNull<T>);

impl<T> Drop for FreePayload<T> {
    fn drop(&mut self) {
        unsafe { drop(Box::from_raw(self.0.as_ptr())) }
    }
}

struct FreeCounter<F, A: CounterAlloc> {
    ptr: NonNull<Counter<F, A>>,
    alloc: A,
}

impl<F, A: CounterAlloc> Drop for FreeCounter<F, A> {
    fn drop(&mut self) {
        unsafe {
            self.alloc
                .deallocate(self.ptr.cast(), Layout::new::<Counter<F, A>>())
        }
    }
}

impl<T, F: FnOnce(&mut T), A: CounterAlloc> Clone for SharedHandle<T, F, A> {
    /// Makes another handle to the same payload, incrementing the count.
    ///
    /// Aborts the process if the count would overflow.
    #[inline]
    fn clone(&self) -> Self {
        let counter = self.counter();
        let count = match counter.count.get().checked_add(1) {
            Some(count) => count,
            None => process::abort(),
        };
        counter.count.set(count);
        trace!("copied {:p}, count {}", self.payload, count);
        SharedHandle {
            payload: self.payload,
            counter: self.counter,
            _owns: PhantomData,
        }
    }
}

impl<T, F: FnOnce(&mut T), A: CounterAlloc> Drop for SharedHandle<T, F, A> {
    fn drop(&mut self) {
        let counter = self.counter();
        let count = counter.count.get() - 1;
        counter.count.set(count);
        trace!("released {:p}, count {}", self.payload, count);
        if count == 0 {
            unsafe { self.destroy() }
        }
    }
}

impl<T, F: FnOnce(&mut T), A: CounterAlloc> Deref for SharedHandle<T, F, A> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { self.payload.as_ref() }
    }
}

impl<T, F: FnOnce(&mut T), A: CounterAlloc> AsRef<T> for SharedHandle<T, F, A> {
    fn as_ref(&self) -> &T {
        &**self
    }
}

impl<T, F: FnOnce(&mut T), A: CounterAlloc> Borrow<T> for SharedHandle<T, F, A> {
    fn borrow(&self) -> &T {
        &**self
    }
}

impl<T: PartialEq, F: FnOnce(&mut T), A: CounterAlloc> PartialEq for SharedHandle<T, F, A> {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: Eq, F: FnOnce(&mut T), A: CounterAlloc> Eq for SharedHandle<T, F, A> {}

impl<T: PartialOrd, F: FnOnce(&mut T), A: CounterAlloc> PartialOrd for SharedHandle<T, F, A> {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (**self).partial_cmp(&**other)
    }
}

impl<T: Ord, F: FnOnce(&mut T), A: CounterAlloc> Ord for SharedHandle<T, F, A> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        (**self).cmp(&**other)
    }
}

impl<T: Hash, F: FnOnce(&mut T), A: CounterAlloc> Hash for SharedHandle<T, F, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state)
    }
}

impl<T: fmt::Display, F: FnOnce(&mut T), A: CounterAlloc> fmt::Display for SharedHandle<T, F, A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: fmt::Debug, F: FnOnce(&mut T), A: CounterAlloc> fmt::Debug for SharedHandle<T, F, A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T, F: FnOnce(&mut T), A: CounterAlloc> fmt::Pointer for SharedHandle<T, F, A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Pointer::fmt(&self.payload.as_ptr(), f)
    }
}
