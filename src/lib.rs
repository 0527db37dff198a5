// Copyright 2013-2014 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Thread-local reference-counted handles with finalizers (the
//! `SharedHandle<T>` type).
//!
//! A `SharedHandle<T>` owns a boxed payload together with every other handle
//! cloned from it. The handles share a single counter. Cloning increments it,
//! dropping decrements it, and when the last handle goes away the optional
//! finalizer runs on the payload, then the payload is dropped and freed, then
//! the counter block is freed. Because release is tied to `Drop`, it happens
//! on every way out of a scope: falling off the end, an early `return`, a `?`
//! propagating an error, or a panic unwinding.
//!
//! Construction is the only fallible operation. The counter block is allocated
//! through a `CounterAlloc` (the global allocator by default), and if that
//! allocation fails the payload is handed back to the caller inside an
//! `AllocationError` instead of being freed.
//!
//! The counter is not atomic, so handles can not leave the thread that made
//! them:
//!
//! ```compile_fail
//! use shared_handle::SharedHandle;
//!
//! fn assert_send<T: Send>(_: T) {}
//! assert_send(SharedHandle::new(1).unwrap());
//! ```
//!
//! ```compile_fail
//! use shared_handle::SharedHandle;
//!
//! fn assert_sync<T: Sync>(_: &T) {}
//! assert_sync(&SharedHandle::new(1).unwrap());
//! ```
//!
//! # Examples
//!
//! A function that needs the payload takes a copy into its own scope. The
//! copy is released when the function returns, and the payload lives on as
//! long as the caller's handle does.
//!
//! ```rust
//! use std::cell::Cell;
//! use shared_handle::SharedHandle;
//!
//! struct Test {
//!     val1: Cell<i32>,
//! }
//!
//! fn print_val1(handle: &SharedHandle<Test>) -> i32 {
//!     let local = handle.clone();
//!     assert_eq!(SharedHandle::strong_count(&local), 2);
//!     println!("The value of val1 is: {}", local.val1.get());
//!     local.val1.get()
//!     // `local` is released here.
//! }
//!
//! fn destruct(_: &mut Test) {
//!     println!("Destructing test struct!");
//! }
//!
//! fn main() {
//!     let test = SharedHandle::with_finalizer(
//!         Box::new(Test { val1: Cell::new(0) }),
//!         destruct as fn(&mut Test),
//!     )
//!     .unwrap();
//!
//!     test.val1.set(100);
//!     assert_eq!(print_val1(&test), 100);
//!     assert_eq!(SharedHandle::strong_count(&test), 1);
//!
//!     // `test` is released here, and `destruct` runs.
//! }
//! ```
//!
//! When the counter block can not be allocated, nothing has been taken from
//! the caller:
//!
//! ```rust
//! use std::alloc::Layout;
//! use std::ptr::NonNull;
//! use shared_handle::{CounterAlloc, SharedHandle};
//!
//! struct Exhausted;
//!
//! unsafe impl CounterAlloc for Exhausted {
//!     fn allocate(&self, _: Layout) -> Option<NonNull<u8>> {
//!         None
//!     }
//!
//!     unsafe fn deallocate(&self, _: NonNull<u8>, _: Layout) {
//!         unreachable!()
//!     }
//! }
//!
//! let payload = Box::new(String::from("still mine"));
//! let err = SharedHandle::new_in(payload, None::<fn(&mut String)>, Exhausted).unwrap_err();
//! println!("{}", err);
//! assert_eq!(*err.into_payload(), "still mine");
//! ```

#[cfg(feature = "log")]
macro_rules! trace {
    ($($arg:tt)+) => { log::trace!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)+) => {};
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:tt)+) => { log::debug!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)+) => {};
}

mod alloc;
mod error;
mod shared;

pub use self::alloc::{CounterAlloc, Global};
pub use self::error::AllocationError;
pub use self::shared::SharedHandle;
