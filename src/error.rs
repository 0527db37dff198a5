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
use std::fmt;

use thiserror::Error;

/// The error returned when the counter block of a new handle cannot be
/// allocated.
///
/// No handle was created, so the payload and the finalizer are given back
/// untouched. Dropping the error drops the payload without running the
/// finalizer.
#[derive(Error)]
#[error(
    "failed to allocate {} bytes of counter storage for a shared handle",
    .layout.size()
)]
pub struct AllocationError<T, F = fn(&mut T)> {
    payload: Box<T>,
    finalizer: Option<F>,
    layout: Layout,
}

impl<T, F> AllocationError<T, F> {
    pub(crate) fn new(payload: Box<T>, finalizer: Option<F>, layout: Layout) -> Self {
        AllocationError { payload, finalizer, layout }
    }

    /// The layout of the counter block that could not be allocated.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Gets back the payload, discarding the finalizer.
    pub fn into_payload(self) -> Box<T> {
        self.payload
    }

    /// Gets back both the payload and the finalizer passed at construction.
    pub fn into_parts(self) -> (Box<T>, Option<F>) {
        (self.payload, self.finalizer)
    }
}

impl<T, F> fmt::Debug for AllocationError<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AllocationError")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
