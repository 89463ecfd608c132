// SPDX-License-Identifier: MPL-2.0

//! Process-wide Tokio runtime.
//!
//! The event loop runs on it through [`block_on`]; terminal input, which
//! only comes as blocking reads, goes to its blocking pool.

use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// REST calls and the auth listener are I/O bound.
const WORKER_THREADS: usize = 2;

static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .max_blocking_threads(2)
        .enable_all()
        .thread_name_fn(|| {
            static NEXT: AtomicUsize = AtomicUsize::new(0);
            format!("faxthat-rt-{}", NEXT.fetch_add(1, Ordering::Relaxed))
        })
        .build()
        .expect("failed to create async runtime")
});

/// Drive `future` to completion on the shared runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.block_on(future)
}

/// Run blocking work (stdin reads) off the worker threads.
pub fn spawn_blocking<F, R>(work: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    RUNTIME.spawn_blocking(work)
}
