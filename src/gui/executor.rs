use std::future::Future;
use iced_futures::{Executor, MaybeSend};

/// Runs iced commands and subscriptions on a multi threaded tokio runtime, so that the
/// bluetooth session worker has a reactor and timers available.
pub struct MyExecutor(tokio::runtime::Runtime);

impl Executor for MyExecutor {
    fn new() -> Result<Self, futures::io::Error> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("espfan-remote-worker")
            .build()
            .map(MyExecutor)
    }

    fn spawn(&self, future: impl Future<Output = ()> + MaybeSend + 'static) {
        let _ = self.0.spawn(future);
    }

    fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.0.enter();
        f()
    }
}
