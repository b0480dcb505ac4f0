use std::future::Future;

use taskwire_runtime::{AppContext, AppSpindown};
use tokio::select;

/// The primary entry point for running a Taskwire process.
pub struct App;

impl App {
    /// Builds a multi-threaded Tokio runtime and runs `async_main` on it,
    /// managing graceful shutdown: whichever of `async_main` or a termination
    /// signal (SIGINT/SIGTERM/Ctrl-C, observed through [`AppContext`])
    /// finishes first wins the race, after which the context is terminated
    /// and every registered [`AppSpindown`] workload is awaited before
    /// returning.
    pub fn boot<Main>(async_main: Main)
    where
        Main: Future<Output = ()>,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to build the Tokio runtime");

        runtime.block_on(Self::run_until_terminated(async_main));
    }

    async fn run_until_terminated<Main>(async_main: Main)
    where
        Main: Future<Output = ()>,
    {
        select! {
            biased;
            _ = AppContext::terminated() => {},
            _ = async_main => {},
        }

        AppContext::terminate();
        AppSpindown::completed().await;
    }
}
