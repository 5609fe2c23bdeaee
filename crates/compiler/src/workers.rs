use crate::CompileError;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Runs `task` over `items` on a pool of at most `workers` threads and
/// returns one result per item, in input order.
///
/// A panicking task becomes a [`CompileError::WorkerPanic`] for its item;
/// siblings keep running.
pub(crate) fn fan_out<T, R, L, F>(
    workers: usize,
    items: Vec<T>,
    label: L,
    task: F,
) -> Result<Vec<Result<R, CompileError>>, CompileError>
where
    T: Send,
    R: Send,
    L: Fn(&T) -> String + Sync,
    F: Fn(T) -> Result<R, CompileError> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("sheetc-worker-{i}"))
        .build()
        .map_err(|e| CompileError::Pool(e.to_string()))?;

    Ok(pool.install(|| {
        items
            .into_par_iter()
            .map(|item| {
                let name = label(&item);
                match catch_unwind(AssertUnwindSafe(|| task(item))) {
                    Ok(result) => result,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(table = %name, %message, "worker panicked");
                        Err(CompileError::WorkerPanic { table: name, message })
                    }
                }
            })
            .collect()
    }))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Splits worker results into successes and the failure of the whole batch.
pub(crate) fn join<R>(results: Vec<Result<R, CompileError>>) -> Result<Vec<R>, CompileError> {
    let mut ok = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for r in results {
        match r {
            Ok(v) => ok.push(v),
            Err(e) => failed.push(e),
        }
    }
    if failed.is_empty() {
        Ok(ok)
    } else {
        Err(CompileError::Failed(failed))
    }
}
