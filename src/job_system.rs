use crate::error::{ImportError, Result};

/// Runs `job` over every item, on scoped worker threads when `threaded` is
/// set. Results keep the input order; the first failure wins.
pub(crate) fn run_jobs<T, R, F>(items: Vec<T>, threaded: bool, job: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R> + Sync,
{
    if !threaded || items.len() < 2 {
        return items.into_iter().map(job).collect();
    }

    let joined = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = items
            .into_iter()
            .map(|item| {
                let job = &job;
                scope.spawn(move |_| job(item))
            })
            .collect();
        handles.into_iter().map(|handle| handle.join()).collect::<Vec<_>>()
    })
    .map_err(|_| ImportError::WorkerPanicked)?;

    joined
        .into_iter()
        .map(|result| result.map_err(|_| ImportError::WorkerPanicked)?)
        .collect()
}
