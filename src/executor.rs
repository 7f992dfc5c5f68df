//! Makes it possible to run per-subtree tasks in the caller thread or in a
//! thread pool.

use std::sync::Arc;

use log::error;

use crate::error::SpatialIndexError;

/// Executor for parallel multi-index traversals.
#[derive(Clone)]
pub enum Executor {
    /// Run every task in the caller thread.
    SingleThread,
    /// Dispatch tasks to a rayon thread pool.
    ThreadPool(Arc<rayon::ThreadPool>),
}

impl Executor {
    /// Creates an executor that performs all tasks in the caller thread.
    pub fn single_thread() -> Executor {
        Executor::SingleThread
    }

    /// Creates an executor dispatching tasks to a pool of `num_threads`
    /// worker threads.
    pub fn multi_thread(num_threads: usize, prefix: &'static str) -> crate::Result<Executor> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |num| format!("{prefix}{num}"))
            .build()
            .map_err(|err| SpatialIndexError::Internal(err.to_string()))?;
        Ok(Executor::ThreadPool(Arc::new(pool)))
    }

    /// Maps `f` over `args`, preserving the argument order in the result.
    ///
    /// Tasks run concurrently on the thread-pool variant; the first failure
    /// is reported after all outstanding tasks have completed. Panics in a
    /// task propagate to the caller.
    pub fn map<A, R, F>(&self, f: F, args: impl Iterator<Item = A>) -> crate::Result<Vec<R>>
    where
        A: Send,
        R: Send,
        F: Sync + Fn(A) -> crate::Result<R>,
    {
        match self {
            Executor::SingleThread => args.map(f).collect::<crate::Result<_>>(),
            Executor::ThreadPool(pool) => {
                let args: Vec<A> = args.collect();
                let num_fruits = args.len();
                let fruit_receiver = {
                    let (fruit_sender, fruit_receiver) = crossbeam_channel::unbounded();
                    pool.scope(|scope| {
                        for (idx, arg) in args.into_iter().enumerate() {
                            // Borrow f and the sender so neither moves into
                            // the closure.
                            let f_ref = &f;
                            let fruit_sender_ref = &fruit_sender;
                            scope.spawn(move |_| {
                                let fruit = f_ref(arg);
                                if let Err(err) = fruit_sender_ref.send((idx, fruit)) {
                                    error!(
                                        "failed to send the result of a subtree task; the \
                                         receiving side probably panicked: {err:?}"
                                    );
                                }
                            });
                        }
                    });
                    fruit_receiver
                    // Dropping the sender here lets the receiver loop
                    // terminate.
                };
                let mut first_error = None;
                let mut result_placeholders: Vec<Option<R>> =
                    std::iter::repeat_with(|| None).take(num_fruits).collect();
                for (idx, fruit) in fruit_receiver {
                    match fruit {
                        Ok(result) => result_placeholders[idx] = Some(result),
                        Err(err) => {
                            first_error.get_or_insert(err);
                        }
                    }
                }
                if let Some(err) = first_error {
                    return Err(err);
                }
                let results: Vec<R> = result_placeholders.into_iter().flatten().collect();
                if results.len() != num_fruits {
                    return Err(SpatialIndexError::Internal(
                        "one of the mapped tasks failed to produce a result".to_string(),
                    ));
                }
                Ok(results)
            }
        }
    }
}
