//! Settled fan-out: run a batch of futures to completion, then collapse
//! their outcomes using spec.md §4.4's rule (0 failures → values, 1 failure
//! → rethrow it, 2+ failures → [`Error::Aggregate`]).
//!
//! Every Series-level range operation (select/delete/drop/flush/insert)
//! dispatches to multiple buckets in parallel and feeds the results through
//! this helper, so the aggregation rule lives in exactly one place.

use crate::error::{Error, Result};
use futures::future::join_all;
use std::future::Future;

/// Await every future in `futures`, in order, then apply the fan-out
/// aggregation rule. The returned `Vec<T>` preserves the input order when
/// every future succeeds.
pub async fn settle_all<T, F>(futures: Vec<F>) -> Result<Vec<T>>
where
    F: Future<Output = Result<T>>,
{
    let results = join_all(futures).await;
    let mut oks = Vec::with_capacity(results.len());
    let mut errs = Vec::new();
    for result in results {
        match result {
            Ok(v) => oks.push(v),
            Err(e) => errs.push(e),
        }
    }
    if errs.is_empty() {
        Ok(oks)
    } else {
        Err(Error::aggregate(errs))
    }
}
