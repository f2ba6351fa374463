//! Run workloads concurrently against a cluster and print metrics.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use yansi::Paint;

use crate::scenario::{Op, ScenarioError, Scenarios};
use crate::workload::{Action, Workload};

/// Runs the given workloads concurrently against the cluster.
///
/// The function runs all workloads until the deadline, then prints metrics
/// and finally deletes all claims left behind. A cancellation token wired to
/// the run deadline aborts in-flight waits promptly; the cleanup pass runs
/// with a fresh, uncancelled scope.
pub async fn run(scenarios: Scenarios, workloads: Vec<Workload>, duration: Duration) -> Result<()> {
    let cancel = CancellationToken::new();
    let scoped = Arc::new(scenarios.with_cancel(cancel.clone()));

    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
        .with_message("Running stresstest:");
    bar.enable_steady_tick(Duration::from_millis(100));

    // run the workloads concurrently, cancelling leftover waits at the deadline
    let canceller = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(duration).await;
            cancel.cancel();
        }
    });
    let tasks: Vec<_> = workloads
        .into_iter()
        .map(|workload| {
            let scenarios = Arc::clone(&scoped);
            tokio::spawn(run_workload(scenarios, workload, duration))
        })
        .collect();

    let finished_tasks = futures::future::join_all(tasks).await;
    canceller.abort();
    bar.finish_and_clear();

    let mut total_metrics = WorkloadMetrics::default();
    let mut workloads = Vec::new();
    for task in finished_tasks {
        let (workload, metrics) = task.unwrap();

        println!();
        println!(
            "{} {} (concurrency: {})",
            "## Workload".bold(),
            workload.name.bold().blue(),
            workload.concurrency.bold()
        );
        print_metrics(&metrics, duration);

        total_metrics.merge(&metrics);
        workloads.push(workload);
    }

    println!();
    println!("{}", "## TOTALS".bold());
    print_metrics(&total_metrics, duration);
    println!();

    let max_concurrency = workloads.iter().map(|w| w.concurrency).max().unwrap_or(1);
    let claims_to_cleanup: Vec<_> = workloads
        .iter_mut()
        .flat_map(|w| w.remaining_claims())
        .collect();

    let bar = ProgressBar::new(claims_to_cleanup.len() as u64)
        .with_message("Deleting remaining claims...")
        .with_style(ProgressStyle::with_template(
            "{msg}\n{wide_bar} {pos}/{len}",
        )?);
    bar.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let cleanup_timing = Arc::new(Mutex::new(DDSketch::default()));
    futures::stream::iter(claims_to_cleanup)
        .for_each_concurrent(max_concurrency, |name| {
            let scenarios = Arc::clone(&scoped);
            let cleanup_timing = Arc::clone(&cleanup_timing);
            let cleanup_cancel = CancellationToken::new();
            let bar = &bar;
            async move {
                let scenarios = scenarios.with_cancel(cleanup_cancel);
                let start = Instant::now();
                if let Err(error) = scenarios.pvc_delete(&name).await {
                    eprintln!("error deleting claim {name}: {error}");
                }
                cleanup_timing
                    .lock()
                    .unwrap()
                    .add(start.elapsed().as_secs_f64());

                bar.inc(1);
            }
        })
        .await;

    bar.finish_and_clear();

    let cleanup_duration = start.elapsed();
    let cleanup_timing = cleanup_timing.lock().unwrap();

    println!(
        "{} ({} claims, concurrency: {})",
        "## CLEANUP".bold(),
        cleanup_timing.count().blue(),
        max_concurrency.bold()
    );
    if cleanup_timing.count() > 0 {
        print_ops(&cleanup_timing, cleanup_duration);
        println!();
        print_percentiles(&cleanup_timing, Duration::from_secs_f64);
    }

    Ok(())
}

async fn run_workload(
    scenarios: Arc<Scenarios>,
    workload: Workload,
    duration: Duration,
) -> (Workload, WorkloadMetrics) {
    let concurrency = workload.concurrency;
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let deadline = tokio::time::Instant::now() + duration;

    let workload = Arc::new(Mutex::new(workload));
    let metrics = Arc::new(Mutex::new(WorkloadMetrics::default()));

    // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        if deadline.elapsed() > Duration::ZERO {
            break;
        }
        tokio::select! {
            permit = semaphore.clone().acquire_owned() => {
                let workload = Arc::clone(&workload);
                let scenarios = Arc::clone(&scenarios);
                let metrics = Arc::clone(&metrics);

                let action = loop {
                    if let Some(action) = workload.lock().unwrap().next_action() {
                        break Some(action);
                    }
                    if deadline.elapsed() > Duration::ZERO {
                        break None;
                    }

                    // nothing to delete or read yet
                    tokio::time::sleep(Duration::from_millis(10)).await;
                };
                let Some(action) = action else {
                    break;
                };

                let task = async move {
                    let start = Instant::now();
                    match action {
                        Action::Create => {
                            let spec = workload.lock().unwrap().claim_spec();
                            match scenarios.pvc_create(spec).await {
                                Ok(name) => {
                                    workload.lock().unwrap().push_claim(name);
                                    metrics.lock().unwrap().record(Op::PvcCreate, start);
                                }
                                Err(error) => {
                                    tracing::error!(%error, "error creating claim");
                                    metrics.lock().unwrap().record_error(Op::PvcCreate, &error);
                                }
                            }
                        }
                        Action::Delete(name) => match scenarios.pvc_delete(&name).await {
                            Ok(()) => {
                                metrics.lock().unwrap().record(Op::PvcDelete, start);
                            }
                            Err(error) => {
                                tracing::error!(%error, claim = %name, "error deleting claim");
                                metrics.lock().unwrap().record_error(Op::PvcDelete, &error);
                            }
                        },
                        Action::Get(name) => match scenarios.pvc_get(&name).await {
                            Ok(observed) => {
                                metrics.lock().unwrap().record(Op::PvcGet, start);

                                let volume = observed.present().and_then(|s| s.volume_name);
                                if let Some(volume) = volume {
                                    let start = Instant::now();
                                    match scenarios.pv_get(&volume).await {
                                        Ok(_) => {
                                            metrics.lock().unwrap().record(Op::PvGet, start);
                                        }
                                        Err(error) => {
                                            tracing::error!(%error, %volume, "error reading volume");
                                            metrics.lock().unwrap().record_error(Op::PvGet, &error);
                                        }
                                    }
                                }
                                workload.lock().unwrap().push_claim(name);
                            }
                            Err(error) => {
                                tracing::error!(%error, claim = %name, "error reading claim");
                                metrics.lock().unwrap().record_error(Op::PvcGet, &error);
                            }
                        },
                        Action::List => {
                            match scenarios.pvc_list().await {
                                Ok(_) => metrics.lock().unwrap().record(Op::PvcList, start),
                                Err(error) => {
                                    tracing::error!(%error, "error listing claims");
                                    metrics.lock().unwrap().record_error(Op::PvcList, &error);
                                }
                            }
                            let start = Instant::now();
                            match scenarios.pv_list().await {
                                Ok(_) => metrics.lock().unwrap().record(Op::PvList, start),
                                Err(error) => {
                                    tracing::error!(%error, "error listing volumes");
                                    metrics.lock().unwrap().record_error(Op::PvList, &error);
                                }
                            }
                        }
                    }
                    drop(permit);
                };
                tokio::spawn(task);
            }
            _ = &mut sleep => {
                break;
            }
        }
    }

    // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
    let _permits = semaphore.acquire_many(concurrency as u32).await;

    let metrics: WorkloadMetrics = {
        let mut metrics = metrics.lock().unwrap();
        std::mem::take(&mut metrics)
    };

    let workload = Arc::try_unwrap(workload)
        .map_err(|_| ())
        .unwrap()
        .into_inner()
        .unwrap();

    (workload, metrics)
}

/// Latency sketch and failure counters for one named operation.
#[derive(Default)]
pub(crate) struct OpMetrics {
    timing: DDSketch,
    failures: u64,
    cancelled: u64,
}

/// Metrics for one workload, keyed by operation.
#[derive(Default)]
pub(crate) struct WorkloadMetrics {
    ops: BTreeMap<Op, OpMetrics>,
}

impl WorkloadMetrics {
    pub(crate) fn record(&mut self, op: Op, start: Instant) {
        self.ops
            .entry(op)
            .or_default()
            .timing
            .add(start.elapsed().as_secs_f64());
    }

    pub(crate) fn record_error(&mut self, op: Op, error: &ScenarioError) {
        let metrics = self.ops.entry(op).or_default();
        match error {
            ScenarioError::Cancelled => metrics.cancelled += 1,
            _ => metrics.failures += 1,
        }
    }

    pub(crate) fn merge(&mut self, other: &WorkloadMetrics) {
        for (op, metrics) in &other.ops {
            let entry = self.ops.entry(*op).or_default();
            entry.timing.merge(&metrics.timing).unwrap();
            entry.failures += metrics.failures;
            entry.cancelled += metrics.cancelled;
        }
    }
}

fn print_metrics(metrics: &WorkloadMetrics, duration: Duration) {
    for (op, metrics) in &metrics.ops {
        let ops = metrics.timing.count();
        if ops == 0 && metrics.failures == 0 && metrics.cancelled == 0 {
            continue;
        }

        print!(
            "{} ({} ops",
            format!("{op}:").to_uppercase().bold().green(),
            ops.bold()
        );
        if metrics.failures > 0 {
            print!(
                ", {}",
                format!("{} FAILURES", metrics.failures).bold().red()
            );
        }
        if metrics.cancelled > 0 {
            print!(", {} cancelled", metrics.cancelled);
        }
        println!(")");

        if ops > 0 {
            print_ops(&metrics.timing, duration);
            println!();
            print_percentiles(&metrics.timing, Duration::from_secs_f64);
        }
    }
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let avg = map(sketch.sum().unwrap() / ops as f64);
    let p50 = map(sketch.quantile(0.5).unwrap().unwrap());
    let p90 = map(sketch.quantile(0.9).unwrap().unwrap());
    let p99 = map(sketch.quantile(0.99).unwrap().unwrap());
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / duration.as_secs_f64();
    print!("  {:.2} operations/s", ops_ps.bold());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error() -> ScenarioError {
        ScenarioError::Api(pvcbench_client::Error::InvalidClusterUrl {
            message: "injected".into(),
        })
    }

    #[test]
    fn metrics_attribute_to_the_named_op() {
        let mut metrics = WorkloadMetrics::default();
        metrics.record(Op::PvcCreate, Instant::now());
        metrics.record(Op::PvcCreate, Instant::now());
        metrics.record(Op::PvList, Instant::now());
        metrics.record_error(Op::PvcDelete, &api_error());
        metrics.record_error(Op::PvcDelete, &ScenarioError::Cancelled);

        assert_eq!(metrics.ops[&Op::PvcCreate].timing.count(), 2);
        assert_eq!(metrics.ops[&Op::PvList].timing.count(), 1);
        assert_eq!(metrics.ops[&Op::PvcDelete].timing.count(), 0);
        assert_eq!(metrics.ops[&Op::PvcDelete].failures, 1);
        assert_eq!(metrics.ops[&Op::PvcDelete].cancelled, 1);
    }

    #[test]
    fn merge_sums_counters_per_op() {
        let mut left = WorkloadMetrics::default();
        left.record(Op::PvcGet, Instant::now());
        left.record_error(Op::PvcGet, &api_error());

        let mut right = WorkloadMetrics::default();
        right.record(Op::PvcGet, Instant::now());
        right.record(Op::PvGet, Instant::now());

        left.merge(&right);
        assert_eq!(left.ops[&Op::PvcGet].timing.count(), 2);
        assert_eq!(left.ops[&Op::PvcGet].failures, 1);
        assert_eq!(left.ops[&Op::PvGet].timing.count(), 1);
    }
}
