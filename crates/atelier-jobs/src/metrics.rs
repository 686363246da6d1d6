//! Prometheus metrics for the job queue.

use atelier_core::{JobType, QueueStats};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    pub const JOBS_ENQUEUED_TOTAL: &str = "atelier_jobs_enqueued_total";
    pub const JOBS_CLAIMED_TOTAL: &str = "atelier_jobs_claimed_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "atelier_jobs_completed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "atelier_jobs_retried_total";
    pub const JOBS_FAILED_TOTAL: &str = "atelier_jobs_failed_total";
    pub const JOBS_TIMED_OUT_TOTAL: &str = "atelier_jobs_timed_out_total";
    pub const JOBS_REQUEUED_STALE_TOTAL: &str = "atelier_jobs_requeued_stale_total";

    pub const JOBS_PENDING: &str = "atelier_jobs_pending";
    pub const JOBS_PROCESSING: &str = "atelier_jobs_processing";

    pub const JOB_DURATION_SECONDS: &str = "atelier_job_duration_seconds";
    pub const JOB_WAIT_TIME_SECONDS: &str = "atelier_job_wait_time_seconds";

    pub const GENERATIONS_TOTAL: &str = "atelier_jobs_generations_total";
    pub const PROJECTS_COMPLETED_TOTAL: &str = "atelier_jobs_projects_completed_total";
    pub const SUBMISSIONS_REJECTED_TOTAL: &str = "atelier_jobs_submissions_rejected_total";
    pub const DISPATCHER_TICKS_TOTAL: &str = "atelier_jobs_dispatcher_ticks_total";
}

/// Registers metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(names::JOBS_CLAIMED_TOTAL, "Total number of jobs claimed by workers");
    describe_counter!(names::JOBS_COMPLETED_TOTAL, "Total number of jobs completed");
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of jobs returned to pending");
    describe_counter!(names::JOBS_FAILED_TOTAL, "Total number of jobs that failed for good");
    describe_counter!(names::JOBS_TIMED_OUT_TOTAL, "Total number of handler timeouts");
    describe_counter!(
        names::JOBS_REQUEUED_STALE_TOTAL,
        "Total number of stale processing jobs reclaimed by the reaper"
    );

    describe_gauge!(names::JOBS_PENDING, "Current number of pending jobs");
    describe_gauge!(names::JOBS_PROCESSING, "Current number of processing jobs");

    describe_histogram!(names::JOB_DURATION_SECONDS, "Handler execution time in seconds");
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Time between creation and claim in seconds"
    );

    describe_counter!(names::GENERATIONS_TOTAL, "Calls to the generation services");
    describe_counter!(names::PROJECTS_COMPLETED_TOTAL, "Projects moved to completed");
    describe_counter!(
        names::SUBMISSIONS_REJECTED_TOTAL,
        "Submissions refused before enqueue"
    );
    describe_counter!(names::DISPATCHER_TICKS_TOTAL, "Dispatcher ticks");
}

pub fn record_enqueued(job_type: JobType) {
    counter!(names::JOBS_ENQUEUED_TOTAL, "job_type" => job_type.as_str()).increment(1);
}

pub fn record_claimed(job_type: JobType, wait: Duration) {
    counter!(names::JOBS_CLAIMED_TOTAL, "job_type" => job_type.as_str()).increment(1);
    histogram!(names::JOB_WAIT_TIME_SECONDS, "job_type" => job_type.as_str())
        .record(wait.as_secs_f64());
}

pub fn record_completed(job_type: JobType, duration: Duration) {
    counter!(names::JOBS_COMPLETED_TOTAL, "job_type" => job_type.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "job_type" => job_type.as_str())
        .record(duration.as_secs_f64());
}

pub fn record_retried(job_type: JobType, reason: &'static str) {
    counter!(
        names::JOBS_RETRIED_TOTAL,
        "job_type" => job_type.as_str(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_failed(job_type: JobType, reason: &'static str) {
    counter!(
        names::JOBS_FAILED_TOTAL,
        "job_type" => job_type.as_str(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_timed_out(job_type: JobType) {
    counter!(names::JOBS_TIMED_OUT_TOTAL, "job_type" => job_type.as_str()).increment(1);
}

pub fn record_requeued_stale(count: u64) {
    counter!(names::JOBS_REQUEUED_STALE_TOTAL).increment(count);
}

pub fn record_generation(service: &'static str) {
    counter!(names::GENERATIONS_TOTAL, "service" => service).increment(1);
}

pub fn record_project_completed() {
    counter!(names::PROJECTS_COMPLETED_TOTAL).increment(1);
}

pub fn record_submission_rejected(reason: &'static str) {
    counter!(names::SUBMISSIONS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_dispatcher_tick(processed: usize) {
    counter!(names::DISPATCHER_TICKS_TOTAL, "idle" => if processed == 0 { "true" } else { "false" })
        .increment(1);
}

#[allow(clippy::cast_precision_loss)]
pub fn update_queue_depth(stats: &QueueStats) {
    gauge!(names::JOBS_PENDING).set(stats.pending as f64);
    gauge!(names::JOBS_PROCESSING).set(stats.processing as f64);
}
