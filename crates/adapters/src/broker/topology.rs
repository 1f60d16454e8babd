// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bit-exact broker topology names.

pub const JOBS_EXCHANGE: &str = "jobs.topic";
pub const DLX_NAME: &str = "dlx_scheduled_jobs";
pub const DLQ_ROUTING_KEY: &str = "failed_jobs";

pub const SCHEDULED_JOBS_QUEUE: &str = "scheduled_jobs_queue";
pub const WORKER_LOGS_QUEUE: &str = "worker_logs_queue";
pub const WORKER_HEARTBEAT_QUEUE: &str = "worker_heartbeat_queue";
pub const WORKER_REGISTRATION_QUEUE: &str = "worker_registration_queue";
pub const JOB_STATUS_UPDATES_QUEUE: &str = "job_status_updates_queue";
pub const FAILED_JOBS_QUEUE: &str = "failed_jobs_queue";
