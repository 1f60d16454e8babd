// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity types for the scheduling platform.
//!
//! The occurrence id doubles as the broker correlation id (§3), so
//! `OccurrenceId` and "correlation id" are the same value everywhere in
//! the system — there is deliberately no separate `CorrelationId` type.

crate::define_id! {
    /// Identifies a `ScheduledJob`.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Identifies a `JobOccurrence`. Doubles as the broker correlation id.
    pub struct OccurrenceId("occ-");
}

crate::define_id! {
    /// Identifies a worker at the fleet level (shared by all instances of
    /// that worker deployment).
    pub struct WorkerId("wkr-");
}

crate::define_id! {
    /// Identifies one running replica of a worker (generated from the
    /// worker id plus process entropy at registration time).
    pub struct InstanceId("ist-");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrence_id_is_the_correlation_id() {
        let id = OccurrenceId::new();
        assert!(id.as_str().starts_with(OccurrenceId::PREFIX));
    }

    #[test]
    fn ids_round_trip_through_string() {
        let id = JobId::new();
        let s = id.to_string();
        let back = JobId::from_string(&s);
        assert_eq!(id, back);
    }

    #[test]
    fn distinct_prefixes_prevent_mixups() {
        assert_ne!(JobId::PREFIX, OccurrenceId::PREFIX);
        assert_ne!(WorkerId::PREFIX, InstanceId::PREFIX);
    }
}
