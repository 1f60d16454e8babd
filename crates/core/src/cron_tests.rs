use super::*;
use chrono::TimeZone;

#[test]
fn parses_six_field_expression_with_seconds() {
    let schedule = Schedule::parse("*/5 * * * * *").expect("valid cron expression");
    let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let next = schedule.next_after(from).expect("next fire time");
    assert!(next > from);
    assert!((next - from).num_seconds() <= 5);
}

#[test]
fn round_trips_through_its_own_string_form() {
    let schedule = Schedule::parse("0 */15 * * * *").expect("valid cron expression");
    let reparsed = Schedule::parse(schedule.as_str()).expect("valid cron expression");
    assert_eq!(schedule, reparsed);
}

#[test]
fn next_fire_is_always_strictly_after_the_given_instant() {
    let schedule = Schedule::parse("0 0 * * * *").expect("valid cron expression");
    let from = Utc.with_ymd_and_hms(2026, 3, 4, 12, 30, 0).unwrap();
    let next = schedule.next_after(from).expect("next fire time");
    assert!(next > from);
}

#[test]
fn every_second_is_the_fastest_allowed_interval() {
    Schedule::parse("* * * * * *").expect("one-second interval is the permitted floor");
}

#[test]
fn malformed_expressions_are_rejected() {
    assert!(Schedule::parse("not a cron expression").is_err());
}
