//! Test fixtures: small tables in the same layout as the field exports.
//!
//! The three tables describe one tiny network:
//!   - R1 (10 units) watched by S1, with both flow and no-flow labels.
//!     Flow levels {0.12, 0.20}, no-flow levels {0.02, 0.05}, so two
//!     candidates (0.119 and 0.05) separate perfectly and average to 0.0845.
//!   - R2 (20 units) watched by S2, flow labels only, so its threshold is
//!     the lowest S2 reading ever recorded (0.30).
//!   - R3 (unknown length) has no labels at all.
//!
//! The reading table contains a NA cell for S2 at 13:00 on July 1st.

#[cfg(test)]
pub(crate) fn fixture_reaches_csv() -> &'static str {
    "location_id,length
R1,10
R2,20
R3,
"
}

#[cfg(test)]
pub(crate) fn fixture_observations_csv() -> &'static str {
    "location_id,sensor,state,water_level,observed_at
R1,S1,flow,0.12,2021-07-01 12:00:00
R1,S1,no_flow,0.05,2021-07-01 13:00:00
R1,S1,wt,0.20,2021-07-02 12:00:00
R1,S1,no_flow,0.02,2021-07-03 12:00:00
R2,S2,flow,0.40,2021-07-01 12:00:00
R2,S2,flow,0.55,2021-07-02 12:00:00
"
}

#[cfg(test)]
pub(crate) fn fixture_readings_csv() -> &'static str {
    "# logger export, local time
observed_at,S1,S2
2021-07-01 12:00:00,0.12,0.40
2021-07-01 13:00:00,0.05,NA
2021-07-02 12:00:00,0.20,0.55
2021-07-03 12:00:00,0.02,0.30
"
}
