//! Property-based tests for confidence calibration (§4.5 step 4) and the
//! scenario pass/fail threshold (§4.2).
