use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// A piecewise-linear, cyclically extended time function.
///
/// The series is a set of (time, value) breaks sorted ascending; the last
/// break time is the period of the function.  Queries past the period wrap
/// around (the series repeats forever).  Interpolation follows the form
///
///   slope = (v_i - v_{i+1}) / (t_i - t_{i+1})
///   intercept = v_{i+1}
///   value(t) = slope * (t - nt) + intercept
///
/// where `[pt, nt)` is the current bracket expressed in absolute time
/// (cycle offset included) and the intercept is anchored at the upper
/// bracket.  The bracket cursor is stateful across steps, so the search is
/// O(1) amortised for a simulation clock that advances monotonically.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeFunction {
    /// Break times [h], strictly increasing; the last entry is the period
    times: Vec<f64>,
    /// Values at the break times
    values: Vec<f64>,
    /// Index of the lower break of the current bracket
    cursor: usize,
    /// Current slope m
    slope: f64,
    /// Current intercept b (value at the upper break)
    intercept: f64,
    /// Prior (lower) interval time [h], absolute
    window_lower: f64,
    /// Next (upper) interval time [h], absolute
    window_upper: f64,
}

impl TimeFunction {
    /// Build a time function from (time, value) breaks.
    ///
    /// Fails with CONFIG-INVALID for fewer than two breaks or non-monotone
    /// times.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.len() < 2 {
            return Err(SimulationError::ConfigInvalid(format!(
                "time function needs at least 2 breaks, got {}",
                points.len()
            )));
        }
        for pair in points.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(SimulationError::ConfigInvalid(format!(
                    "time function breaks not increasing: {} then {}",
                    pair[0].0, pair[1].0
                )));
            }
        }
        let (times, values) = points.into_iter().unzip();
        Ok(TimeFunction {
            times,
            values,
            cursor: 0,
            slope: 0.0,
            intercept: 0.0,
            // force a bracket search on the first refresh
            window_lower: f64::INFINITY,
            window_upper: f64::NEG_INFINITY,
        })
    }

    /// A constant function (two equal breaks spanning `period`).
    pub fn constant(value: f64, period: f64) -> Self {
        TimeFunction::new(vec![(0.0, value), (period, value)])
            .expect("constant series is always valid")
    }

    /// Period of the function: the last break time [h].
    pub fn period(&self) -> f64 {
        *self.times.last().expect("validated: at least 2 breaks")
    }

    /// Absolute time [h] at which the bracket next becomes stale.
    pub fn next_update(&self) -> f64 {
        self.window_upper
    }

    /// True when `simtime` has left the current bracket.
    fn stale(&self, simtime: f64) -> bool {
        simtime >= self.window_upper || simtime < self.window_lower
    }

    /// Re-bracket the cursor for `simtime` and recompute slope, intercept,
    /// and window.  No-op while `simtime` remains inside the window.
    pub fn refresh(&mut self, simtime: f64) {
        if !self.stale(simtime) {
            return;
        }

        let endtime = self.period();

        // Work with the current time, modulo the period: if the simulation
        // time is past the last break, start again (cyclically) with the
        // first value in the series.
        let mtime = (simtime / endtime).fract() * endtime;

        // Walk the cursor up or down until mtime lies in [t_ip, t_ip+1).
        let mut ip = self.cursor;
        while ip + 2 < self.times.len() && mtime >= self.times[ip + 1] {
            ip += 1;
        }
        while ip > 0 && mtime < self.times[ip] {
            ip -= 1;
        }

        self.intercept = self.values[ip + 1];
        self.slope =
            (self.values[ip] - self.values[ip + 1]) / (self.times[ip] - self.times[ip + 1]);

        // Number of completed cycles at the current simulation time.
        let ncycle = (simtime / endtime).floor();
        self.window_upper = ncycle * endtime + self.times[ip + 1];
        self.window_lower = ncycle * endtime + self.times[ip];
        self.cursor = ip;
    }

    /// Interpolated value at `simtime` using the current slope/intercept.
    /// `refresh` must have run for a time inside the same bracket.
    pub fn value(&self, simtime: f64) -> f64 {
        self.slope * (simtime - self.window_upper) + self.intercept
    }

    /// Refresh then interpolate in one call.
    pub fn interpolate(&mut self, simtime: f64) -> f64 {
        self.refresh(simtime);
        self.value(simtime)
    }
}

/// A group of time functions sharing one update gate.
///
/// `next_any` is the earliest upper window bound across the group; the
/// bracket search is skipped for every member until the simulation clock
/// crosses it.  The linear-combination step runs every query regardless.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimeFunctionGroup {
    functions: Vec<TimeFunction>,
    next_any: f64,
}

impl TimeFunctionGroup {
    pub fn new(functions: Vec<TimeFunction>) -> Self {
        TimeFunctionGroup {
            functions,
            next_any: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Advance the group to `simtime`, re-bracketing only when the gate
    /// has been crossed.
    pub fn update(&mut self, simtime: f64) {
        if simtime < self.next_any || self.functions.is_empty() {
            return;
        }
        let mut nt = f64::INFINITY;
        for f in &mut self.functions {
            f.refresh(simtime);
            nt = nt.min(f.next_update());
        }
        self.next_any = nt;
    }

    /// Interpolated value of member `id` (1-based; 0 means "no function"
    /// and yields the multiplicative identity).
    pub fn value(&self, id: usize, simtime: f64) -> f64 {
        if id == 0 {
            return 1.0;
        }
        self.functions[id - 1].value(simtime)
    }

    pub fn get(&self, id: usize) -> Option<&TimeFunction> {
        if id == 0 {
            None
        } else {
            self.functions.get(id - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> TimeFunction {
        // 0 -> 10 over [0, 2], period 2 h
        TimeFunction::new(vec![(0.0, 0.0), (2.0, 10.0)]).unwrap()
    }

    #[test]
    fn rejects_short_and_nonmonotone_series() {
        assert!(TimeFunction::new(vec![(0.0, 1.0)]).is_err());
        assert!(TimeFunction::new(vec![(0.0, 1.0), (0.0, 2.0)]).is_err());
        assert!(TimeFunction::new(vec![(1.0, 1.0), (0.5, 2.0)]).is_err());
    }

    #[test]
    fn interpolates_linearly_inside_bracket() {
        let mut f = ramp();
        assert!((f.interpolate(0.5) - 2.5).abs() < 1e-12);
        assert!((f.interpolate(1.5) - 7.5).abs() < 1e-12);
    }

    #[test]
    fn wraps_cyclically_at_period() {
        let mut f = ramp();
        // t == endtime yields the value at t = 0 of the next cycle
        assert!((f.interpolate(2.0) - 0.0).abs() < 1e-12);
        assert!((f.interpolate(2.5) - 2.5).abs() < 1e-12);
        assert!((f.interpolate(5.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn cursor_survives_wraparound() {
        let mut f =
            TimeFunction::new(vec![(0.0, 1.0), (1.0, 2.0), (3.0, 4.0), (4.0, 0.0)]).unwrap();
        // Walk to the last bracket, then wrap; the cursor must re-bracket
        // without losing the series.
        let _ = f.interpolate(3.5);
        assert_eq!(f.cursor, 2);
        let v = f.interpolate(4.2);
        assert_eq!(f.cursor, 0);
        assert!((v - 1.2).abs() < 1e-12);
    }

    #[test]
    fn group_gate_skips_search_until_crossed() {
        let mut g = TimeFunctionGroup::new(vec![ramp(), TimeFunction::constant(3.0, 2.0)]);
        g.update(0.25);
        let nt = g.next_any;
        assert!(nt > 0.25);
        // interpolated values still track the clock between gate crossings
        assert!((g.value(1, 0.5) - 2.5).abs() < 1e-12);
        assert!((g.value(2, 0.5) - 3.0).abs() < 1e-12);
        g.update(nt + 0.1);
        assert!(g.next_any > nt);
    }

    #[test]
    fn id_zero_is_identity() {
        let g = TimeFunctionGroup::new(vec![]);
        assert_eq!(g.value(0, 17.0), 1.0);
    }
}
