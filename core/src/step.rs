//! Threshold step functions declared as data.
//!
//! Every business rule of the form "if x ≤ 30 then 0.05, else if x ≤ 60
//! then 0.15, ..." is an ordered list of `(bound, value)` pairs plus a
//! fallback. Steps are evaluated in declaration order and the first
//! match wins.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// A step matches when `x <= bound`. Bounds should ascend.
    AtMost,
    /// A step matches when `x >= bound`. Bounds should descend.
    AtLeast,
}

#[derive(Debug, Clone, Copy)]
pub struct StepTable<'a, T> {
    pub edge:      Edge,
    pub steps:     &'a [(f64, T)],
    pub otherwise: T,
}

impl<'a, T: Copy> StepTable<'a, T> {
    pub const fn at_most(steps: &'a [(f64, T)], otherwise: T) -> Self {
        Self { edge: Edge::AtMost, steps, otherwise }
    }

    pub const fn at_least(steps: &'a [(f64, T)], otherwise: T) -> Self {
        Self { edge: Edge::AtLeast, steps, otherwise }
    }

    pub fn lookup(&self, x: f64) -> T {
        let edge = self.edge;
        first_match(self.steps, self.otherwise, |bound| match edge {
            Edge::AtMost  => x <= bound,
            Edge::AtLeast => x >= bound,
        })
    }
}

/// Return the value of the first step whose bound satisfies `hit`,
/// or `otherwise` when none does.
pub fn first_match<T: Copy>(steps: &[(f64, T)], otherwise: T, hit: impl Fn(f64) -> bool) -> T {
    steps
        .iter()
        .find(|(bound, _)| hit(*bound))
        .map(|(_, value)| *value)
        .unwrap_or(otherwise)
}
