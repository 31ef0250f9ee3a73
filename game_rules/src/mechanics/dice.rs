//! Dice rolling behind a swappable random source.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of randomness for dice.
///
/// Shared through the capability bundle so every rule provider rolls from the
/// same source, and swapped for [`FixedRandom`] in tests.
pub trait RandomSource: Send + Sync {
    /// A random integer in `min..=max`.
    fn range(&self, min: i32, max: i32) -> i32;
}

/// Production source backed by `rand::thread_rng()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn range(&self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Deterministic source that replays a sequence, cycling when exhausted.
///
/// Values outside the requested range are clamped into it.
#[derive(Debug)]
pub struct FixedRandom {
    values: Vec<i32>,
    index: AtomicUsize,
}

impl FixedRandom {
    pub fn new(values: Vec<i32>) -> Self {
        Self {
            values,
            index: AtomicUsize::new(0),
        }
    }

    /// Always returns the same value.
    pub fn constant(value: i32) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for FixedRandom {
    fn range(&self, min: i32, max: i32) -> i32 {
        if self.values.is_empty() {
            return min;
        }
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        self.values[idx % self.values.len()].clamp(min, max.max(min))
    }
}

/// Result of rolling `count` dice with `sides` faces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub count: u32,
    pub sides: u32,
    pub rolls: Vec<i32>,
    pub total: i32,
}

impl DiceRoll {
    /// Roll `count`d`sides`. A zero-sided die always shows zero; faces above
    /// `i32::MAX` are capped there and the total saturates.
    pub fn roll(rng: &dyn RandomSource, count: u32, sides: u32) -> Self {
        let faces = i32::try_from(sides).unwrap_or(i32::MAX);
        let rolls: Vec<i32> = (0..count)
            .map(|_| if faces == 0 { 0 } else { rng.range(1, faces) })
            .collect();
        let total = rolls.iter().fold(0i32, |sum, roll| sum.saturating_add(*roll));
        Self {
            count,
            sides,
            rolls,
            total,
        }
    }

    pub fn d20(rng: &dyn RandomSource) -> Self {
        Self::roll(rng, 1, 20)
    }

    pub fn is_natural_20(&self) -> bool {
        self.count == 1 && self.sides == 20 && self.total == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.count == 1 && self.sides == 20 && self.total == 1
    }
}

impl fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{} = {}", self.count, self.sides, self.total)
    }
}
