use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Uniform random source over ticket positions.
pub trait TicketPicker: Send {
    /// Returns an index uniformly distributed over `[0, len)`. `len` is never zero.
    fn pick(&mut self, len: u64) -> u64;

    /// Number of picks served so far.
    fn samples_drawn(&self) -> u64;
}

/// Adapts any `rand` generator into a `TicketPicker`.
pub struct RngPicker<R> {
    rng: R,
    samples_drawn: u64,
}

impl<R: Rng + Send> RngPicker<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            samples_drawn: 0,
        }
    }
}

impl RngPicker<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl RngPicker<ChaCha8Rng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> TicketPicker for RngPicker<R> {
    fn pick(&mut self, len: u64) -> u64 {
        assert!(len > 0, "Cannot pick from an empty pool");
        self.samples_drawn += 1;
        self.rng.gen_range(0..len)
    }

    fn samples_drawn(&self) -> u64 {
        self.samples_drawn
    }
}

/// Replays a fixed sequence of indices, wrapping each into range.
#[cfg(test)]
pub struct FixedPicker {
    indices: Vec<u64>,
    cursor: usize,
}

#[cfg(test)]
impl FixedPicker {
    pub fn new(indices: Vec<u64>) -> Self {
        assert!(!indices.is_empty(), "Fixed picker needs at least one index");
        Self { indices, cursor: 0 }
    }
}

#[cfg(test)]
impl TicketPicker for FixedPicker {
    fn pick(&mut self, len: u64) -> u64 {
        let index = self.indices[self.cursor % self.indices.len()];
        self.cursor += 1;
        index % len
    }

    fn samples_drawn(&self) -> u64 {
        self.cursor as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_pickers_are_reproducible() {
        let mut first = RngPicker::seeded(7);
        let mut second = RngPicker::seeded(7);
        let a: Vec<u64> = (0..32).map(|_| first.pick(1_000)).collect();
        let b: Vec<u64> = (0..32).map(|_| second.pick(1_000)).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|index| *index < 1_000));
        assert_eq!(first.samples_drawn(), 32);
    }

    #[test]
    fn fixed_picker_wraps_into_range() {
        let mut picker = FixedPicker::new(vec![0, 5]);
        assert_eq!(picker.pick(3), 0);
        assert_eq!(picker.pick(3), 2);
        assert_eq!(picker.pick(3), 0);
    }
}
