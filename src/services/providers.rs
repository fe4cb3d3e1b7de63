// services/providers.rs
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of "now" for the simulator.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time anchored once, then advanced by tokio's monotonic clock.
///
/// Follows `tokio::time::pause`/`advance`, so flows under a paused test
/// runtime see simulated time pass instantly.
#[derive(Debug, Clone)]
pub struct SystemClock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.mono.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Randomness used for failure injection and id generation.
pub trait Entropy: Send + Sync {
    /// Uniform draw in `[0, 1)`.
    fn roll(&self) -> f64;

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn pick(&self, len: usize) -> usize;

    /// Uppercase alphanumeric token of `len` characters.
    fn token(&self, len: usize) -> String;
}

fn token_from<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadEntropy;

impl Entropy for ThreadEntropy {
    fn roll(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }

    fn token(&self, len: usize) -> String {
        token_from(&mut rand::thread_rng(), len)
    }
}

/// Reproducible entropy from a fixed seed.
#[derive(Debug)]
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        SeededEntropy {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }
}

impl Entropy for SeededEntropy {
    fn roll(&self) -> f64 {
        self.with_rng(|rng| rng.gen::<f64>())
    }

    fn pick(&self, len: usize) -> usize {
        self.with_rng(|rng| rng.gen_range(0..len))
    }

    fn token(&self, len: usize) -> String {
        self.with_rng(|rng| token_from(rng, len))
    }
}

/// Scripted entropy: hands out queued rolls in order, then repeats `fallback`.
///
/// `pick` consumes a roll too and scales it onto the index range, so a
/// script can steer both the dice and the chosen failure reason.
#[derive(Debug)]
pub struct SequenceEntropy {
    rolls: Mutex<VecDeque<f64>>,
    fallback: f64,
    counter: Mutex<u64>,
}

impl SequenceEntropy {
    pub fn new(rolls: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        SequenceEntropy {
            rolls: Mutex::new(rolls.into_iter().collect()),
            fallback,
            counter: Mutex::new(0),
        }
    }

    /// Every roll returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(std::iter::empty(), value)
    }
}

impl Entropy for SequenceEntropy {
    fn roll(&self) -> f64 {
        let mut rolls = self.rolls.lock().unwrap_or_else(|e| e.into_inner());
        rolls.pop_front().unwrap_or(self.fallback)
    }

    fn pick(&self, len: usize) -> usize {
        let index = (self.roll() * len as f64) as usize;
        index.min(len.saturating_sub(1))
    }

    fn token(&self, len: usize) -> String {
        let mut counter = self.counter.lock().unwrap_or_else(|e| e.into_inner());
        *counter += 1;
        format!("{:0>width$}", *counter, width = len)
    }
}
