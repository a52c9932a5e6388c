//! Seedable multiply-with-carry generator.
//!
//! A MWC64X-style generator: 32-bit multiply-with-carry with the carry kept
//! in the upper half of a 64-bit state, output `x ^ c`. Every pixel and every
//! virtual-light sample gets its own stream derived from a shared
//! [`SeedTuple`] and a stream index, so results do not depend on which
//! thread renders what.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Multiplier of the MWC recurrence.
const MWC_A: u64 = 4_294_883_355;

/// Seed words are kept to 27 bits.
pub const SEED_MASK: u32 = 134_217_727;

/// First stream index used by the virtual point light pass; pixel streams
/// stay below it.
pub const VPL_STREAM_BASE: u64 = 1 << 48;

const INV_2_24: f32 = 1.0 / 16_777_216.0;

/// Four seed words shared by every stream of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedTuple {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub w: u32,
}

impl SeedTuple {
    /// Explicit seeds, masked to 27 bits.
    pub fn new(x: u32, y: u32, z: u32, w: u32) -> Self {
        Self {
            x: x & SEED_MASK,
            y: y & SEED_MASK,
            z: z & SEED_MASK,
            w: w & SEED_MASK,
        }
    }

    /// Seeds from wall-clock seconds, the process id, the sub-second clock
    /// reading and a word from the OS generator.
    pub fn from_entropy() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_clock(since_epoch, std::process::id(), rand::random::<u32>())
    }

    fn from_clock(since_epoch: Duration, pid: u32, extra: u32) -> Self {
        let secs = since_epoch.as_secs() as u32;
        let ticks = since_epoch.subsec_nanos() ^ secs.rotate_left(13);
        Self::new(
            secs,
            pid.wrapping_mul(pid).wrapping_mul(pid),
            ticks.wrapping_mul(ticks),
            extra,
        )
    }

    fn packed(&self) -> u64 {
        let lo = (self.x as u64) | ((self.y as u64) << 32);
        let hi = (self.z as u64) | ((self.w as u64) << 32);
        lo ^ hi.rotate_left(27)
    }
}

impl fmt::Display for SeedTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.z, self.w)
    }
}

impl FromStr for SeedTuple {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words = s
            .split(',')
            .map(|w| w.trim().parse::<u32>().map_err(|e| format!("bad seed word {w:?}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        match words.as_slice() {
            [x, y, z, w] => Ok(Self::new(*x, *y, *z, *w)),
            _ => Err(format!("expected 4 comma-separated seed words, got {}", words.len())),
        }
    }
}

/// splitmix64 finalizer, used only to spread seeds over the state.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Multiply-with-carry generator with 64 bits of state.
#[derive(Debug, Clone)]
pub struct Mwc64x {
    state: u64,
}

impl Mwc64x {
    /// Generator for stream `stream` of the render seeded by `seeds`.
    pub fn from_seeds(seeds: SeedTuple, stream: u64) -> Self {
        let mixed = mix64(seeds.packed() ^ mix64(stream));
        let x = mixed as u32 as u64;
        // Carry must stay in [1, A - 1] for the full period.
        let c = ((mixed >> 32) % (MWC_A - 1)) + 1;
        let mut rng = Self { state: x | (c << 32) };
        // The first outputs of a freshly mixed state are still correlated
        // with the stream index.
        for _ in 0..4 {
            rng.step();
        }
        rng
    }

    #[inline]
    fn step(&mut self) -> u32 {
        let x = self.state as u32;
        let c = (self.state >> 32) as u32;
        self.state = (x as u64) * MWC_A + c as u64;
        x ^ c
    }
}

impl RngCore for Mwc64x {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.step()
    }

    fn next_u64(&mut self) -> u64 {
        let lo = self.step() as u64;
        let hi = self.step() as u64;
        lo | (hi << 32)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Mwc64x {
    type Seed = [u8; 16];

    fn from_seed(seed: Self::Seed) -> Self {
        let word = |i: usize| u32::from_le_bytes([seed[i], seed[i + 1], seed[i + 2], seed[i + 3]]);
        Self::from_seeds(SeedTuple::new(word(0), word(4), word(8), word(12)), 0)
    }
}

/// Uniform float in [0, 1) from the top 24 bits of the next word.
#[inline]
pub fn gen_f32(rng: &mut dyn RngCore) -> f32 {
    (rng.next_u32() >> 8) as f32 * INV_2_24
}

/// Stream index of pixel `(x, y)` in an image `width` pixels wide.
#[inline]
pub fn pixel_stream(x: u32, y: u32, width: u32) -> u64 {
    y as u64 * width as u64 + x as u64
}
