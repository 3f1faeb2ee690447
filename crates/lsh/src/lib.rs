//! Locality-sensitive similarity index for git-theta.
//!
//! At clean time the pipeline needs to decide whether a changed tensor is
//! still numerically close enough to its previous value to justify a delta
//! encoding. Exact equality is settled upstream by content hashes; this
//! index answers the "close but not equal" question: signatures bucket the
//! candidates, and a true L2 distance check against the threshold picks the
//! single winner.
//!
//! Signatures are E2LSH-style quantized Gaussian projections. The
//! projection vectors are drawn from a fixed-seed ChaCha pool, so index
//! behavior is deterministic across runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use theta_params::{Oid, Tensor};
use tracing::debug;

/// Seed for the shared projection pool. Fixed so that signatures are stable
/// across processes.
const POOL_SEED: u64 = 0x7468_6574_615f_6c73;

/// Quantization width of a projection bucket, in units of the threshold.
const BUCKET_WIDTH_FACTOR: f64 = 8.0;

/// A previous tensor registered in the index.
#[derive(Clone, Debug)]
pub struct LshEntry {
    oid: Oid,
    tensor: Tensor,
    signature: Vec<i64>,
}

impl LshEntry {
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }
}

/// The winning candidate for a query.
#[derive(Clone, Debug)]
pub struct LshMatch<'a> {
    pub oid: &'a Oid,
    pub tensor: &'a Tensor,
    pub distance: f64,
}

/// Similarity index over a bounded pool of previous tensor values.
#[derive(Debug)]
pub struct LshIndex {
    signature_size: usize,
    threshold: f64,
    pool_size: usize,
    projection_pool: Vec<f64>,
    entries: Vec<LshEntry>,
}

impl LshIndex {
    pub fn new(signature_size: usize, threshold: f64, pool_size: usize) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(POOL_SEED);
        let projection_pool = (0..pool_size.max(1))
            .map(|_| standard_normal(&mut rng))
            .collect();
        Self {
            signature_size,
            threshold,
            pool_size,
            projection_pool,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a previous tensor. Insertions beyond the pool bound are
    /// dropped; the query then simply reports no match for them.
    pub fn insert(&mut self, oid: Oid, tensor: Tensor) {
        if self.entries.len() >= self.pool_size {
            debug!(%oid, "similarity pool full, dropping entry");
            return;
        }
        let signature = self.signature(&tensor);
        self.entries.push(LshEntry {
            oid,
            tensor,
            signature,
        });
    }

    /// Find the single close match for `query`, if any.
    ///
    /// Candidates sit in the same or an adjacent bucket on every signature
    /// component (tensors within the threshold can straddle one bucket
    /// boundary); the winner is within the L2 threshold, ties broken by
    /// smaller distance then lexicographic oid.
    pub fn query(&self, query: &Tensor) -> Option<LshMatch<'_>> {
        let signature = self.signature(query);
        let mut best: Option<LshMatch<'_>> = None;
        for entry in &self.entries {
            if !signatures_adjacent(&entry.signature, &signature) {
                continue;
            }
            let Some(distance) = l2_distance(query, &entry.tensor) else {
                continue;
            };
            if distance > self.threshold {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    distance < current.distance
                        || (distance == current.distance && entry.oid < *current.oid)
                }
            };
            if better {
                best = Some(LshMatch {
                    oid: &entry.oid,
                    tensor: &entry.tensor,
                    distance,
                });
            }
        }
        best
    }

    /// Quantized projections of the flattened tensor.
    fn signature(&self, tensor: &Tensor) -> Vec<i64> {
        let values: Vec<f64> = match tensor.as_f32() {
            Ok(array) => array.iter().map(|v| *v as f64).collect(),
            Err(_) => return vec![i64::MIN; self.signature_size],
        };
        let width = self.threshold * BUCKET_WIDTH_FACTOR;
        (0..self.signature_size)
            .map(|bit| {
                let dot: f64 = values
                    .iter()
                    .enumerate()
                    .map(|(dim, v)| v * self.projection(bit, dim))
                    .sum();
                (dot / width).floor() as i64
            })
            .collect()
    }

    /// Projection component for (bit, dim), drawn from the shared pool.
    fn projection(&self, bit: usize, dim: usize) -> f64 {
        let mixed = splitmix64((bit as u64) << 32 ^ dim as u64);
        self.projection_pool[(mixed % self.projection_pool.len() as u64) as usize]
    }
}

fn standard_normal(rng: &mut ChaCha20Rng) -> f64 {
    // Box-Muller transform over two uniforms.
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn signatures_adjacent(a: &[i64], b: &[i64]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.abs_diff(*y) <= 1)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Euclidean distance between same-shape float tensors.
fn l2_distance(a: &Tensor, b: &Tensor) -> Option<f64> {
    if a.shape() != b.shape() {
        return None;
    }
    let a = a.as_f32().ok()?;
    let b = b.as_f32().ok()?;
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum();
    Some(sum.sqrt())
}
