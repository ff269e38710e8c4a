use std::sync::atomic::{AtomicU64, Ordering};

use candle_core::Tensor;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::SamplingStrategy,
    end_points::{SeedPoints, Votes},
    error::HdNetError,
    ops::{furthest_point_sample, random_sample},
};

/// Picks the votes a proposal module aggregates around.
///
/// Random sampling draws from an [`StdRng`] keyed by the configured seed, the sampler's stream
/// and a call counter. Samplers sharing a seed but not a stream draw different indices, and a
/// sequence of forward passes is reproducible.
#[derive(Debug)]
pub struct VoteSampler {
    strategy: SamplingStrategy,
    num_proposal: usize,
    seed: u64,
    stream: u64,
    calls: AtomicU64,
}

impl VoteSampler {
    /// Create a sampler returning `num_proposal` indices per batch element.
    ///
    /// `stream` separates the random draws of samplers built from the same `seed`.
    pub fn new(strategy: SamplingStrategy, num_proposal: usize, seed: u64, stream: u64) -> Self {
        Self {
            strategy,
            num_proposal,
            seed,
            stream,
            calls: AtomicU64::new(0),
        }
    }

    /// The generator of one random draw; distinct `(seed, stream, call)` keys never share a seed.
    fn rng(&self, call: u64) -> StdRng {
        let mut key = [0u8; 32];
        key[..8].copy_from_slice(&self.seed.to_le_bytes());
        key[8..16].copy_from_slice(&self.stream.to_le_bytes());
        key[16..24].copy_from_slice(&call.to_le_bytes());
        StdRng::from_seed(key)
    }

    /// The sampling strategy.
    pub fn strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    /// Sample `(B, num_proposal)` `u32` indices into the vote set.
    ///
    /// With [`SamplingStrategy::SeedFps`] the seed with index `s` maps to its first vote
    /// `s * vote_factor`.
    pub fn sample(&self, votes: &Votes, seeds: &SeedPoints) -> Result<Tensor, HdNetError> {
        let (b, num_votes, _) = votes.xyz.dims3()?;
        let num_seeds = seeds.xyz.dim(1)?;

        match self.strategy {
            SamplingStrategy::VoteFps => furthest_point_sample(&votes.xyz, self.num_proposal),
            SamplingStrategy::SeedFps => {
                if num_seeds == 0 || num_votes % num_seeds != 0 {
                    return Err(HdNetError::ShapeMismatch {
                        context: "seed_fps",
                        expected: vec![num_seeds],
                        actual: vec![num_votes],
                    });
                }
                let vote_factor = (num_votes / num_seeds) as u32;
                let inds = furthest_point_sample(&seeds.xyz, self.num_proposal)?
                    .flatten_all()?
                    .to_vec1::<u32>()?
                    .into_iter()
                    .map(|s| s * vote_factor)
                    .collect::<Vec<_>>();
                Ok(Tensor::from_vec(
                    inds,
                    (b, self.num_proposal),
                    votes.xyz.device(),
                )?)
            }
            SamplingStrategy::Random => {
                let call = self.calls.fetch_add(1, Ordering::Relaxed);
                let mut rng = self.rng(call);
                log::debug!("random vote sampling, stream {}, call {call}", self.stream);
                random_sample(
                    b,
                    num_votes,
                    self.num_proposal,
                    &mut rng,
                    votes.xyz.device(),
                )
            }
        }
    }
}
