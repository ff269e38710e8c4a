use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::HdNetError;

/// How a proposal module picks the votes it aggregates around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SamplingStrategy {
    /// Farthest point sampling directly on the vote positions.
    #[default]
    VoteFps,
    /// Farthest point sampling on the seed positions, then the votes cast by those seeds.
    SeedFps,
    /// Uniform random vote indices.
    Random,
}

impl SamplingStrategy {
    /// The configuration name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingStrategy::VoteFps => "vote_fps",
            SamplingStrategy::SeedFps => "seed_fps",
            SamplingStrategy::Random => "random",
        }
    }
}

impl FromStr for SamplingStrategy {
    type Err = HdNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vote_fps" => Ok(SamplingStrategy::VoteFps),
            "seed_fps" => Ok(SamplingStrategy::SeedFps),
            "random" => Ok(SamplingStrategy::Random),
            _ => Err(HdNetError::UnknownSamplingStrategy(s.to_string())),
        }
    }
}

impl TryFrom<String> for SamplingStrategy {
    type Error = HdNetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SamplingStrategy> for String {
    fn from(value: SamplingStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyper-parameters of the hybrid voting network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdNetConfig {
    /// Number of feature channels per input point besides xyz.
    pub input_feature_dim: usize,
    /// Number of seed points produced by each backbone tower.
    pub num_seed: usize,
    /// Feature width of the seeds and of the aggregated descriptor.
    pub seed_feature_dim: usize,
    /// Ball query radius of the backbone grouping.
    pub backbone_radius: f32,
    /// Neighbours gathered per seed by the backbone.
    pub backbone_nsample: usize,
    /// Hidden widths of the backbone shared MLP, before the final `seed_feature_dim` layer.
    pub backbone_mlp: Vec<usize>,
    /// Hidden width of the boundary flag heads.
    pub flag_hidden_dim: usize,
    /// Number of proposals per proposal module.
    pub num_proposal: usize,
    /// Number of votes cast by each seed.
    pub vote_factor: usize,
    /// Vote sampling strategy of the proposal modules.
    pub sampling: SamplingStrategy,
    /// Ball query radius of the vote aggregation.
    pub aggregation_radius: f32,
    /// Neighbours gathered per proposal by the vote aggregation.
    pub aggregation_nsample: usize,
    /// Feature width of the proposals.
    pub proposal_feature_dim: usize,
    /// Ball query radius used by the refinement stage to pool primitive proposals.
    pub refine_radius: f32,
    /// Predict the six bounding planes per seed.
    pub with_planes: bool,
    /// Predict per-seed semantic cues.
    pub with_object_cues: bool,
    /// Seed of the random vote sampling.
    pub seed: u64,
}

impl Default for HdNetConfig {
    fn default() -> Self {
        Self {
            input_feature_dim: 0,
            num_seed: 1024,
            seed_feature_dim: 256,
            backbone_radius: 0.2,
            backbone_nsample: 32,
            backbone_mlp: vec![64, 128],
            flag_hidden_dim: 128,
            num_proposal: 128,
            vote_factor: 1,
            sampling: SamplingStrategy::VoteFps,
            aggregation_radius: 0.3,
            aggregation_nsample: 16,
            proposal_feature_dim: 128,
            refine_radius: 0.5,
            with_planes: false,
            with_object_cues: false,
            seed: 0,
        }
    }
}

impl HdNetConfig {
    /// Check that the configuration describes a buildable network.
    pub fn validate(&self) -> Result<(), HdNetError> {
        let check = |ok: bool, msg: &str| {
            if ok {
                Ok(())
            } else {
                Err(HdNetError::InvalidConfig(msg.to_string()))
            }
        };

        check(self.num_seed > 0, "num_seed must be positive")?;
        check(self.seed_feature_dim > 0, "seed_feature_dim must be positive")?;
        check(self.vote_factor > 0, "vote_factor must be positive")?;
        check(self.num_proposal > 0, "num_proposal must be positive")?;
        check(
            self.num_proposal <= self.num_seed * self.vote_factor,
            "num_proposal cannot exceed the number of votes",
        )?;
        check(
            self.aggregation_nsample > 0 && self.backbone_nsample > 0,
            "nsample must be positive",
        )?;
        check(
            self.backbone_radius > 0.0 && self.aggregation_radius > 0.0 && self.refine_radius > 0.0,
            "radii must be positive",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_strategy_parse() -> Result<(), HdNetError> {
        assert_eq!("vote_fps".parse::<SamplingStrategy>()?, SamplingStrategy::VoteFps);
        assert_eq!("seed_fps".parse::<SamplingStrategy>()?, SamplingStrategy::SeedFps);
        assert_eq!("random".parse::<SamplingStrategy>()?, SamplingStrategy::Random);

        let err = "cluster_fps".parse::<SamplingStrategy>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown sampling strategy: cluster_fps");

        Ok(())
    }

    #[test]
    fn test_config_json() -> Result<(), Box<dyn std::error::Error>> {
        let config: HdNetConfig =
            serde_json::from_str(r#"{"num_proposal": 256, "sampling": "seed_fps"}"#)?;
        assert_eq!(config.num_proposal, 256);
        assert_eq!(config.sampling, SamplingStrategy::SeedFps);
        assert_eq!(config.num_seed, 1024);

        let json = serde_json::to_string(&config)?;
        assert!(json.contains("\"seed_fps\""));

        let bad = serde_json::from_str::<HdNetConfig>(r#"{"sampling": "nope"}"#);
        assert!(bad.is_err());

        Ok(())
    }

    #[test]
    fn test_config_validate() {
        assert!(HdNetConfig::default().validate().is_ok());

        let config = HdNetConfig {
            num_seed: 64,
            num_proposal: 128,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HdNetError::InvalidConfig(_))
        ));
    }
}
