//! Steering policies: trainable functions from the normalized arena state to a
//! 2-D movement direction.

pub mod network;
pub mod optimizer;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ::rand::Rng;
use macroquad::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{self, SimConfig};
use crate::save_load;
use network::{Network, Shape};
use optimizer::Adam;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("policy encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("unsupported policy snapshot version {0}")]
    Version(u32),
    #[error("corrupt policy snapshot: {0}")]
    Corrupt(String),
    #[error("policy shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch { expected: Shape, found: Shape },
}

/// Contract every steering policy satisfies.
///
/// `copy` must produce a fully independent clone: the population relies on
/// mutating children without touching their parents.
pub trait SteeringPolicy: Clone + Send {
    fn shape(&self) -> Shape;

    /// Pure inference. The result is not normalized.
    fn predict(&self, state: &[f32]) -> Vec2;

    /// One online update towards `target` (direction only), returning the raw
    /// prediction made before the update.
    fn train_step(&mut self, state: &[f32], target: Vec2) -> Vec2;

    /// Add `rate * N(0, 1)` to every parameter in place.
    fn mutate(&mut self, rate: f32, rng: &mut impl Rng);

    fn save(&self, path: &Path) -> Result<(), PolicyError>;

    /// Replace the parameters with the snapshot at `path`. The snapshot must
    /// have this policy's shape.
    fn load(&mut self, path: &Path) -> Result<(), PolicyError>;

    fn copy(&self) -> Self {
        self.clone()
    }
}

/// Which update rule a policy trains with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Plain gradient step with an explicit learning rate.
    Gradient,
    #[default]
    Adam,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Gradient => write!(f, "gradient"),
            PolicyKind::Adam => write!(f, "adam"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown policy kind `{0}` (expected `gradient` or `adam`)")]
pub struct ParsePolicyKindError(String);

impl FromStr for PolicyKind {
    type Err = ParsePolicyKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gradient" | "sgd" => Ok(Self::Gradient),
            "adam" => Ok(Self::Adam),
            other => Err(ParsePolicyKindError(other.to_string())),
        }
    }
}

fn load_matching(path: &Path, expected: Shape) -> Result<Network, PolicyError> {
    let (kind, network) = save_load::load_network(path)?;
    let found = network.shape();
    if found != expected {
        return Err(PolicyError::ShapeMismatch { expected, found });
    }
    log::info!("loaded {kind} policy {found:?} from {}", path.display());
    Ok(network)
}

/// Explicit gradient descent: `param -= lr * clipped_grad`.
#[derive(Clone, Debug)]
pub struct GradientPolicy {
    network: Network,
    pub learning_rate: f32,
}

impl GradientPolicy {
    pub fn new(shape: Shape, learning_rate: f32, rng: &mut impl Rng) -> Self {
        Self::from_network(Network::random(shape, rng), learning_rate)
    }

    pub fn from_network(network: Network, learning_rate: f32) -> Self {
        Self {
            network,
            learning_rate,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }
}

impl SteeringPolicy for GradientPolicy {
    fn shape(&self) -> Shape {
        self.network.shape()
    }

    fn predict(&self, state: &[f32]) -> Vec2 {
        self.network.predict(state)
    }

    fn train_step(&mut self, state: &[f32], target: Vec2) -> Vec2 {
        let act = self.network.forward(state);
        let (mut grads, _loss) = self.network.direction_gradients(state, &act, target);
        grads.clip_to(config::MAX_GRAD_NORM);
        let lr = self.learning_rate;
        self.network.apply(&grads, |_, g| lr * g);
        act.output
    }

    fn mutate(&mut self, rate: f32, rng: &mut impl Rng) {
        self.network.mutate(rate, rng);
    }

    fn save(&self, path: &Path) -> Result<(), PolicyError> {
        save_load::save_network(&self.network, PolicyKind::Gradient, path)
    }

    fn load(&mut self, path: &Path) -> Result<(), PolicyError> {
        self.network = load_matching(path, self.shape())?;
        Ok(())
    }
}

/// Same network trained with Adam.
#[derive(Clone, Debug)]
pub struct AdamPolicy {
    network: Network,
    optimizer: Adam,
}

impl AdamPolicy {
    pub fn new(shape: Shape, learning_rate: f32, rng: &mut impl Rng) -> Self {
        Self::from_network(Network::random(shape, rng), learning_rate)
    }

    /// Fresh optimizer state around existing parameters.
    pub fn from_network(network: Network, learning_rate: f32) -> Self {
        let optimizer = Adam::new(network.param_count(), learning_rate);
        Self { network, optimizer }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }
}

impl SteeringPolicy for AdamPolicy {
    fn shape(&self) -> Shape {
        self.network.shape()
    }

    fn predict(&self, state: &[f32]) -> Vec2 {
        self.network.predict(state)
    }

    fn train_step(&mut self, state: &[f32], target: Vec2) -> Vec2 {
        let act = self.network.forward(state);
        let (mut grads, _loss) = self.network.direction_gradients(state, &act, target);
        grads.clip_to(config::MAX_GRAD_NORM);
        self.optimizer.step(&mut self.network, &grads);
        act.output
    }

    fn mutate(&mut self, rate: f32, rng: &mut impl Rng) {
        self.network.mutate(rate, rng);
    }

    fn save(&self, path: &Path) -> Result<(), PolicyError> {
        save_load::save_network(&self.network, PolicyKind::Adam, path)
    }

    fn load(&mut self, path: &Path) -> Result<(), PolicyError> {
        self.network = load_matching(path, self.shape())?;
        self.optimizer.reset(self.network.param_count());
        Ok(())
    }
}

/// A policy of either kind, chosen once at construction.
#[derive(Clone, Debug)]
pub enum Policy {
    Gradient(GradientPolicy),
    Adam(AdamPolicy),
}

impl Policy {
    pub fn new(kind: PolicyKind, shape: Shape, learning_rate: f32, rng: &mut impl Rng) -> Self {
        match kind {
            PolicyKind::Gradient => Self::Gradient(GradientPolicy::new(shape, learning_rate, rng)),
            PolicyKind::Adam => Self::Adam(AdamPolicy::new(shape, learning_rate, rng)),
        }
    }

    pub fn from_config(config: &SimConfig, rng: &mut impl Rng) -> Self {
        let shape = Shape::new(config.input_dim(), config.hidden1, config.hidden2);
        Self::new(config.policy, shape, config.learning_rate, rng)
    }

    /// Like [`Policy::from_config`] but with hidden widths drawn from
    /// [`config::HIDDEN_WIDTH_CHOICES`].
    pub fn with_random_widths(config: &SimConfig, rng: &mut impl Rng) -> Self {
        let choices = &config::HIDDEN_WIDTH_CHOICES;
        let hidden1 = choices[rng.gen_range(0..choices.len())];
        let hidden2 = choices[rng.gen_range(0..choices.len())];
        let shape = Shape::new(config.input_dim(), hidden1, hidden2);
        Self::new(config.policy, shape, config.learning_rate, rng)
    }

    /// Rebuild a policy from a saved snapshot, taking its kind and layer
    /// widths from the file rather than from any config.
    pub fn from_snapshot(path: &Path, learning_rate: f32) -> Result<Self, PolicyError> {
        let (kind, network) = save_load::load_network(path)?;
        log::info!(
            "loaded {kind} policy {:?} from {}",
            network.shape(),
            path.display()
        );
        Ok(match kind {
            PolicyKind::Gradient => {
                Self::Gradient(GradientPolicy::from_network(network, learning_rate))
            }
            PolicyKind::Adam => Self::Adam(AdamPolicy::from_network(network, learning_rate)),
        })
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Gradient(_) => PolicyKind::Gradient,
            Self::Adam(_) => PolicyKind::Adam,
        }
    }

    pub fn network(&self) -> &Network {
        match self {
            Self::Gradient(p) => p.network(),
            Self::Adam(p) => p.network(),
        }
    }
}

impl SteeringPolicy for Policy {
    fn shape(&self) -> Shape {
        self.network().shape()
    }

    fn predict(&self, state: &[f32]) -> Vec2 {
        match self {
            Self::Gradient(p) => p.predict(state),
            Self::Adam(p) => p.predict(state),
        }
    }

    fn train_step(&mut self, state: &[f32], target: Vec2) -> Vec2 {
        match self {
            Self::Gradient(p) => p.train_step(state, target),
            Self::Adam(p) => p.train_step(state, target),
        }
    }

    fn mutate(&mut self, rate: f32, rng: &mut impl Rng) {
        match self {
            Self::Gradient(p) => p.mutate(rate, rng),
            Self::Adam(p) => p.mutate(rate, rng),
        }
    }

    fn save(&self, path: &Path) -> Result<(), PolicyError> {
        match self {
            Self::Gradient(p) => p.save(path),
            Self::Adam(p) => p.save(path),
        }
    }

    fn load(&mut self, path: &Path) -> Result<(), PolicyError> {
        match self {
            Self::Gradient(p) => p.load(path),
            Self::Adam(p) => p.load(path),
        }
    }
}
