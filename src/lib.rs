//! A toroidal arena where a player chases particles and flees killers while a
//! small feed-forward policy learns to steer it online, plus an evolutionary
//! search over populations of such policies.

pub mod arena;
pub mod brain;
pub mod config;
pub mod entity;
pub mod episode;
pub mod evolution;
pub mod logging;
pub mod renderer;
pub mod reporting;
pub mod save_load;
pub mod world;

pub use arena::{Arena, TickOutput};
pub use brain::{Policy, PolicyError, PolicyKind, SteeringPolicy};
pub use config::{ConfigError, EvolutionConfig, RunConfig, Selection, SimConfig};
pub use episode::{Episode, EpisodeResult, Outcome};
pub use evolution::{Evolution, EvolutionOutcome, Member, Phase};
pub use logging::init as init_logging;
