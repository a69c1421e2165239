//! Rolling-window forecasting of temperature and humidity.
//!
//! A small `12-64-32-2` ReLU network predicts the next reading from the last
//! four observations. The same model runs in two places:
//!
//! - an embedded device, which loads frozen parameters compiled in as
//!   fixed-size arrays and only calls [`Predictor::predict`];
//! - a gateway, which loads a JSON artifact and also calls
//!   [`Predictor::apply_update`] to adapt online as ground truth arrives.
//!
//! Parameters are fit offline with [`trainer::train`] and exchanged through
//! [`ModelArtifact`].

pub mod adapter;
pub mod buffer;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod metrics;
pub mod network;
pub mod optim;
pub mod predictor;
pub mod scaler;
pub mod trainer;

pub use adapter::UpdateSummary;
pub use buffer::{FeatureWindow, RollingBuffer};
pub use config::{Topology, TrainerConfig, N_FEATURES, N_OUTPUTS, WINDOW_SIZE};
pub use error::{ForecastError, Result};
pub use export::ModelArtifact;
pub use features::{build_supervised, Observation, SupervisedSet};
pub use network::{ForwardCache, Network, NetworkParams};
pub use predictor::{PredictionRecord, Predictor};
pub use scaler::Standardizer;
pub use trainer::{train, TrainedModel, TrainingReport};
