//! End-to-end driver: fetch a domain pair, train both directions, evaluate each
//! on the other dataset.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span};

use affect_shared::{FeatureSource, SourceError, TargetDimension};

use crate::adapt::AdaptationMethod;
use crate::config::{ConfigError, PipelineConfig};
use crate::learner::{
    evaluate_bidirectional, train_bidirectional, BidirectionalEvaluation, BidirectionalModels,
    LearnerError,
};
use crate::logging::log_run;
use crate::models::FeatureImportance;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("feature source failed: {0}")]
    Source(#[from] SourceError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Learner(#[from] LearnerError),

    #[error("could not write run log: {0}")]
    Log(#[from] std::io::Error),
}

/// Everything produced for one target dimension.
#[derive(Debug, Clone)]
pub struct CrossDomainRun {
    pub dimension: TargetDimension,
    pub method: AdaptationMethod,
    pub models: BidirectionalModels,
    pub evaluation: BidirectionalEvaluation,
}

impl CrossDomainRun {
    /// Forward-model feature importances, most important first.
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        self.models.forward.feature_importance()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            dimension: self.dimension,
            method: self.method,
            forward_direction: self.evaluation.forward.direction.clone(),
            forward_accuracy: self.evaluation.forward.accuracy,
            forward_f1: self.evaluation.forward.weighted_f1,
            reverse_direction: self.evaluation.reverse.direction.clone(),
            reverse_accuracy: self.evaluation.reverse.accuracy,
            reverse_f1: self.evaluation.reverse.weighted_f1,
        }
    }
}

/// Flat per-dimension numbers for tabulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub dimension: TargetDimension,
    pub method: AdaptationMethod,
    pub forward_direction: String,
    pub forward_accuracy: f64,
    pub forward_f1: f64,
    pub reverse_direction: String,
    pub reverse_accuracy: f64,
    pub reverse_f1: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CrossDomainPipeline {
    config: PipelineConfig,
}

impl CrossDomainPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        Ok(Self::new(PipelineConfig::load_from_file(path)?))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(
        &self,
        source: &dyn FeatureSource,
        dimension: TargetDimension,
    ) -> Result<CrossDomainRun, PipelineError> {
        let span = info_span!("pipeline", dimension = %dimension, provider = source.name());
        let _enter = span.enter();

        let pair = source.domain_pair(dimension)?;
        let method = self.config.alignment.method;
        info!(
            source = pair.source().dataset(),
            target = pair.target().dataset(),
            features = pair.source().n_features(),
            method = %method,
            "starting cross-domain run"
        );

        let models = train_bidirectional(&pair, method, &self.config)?;
        let evaluation = evaluate_bidirectional(&models, &pair, &self.config.evaluation)?;
        Ok(CrossDomainRun {
            dimension,
            method,
            models,
            evaluation,
        })
    }

    /// Arousal then valence.
    pub fn run_all(&self, source: &dyn FeatureSource) -> Result<Vec<CrossDomainRun>, PipelineError> {
        TargetDimension::all()
            .into_iter()
            .map(|dimension| self.run(source, dimension))
            .collect()
    }

    /// Append both directions of `run` to a JSON-lines log.
    pub fn log<P: AsRef<Path>>(&self, run: &CrossDomainRun, path: P) -> Result<(), PipelineError> {
        log_run(
            path.as_ref(),
            run.dimension,
            &run.models.forward,
            &run.evaluation.forward,
        )?;
        log_run(
            path.as_ref(),
            run.dimension,
            &run.models.reverse,
            &run.evaluation.reverse,
        )?;
        Ok(())
    }
}
