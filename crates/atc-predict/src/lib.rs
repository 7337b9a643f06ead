//! `atc-predict` — forecasting traffic state and optimizing against it.
//!
//! The [`TrafficPredictor`] blends stored `(road, day-of-week, slot)`
//! patterns with the live road state into a per-road forecast with a
//! confidence score.  The [`PredictiveOptimizer`] turns a forecast into a
//! synthetic network snapshot, runs the genetic algorithm against it, and
//! scores its own past predictions once their target time has passed.
//!
//! | Module       | Contents                                               |
//! |--------------|--------------------------------------------------------|
//! | [`predictor`]| `PredictionConfig`, `PredictedMetrics`, `TrafficPredictor` |
//! | [`optimizer`]| `PipelineStatus`, `PredictiveOptimizer`, accuracy FIFO |

pub mod error;
pub mod optimizer;
pub mod predictor;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{PredictError, PredictResult};
pub use optimizer::{
    OptimizationOutcome, PipelineStatus, PredictionAccuracy, PredictiveConfig,
    PredictiveOptimizer,
};
pub use predictor::{PredictedMetrics, PredictionConfig, PredictionResult, TrafficPredictor};
