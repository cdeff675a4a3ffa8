//! Service layer
//!
//! Services contain the business logic of the worker pool. The deployment
//! pipeline is the only one: it turns a queue delivery into a committed job
//! outcome using the job store and cluster collaborators it is given.

mod pipeline;

pub use pipeline::{DeploymentPipeline, JobFailure, Outcome, SUCCESS_RESULT, StageFault};
