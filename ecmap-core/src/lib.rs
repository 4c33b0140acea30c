#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assignment;
pub mod error;
pub mod graph;
pub mod iuc;
pub mod json;
pub mod mapping;
pub mod mapping_config;
pub mod orchestrator;
pub mod policy;
pub mod step1;
pub mod step2;
pub mod step3;
pub mod step4;
pub mod taxonomy;
pub mod token;
pub mod tuple;
pub mod validate;

pub use error::{CoreError, Envelope, ErrorClass};
pub use orchestrator::{run_ec_pipeline, run_mapping_pipeline, EcPipelineOutput, MappingPipelineOutput};
pub use tuple::Tuple;
