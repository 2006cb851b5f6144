//! Submitting timebased assets to an external transcoder.

mod backend;
#[cfg(feature = "elastic-transcoder")]
mod elastic;
pub mod templates;
mod transcoder;

pub use backend::{
    CreateJobRequest, CreateJobResponse, JobOutputRequest, Page, Pipeline, TranscoderBackend,
    TranscoderLookup,
};
#[cfg(feature = "elastic-transcoder")]
pub use elastic::ElasticTranscoderBackend;
pub use transcoder::{Transcoder, TranscoderSettings, NO_OUTPUTS_ERROR, PIPELINE_NOT_FOUND_ERROR};

#[cfg(test)]
pub(crate) use backend::tests::MockTranscoderBackend;
