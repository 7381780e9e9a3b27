//! Visit and API-call records produced by the pipeline.

mod access;
mod response;

pub use access::{
    AccessEvent, DeviceInfo, DeviceType, Engagement, ExitType, UserAction, UtmParams, Visit,
    VisitContext,
};
pub use response::{
    CallOutcome, FailureDetail, FailureKind, ImageInfo, Outcome, RecognitionPayload,
    ResponseEvent, ResponseRecord, ResponseStatus, Timing,
};
